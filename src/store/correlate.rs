use super::{FractionTag, ObservationStore, ParentalSite, TraceEvent};
use crate::errors::Error;
use std::collections::HashMap;

/// Random access to alignments: template length per read name in a window.
pub trait AlignmentSource {
    fn template_lengths(
        &mut self,
        chrom: &str,
        start: u32,
        end: u32,
    ) -> Result<HashMap<String, u32>, Error>;
}

/// Parental genotypes used to tag fragments for fraction estimation.
pub trait ParentalSource {
    fn site(&mut self, chrom: &str, pos: u32) -> Result<Option<ParentalSite>, Error>;
}

/// Used when no parental call set is supplied; every fragment stays unclassified.
pub struct NoParents;

impl ParentalSource for NoParents {
    fn site(&mut self, _chrom: &str, _pos: u32) -> Result<Option<ParentalSite>, Error> {
        Ok(None)
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CorrelationStats {
    pub positions: usize,
    pub fragments: usize,
    pub uncorrelated: usize,
    pub invalid: usize,
    pub abandoned: usize,
}

#[derive(Debug)]
struct PositionCursor {
    chrom: String,
    pos: u32,
    lengths: Option<HashMap<String, u32>>,
    site: Option<Option<ParentalSite>>,
}

#[derive(Debug)]
enum CursorState {
    Idle,
    Accumulating(PositionCursor),
    /// After an unreadable position marker: fragments are dropped until the
    /// next marker or `finished position`.
    Skipping,
}

/// Turns trace events into store batches, resolving each fragment's template
/// length from alignments around the current position.
pub struct Correlator<A, P> {
    alignments: A,
    parents: P,
    window: u32,
    state: CursorState,
    stats: CorrelationStats,
}

impl<A: AlignmentSource, P: ParentalSource> Correlator<A, P> {
    pub fn new(alignments: A, parents: P, window: u32) -> Self {
        Self {
            alignments,
            parents,
            window,
            state: CursorState::Idle,
            stats: CorrelationStats::default(),
        }
    }

    /// Applies one event. Only errors that break the trace ordering or the
    /// store itself are returned; fragment-level problems are logged and skipped.
    pub fn handle(&mut self, event: TraceEvent, store: &mut ObservationStore) -> Result<(), Error> {
        match self.apply(event, store) {
            Ok(()) => Ok(()),
            Err(err) if err.is_fatal() => Err(err),
            Err(err) => {
                self.record_skip(&err);
                Ok(())
            }
        }
    }

    /// Closes the stream; a position left open by a truncated trace is discarded.
    pub fn finish(mut self, store: &mut ObservationStore) -> CorrelationStats {
        match std::mem::replace(&mut self.state, CursorState::Idle) {
            CursorState::Accumulating(cursor) => {
                log::warn!(
                    "Trace ended inside position {}:{}; discarding it",
                    cursor.chrom,
                    cursor.pos
                );
                store.abandon_position();
                self.stats.abandoned += 1;
            }
            CursorState::Skipping => self.discard_interrupted(store),
            CursorState::Idle => {}
        }
        self.stats
    }

    pub fn stats(&self) -> &CorrelationStats {
        &self.stats
    }

    fn apply(&mut self, event: TraceEvent, store: &mut ObservationStore) -> Result<(), Error> {
        match event {
            TraceEvent::Position { chrom, pos } => {
                if matches!(self.state, CursorState::Skipping) {
                    self.discard_interrupted(store);
                }
                store.begin_position(&chrom, pos)?;
                self.state = CursorState::Accumulating(PositionCursor {
                    chrom,
                    pos,
                    lengths: None,
                    site: None,
                });
                Ok(())
            }
            TraceEvent::Fragment { allele, read_id } => {
                let cursor = match &mut self.state {
                    CursorState::Accumulating(cursor) => cursor,
                    CursorState::Idle => return Err(Error::NoOpenPosition),
                    CursorState::Skipping => {
                        log::debug!("Dropping fragment {} of an unreadable position", read_id);
                        self.stats.invalid += 1;
                        return Ok(());
                    }
                };
                let lengths = match cursor.lengths.take() {
                    Some(lengths) => lengths,
                    None => self.alignments.template_lengths(
                        &cursor.chrom,
                        cursor.pos.saturating_sub(self.window),
                        cursor.pos.saturating_add(self.window),
                    )?,
                };
                let length = lengths.get(&read_id).copied();
                cursor.lengths = Some(lengths);

                let length = length.ok_or_else(|| Error::Correlation {
                    chrom: cursor.chrom.clone(),
                    pos: cursor.pos,
                    read_id: read_id.clone(),
                })?;

                if cursor.site.is_none() {
                    cursor.site = Some(self.parents.site(&cursor.chrom, cursor.pos)?);
                }
                let tag = match cursor.site.as_ref().and_then(|site| site.as_ref()) {
                    Some(site) => FractionTag::classify(&allele, site),
                    None => FractionTag::Unclassified,
                };

                store.record_fragment(&allele, length, &read_id, tag)?;
                self.stats.fragments += 1;
                Ok(())
            }
            TraceEvent::Finished => {
                if matches!(self.state, CursorState::Skipping) {
                    self.discard_interrupted(store);
                    self.state = CursorState::Idle;
                    return Ok(());
                }
                let committed = store.commit_position()?;
                if let CursorState::Accumulating(cursor) =
                    std::mem::replace(&mut self.state, CursorState::Idle)
                {
                    log::trace!(
                        "{}:{}: committed {} fragments",
                        cursor.chrom,
                        cursor.pos,
                        committed
                    );
                }
                self.stats.positions += 1;
                Ok(())
            }
        }
    }

    /// Drops a position that was still open when an unreadable marker arrived.
    fn discard_interrupted(&mut self, store: &mut ObservationStore) {
        if let Some((chrom, pos)) = store.abandon_position() {
            log::warn!(
                "Position {}:{} interrupted by an unreadable marker; discarding it",
                chrom,
                pos
            );
            self.stats.abandoned += 1;
        }
    }

    /// Counts a contained error against the run statistics. An unreadable
    /// position marker also puts the cursor into skipping mode.
    pub fn record_skip(&mut self, err: &Error) {
        match err {
            Error::MalformedMarker { .. } => {
                log::warn!("Skipping position: {}", err);
                self.stats.invalid += 1;
                self.state = CursorState::Skipping;
            }
            Error::Correlation { .. } => {
                log::debug!("Skipping fragment: {}", err);
                self.stats.uncorrelated += 1;
            }
            _ => {
                log::warn!("Skipping trace record: {}", err);
                self.stats.invalid += 1;
            }
        }
    }
}
