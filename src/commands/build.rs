use crate::cli::BuildArgs;
use crate::store::{
    stream_trace_into_channel, AlignmentSource, CorrelationStats, Correlator, NoParents,
    ObservationStore, ParentalSource,
};
use crate::utils::{open_indexed_bam, open_text_reader, BamWindow, Result};
use crate::vcf::VcfParents;
use crossbeam_channel::bounded;
use std::{io::BufRead, path::Path, thread};

const CHANNEL_BUFFER_SIZE: usize = 2048;

pub fn build(args: BuildArgs) -> Result<()> {
    let alignments = BamWindow::new(open_indexed_bam(&args.reads_path)?);
    let mut store =
        ObservationStore::create(Path::new(&args.store_root), &args.shard, args.overwrite)?;
    let trace = open_text_reader(&args.trace_path)?;

    let stats = match &args.parents_path {
        Some(path) => {
            let parents = VcfParents::open(path, args.mother.as_deref(), args.father.as_deref())?;
            log::info!("Tagging fraction-informative fragments using {}", path.display());
            let correlator = Correlator::new(alignments, parents, args.window);
            correlate_trace(trace, correlator, &mut store)?
        }
        None => {
            log::info!("No parental call set given; fragments stay unclassified");
            let correlator = Correlator::new(alignments, NoParents, args.window);
            correlate_trace(trace, correlator, &mut store)?
        }
    };

    log::info!(
        "Shard {}: {} positions, {} fragments stored; skipped {} uncorrelated and {} invalid fragments",
        store.shard(),
        stats.positions,
        stats.fragments,
        stats.uncorrelated,
        stats.invalid
    );
    if stats.abandoned > 0 {
        log::warn!("Discarded {} incomplete position(s)", stats.abandoned);
    }
    Ok(())
}

/// Streams trace events from a reader thread into the correlator. Stops at
/// the first fatal error, leaving every committed position in place.
pub fn correlate_trace<R, A, P>(
    trace: R,
    mut correlator: Correlator<A, P>,
    store: &mut ObservationStore,
) -> Result<CorrelationStats>
where
    R: BufRead + Send + 'static,
    A: AlignmentSource,
    P: ParentalSource,
{
    let (sender, receiver) = bounded(CHANNEL_BUFFER_SIZE);
    let stream_thread = thread::spawn(move || stream_trace_into_channel(trace, sender));

    let mut failure = None;
    for event in &receiver {
        let outcome = match event {
            Ok(event) => correlator.handle(event, store),
            Err(err) => {
                correlator.record_skip(&err);
                Ok(())
            }
        };
        if let Err(err) = outcome {
            failure = Some(err);
            break;
        }
    }
    drop(receiver);

    let streamed = stream_thread
        .join()
        .map_err(|_| "Trace stream thread panicked".to_string())?;
    let stats = correlator.finish(store);
    if let Some(err) = failure {
        return Err(format!("Store build aborted: {}", err));
    }
    let n_lines = streamed?;
    log::debug!("Read {} trace lines", n_lines);
    Ok(stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::Error;
    use std::{collections::HashMap, io::Cursor};
    use tempfile::TempDir;

    struct Lengths(HashMap<String, u32>);

    impl AlignmentSource for Lengths {
        fn template_lengths(
            &mut self,
            _chrom: &str,
            _start: u32,
            _end: u32,
        ) -> std::result::Result<HashMap<String, u32>, Error> {
            Ok(self.0.clone())
        }
    }

    fn alignments() -> Lengths {
        Lengths(
            [("r1".to_string(), 160), ("r2".to_string(), 145)]
                .into_iter()
                .collect(),
        )
    }

    #[test]
    fn builds_store_from_trace_stream() {
        let dir = TempDir::new().unwrap();
        let mut store = ObservationStore::create(dir.path(), "all", false).unwrap();
        let trace = "\
position: chr7:117559590
haplo_obs\t.\t.\tC\ts:r1
not a trace line
haplo_obs\tbroken
haplo_obs\t.\t.\tT\ts:r2
haplo_obs\t.\t.\tT\ts:r9
finished position
position: chr7:117559600
haplo_obs\t.\t.\tA\ts:r1
";
        let correlator = Correlator::new(alignments(), NoParents, 500);
        let stats =
            correlate_trace(Cursor::new(trace.to_string()), correlator, &mut store).unwrap();

        assert_eq!(
            stats,
            CorrelationStats {
                positions: 1,
                fragments: 3,
                uncorrelated: 1,
                invalid: 1,
                abandoned: 1,
            }
        );
        let observations = store.fetch("7", 117559590).unwrap();
        assert_eq!(observations.len(), 2);
        assert!(store.fetch("chr7", 117559600).unwrap().is_empty());
    }

    #[test]
    fn unreadable_marker_does_not_abort_the_build() {
        let dir = TempDir::new().unwrap();
        let mut store = ObservationStore::create(dir.path(), "all", false).unwrap();
        let trace = "\
position: chr1:100
haplo_obs\t.\t.\tC\ts:r1
finished position
position: chr1:abc
haplo_obs\t.\t.\tC\ts:r2
finished position
position: chr1:300
haplo_obs\t.\t.\tT\ts:r2
finished position
";
        let correlator = Correlator::new(alignments(), NoParents, 500);
        let stats =
            correlate_trace(Cursor::new(trace.to_string()), correlator, &mut store).unwrap();
        assert_eq!(stats.positions, 2);
        assert_eq!(stats.invalid, 2);
        assert_eq!(store.fetch("1", 100).unwrap().len(), 1);
        assert_eq!(store.fetch("1", 300).unwrap().len(), 1);
    }

    #[test]
    fn nested_positions_abort_the_build() {
        let dir = TempDir::new().unwrap();
        let mut store = ObservationStore::create(dir.path(), "all", false).unwrap();
        let trace = "\
position: chr1:100
haplo_obs\t.\t.\tC\ts:r1
finished position
position: chr1:200
position: chr1:300
haplo_obs\t.\t.\tC\ts:r2
finished position
";
        let correlator = Correlator::new(alignments(), NoParents, 500);
        let result = correlate_trace(Cursor::new(trace.to_string()), correlator, &mut store);
        assert!(result.is_err());
        assert_eq!(store.fetch("1", 100).unwrap().len(), 1);
        assert!(store.fetch("1", 300).unwrap().is_empty());
        assert!(!store.is_open());
    }
}
