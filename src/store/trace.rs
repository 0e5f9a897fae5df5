//! Parsing of the variant caller's per-fragment debug trace.
//!
//! The trace is line oriented. Three line kinds matter, everything else is
//! ignored:
//!
//! ```text
//! position: chr1:1234567
//! haplo_obs<TAB>...<TAB>...<TAB>G<TAB>sample:ILLUMINA:1:FC:1:1101:1000:2000:...
//! finished position
//! ```

use crate::errors::Error;
use crossbeam_channel::Sender;
use std::io::BufRead;

const POSITION_PREFIX: &str = "position: ";
const FRAGMENT_PREFIX: &str = "haplo_obs";
const FINISHED_PREFIX: &str = "finished position";

const ALLELE_COLUMN: usize = 3;
const READ_COLUMN: usize = 4;
/// Number of colon-separated fields forming an Illumina read name.
const READ_NAME_FIELDS: usize = 7;

#[derive(Debug, Clone, PartialEq)]
pub enum TraceEvent {
    Position { chrom: String, pos: u32 },
    Fragment { allele: String, read_id: String },
    Finished,
}

pub fn parse_line(line: &str, line_number: usize) -> Result<Option<TraceEvent>, Error> {
    let malformed = |msg: &str| Error::MalformedTrace {
        line: line_number,
        msg: msg.to_string(),
    };

    if let Some(rest) = line.strip_prefix(POSITION_PREFIX) {
        let malformed = |msg: &str| Error::MalformedMarker {
            line: line_number,
            msg: msg.to_string(),
        };
        let locus = rest
            .split_whitespace()
            .next()
            .ok_or_else(|| malformed("missing locus"))?;
        let (chrom, pos) = locus
            .rsplit_once(':')
            .ok_or_else(|| malformed("locus must be CHROM:POS"))?;
        let pos = pos
            .parse::<u32>()
            .map_err(|_| malformed("position is not an integer"))?;
        if chrom.is_empty() {
            return Err(malformed("empty chromosome"));
        }
        return Ok(Some(TraceEvent::Position {
            chrom: chrom.to_string(),
            pos,
        }));
    }

    if line.starts_with(FRAGMENT_PREFIX) {
        let fields: Vec<&str> = line.trim_end().split('\t').collect();
        if fields.len() <= READ_COLUMN {
            return Err(malformed("too few fields in fragment line"));
        }
        let allele = fields[ALLELE_COLUMN];
        let token: Vec<&str> = fields[READ_COLUMN].split(':').collect();
        if allele.is_empty() || token.len() < 2 {
            return Err(malformed("missing allele or read identity"));
        }
        let name_end = token.len().min(READ_NAME_FIELDS + 1);
        return Ok(Some(TraceEvent::Fragment {
            allele: allele.to_string(),
            read_id: token[1..name_end].join(":"),
        }));
    }

    if line.starts_with(FINISHED_PREFIX) {
        return Ok(Some(TraceEvent::Finished));
    }

    Ok(None)
}

/// Parses a trace stream and forwards recognized events in order.
///
/// Malformed lines are forwarded as errors so the consumer decides whether
/// to skip them; a read failure ends the stream.
pub fn stream_trace_into_channel<R: BufRead>(
    reader: R,
    sender: Sender<Result<TraceEvent, Error>>,
) -> crate::utils::Result<usize> {
    let mut n_lines = 0;
    for (index, line) in reader.lines().enumerate() {
        let line_number = index + 1;
        let line = line.map_err(|e| format!("Error at trace line {}: {}", line_number, e))?;
        n_lines = line_number;
        let event = match parse_line(&line, line_number) {
            Ok(Some(event)) => Ok(event),
            Ok(None) => continue,
            Err(err) => Err(err),
        };
        if sender.send(event).is_err() {
            return Err("Trace consumer stopped early".to_string());
        }
    }
    Ok(n_lines)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbeam_channel::unbounded;

    #[test]
    fn parse_position_marker() {
        assert_eq!(
            parse_line("position: chr12:4500123", 1).unwrap(),
            Some(TraceEvent::Position {
                chrom: "chr12".into(),
                pos: 4500123
            })
        );
    }

    #[test]
    fn parse_fragment_line() {
        let line = "haplo_obs\t0\t12\tG\tcfdna:M0001:12:000-AB:1:1101:15589:1333:1:N\t60";
        assert_eq!(
            parse_line(line, 2).unwrap(),
            Some(TraceEvent::Fragment {
                allele: "G".into(),
                read_id: "M0001:12:000-AB:1:1101:15589:1333".into()
            })
        );
    }

    #[test]
    fn short_read_token_uses_available_fields() {
        let line = "haplo_obs\ta\tb\tAT\tsample:read42";
        assert_eq!(
            parse_line(line, 3).unwrap(),
            Some(TraceEvent::Fragment {
                allele: "AT".into(),
                read_id: "read42".into()
            })
        );
    }

    #[test]
    fn parse_finished_and_unrelated_lines() {
        assert_eq!(
            parse_line("finished position", 4).unwrap(),
            Some(TraceEvent::Finished)
        );
        assert_eq!(parse_line("haplotype: something else", 5).unwrap(), None);
        assert_eq!(parse_line("", 6).unwrap(), None);
    }

    #[test]
    fn malformed_lines_are_validation_errors() {
        assert!(matches!(
            parse_line("position: chr1", 7),
            Err(Error::MalformedMarker { line: 7, .. })
        ));
        assert!(matches!(
            parse_line("position: chr1:abc", 8),
            Err(Error::MalformedMarker { line: 8, .. })
        ));
        assert!(matches!(
            parse_line("haplo_obs\t1\t2", 9),
            Err(Error::MalformedTrace { line: 9, .. })
        ));
        assert!(parse_line("haplo_obs\t1\t2\tG\tnocolon", 10).is_err());
    }

    #[test]
    fn stream_forwards_events_in_order() {
        let trace = "junk\nposition: 1:10\nhaplo_obs\tx\ty\tA\ts:r1\nfinished position\n";
        let (sender, receiver) = unbounded();
        let n_lines = stream_trace_into_channel(trace.as_bytes(), sender).unwrap();
        assert_eq!(n_lines, 4);
        let events: Vec<TraceEvent> = receiver.iter().map(|e| e.unwrap()).collect();
        assert_eq!(events.len(), 3);
        assert_eq!(events[2], TraceEvent::Finished);
    }
}
