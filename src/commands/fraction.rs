use crate::cli::{FractionArgs, FractionModelArgs};
use crate::errors::Error;
use crate::fraction::{collect_lengths, default_thread_count, resolve_shards, FetalFraction};
use crate::utils::Result;
use std::{
    fs::File,
    io::{self, BufWriter, Write},
    path::Path,
};

pub fn fraction(args: FractionArgs) -> Result<()> {
    let num_threads = args.num_threads.unwrap_or_else(default_thread_count);
    let fraction = estimate_fraction(
        &args.store_root,
        args.shard.as_deref(),
        &args.model,
        num_threads,
    )?;

    let mut writer: Box<dyn Write> = match &args.output {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).map_err(|e| format!("Failed to create {}: {}", path, e))?,
        )),
        None => Box::new(BufWriter::new(io::stdout().lock())),
    };
    write_report(&fraction, &mut writer)
        .and_then(|_| writer.flush())
        .map_err(|e| format!("Failed to write fraction report: {}", e))
}

/// Builds the fraction model from every selected shard. Without any
/// fraction-informative fragments the model degrades to a constant.
pub fn estimate_fraction(
    store_root: &Path,
    shard: Option<&str>,
    params: &FractionModelArgs,
    num_threads: usize,
) -> Result<FetalFraction> {
    let shards = resolve_shards(store_root, shard)?;
    let lengths = collect_lengths(store_root, &shards, num_threads)?;

    let mut fraction = match FetalFraction::build(&lengths, params.bin_width, params.max_length) {
        Ok(fraction) => fraction,
        Err(Error::InsufficientData) => {
            let total = params.fetal_fraction.unwrap_or(0.0);
            log::warn!(
                "No fraction-informative fragments found; using a constant fetal fraction of {}",
                total
            );
            FetalFraction::constant(total)
        }
        Err(err) => return Err(err.into()),
    };
    if let Some(total) = params.fetal_fraction {
        log::info!(
            "Overriding estimated total fetal fraction {:.4} with {}",
            fraction.total,
            total
        );
        fraction.total = total;
    }
    log::info!("Total fetal fraction: {:.4}", fraction.total);
    Ok(fraction)
}

pub fn write_report<W: Write>(fraction: &FetalFraction, writer: &mut W) -> io::Result<()> {
    writeln!(writer, "#total_fraction\t{}", fraction.total)?;
    writeln!(writer, "#bin_width\t{}", fraction.table.bin_width())?;
    writeln!(writer, "length\tfraction")?;
    for (length, estimate) in fraction.table.iter() {
        writeln!(writer, "{}\t{:.6}", length, estimate)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fraction::{DEFAULT_BIN_WIDTH, DEFAULT_MAX_LENGTH};
    use crate::store::{FractionTag, ObservationStore};
    use tempfile::TempDir;

    fn params(fetal_fraction: Option<f64>) -> FractionModelArgs {
        FractionModelArgs {
            bin_width: DEFAULT_BIN_WIDTH,
            max_length: DEFAULT_MAX_LENGTH,
            fetal_fraction,
        }
    }

    fn store_with_tags(root: &Path, tags: &[(u32, FractionTag)]) {
        let mut store = ObservationStore::create(root, "chr1", false).unwrap();
        store.begin_position("chr1", 1000).unwrap();
        for (i, (length, tag)) in tags.iter().enumerate() {
            store
                .record_fragment("A", *length, &format!("r{}", i), *tag)
                .unwrap();
        }
        store.commit_position().unwrap();
    }

    #[test]
    fn unclassified_store_falls_back_to_override() {
        let dir = TempDir::new().unwrap();
        store_with_tags(dir.path(), &[(150, FractionTag::Unclassified)]);

        let fraction = estimate_fraction(dir.path(), None, &params(Some(0.12)), 1).unwrap();
        assert_eq!(fraction, FetalFraction::constant(0.12));

        let fraction = estimate_fraction(dir.path(), None, &params(None), 1).unwrap();
        assert_eq!(fraction.total, 0.0);
        assert!(fraction.table.is_empty());
    }

    #[test]
    fn estimates_total_from_tagged_lengths() {
        let dir = TempDir::new().unwrap();
        store_with_tags(
            dir.path(),
            &[
                (140, FractionTag::MaternalOnly),
                (166, FractionTag::Shared),
                (168, FractionTag::Shared),
                (170, FractionTag::Shared),
            ],
        );
        let fraction = estimate_fraction(dir.path(), Some("chr1"), &params(None), 2).unwrap();
        assert!((fraction.total - 0.5).abs() < 1e-12);
        assert!(!fraction.table.is_empty());

        let overridden =
            estimate_fraction(dir.path(), Some("chr1"), &params(Some(0.2)), 2).unwrap();
        assert_eq!(overridden.total, 0.2);
        assert_eq!(overridden.table, fraction.table);
    }

    #[test]
    fn missing_store_is_an_error() {
        let dir = TempDir::new().unwrap();
        assert!(estimate_fraction(dir.path(), None, &params(None), 1).is_err());
    }

    #[test]
    fn report_lists_every_length() {
        let mut out = Vec::new();
        write_report(&FetalFraction::constant(0.1), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "#total_fraction\t0.1\n#bin_width\t0\nlength\tfraction\n");
    }
}
