use crate::errors::Error;
use crate::store::{FractionTag, LengthObservation, ObservationStore};
use crate::utils::Result;
use rayon::{prelude::*, ThreadPoolBuilder};
use std::path::Path;

/// Allele-count assumptions differ on sex chromosomes, so they never feed the estimate.
const EXCLUDED_CONTIGS: [&str; 2] = ["X", "Y"];

pub fn default_thread_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}

/// Resolves the shards to scan: the named one, or every shard under `root`.
pub fn resolve_shards(root: &Path, shard: Option<&str>) -> Result<Vec<String>> {
    let shards = match shard {
        Some(shard) => vec![shard.to_string()],
        None => ObservationStore::shards(root)?,
    };
    if shards.is_empty() {
        return Err(format!(
            "No observation shards found under {}",
            root.display()
        ));
    }
    Ok(shards)
}

/// Scans every shard for fraction-informative fragment lengths on a dedicated
/// pool and concatenates the per-shard results in shard order.
pub fn collect_lengths(
    root: &Path,
    shards: &[String],
    num_threads: usize,
) -> Result<Vec<LengthObservation>> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(num_threads.max(1))
        .thread_name(|i| format!("fraction-{}", i))
        .build()
        .map_err(|e| format!("Failed to initialize thread pool: {}", e))?;

    let per_shard = pool.install(|| {
        shards
            .par_iter()
            .map(|shard| scan_shard(root, shard))
            .collect::<std::result::Result<Vec<_>, Error>>()
    })?;

    let lengths: Vec<LengthObservation> = per_shard.into_iter().flatten().collect();
    log::info!(
        "Collected {} informative fragment lengths from {} shard(s)",
        lengths.len(),
        shards.len()
    );
    Ok(lengths)
}

fn scan_shard(root: &Path, shard: &str) -> std::result::Result<Vec<LengthObservation>, Error> {
    let store = ObservationStore::open(root, shard)?;
    let lengths = store.bulk_fetch(FractionTag::is_informative, &EXCLUDED_CONTIGS)?;
    log::debug!("Shard {}: {} informative lengths", shard, lengths.len());
    Ok(lengths)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn populate(root: &Path, shard: &str, chrom: &str, reads: &[(&str, u32, FractionTag)]) {
        let mut store = ObservationStore::create(root, shard, false).unwrap();
        store.begin_position(chrom, 100).unwrap();
        for (read_id, length, tag) in reads {
            store.record_fragment("A", *length, read_id, *tag).unwrap();
        }
        store.commit_position().unwrap();
    }

    #[test]
    fn merges_all_shards_and_skips_sex_chromosomes() {
        let dir = TempDir::new().unwrap();
        populate(
            dir.path(),
            "chr1",
            "chr1",
            &[
                ("a", 150, FractionTag::Shared),
                ("b", 140, FractionTag::MaternalOnly),
                ("c", 170, FractionTag::Unclassified),
            ],
        );
        populate(dir.path(), "chr2", "2", &[("d", 160, FractionTag::Shared)]);
        populate(dir.path(), "chrX", "X", &[("e", 130, FractionTag::MaternalOnly)]);

        let shards = resolve_shards(dir.path(), None).unwrap();
        assert_eq!(shards, vec!["chr1", "chr2", "chrX"]);

        let mut lengths: Vec<u32> = collect_lengths(dir.path(), &shards, 2)
            .unwrap()
            .into_iter()
            .map(|l| l.length)
            .collect();
        lengths.sort_unstable();
        assert_eq!(lengths, vec![140, 150, 160]);
    }

    #[test]
    fn named_shard_must_exist() {
        let dir = TempDir::new().unwrap();
        let shards = resolve_shards(dir.path(), Some("chr9")).unwrap();
        assert!(collect_lengths(dir.path(), &shards, 1).is_err());
        assert!(resolve_shards(dir.path(), None).is_err());
    }
}
