use super::observation::{FragmentRecord, FractionTag, LengthObservation, Observation};
use crate::errors::Error;
use crate::utils::normalize_chrom;
use std::{
    collections::{HashMap, HashSet},
    fs,
    io::{self, BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use tempfile::NamedTempFile;

const BATCH_EXTENSION: &str = "json";

#[derive(Debug)]
struct PositionBuffer {
    chrom: String,
    pos: u32,
    fragments: Vec<FragmentRecord>,
    by_read: HashMap<String, usize>,
}

/// Per-position fragment observations persisted under `<root>/<shard>/<chrom>/<pos>.json`.
///
/// Positions are written through an accumulation buffer: `begin_position`,
/// any number of `record_fragment` calls, then `commit_position`. A commit
/// writes a temporary file and renames it into place, so a position is either
/// fully visible or absent.
#[derive(Debug)]
pub struct ObservationStore {
    dir: PathBuf,
    shard: String,
    buffer: Option<PositionBuffer>,
}

impl ObservationStore {
    /// Creates (or with `overwrite`, recreates) a shard under `root`.
    pub fn create(root: &Path, shard: &str, overwrite: bool) -> Result<Self, Error> {
        let dir = shard_dir(root, shard)?;
        if overwrite && dir.exists() {
            log::info!("Dropping existing observation shard {}", dir.display());
            fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        }
        fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        Ok(Self {
            dir,
            shard: shard.to_string(),
            buffer: None,
        })
    }

    /// Reopens an existing shard.
    pub fn open(root: &Path, shard: &str) -> Result<Self, Error> {
        let dir = shard_dir(root, shard)?;
        if !dir.is_dir() {
            return Err(Error::io(
                &dir,
                io::Error::new(io::ErrorKind::NotFound, "observation shard does not exist"),
            ));
        }
        Ok(Self {
            dir,
            shard: shard.to_string(),
            buffer: None,
        })
    }

    /// Lists the shard identifiers present under `root`.
    pub fn shards(root: &Path) -> Result<Vec<String>, Error> {
        let mut shards = Vec::new();
        for entry in fs::read_dir(root).map_err(|e| Error::io(root, e))? {
            let entry = entry.map_err(|e| Error::io(root, e))?;
            if entry.path().is_dir() {
                shards.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        shards.sort();
        Ok(shards)
    }

    pub fn shard(&self) -> &str {
        &self.shard
    }

    pub fn is_open(&self) -> bool {
        self.buffer.is_some()
    }

    pub fn begin_position(&mut self, chrom: &str, pos: u32) -> Result<(), Error> {
        if let Some(open) = &self.buffer {
            return Err(Error::sequence(format!(
                "position {}:{} started while {}:{} is still open",
                chrom, pos, open.chrom, open.pos
            )));
        }
        self.buffer = Some(PositionBuffer {
            chrom: normalize_chrom(chrom).to_string(),
            pos,
            fragments: Vec::new(),
            by_read: HashMap::new(),
        });
        Ok(())
    }

    /// Appends a fragment to the open position.
    ///
    /// A repeated read id replaces the earlier entry and is reported as an
    /// error so the caller can log the upstream inconsistency.
    pub fn record_fragment(
        &mut self,
        allele: &str,
        length: u32,
        read_id: &str,
        tag: FractionTag,
    ) -> Result<(), Error> {
        let buffer = self.buffer.as_mut().ok_or(Error::NoOpenPosition)?;
        let record = FragmentRecord {
            allele: allele.to_string(),
            length,
            read_id: read_id.to_string(),
            tag,
        };

        match buffer.by_read.get(read_id) {
            Some(&index) => {
                let previous = std::mem::replace(&mut buffer.fragments[index], record);
                if previous.length != length {
                    return Err(Error::InconsistentLength {
                        chrom: buffer.chrom.clone(),
                        pos: buffer.pos,
                        read_id: read_id.to_string(),
                        first: previous.length,
                        second: length,
                    });
                }
                Err(Error::DuplicateFragment {
                    chrom: buffer.chrom.clone(),
                    pos: buffer.pos,
                    read_id: read_id.to_string(),
                })
            }
            None => {
                buffer
                    .by_read
                    .insert(read_id.to_string(), buffer.fragments.len());
                buffer.fragments.push(record);
                Ok(())
            }
        }
    }

    /// Flushes the open position to disk and returns the number of fragments written.
    pub fn commit_position(&mut self) -> Result<usize, Error> {
        let buffer = self
            .buffer
            .take()
            .ok_or_else(|| Error::sequence("position finished while no position is open"))?;
        let count = buffer.fragments.len();
        if count == 0 {
            log::debug!("{}:{}: no fragments to commit", buffer.chrom, buffer.pos);
            let stale = batch_path(&self.dir, &buffer.chrom, buffer.pos);
            match fs::remove_file(&stale) {
                Ok(()) => log::debug!("{}:{}: removed previous batch", buffer.chrom, buffer.pos),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(Error::io(&stale, e)),
            }
            return Ok(0);
        }

        let chrom_dir = self.dir.join(&buffer.chrom);
        fs::create_dir_all(&chrom_dir).map_err(|e| Error::io(&chrom_dir, e))?;
        let final_path = batch_path(&self.dir, &buffer.chrom, buffer.pos);
        if final_path.exists() {
            log::debug!("{}:{}: replacing existing batch", buffer.chrom, buffer.pos);
        }

        let tmp = NamedTempFile::new_in(&chrom_dir).map_err(|e| Error::io(&chrom_dir, e))?;
        {
            let mut writer = BufWriter::new(tmp.as_file());
            serde_json::to_writer(&mut writer, &buffer.fragments).map_err(|e| {
                Error::Serialization {
                    path: final_path.clone(),
                    source: e,
                }
            })?;
            writer.flush().map_err(|e| Error::io(&final_path, e))?;
        }
        tmp.as_file()
            .sync_all()
            .map_err(|e| Error::io(&final_path, e))?;
        tmp.persist(&final_path)
            .map_err(|e| Error::io(&final_path, e.error))?;
        Ok(count)
    }

    /// Drops the open position without writing it.
    pub fn abandon_position(&mut self) -> Option<(String, u32)> {
        self.buffer.take().map(|buffer| (buffer.chrom, buffer.pos))
    }

    /// All fragments recorded at a position; empty when the position is unknown.
    pub fn fetch(&self, chrom: &str, pos: u32) -> Result<Vec<Observation>, Error> {
        let chrom = normalize_chrom(chrom);
        let path = batch_path(&self.dir, chrom, pos);
        match read_batch(&path) {
            Ok(records) => Ok(records
                .into_iter()
                .map(|record| Observation::from_record(chrom, pos, record))
                .collect()),
            Err(Error::Io { source, .. }) if source.kind() == io::ErrorKind::NotFound => {
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    /// Distinct fragment lengths whose tag satisfies `keep`, skipping `excluded` contigs.
    ///
    /// A fragment overlapping several positions is reported once per
    /// (contig, read id, length, tag).
    pub fn bulk_fetch<F>(&self, keep: F, excluded: &[&str]) -> Result<Vec<LengthObservation>, Error>
    where
        F: Fn(FractionTag) -> bool,
    {
        let mut seen = HashSet::new();
        let mut lengths = Vec::new();
        for chrom_entry in fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))? {
            let chrom_entry = chrom_entry.map_err(|e| Error::io(&self.dir, e))?;
            let chrom_dir = chrom_entry.path();
            if !chrom_dir.is_dir() {
                continue;
            }
            let chrom = chrom_entry.file_name().to_string_lossy().into_owned();
            if excluded
                .iter()
                .any(|ex| normalize_chrom(ex) == normalize_chrom(&chrom))
            {
                continue;
            }

            for batch_entry in fs::read_dir(&chrom_dir).map_err(|e| Error::io(&chrom_dir, e))? {
                let path = batch_entry.map_err(|e| Error::io(&chrom_dir, e))?.path();
                if path.extension().and_then(|ext| ext.to_str()) != Some(BATCH_EXTENSION) {
                    continue;
                }
                for record in read_batch(&path)? {
                    if !keep(record.tag) {
                        continue;
                    }
                    if seen.insert((chrom.clone(), record.read_id, record.length, record.tag)) {
                        lengths.push(LengthObservation {
                            chrom: chrom.clone(),
                            length: record.length,
                            tag: record.tag,
                        });
                    }
                }
            }
        }
        Ok(lengths)
    }
}

fn shard_dir(root: &Path, shard: &str) -> Result<PathBuf, Error> {
    if shard.is_empty() || shard.contains(std::path::MAIN_SEPARATOR) || shard.starts_with('.') {
        return Err(Error::io(
            root,
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("invalid shard identifier '{}'", shard),
            ),
        ));
    }
    Ok(root.join(shard))
}

fn batch_path(dir: &Path, chrom: &str, pos: u32) -> PathBuf {
    dir.join(chrom).join(format!("{}.{}", pos, BATCH_EXTENSION))
}

fn read_batch(path: &Path) -> Result<Vec<FragmentRecord>, Error> {
    let file = fs::File::open(path).map_err(|e| Error::io(path, e))?;
    serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::Serialization {
        path: path.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn store_with(dir: &TempDir) -> ObservationStore {
        ObservationStore::create(dir.path(), "all", false).unwrap()
    }

    #[test]
    fn commit_then_fetch_position() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("chr1", 1000).unwrap();
        store
            .record_fragment("A", 150, "r1", FractionTag::Shared)
            .unwrap();
        store
            .record_fragment("G", 143, "r2", FractionTag::MaternalOnly)
            .unwrap();
        assert_eq!(store.commit_position().unwrap(), 2);
        assert!(!store.is_open());

        let observations = store.fetch("1", 1000).unwrap();
        assert_eq!(observations.len(), 2);
        assert_eq!(observations[0].chrom, "1");
        assert_eq!(observations[0].pos, 1000);
        assert_eq!(observations[1].allele, "G");
        assert_eq!(observations[1].length, 143);
        assert_eq!(observations[1].tag, FractionTag::MaternalOnly);

        // `chr`-prefixed lookups resolve to the same position
        assert_eq!(store.fetch("chr1", 1000).unwrap().len(), 2);
    }

    #[test]
    fn fetch_missing_position_is_empty() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        assert!(store.fetch("2", 5).unwrap().is_empty());
    }

    #[test]
    fn nested_position_is_a_sequence_error() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("1", 10).unwrap();
        let err = store.begin_position("1", 11).unwrap_err();
        assert!(matches!(err, Error::Sequence { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn commit_without_open_position_is_a_sequence_error() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        assert!(matches!(
            store.commit_position(),
            Err(Error::Sequence { .. })
        ));
    }

    #[test]
    fn fragment_without_open_position_is_rejected() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        let err = store
            .record_fragment("A", 150, "r1", FractionTag::Shared)
            .unwrap_err();
        assert!(matches!(err, Error::NoOpenPosition));
        assert!(!err.is_fatal());
    }

    #[test]
    fn duplicate_read_is_reported_and_last_write_wins() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("3", 77).unwrap();
        store
            .record_fragment("A", 160, "r1", FractionTag::Unclassified)
            .unwrap();
        let err = store
            .record_fragment("C", 160, "r1", FractionTag::Unclassified)
            .unwrap_err();
        assert!(matches!(err, Error::DuplicateFragment { .. }));
        store.commit_position().unwrap();

        let observations = store.fetch("3", 77).unwrap();
        assert_eq!(observations.len(), 1);
        assert_eq!(observations[0].allele, "C");
    }

    #[test]
    fn duplicate_read_with_other_length_is_inconsistent() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("3", 77).unwrap();
        store
            .record_fragment("A", 160, "r1", FractionTag::Unclassified)
            .unwrap();
        let err = store
            .record_fragment("A", 170, "r1", FractionTag::Unclassified)
            .unwrap_err();
        assert!(matches!(
            err,
            Error::InconsistentLength {
                first: 160,
                second: 170,
                ..
            }
        ));
    }

    #[test]
    fn reopen_shard_and_list_shards() {
        let dir = TempDir::new().unwrap();
        {
            let mut store = ObservationStore::create(dir.path(), "chr5:1-1000", false).unwrap();
            store.begin_position("5", 500).unwrap();
            store
                .record_fragment("T", 166, "r9", FractionTag::Shared)
                .unwrap();
            store.commit_position().unwrap();
        }
        ObservationStore::create(dir.path(), "chr6", false).unwrap();

        let reopened = ObservationStore::open(dir.path(), "chr5:1-1000").unwrap();
        assert_eq!(reopened.fetch("5", 500).unwrap().len(), 1);
        assert_eq!(
            ObservationStore::shards(dir.path()).unwrap(),
            vec!["chr5:1-1000".to_string(), "chr6".to_string()]
        );
        assert!(ObservationStore::open(dir.path(), "chr7").is_err());
    }

    #[test]
    fn overwrite_drops_existing_shard() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("1", 1).unwrap();
        store
            .record_fragment("A", 100, "r1", FractionTag::Shared)
            .unwrap();
        store.commit_position().unwrap();

        let store = ObservationStore::create(dir.path(), "all", true).unwrap();
        assert!(store.fetch("1", 1).unwrap().is_empty());
    }

    #[test]
    fn empty_recommit_clears_previous_batch() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        store.begin_position("1", 1).unwrap();
        store
            .record_fragment("A", 100, "r1", FractionTag::Shared)
            .unwrap();
        store.commit_position().unwrap();

        let mut store = ObservationStore::create(dir.path(), "all", false).unwrap();
        assert_eq!(store.fetch("1", 1).unwrap().len(), 1);
        store.begin_position("1", 1).unwrap();
        assert_eq!(store.commit_position().unwrap(), 0);
        assert!(store.fetch("1", 1).unwrap().is_empty());
    }

    #[test]
    fn bulk_fetch_filters_tags_contigs_and_duplicates() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with(&dir);
        let positions = [("1", 100), ("1", 101), ("X", 50)];
        for (chrom, pos) in positions {
            store.begin_position(chrom, pos).unwrap();
            // r1 overlaps both chr1 positions and must be counted once
            store
                .record_fragment("A", 150, "r1", FractionTag::Shared)
                .unwrap();
            store
                .record_fragment("G", 140, &format!("f{}", pos), FractionTag::MaternalOnly)
                .unwrap();
            store
                .record_fragment("G", 170, &format!("u{}", pos), FractionTag::Unclassified)
                .unwrap();
            store.commit_position().unwrap();
        }

        let mut lengths = store
            .bulk_fetch(FractionTag::is_informative, &["X", "Y"])
            .unwrap();
        lengths.sort_by_key(|l| (l.length, l.chrom.clone()));
        assert_eq!(lengths.len(), 3);
        assert_eq!(lengths[0].length, 140);
        assert_eq!(lengths[1].length, 140);
        assert_eq!(lengths[2].length, 150);
        assert!(lengths.iter().all(|l| l.chrom == "1"));
    }

    #[test]
    fn partially_written_batches_are_not_visible() {
        let dir = TempDir::new().unwrap();
        let store = store_with(&dir);
        let chrom_dir = dir.path().join("all").join("1");
        fs::create_dir_all(&chrom_dir).unwrap();
        fs::write(chrom_dir.join(".tmpXYZ"), b"[{\"allele\":").unwrap();
        assert!(store.fetch("1", 1).unwrap().is_empty());
        assert!(store
            .bulk_fetch(FractionTag::is_informative, &[])
            .unwrap()
            .is_empty());
    }

    #[test]
    fn invalid_shard_identifiers_are_rejected() {
        let dir = TempDir::new().unwrap();
        assert!(ObservationStore::create(dir.path(), "", false).is_err());
        assert!(ObservationStore::create(dir.path(), "a/b", false).is_err());
    }
}
