use crate::errors::Error;
use crate::store::AlignmentSource;
use crate::utils::Result;
use rust_htslib::bam::{self, Read, Record};
use std::{collections::HashMap, path::Path};

pub fn open_indexed_bam(bam_path: &Path) -> Result<bam::IndexedReader> {
    let bam = bam::IndexedReader::from_path(bam_path)
        .map_err(|e| format!("Failed to create bam reader: {}", e))?;
    if !is_bam_mapped(bam.header()) {
        return Err(format!("Input BAM is not mapped: {}", bam_path.display()));
    }
    Ok(bam)
}

fn is_bam_mapped(header: &bam::HeaderView) -> bool {
    header.target_count() > 0
}

/// Template lengths of all primary alignments overlapping a window, keyed by read name.
pub struct BamWindow {
    reader: bam::IndexedReader,
}

impl BamWindow {
    pub fn new(reader: bam::IndexedReader) -> Self {
        Self { reader }
    }
}

impl AlignmentSource for BamWindow {
    fn template_lengths(
        &mut self,
        chrom: &str,
        start: u32,
        end: u32,
    ) -> std::result::Result<HashMap<String, u32>, Error> {
        let mut lengths = HashMap::new();
        if let Err(msg) = self.reader.fetch((chrom, start as i64, end as i64)) {
            log::warn!("Fetch error at {}:{}-{}: {}", chrom, start, end, msg);
            return Ok(lengths);
        }

        let mut record = Record::new();
        while let Some(result) = self.reader.read(&mut record) {
            result.map_err(|e| Error::Alignment { msg: e.to_string() })?;
            if record.is_supplementary() || record.is_secondary() {
                continue;
            }
            let name = String::from_utf8_lossy(record.qname()).into_owned();
            lengths.insert(name, record.insert_size().unsigned_abs() as u32);
        }
        Ok(lengths)
    }
}
