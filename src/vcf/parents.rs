use super::record::{contig_rid, resolve_sample, FieldSchema, SiteRecord};
use crate::errors::Error;
use crate::store::{ParentalSite, ParentalSource};
use crate::utils::Result;
use rust_htslib::bcf::{self, header::HeaderView, Read};
use std::path::Path;

/// Random-access parental genotypes from an indexed VCF/BCF.
pub struct VcfParents {
    reader: bcf::IndexedReader,
    header: HeaderView,
    record: bcf::Record,
    schema: FieldSchema,
    samples: [usize; 2],
}

impl VcfParents {
    pub fn open(path: &Path, mother: Option<&str>, father: Option<&str>) -> Result<Self> {
        let reader = bcf::IndexedReader::from_path(path)
            .map_err(|e| format!("Failed to open indexed VCF {}: {}", path.display(), e))?;
        let header = reader.header();
        let samples = [
            resolve_sample(header, mother, 0)?,
            resolve_sample(header, father, 1)?,
        ];
        if samples[0] == samples[1] {
            return Err("Mother and father must be different samples".to_string());
        }
        let header = header.clone();
        let record = reader.empty_record();
        Ok(VcfParents {
            reader,
            header,
            record,
            schema: FieldSchema::default(),
            samples,
        })
    }
}

impl ParentalSource for VcfParents {
    fn site(&mut self, chrom: &str, pos: u32) -> std::result::Result<Option<ParentalSite>, Error> {
        let Some(rid) = contig_rid(&self.header, chrom) else {
            return Ok(None);
        };
        let start = pos.saturating_sub(1) as u64;
        if self.reader.fetch(rid, start, Some(start)).is_err() {
            return Ok(None);
        }

        while let Some(status) = self.reader.read(&mut self.record) {
            status.map_err(|e| Error::CallSet {
                msg: format!("parental VCF read at {}:{}: {}", chrom, pos, e),
            })?;
            if self.record.pos() + 1 != pos as i64 {
                continue;
            }
            let site =
                SiteRecord::from_record(&self.record, &self.header, &self.samples, &self.schema)
                    .map_err(|msg| Error::CallSet { msg })?;
            if !site.is_biallelic() {
                continue;
            }
            return Ok(Some(ParentalSite {
                ref_allele: String::from_utf8_lossy(site.ref_allele()).into_owned(),
                alt_allele: String::from_utf8_lossy(&site.alleles[1]).into_owned(),
                maternal: site.genotype(0),
                paternal: site.genotype(1),
            }));
        }
        Ok(None)
    }
}
