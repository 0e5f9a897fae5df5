//! Output VCF holding one fetal sample per paired site.
//!
//! The header starts from the cfDNA call set so its INFO and FORMAT fields
//! pass through, gains any contig only the parental call set declares, and
//! replaces the genotype FORMAT fields with the caller's own. Parental
//! per-sample fields are re-declared as INFO with an `M`/`F` prefix and
//! parental INFO fields with a `P` prefix.

use super::pairing::SitePair;
use super::record::{
    contig_rid, field_definitions, FieldKind, FieldValue, SampleGenotype, SiteRecord,
};
use crate::genotype::Genotype;
use crate::utils::Result;
use crate::workflows::{FetalCall, SiteOutcome};
use rust_htslib::bcf::{
    self, header::HeaderView, record::GenotypeAllele, HeaderRecord, Record,
};
use std::{collections::HashSet, env, path::Path};

const FORMAT_LINES: [&str; 4] = [
    r#"##FORMAT=<ID=GT,Number=1,Type=String,Description="Fetal genotype">"#,
    r#"##FORMAT=<ID=GL,Number=G,Type=Float,Description="Log10 genotype likelihoods normalized to the most likely genotype">"#,
    r#"##FORMAT=<ID=PG,Number=G,Type=Float,Description="Genotype prior probabilities from the parental genotypes">"#,
    r#"##FORMAT=<ID=PP,Number=G,Type=Float,Description="Genotype posterior probabilities">"#,
];

const CALL_FORMATS: [&[u8]; 4] = [b"GT", b"GL", b"PG", b"PP"];
const PARENT_INFOS: [&[u8]; 3] = [b"MGT", b"FGT", b"MFQ"];

const INFO_LINES: [&str; 3] = [
    r#"##INFO=<ID=MGT,Number=1,Type=String,Description="Maternal genotype">"#,
    r#"##INFO=<ID=FGT,Number=1,Type=String,Description="Paternal genotype">"#,
    r#"##INFO=<ID=MFQ,Number=1,Type=Float,Description="Quality of the parental call">"#,
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputType {
    Vcf { is_uncompressed: bool },
    Bcf { is_uncompressed: bool },
}

impl OutputType {
    pub fn infer(path: Option<&Path>) -> Self {
        let name = path
            .map(|p| p.to_string_lossy().to_lowercase())
            .unwrap_or_default();
        if name.ends_with(".bcf.gz") {
            OutputType::Bcf {
                is_uncompressed: false,
            }
        } else if name.ends_with(".vcf.gz") || name.ends_with(".vcf.bgz") {
            OutputType::Vcf {
                is_uncompressed: false,
            }
        } else if name.ends_with(".bcf") {
            OutputType::Bcf {
                is_uncompressed: true,
            }
        } else {
            OutputType::Vcf {
                is_uncompressed: true,
            }
        }
    }

    fn settings(self) -> (bool, bcf::Format) {
        match self {
            OutputType::Vcf { is_uncompressed } => (is_uncompressed, bcf::Format::Vcf),
            OutputType::Bcf { is_uncompressed } => (is_uncompressed, bcf::Format::Bcf),
        }
    }
}

pub struct VcfWriter {
    writer: bcf::Writer,
    /// Every INFO ID the writer fills itself.
    reserved_info: HashSet<Vec<u8>>,
    /// Prefixed parental IDs declared in the header.
    parental_info: HashSet<Vec<u8>>,
}

impl VcfWriter {
    /// Opens `output`, or stdout when no path is given.
    pub fn new(
        output: Option<&Path>,
        cfdna_header: &HeaderView,
        parents_header: &HeaderView,
        sample_name: &str,
    ) -> Result<Self> {
        let mut header = Self::create_header(cfdna_header)?;
        add_missing_contigs(&mut header, cfdna_header, parents_header);
        let mut reserved_info: HashSet<Vec<u8>> =
            PARENT_INFOS.iter().map(|tag| tag.to_vec()).collect();
        let parental_info =
            declare_parental_fields(&mut header, parents_header, &mut reserved_info);
        add_provenance(&mut header);
        header.push_sample(sample_name.as_bytes());

        let (is_uncompressed, format) = OutputType::infer(output).settings();
        let writer = match output {
            Some(path) => bcf::Writer::from_path(path, &header, is_uncompressed, format),
            None => bcf::Writer::from_stdout(&header, is_uncompressed, format),
        }
        .map_err(|e| format!("Failed to create VCF writer: {}", e))?;
        Ok(VcfWriter {
            writer,
            reserved_info,
            parental_info,
        })
    }

    fn create_header(cfdna_header: &HeaderView) -> Result<bcf::Header> {
        let mut header = bcf::Header::from_template_subset(cfdna_header, &[])
            .map_err(|e| format!("Failed to copy cfDNA VCF header: {}", e))?;
        for tag in CALL_FORMATS {
            header.remove_format(tag);
        }
        for tag in PARENT_INFOS {
            header.remove_info(tag);
        }
        for line in INFO_LINES.iter().chain(FORMAT_LINES.iter()) {
            header.push_record(line.as_bytes());
        }
        Ok(header)
    }

    pub fn write(&mut self, pair: &SitePair, outcome: &SiteOutcome) -> Result<()> {
        let site = match (&pair.cfdna, &pair.parents) {
            (Some(cfdna), _) => cfdna,
            (None, Some(parents)) => parents,
            (None, None) => return Ok(()),
        };
        let locus = |e: rust_htslib::errors::Error| format!("{}:{}: {}", site.chrom, site.pos, e);
        let mut record = self.writer.empty_record();
        self.set_site(site, &mut record)?;
        record.set_qual(outcome.quality() as f32);

        if let Some(cfdna) = &pair.cfdna {
            for (tag, value) in &cfdna.info {
                if !self.reserved_info.contains(tag) {
                    push_info(&mut record, tag, value).map_err(locus)?;
                }
            }
        }
        if let Some(parents) = &pair.parents {
            self.set_parental_info(parents, &mut record).map_err(locus)?;
        }

        match outcome {
            SiteOutcome::Called(call) => {
                let sample = pair.cfdna.as_ref().and_then(|cfdna| cfdna.samples.first());
                set_call(call, sample, &mut record)
            }
            _ => record.push_genotypes(&[
                GenotypeAllele::UnphasedMissing,
                GenotypeAllele::UnphasedMissing,
            ]),
        }
        .map_err(locus)?;

        self.writer
            .write(&record)
            .map_err(|e| format!("Failed to write VCF record {}:{}: {}", site.chrom, site.pos, e))
    }

    fn set_parental_info(
        &self,
        parents: &SiteRecord,
        record: &mut Record,
    ) -> std::result::Result<(), rust_htslib::errors::Error> {
        let encoded = |index: usize| {
            parents
                .samples
                .get(index)
                .map(|s| s.encoded.clone())
                .unwrap_or_else(|| ".".to_string())
        };
        record.push_info_string(b"MGT", &[encoded(0).as_bytes()])?;
        record.push_info_string(b"FGT", &[encoded(1).as_bytes()])?;
        if let Some(qual) = parents.qual {
            record.push_info_float(b"MFQ", &[qual])?;
        }

        for (prefix, index) in [(b'M', 0), (b'F', 1)] {
            let Some(sample) = parents.samples.get(index) else {
                continue;
            };
            for (tag, value) in &sample.fields {
                self.push_parental(record, prefix, tag, value)?;
            }
        }
        for (tag, value) in &parents.info {
            self.push_parental(record, b'P', tag, value)?;
        }
        Ok(())
    }

    fn push_parental(
        &self,
        record: &mut Record,
        prefix: u8,
        tag: &[u8],
        value: &FieldValue,
    ) -> std::result::Result<(), rust_htslib::errors::Error> {
        let id = [&[prefix][..], tag].concat();
        if !self.parental_info.contains(&id) {
            return Ok(());
        }
        push_info(record, &id, value)
    }

    fn set_site(&self, site: &SiteRecord, record: &mut Record) -> Result<()> {
        let rid = contig_rid(self.writer.header(), &site.chrom)
            .ok_or_else(|| format!("Contig {} missing from output header", site.chrom))?;
        record.set_rid(Some(rid));
        record.set_pos(site.pos as i64 - 1);
        record
            .set_id(&site.id)
            .map_err(|e| format!("Failed to set ID at {}:{}: {}", site.chrom, site.pos, e))?;
        let alleles: Vec<&[u8]> = site.alleles.iter().map(|a| a.as_slice()).collect();
        record
            .set_alleles(&alleles)
            .map_err(|e| format!("Failed to set alleles at {}:{}: {}", site.chrom, site.pos, e))
    }
}

fn push_info(
    record: &mut Record,
    tag: &[u8],
    value: &FieldValue,
) -> std::result::Result<(), rust_htslib::errors::Error> {
    match value {
        FieldValue::Flag => record.push_info_flag(tag),
        FieldValue::Integer(values) => record.push_info_integer(tag, values),
        FieldValue::Float(values) => record.push_info_float(tag, values),
        FieldValue::String(values) => {
            let values: Vec<&[u8]> = values.iter().map(|v| v.as_slice()).collect();
            record.push_info_string(tag, &values)
        }
    }
}

fn push_format(
    record: &mut Record,
    tag: &[u8],
    value: &FieldValue,
) -> std::result::Result<(), rust_htslib::errors::Error> {
    match value {
        FieldValue::Flag => Ok(()),
        FieldValue::Integer(values) => record.push_format_integer(tag, values),
        FieldValue::Float(values) => record.push_format_float(tag, values),
        FieldValue::String(values) => {
            let values: Vec<&[u8]> = values.iter().map(|v| v.as_slice()).collect();
            record.push_format_string(tag, &values)
        }
    }
}

fn add_missing_contigs(header: &mut bcf::Header, cfdna: &HeaderView, parents: &HeaderView) {
    let known: HashSet<Vec<u8>> = (0..cfdna.contig_count())
        .filter_map(|rid| cfdna.rid2name(rid).ok())
        .map(|name| name.to_vec())
        .collect();
    for record in parents.header_records() {
        let HeaderRecord::Contig { values, .. } = record else {
            continue;
        };
        let Some(id) = values.get("ID") else {
            continue;
        };
        if known.contains(id.as_bytes()) {
            continue;
        }
        let line = match values.get("length") {
            Some(length) => format!("##contig=<ID={},length={}>", id, length),
            None => format!("##contig=<ID={}>", id),
        };
        header.push_record(line.as_bytes());
    }
}

/// Declares `M`/`F`-prefixed INFO fields for each parental FORMAT field and
/// `P`-prefixed ones for each parental INFO field. Returns the declared IDs;
/// an ID already taken is skipped.
fn declare_parental_fields(
    header: &mut bcf::Header,
    parents: &HeaderView,
    reserved: &mut HashSet<Vec<u8>>,
) -> HashSet<Vec<u8>> {
    let mut fields = Vec::new();
    for field in field_definitions(parents, FieldKind::Format) {
        if field.id == b"GT" {
            continue;
        }
        fields.push(("M", "Maternal", field.clone()));
        fields.push(("F", "Paternal", field));
    }
    for field in field_definitions(parents, FieldKind::Info) {
        fields.push(("P", "Parental", field));
    }

    let mut declared = HashSet::new();
    for (prefix, label, field) in fields {
        let id = [prefix.as_bytes(), field.id.as_slice()].concat();
        if !reserved.insert(id.clone()) {
            log::warn!(
                "Parental field {} would clash with INFO/{}; not passed through",
                String::from_utf8_lossy(&field.id),
                String::from_utf8_lossy(&id)
            );
            continue;
        }
        header.remove_info(&id);
        header.push_record(field.info_line(prefix, label).as_bytes());
        declared.insert(id);
    }
    declared
}

fn add_provenance(header: &mut bcf::Header) {
    let line = format!(
        "##{}Version={}",
        env!("CARGO_PKG_NAME"),
        *crate::cli::FULL_VERSION
    );
    header.push_record(line.as_bytes());
    let command_line = env::args().collect::<Vec<String>>().join(" ");
    let line = format!("##{}Command={}", env!("CARGO_PKG_NAME"), command_line);
    header.push_record(line.as_bytes());
}

/// Fills the fetal column: the call's genotype, the cfDNA sample's own FORMAT
/// values, then likelihoods, priors and posteriors.
fn set_call(
    call: &FetalCall,
    cfdna_sample: Option<&SampleGenotype>,
    record: &mut Record,
) -> std::result::Result<(), rust_htslib::errors::Error> {
    record.push_genotypes(&Genotype::to_alleles(call.prediction))?;
    if let Some(sample) = cfdna_sample {
        for (tag, value) in &sample.fields {
            if !CALL_FORMATS.contains(&tag.as_slice()) {
                push_format(record, tag, value)?;
            }
        }
    }
    record.push_format_float(b"GL", &round_all(&call.normalized_likelihoods, 2))?;
    if let Some(priors) = &call.priors {
        record.push_format_float(b"PG", &round_all(priors, 5))?;
    }
    record.push_format_float(b"PP", &round_all(&call.posteriors, 5))
}

fn round_all(values: &[f64; 3], digits: i32) -> [f32; 3] {
    let scale = 10f64.powi(digits);
    values.map(|v| {
        if v.is_finite() {
            ((v * scale).round() / scale) as f32
        } else {
            v as f32
        }
    })
}
