use crate::genotype::Genotype;
use crate::utils::Result;
use rust_htslib::bcf::{
    self,
    header::{HeaderView, TagLength, TagType},
    HeaderRecord,
};

/// One INFO or per-sample FORMAT value carried over from an input record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Flag,
    Integer(Vec<i32>),
    Float(Vec<f32>),
    String(Vec<Vec<u8>>),
}

const INT_VECTOR_END: i32 = i32::MIN + 1;
const INT_MISSING: i32 = i32::MIN;
const FLOAT_MISSING_BITS: u32 = 0x7F80_0001;
const FLOAT_VECTOR_END_BITS: u32 = 0x7F80_0002;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Info,
    Format,
}

/// An INFO or FORMAT header definition.
#[derive(Debug, Clone)]
pub struct FieldDefinition {
    pub id: Vec<u8>,
    /// VCF `Number` code: a count, `A`, `R`, `G` or `.`
    pub number: String,
    pub tag_type: TagType,
    pub description: String,
}

impl FieldDefinition {
    /// INFO header line declaring this field as `<prefix><ID>`.
    pub fn info_line(&self, prefix: &str, description_prefix: &str) -> String {
        format!(
            r#"##INFO=<ID={}{},Number={},Type={},Description="{} {}">"#,
            prefix,
            String::from_utf8_lossy(&self.id),
            self.number,
            type_name(&self.tag_type),
            description_prefix,
            self.description
        )
    }
}

/// Every `kind` field declared by `header`, in header order.
pub fn field_definitions(header: &HeaderView, kind: FieldKind) -> Vec<FieldDefinition> {
    let mut fields = Vec::new();
    for record in header.header_records() {
        let values = match (&record, kind) {
            (HeaderRecord::Info { values, .. }, FieldKind::Info) => values,
            (HeaderRecord::Format { values, .. }, FieldKind::Format) => values,
            _ => continue,
        };
        let Some(id) = values.get("ID") else {
            continue;
        };
        let declared = match kind {
            FieldKind::Info => header.info_type(id.as_bytes()),
            FieldKind::Format => header.format_type(id.as_bytes()),
        };
        match declared {
            Ok((tag_type, tag_length)) => fields.push(FieldDefinition {
                id: id.as_bytes().to_vec(),
                number: number_code(&tag_length),
                tag_type,
                description: values
                    .get("Description")
                    .map(|d| d.trim_matches('"').to_string())
                    .unwrap_or_default(),
            }),
            Err(e) => log::debug!("Skipping {:?}/{}: {}", kind, id, e),
        }
    }
    fields
}

fn number_code(length: &TagLength) -> String {
    match length {
        TagLength::Fixed(n) => n.to_string(),
        TagLength::AltAlleles => "A".to_string(),
        TagLength::Alleles => "R".to_string(),
        TagLength::Genotypes => "G".to_string(),
        TagLength::Variable => ".".to_string(),
    }
}

fn type_name(tag_type: &TagType) -> &'static str {
    match tag_type {
        TagType::Flag => "Flag",
        TagType::Integer => "Integer",
        TagType::Float => "Float",
        TagType::String => "String",
    }
}

/// INFO and per-sample FORMAT fields to copy from input records. Empty by
/// default, so only genotypes are extracted.
#[derive(Debug, Clone, Default)]
pub struct FieldSchema {
    info: Vec<FieldDefinition>,
    format: Vec<FieldDefinition>,
}

impl FieldSchema {
    pub fn with_info(mut self, header: &HeaderView) -> Self {
        self.info = field_definitions(header, FieldKind::Info);
        self
    }

    /// Per-sample FORMAT fields other than GT, which is kept as the genotype.
    pub fn with_format(mut self, header: &HeaderView) -> Self {
        self.format = field_definitions(header, FieldKind::Format)
            .into_iter()
            .filter(|field| field.id != b"GT")
            .collect();
        self
    }

    /// Copies every declared INFO field present on `record`.
    pub fn extract_info(&self, record: &bcf::Record) -> Vec<(Vec<u8>, FieldValue)> {
        let mut values = Vec::new();
        for field in &self.info {
            let mut info = record.info(&field.id);
            let value = match field.tag_type {
                TagType::Flag => match info.flag() {
                    Ok(true) => Some(FieldValue::Flag),
                    _ => None,
                },
                TagType::Integer => info
                    .integer()
                    .ok()
                    .flatten()
                    .map(|v| FieldValue::Integer(v.to_vec())),
                TagType::Float => info
                    .float()
                    .ok()
                    .flatten()
                    .map(|v| FieldValue::Float(v.to_vec())),
                TagType::String => info
                    .string()
                    .ok()
                    .flatten()
                    .map(|v| FieldValue::String(v.iter().map(|s| s.to_vec()).collect())),
            };
            if let Some(value) = value {
                values.push((field.id.clone(), value));
            }
        }
        values
    }

    /// Copies every declared FORMAT field `sample` carries a value for.
    pub fn extract_format(
        &self,
        record: &bcf::Record,
        sample: usize,
    ) -> Vec<(Vec<u8>, FieldValue)> {
        let mut values = Vec::new();
        for field in &self.format {
            let format = record.format(&field.id);
            let value = match field.tag_type {
                TagType::Integer => format
                    .integer()
                    .ok()
                    .and_then(|all| all.get(sample).and_then(|v| present_integers(v)))
                    .map(FieldValue::Integer),
                TagType::Float => format
                    .float()
                    .ok()
                    .and_then(|all| all.get(sample).and_then(|v| present_floats(v)))
                    .map(FieldValue::Float),
                TagType::String => format
                    .string()
                    .ok()
                    .and_then(|all| all.get(sample).map(|v| v.to_vec()))
                    .filter(|v| !v.is_empty() && v.as_slice() != b".")
                    .map(|v| FieldValue::String(vec![v])),
                TagType::Flag => None,
            };
            if let Some(value) = value {
                values.push((field.id.clone(), value));
            }
        }
        values
    }
}

/// Drops vector-end padding; `None` when nothing but missing values remain.
fn present_integers(values: &[i32]) -> Option<Vec<i32>> {
    let values: Vec<i32> = values
        .iter()
        .copied()
        .take_while(|v| *v != INT_VECTOR_END)
        .collect();
    if values.iter().all(|v| *v == INT_MISSING) {
        return None;
    }
    Some(values)
}

fn present_floats(values: &[f32]) -> Option<Vec<f32>> {
    let values: Vec<f32> = values
        .iter()
        .copied()
        .take_while(|v| v.to_bits() != FLOAT_VECTOR_END_BITS)
        .collect();
    if values.iter().all(|v| v.to_bits() == FLOAT_MISSING_BITS) {
        return None;
    }
    Some(values)
}

/// Genotype of one sample: the raw VCF encoding plus its allele-count form
/// when it is a biallelic diploid call.
#[derive(Debug, Clone, PartialEq)]
pub struct SampleGenotype {
    pub encoded: String,
    pub genotype: Option<Genotype>,
    /// FORMAT values other than GT, when the reader extracts them.
    pub fields: Vec<(Vec<u8>, FieldValue)>,
}

impl SampleGenotype {
    pub fn missing() -> Self {
        SampleGenotype {
            encoded: ".".to_string(),
            genotype: None,
            fields: Vec::new(),
        }
    }
}

/// Owned copy of the parts of a VCF record used for calling and output.
#[derive(Debug, Clone, PartialEq)]
pub struct SiteRecord {
    pub chrom: String,
    /// 1-based
    pub pos: u32,
    pub id: Vec<u8>,
    pub alleles: Vec<Vec<u8>>,
    pub qual: Option<f32>,
    pub info: Vec<(Vec<u8>, FieldValue)>,
    pub samples: Vec<SampleGenotype>,
}

impl SiteRecord {
    /// Extracts a record; `samples` selects which sample genotypes to keep, in order.
    pub fn from_record(
        record: &bcf::Record,
        header: &HeaderView,
        samples: &[usize],
        schema: &FieldSchema,
    ) -> Result<Self> {
        let rid = record
            .rid()
            .ok_or_else(|| "VCF record without a contig".to_string())?;
        let chrom = header
            .rid2name(rid)
            .map_err(|e| format!("Unknown contig id {}: {}", rid, e))?;
        let chrom = String::from_utf8_lossy(chrom).into_owned();
        let pos = u32::try_from(record.pos() + 1)
            .map_err(|_| format!("Invalid position {} on {}", record.pos(), chrom))?;

        let qual = record.qual();
        let qual = if qual.is_nan() { None } else { Some(qual) };

        let sample_genotypes = if samples.is_empty() {
            Vec::new()
        } else {
            // A record without GT yields missing genotypes; its other FORMAT fields still apply.
            let genotypes = record.genotypes().ok();
            samples
                .iter()
                .map(|&index| {
                    let mut sample = match &genotypes {
                        Some(genotypes) => {
                            let gt = genotypes.get(index);
                            SampleGenotype {
                                encoded: gt.to_string(),
                                genotype: Genotype::from_alleles(&gt),
                                fields: Vec::new(),
                            }
                        }
                        None => SampleGenotype::missing(),
                    };
                    sample.fields = schema.extract_format(record, index);
                    sample
                })
                .collect()
        };

        Ok(SiteRecord {
            chrom,
            pos,
            id: record.id(),
            alleles: record.alleles().iter().map(|a| a.to_vec()).collect(),
            qual,
            info: schema.extract_info(record),
            samples: sample_genotypes,
        })
    }

    pub fn ref_allele(&self) -> &[u8] {
        self.alleles.first().map(|a| a.as_slice()).unwrap_or_default()
    }

    pub fn alt_alleles(&self) -> &[Vec<u8>] {
        self.alleles.get(1..).unwrap_or_default()
    }

    pub fn is_biallelic(&self) -> bool {
        self.alleles.len() == 2
    }

    pub fn genotype(&self, sample: usize) -> Option<Genotype> {
        self.samples.get(sample).and_then(|s| s.genotype)
    }
}

/// Header id of `chrom`, accepting the name with or without a `chr` prefix.
pub fn contig_rid(header: &HeaderView, chrom: &str) -> Option<u32> {
    header.name2rid(chrom.as_bytes()).ok().or_else(|| {
        let alternative = match chrom.strip_prefix("chr") {
            Some(stripped) => stripped.to_string(),
            None => format!("chr{}", chrom),
        };
        header.name2rid(alternative.as_bytes()).ok()
    })
}

/// Index of `name` in the header, or `default` when no name is given.
pub fn resolve_sample(header: &HeaderView, name: Option<&str>, default: usize) -> Result<usize> {
    match name {
        Some(name) => header
            .sample_id(name.as_bytes())
            .ok_or_else(|| format!("Sample {} not found in VCF header", name)),
        None if default < header.sample_count() as usize => Ok(default),
        None => Err(format!(
            "VCF has {} sample(s); cannot use sample #{} by default",
            header.sample_count(),
            default + 1
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site(alleles: &[&str]) -> SiteRecord {
        SiteRecord {
            chrom: "1".into(),
            pos: 10,
            id: b".".to_vec(),
            alleles: alleles.iter().map(|a| a.as_bytes().to_vec()).collect(),
            qual: None,
            info: Vec::new(),
            samples: vec![
                SampleGenotype {
                    encoded: "0/1".into(),
                    genotype: Some(Genotype::Het),
                    fields: Vec::new(),
                },
                SampleGenotype::missing(),
            ],
        }
    }

    #[test]
    fn allele_accessors() {
        let biallelic = site(&["A", "G"]);
        assert!(biallelic.is_biallelic());
        assert_eq!(biallelic.ref_allele(), b"A");
        assert_eq!(biallelic.alt_alleles(), &[b"G".to_vec()]);

        let multi = site(&["A", "G", "T"]);
        assert!(!multi.is_biallelic());
        assert_eq!(multi.alt_alleles().len(), 2);

        let empty = site(&[]);
        assert_eq!(empty.ref_allele(), b"");
        assert!(empty.alt_alleles().is_empty());
    }

    #[test]
    fn sample_genotype_lookup() {
        let record = site(&["A", "G"]);
        assert_eq!(record.genotype(0), Some(Genotype::Het));
        assert_eq!(record.genotype(1), None);
        assert_eq!(record.genotype(5), None);
    }
}
