use crate::genotype::Genotype;
use serde::{Deserialize, Serialize};

/// Marks whether a fragment can inform fetal fraction estimation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FractionTag {
    /// Carries the allele the mother lacks at a site where the parents are
    /// homozygous for different alleles, so it can only be fetal-derived.
    MaternalOnly,
    /// Carries the maternal allele at such a site; shared by mother and fetus.
    Shared,
    Unclassified,
}

impl FractionTag {
    pub fn classify(allele: &str, site: &ParentalSite) -> FractionTag {
        let (maternal, paternal) = match (site.maternal, site.paternal) {
            (Some(m), Some(p)) => (m, p),
            _ => return FractionTag::Unclassified,
        };
        let (maternal_allele, paternal_allele) = match (maternal, paternal) {
            (Genotype::HomRef, Genotype::HomAlt) => (&site.ref_allele, &site.alt_allele),
            (Genotype::HomAlt, Genotype::HomRef) => (&site.alt_allele, &site.ref_allele),
            _ => return FractionTag::Unclassified,
        };
        if allele == paternal_allele {
            FractionTag::MaternalOnly
        } else if allele == maternal_allele {
            FractionTag::Shared
        } else {
            FractionTag::Unclassified
        }
    }

    pub fn is_informative(self) -> bool {
        self != FractionTag::Unclassified
    }
}

/// Parental genotypes and alleles at one site, as needed to tag fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct ParentalSite {
    pub ref_allele: String,
    pub alt_allele: String,
    pub maternal: Option<Genotype>,
    pub paternal: Option<Genotype>,
}

/// One fragment as persisted inside a position batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentRecord {
    pub allele: String,
    pub length: u32,
    pub read_id: String,
    pub tag: FractionTag,
}

/// One fragment observed at one genomic position.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub chrom: String,
    pub pos: u32,
    pub allele: String,
    pub length: u32,
    pub read_id: String,
    pub tag: FractionTag,
}

impl Observation {
    pub(crate) fn from_record(chrom: &str, pos: u32, record: FragmentRecord) -> Self {
        Observation {
            chrom: chrom.to_string(),
            pos,
            allele: record.allele,
            length: record.length,
            read_id: record.read_id,
            tag: record.tag,
        }
    }
}

/// Fragment length with its fraction tag, as consumed by fraction estimation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LengthObservation {
    pub chrom: String,
    pub length: u32,
    pub tag: FractionTag,
}
