use rust_htslib::bcf::record::GenotypeAllele;
use std::fmt;
use std::str::FromStr;

/// Biallelic diploid genotype encoded by its alternate-allele count.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Genotype {
    HomRef,
    Het,
    HomAlt,
}

impl Genotype {
    /// Canonical order 0/0, 0/1, 1/1; indexes every per-genotype vector.
    pub const ALL: [Genotype; 3] = [Genotype::HomRef, Genotype::Het, Genotype::HomAlt];

    pub fn from_alt_count(count: u8) -> Option<Self> {
        match count {
            0 => Some(Genotype::HomRef),
            1 => Some(Genotype::Het),
            2 => Some(Genotype::HomAlt),
            _ => None,
        }
    }

    pub fn alt_count(self) -> u8 {
        match self {
            Genotype::HomRef => 0,
            Genotype::Het => 1,
            Genotype::HomAlt => 2,
        }
    }

    pub fn index(self) -> usize {
        self.alt_count() as usize
    }

    /// Probability of transmitting the alternate allele.
    pub fn alt_fraction(self) -> f64 {
        self.alt_count() as f64 / 2.0
    }

    /// Decodes htslib genotype alleles; anything other than two called
    /// reference/first-alternate alleles is unknown.
    pub fn from_alleles(alleles: &[GenotypeAllele]) -> Option<Self> {
        if alleles.len() != 2 {
            return None;
        }
        let mut count = 0;
        for allele in alleles {
            match allele.index() {
                Some(0) => {}
                Some(1) => count += 1,
                _ => return None,
            }
        }
        Genotype::from_alt_count(count)
    }

    pub fn to_alleles(self) -> [GenotypeAllele; 2] {
        match self {
            Genotype::HomRef => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(0)],
            Genotype::Het => [GenotypeAllele::Unphased(0), GenotypeAllele::Unphased(1)],
            Genotype::HomAlt => [GenotypeAllele::Unphased(1), GenotypeAllele::Unphased(1)],
        }
    }
}

impl FromStr for Genotype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let alleles: Vec<&str> = s.split(&['/', '|']).collect();
        if alleles.len() != 2 {
            return Err(format!("Not a diploid genotype: {}", s));
        }
        let mut count = 0;
        for allele in alleles {
            match allele {
                "0" => {}
                "1" => count += 1,
                _ => return Err(format!("Unsupported genotype: {}", s)),
            }
        }
        Genotype::from_alt_count(count).ok_or_else(|| format!("Unsupported genotype: {}", s))
    }
}

impl fmt::Display for Genotype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let encoding = match self {
            Genotype::HomRef => "0/0",
            Genotype::Het => "0/1",
            Genotype::HomAlt => "1/1",
        };
        write!(f, "{}", encoding)
    }
}
