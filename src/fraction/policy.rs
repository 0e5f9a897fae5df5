use super::FetalFraction;
use std::{collections::HashSet, fmt, str::FromStr};

pub const DEFAULT_ORIGIN_FRACTION: f64 = 0.7;

/// How a fragment's fetal fraction is chosen during likelihood evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FractionModel {
    /// Total fraction for every fragment.
    Uniform,
    /// Length table at the indel-adjusted length, falling back to the total.
    Lengths,
    /// As `Lengths`, but fragments known to be fetal use a fixed fraction.
    Origin,
}

impl FromStr for FractionModel {
    type Err = String;
    fn from_str(model: &str) -> Result<Self, Self::Err> {
        match model {
            "uniform" => Ok(FractionModel::Uniform),
            "lengths" => Ok(FractionModel::Lengths),
            "origin" => Ok(FractionModel::Origin),
            _ => Err(format!(
                "Invalid fraction model '{}' (expected uniform, lengths or origin)",
                model
            )),
        }
    }
}

impl fmt::Display for FractionModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FractionModel::Uniform => "uniform",
            FractionModel::Lengths => "lengths",
            FractionModel::Origin => "origin",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone)]
pub struct FractionPolicy {
    pub model: FractionModel,
    pub fraction: FetalFraction,
    pub origin_fraction: f64,
    pub fetal_reads: HashSet<String>,
}

impl FractionPolicy {
    pub fn new(model: FractionModel, fraction: FetalFraction) -> Self {
        FractionPolicy {
            model,
            fraction,
            origin_fraction: DEFAULT_ORIGIN_FRACTION,
            fetal_reads: HashSet::new(),
        }
    }

    pub fn with_origin(mut self, origin_fraction: f64, fetal_reads: HashSet<String>) -> Self {
        self.origin_fraction = origin_fraction;
        self.fetal_reads = fetal_reads;
        self
    }

    /// Fetal fraction for one fragment. `delta` is `len(REF) - len(ALT)`.
    pub fn fraction_for(&self, read_id: &str, length: u32, delta: i64) -> f64 {
        match self.model {
            FractionModel::Uniform => self.fraction.total,
            FractionModel::Lengths => self.fraction.lookup(length as i64 - delta),
            FractionModel::Origin => {
                if self.fetal_reads.contains(read_id) {
                    self.origin_fraction
                } else {
                    self.fraction.lookup(length as i64 - delta)
                }
            }
        }
    }
}
