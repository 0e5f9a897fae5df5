use crate::errors::Error;
use crate::store::{FractionTag, LengthObservation};

pub const DEFAULT_BIN_WIDTH: u32 = 3;
pub const DEFAULT_MAX_LENGTH: u32 = 500;
/// A bin is estimated on its own only when both counts exceed this.
pub const MIN_BIN_SUPPORT: usize = 5;

/// Per-length fetal fraction, indexed by fragment length over the binned domain.
///
/// Bin edges are `0, w, 2w, ...` below the maximum length; the first bin is
/// closed on both ends and later bins are `(lo, hi]`, so length `L > 0`
/// falls into bin `(L - 1) / w`.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FractionTable {
    bin_width: u32,
    per_length: Vec<f64>,
}

impl FractionTable {
    pub fn is_empty(&self) -> bool {
        self.per_length.is_empty()
    }

    pub fn bin_width(&self) -> u32 {
        self.bin_width
    }

    /// Estimate for `length`, if it falls inside the table domain.
    pub fn get(&self, length: i64) -> Option<f64> {
        usize::try_from(length)
            .ok()
            .and_then(|index| self.per_length.get(index))
            .copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, f64)> + '_ {
        self.per_length
            .iter()
            .enumerate()
            .map(|(length, fraction)| (length as u32, *fraction))
    }
}

/// Total fetal fraction plus its per-length refinement.
#[derive(Debug, Clone, PartialEq)]
pub struct FetalFraction {
    pub total: f64,
    pub table: FractionTable,
}

impl FetalFraction {
    /// A model with no length information; every lookup yields `total`.
    pub fn constant(total: f64) -> Self {
        FetalFraction {
            total,
            table: FractionTable::default(),
        }
    }

    pub fn build(
        lengths: &[LengthObservation],
        bin_width: u32,
        max_length: u32,
    ) -> Result<Self, Error> {
        let fetal: Vec<u32> = tagged_lengths(lengths, FractionTag::MaternalOnly);
        let shared: Vec<u32> = tagged_lengths(lengths, FractionTag::Shared);
        if fetal.is_empty() && shared.is_empty() {
            return Err(Error::InsufficientData);
        }

        let total = estimate(fetal.len(), shared.len());
        let table = build_table(&fetal, &shared, total, bin_width, max_length);
        log::debug!(
            "Fetal fraction from {} fetal and {} shared fragments: {:.4}",
            fetal.len(),
            shared.len(),
            total
        );
        Ok(FetalFraction { total, table })
    }

    /// Never fails: lengths outside the table domain use the total fraction.
    pub fn lookup(&self, length: i64) -> f64 {
        self.table.get(length).unwrap_or(self.total)
    }
}

fn tagged_lengths(lengths: &[LengthObservation], tag: FractionTag) -> Vec<u32> {
    lengths
        .iter()
        .filter(|obs| obs.tag == tag)
        .map(|obs| obs.length)
        .collect()
}

/// Fetal fragments carry one of two fetal alleles, hence the factor of two.
fn estimate(fetal: usize, shared: usize) -> f64 {
    if fetal + shared == 0 {
        return 0.0;
    }
    (2.0 * fetal as f64 / (fetal + shared) as f64).min(1.0)
}

fn bin_index(length: u32, bin_width: u32) -> usize {
    if length == 0 {
        0
    } else {
        ((length - 1) / bin_width) as usize
    }
}

fn build_table(
    fetal: &[u32],
    shared: &[u32],
    total: f64,
    bin_width: u32,
    max_length: u32,
) -> FractionTable {
    let bin_width = bin_width.max(1);
    let edges: Vec<u32> = (0..max_length).step_by(bin_width as usize).collect();
    if edges.len() < 2 {
        return FractionTable {
            bin_width,
            per_length: Vec::new(),
        };
    }
    let n_bins = edges.len() - 1;
    let last_edge = edges[n_bins];

    let count = |lengths: &[u32]| {
        let mut counts = vec![0usize; n_bins];
        for &length in lengths.iter().filter(|&&l| l <= last_edge) {
            counts[bin_index(length, bin_width)] += 1;
        }
        counts
    };
    let fetal_counts = count(fetal);
    let shared_counts = count(shared);

    let mut per_length = Vec::with_capacity(last_edge as usize + 1);
    let mut previous = total;
    for length in 0..=last_edge {
        let bin = bin_index(length, bin_width);
        let (f, s) = (fetal_counts[bin], shared_counts[bin]);
        if f > MIN_BIN_SUPPORT && s > MIN_BIN_SUPPORT {
            previous = estimate(f, s);
        }
        per_length.push(previous);
    }

    FractionTable {
        bin_width,
        per_length,
    }
}
