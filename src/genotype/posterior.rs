use super::{has_priors, Genotype, Priors};
use bio::stats::{LogProb, PHREDProb};
use std::f64::consts::LN_10;

/// Quality reported when no alternative genotype carries any probability mass.
pub const MAX_QUALITY: f64 = 999.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Posterior {
    /// Log prior plus log likelihood per fetal genotype; `None` where the
    /// prior rules the genotype out.
    pub joint: [Option<LogProb>; 3],
    pub prediction: Genotype,
    pub quality: f64,
}

impl Posterior {
    /// Normalized posterior probabilities, zero for excluded genotypes.
    pub fn probabilities(&self) -> [f64; 3] {
        let total = ln_sum_exp(self.joint.iter().flatten().copied());
        if *total == f64::NEG_INFINITY {
            return [0.0; 3];
        }
        let probs = self.joint.map(|p| p.map_or(0.0, |p| (*p - *total).exp()));
        let sum: f64 = probs.iter().sum();
        probs.map(|p| p / sum)
    }
}

pub fn calculate_posteriors(priors: &Priors, likelihoods: &[LogProb; 3]) -> Posterior {
    let joint: [Option<LogProb>; 3] = if has_priors(priors) {
        std::array::from_fn(|i| priors[i].map(|prior| prior + likelihoods[i]))
    } else {
        likelihoods.map(Some)
    };

    let mut best: Option<usize> = None;
    for (i, p) in joint.iter().enumerate() {
        if let Some(p) = p {
            match best {
                Some(b) if joint[b].is_some_and(|current| *p <= current) => {}
                _ => best = Some(i),
            }
        }
    }
    let best = best.unwrap_or(0);
    let prediction = Genotype::ALL[best];
    let quality = phred_quality(&joint, best);

    Posterior {
        joint,
        prediction,
        quality,
    }
}

/// Phred-scaled probability that the call at `best` is wrong, i.e. the
/// posterior mass of every other admissible genotype.
pub fn phred_quality(joint: &[Option<LogProb>; 3], best: usize) -> f64 {
    let best_prob = match joint[best] {
        Some(p) if *p != f64::NEG_INFINITY => p,
        _ => return 0.0,
    };
    let others: Vec<LogProb> = joint
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != best)
        .filter_map(|(_, p)| *p)
        .collect();
    if others.is_empty() {
        return MAX_QUALITY;
    }

    let ln_others = ln_sum_exp(others.iter().copied());
    let ln_total = ln_sum_exp([ln_others, best_prob]);
    let ln_error = LogProb(*ln_others - *ln_total);
    let quality = *PHREDProb::from(ln_error);
    if quality.is_nan() {
        return 0.0;
    }
    quality.clamp(0.0, MAX_QUALITY)
}

/// Log of a sum of log-space probabilities, shifted by the maximum and
/// evaluated with `f64::exp` (bio's `ln_sum_exp` uses an approximate exp).
fn ln_sum_exp(values: impl IntoIterator<Item = LogProb>) -> LogProb {
    let values: Vec<f64> = values.into_iter().map(|p| *p).collect();
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return LogProb::ln_zero();
    }
    if max == f64::INFINITY {
        return LogProb(f64::INFINITY);
    }
    LogProb(max + values.iter().map(|p| (p - max).exp()).sum::<f64>().ln())
}

/// Log10 likelihoods shifted so the most likely genotype is 0.
pub fn normalized_likelihoods(likelihoods: &[LogProb; 3]) -> [f64; 3] {
    let max = likelihoods
        .iter()
        .map(|p| **p)
        .fold(f64::NEG_INFINITY, f64::max);
    likelihoods.map(|p| if *p == max { 0.0 } else { (*p - max) / LN_10 })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::genotype::calculate_priors;
    use approx::assert_relative_eq;
    use bio::stats::Prob;

    fn ln(p: f64) -> LogProb {
        LogProb::from(Prob(p))
    }

    #[test]
    fn joint_adds_priors_to_likelihoods() {
        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::Het));
        let likelihoods = [ln(0.1), ln(0.2), ln(0.3)];
        let posterior = calculate_posteriors(&priors, &likelihoods);
        assert_relative_eq!(*posterior.joint[0].unwrap(), (0.25f64 * 0.1).ln());
        assert_relative_eq!(*posterior.joint[1].unwrap(), (0.5f64 * 0.2).ln());
        assert_eq!(posterior.prediction, Genotype::Het);
    }

    #[test]
    fn missing_prior_excludes_genotype() {
        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::HomRef));
        // likelihood alone would favour 1/1
        let likelihoods = [ln(0.01), ln(0.02), ln(0.9)];
        let posterior = calculate_posteriors(&priors, &likelihoods);
        assert!(posterior.joint[2].is_none());
        assert_eq!(posterior.prediction, Genotype::Het);
        assert_eq!(posterior.probabilities()[2], 0.0);
        assert_relative_eq!(
            posterior.probabilities().iter().sum::<f64>(),
            1.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn absent_priors_fall_back_to_likelihoods() {
        let likelihoods = [ln(0.2), ln(0.7), ln(0.1)];
        let posterior = calculate_posteriors(&[None; 3], &likelihoods);
        assert_eq!(posterior.joint, likelihoods.map(Some));
        assert_eq!(posterior.prediction, Genotype::Het);
    }

    #[test]
    fn ties_prefer_lowest_index() {
        let likelihoods = [ln(0.5), ln(0.5), ln(0.5)];
        let posterior = calculate_posteriors(&[None; 3], &likelihoods);
        assert_eq!(posterior.prediction, Genotype::HomRef);

        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::HomRef));
        let posterior = calculate_posteriors(&priors, &[ln(0.3), ln(0.3), ln(0.3)]);
        assert_eq!(posterior.prediction, Genotype::HomRef);
    }

    #[test]
    fn quality_grows_with_separation() {
        let close = calculate_posteriors(&[None; 3], &[ln(0.3), ln(0.35), ln(0.35)]);
        let far = calculate_posteriors(&[None; 3], &[ln(0.001), ln(0.01), ln(0.989)]);
        let farther = calculate_posteriors(&[None; 3], &[ln(1e-8), ln(1e-6), ln(0.999)]);
        assert!(close.quality < far.quality);
        assert!(far.quality < farther.quality);
        // P(error) = 0.011 over a normalized joint
        assert_relative_eq!(far.quality, -10.0 * 0.011f64.log10(), epsilon = 1e-9);
    }

    #[test]
    fn single_admissible_genotype_is_capped() {
        let (priors, _) = calculate_priors(Some(Genotype::HomRef), Some(Genotype::HomAlt));
        let posterior = calculate_posteriors(&priors, &[ln(0.1), ln(0.2), ln(0.3)]);
        assert_eq!(posterior.prediction, Genotype::Het);
        assert_eq!(posterior.quality, MAX_QUALITY);
    }

    #[test]
    fn impossible_evidence_has_zero_quality() {
        let zero = LogProb::ln_zero();
        let posterior = calculate_posteriors(&[None; 3], &[zero, zero, zero]);
        assert_eq!(posterior.quality, 0.0);
        assert_eq!(posterior.probabilities(), [0.0; 3]);
    }

    #[test]
    fn ten_alt_fragments_under_het_mother_call_homalt() {
        let lh = [
            LogProb(10.0 * 0.45f64.ln()),
            LogProb(10.0 * 0.5f64.ln()),
            LogProb(10.0 * 0.55f64.ln()),
        ];
        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::Het));
        let posterior = calculate_posteriors(&priors, &lh);
        assert_eq!(posterior.prediction.index(), 2);
        assert!(posterior.quality > 0.0);
    }

    #[test]
    fn posteriors_are_normalized_exactly() {
        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::Het));
        let lh = [
            LogProb(10.0 * 0.45f64.ln()),
            LogProb(10.0 * 0.5f64.ln()),
            LogProb(10.0 * 0.55f64.ln()),
        ];
        let probs = calculate_posteriors(&priors, &lh).probabilities();
        assert_relative_eq!(probs.iter().sum::<f64>(), 1.0, epsilon = 1e-12);

        let weights = [0.25 * 0.45f64.powi(10), 0.5 * 0.5f64.powi(10), 0.25 * 0.55f64.powi(10)];
        let total: f64 = weights.iter().sum();
        for (p, w) in probs.iter().zip(weights) {
            assert_relative_eq!(*p, w / total, epsilon = 1e-12);
        }
    }

    #[test]
    fn ln_sum_exp_matches_direct_sum() {
        let sum = ln_sum_exp([ln(0.2), ln(0.3), LogProb::ln_zero()]);
        assert_relative_eq!(*sum, 0.5f64.ln(), epsilon = 1e-14);
        assert_eq!(ln_sum_exp([LogProb::ln_zero(); 2]), LogProb::ln_zero());
    }

    #[test]
    fn normalized_likelihoods_are_log10_relative_to_best() {
        let normalized = normalized_likelihoods(&[ln(0.01), ln(0.1), ln(1.0)]);
        assert_relative_eq!(normalized[0], -2.0, epsilon = 1e-12);
        assert_relative_eq!(normalized[1], -1.0, epsilon = 1e-12);
        assert_eq!(normalized[2], 0.0);
    }
}
