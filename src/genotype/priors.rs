use super::Genotype;
use bio::stats::{LogProb, Prob};
use std::fmt;

/// Where a position's genotype priors came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriorSource {
    Parents,
    Unavailable,
}

impl fmt::Display for PriorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PriorSource::Parents => write!(f, "parents"),
            PriorSource::Unavailable => write!(f, "."),
        }
    }
}

/// Log prior per fetal genotype; `None` marks a genotype the parents cannot produce.
pub type Priors = [Option<LogProb>; 3];

/// Mendelian transmission priors for the three fetal genotypes.
pub fn calculate_priors(
    maternal: Option<Genotype>,
    paternal: Option<Genotype>,
) -> (Priors, PriorSource) {
    let (m, f) = match (maternal, paternal) {
        (Some(maternal), Some(paternal)) => (maternal.alt_fraction(), paternal.alt_fraction()),
        _ => return ([None; 3], PriorSource::Unavailable),
    };

    let probs = [
        (1.0 - m) * (1.0 - f),
        m * (1.0 - f) + (1.0 - m) * f,
        m * f,
    ];
    let priors = probs.map(|p| {
        if p == 0.0 {
            None
        } else {
            Some(LogProb::from(Prob(p)))
        }
    });
    (priors, PriorSource::Parents)
}

pub fn has_priors(priors: &Priors) -> bool {
    priors.iter().any(Option::is_some)
}

/// Prior probabilities with impossible genotypes as zero, or `None` when no
/// prior is available at all.
pub fn prior_probabilities(priors: &Priors) -> Option<[f64; 3]> {
    if !has_priors(priors) {
        return None;
    }
    Some(priors.map(|p| p.map_or(0.0, |p| p.exp())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn priors_sum_to_one_for_all_parental_pairs() {
        for maternal in Genotype::ALL {
            for paternal in Genotype::ALL {
                let (priors, source) = calculate_priors(Some(maternal), Some(paternal));
                assert_eq!(source, PriorSource::Parents);
                let total: f64 = priors.iter().flatten().map(|p| p.exp()).sum();
                assert_relative_eq!(total, 1.0, epsilon = 1e-12);
            }
        }
    }

    #[test]
    fn het_mother_and_homref_father() {
        let (priors, _) = calculate_priors(Some(Genotype::Het), Some(Genotype::HomRef));
        assert_relative_eq!(priors[0].unwrap().exp(), 0.5);
        assert_relative_eq!(priors[1].unwrap().exp(), 0.5);
        assert!(priors[2].is_none());
        let probs = prior_probabilities(&priors).unwrap();
        assert_relative_eq!(probs[0], 0.5);
        assert_eq!(probs[2], 0.0);
    }

    #[test]
    fn homozygous_opposite_parents_force_het_fetus() {
        let (priors, _) = calculate_priors(Some(Genotype::HomRef), Some(Genotype::HomAlt));
        assert!(priors[0].is_none());
        assert_relative_eq!(*priors[1].unwrap(), 0.0);
        assert!(priors[2].is_none());
    }

    #[test]
    fn unknown_parent_gives_no_priors() {
        let (priors, source) = calculate_priors(Some(Genotype::Het), None);
        assert_eq!(priors, [None; 3]);
        assert_eq!(source, PriorSource::Unavailable);
        assert!(!has_priors(&priors));
        assert_eq!(prior_probabilities(&priors), None);
        assert_eq!(source.to_string(), ".");
    }
}
