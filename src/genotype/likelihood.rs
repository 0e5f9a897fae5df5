use super::Genotype;
use crate::errors::Error;
use crate::fraction::FractionPolicy;
use crate::store::{Observation, ObservationStore};
use bio::stats::LogProb;
use std::collections::HashSet;

/// A biallelic site as seen by the likelihood model.
#[derive(Debug, Clone, PartialEq)]
pub struct VariantSite {
    pub chrom: String,
    pub pos: u32,
    pub ref_allele: String,
    pub alt_allele: String,
}

impl VariantSite {
    /// Length difference between the alleles, used to undo the indel's
    /// effect on observed fragment lengths.
    pub fn length_delta(&self) -> i64 {
        self.ref_allele.len() as i64 - self.alt_allele.len() as i64
    }
}

/// Probability of observing `allele` on one fragment for each fetal genotype.
///
/// A fragment is fetal with probability `fetal_fraction`, in which case its
/// allele follows the candidate fetal genotype, and maternal otherwise.
/// Alleles matching neither REF nor ALT carry no information.
pub fn calculate_fragment_likelihood(
    allele: &str,
    maternal: Genotype,
    ref_allele: &str,
    alt_allele: &str,
    fetal_fraction: f64,
) -> Option<[f64; 3]> {
    let f = fetal_fraction;
    let (maternal_share, fetal_weights) = if allele == alt_allele {
        (maternal.alt_fraction(), [0.0, 0.5, 1.0])
    } else if allele == ref_allele {
        (1.0 - maternal.alt_fraction(), [1.0, 0.5, 0.0])
    } else {
        return None;
    };
    Some(fetal_weights.map(|w| w * f + maternal_share * (1.0 - f)))
}

/// Summed log-likelihoods over all fragments stored at `site` in any of `stores`.
///
/// A read seen in more than one shard counts once, from the first shard listing it.
pub fn calculate_likelihoods(
    site: &VariantSite,
    maternal: Genotype,
    policy: &FractionPolicy,
    stores: &[ObservationStore],
    max_fragments: Option<usize>,
) -> Result<[LogProb; 3], Error> {
    let mut observations = Vec::new();
    let mut seen = HashSet::new();
    for store in stores {
        for obs in store.fetch(&site.chrom, site.pos)? {
            if seen.insert(obs.read_id.clone()) {
                observations.push(obs);
            } else {
                log::debug!(
                    "{}:{}: read {} already seen in another shard",
                    site.chrom,
                    site.pos,
                    obs.read_id
                );
            }
        }
    }
    likelihoods_from_observations(site, maternal, policy, &observations, max_fragments)
}

pub fn likelihoods_from_observations(
    site: &VariantSite,
    maternal: Genotype,
    policy: &FractionPolicy,
    observations: &[Observation],
    max_fragments: Option<usize>,
) -> Result<[LogProb; 3], Error> {
    let delta = site.length_delta();
    let limit = max_fragments.unwrap_or(usize::MAX);

    let mut sums = [0.0f64; 3];
    let mut used = 0;
    for obs in observations.iter().take(limit) {
        let fraction = policy.fraction_for(&obs.read_id, obs.length, delta);
        let Some(likelihoods) = calculate_fragment_likelihood(
            &obs.allele,
            maternal,
            &site.ref_allele,
            &site.alt_allele,
            fraction,
        ) else {
            continue;
        };
        for (sum, likelihood) in sums.iter_mut().zip(likelihoods) {
            *sum += likelihood.ln();
        }
        used += 1;
    }

    if used == 0 {
        return Err(Error::NoEvidence {
            chrom: site.chrom.clone(),
            pos: site.pos,
        });
    }
    log::trace!(
        "{}:{}: {} of {} fragments informative",
        site.chrom,
        site.pos,
        used,
        observations.len()
    );
    Ok(sums.map(LogProb))
}
