use super::{FetalCall, NoCallReason, SiteOutcome};
use crate::errors::Error;
use crate::fraction::FractionPolicy;
use crate::genotype::{
    calculate_likelihoods, calculate_posteriors, calculate_priors, normalized_likelihoods,
    prior_probabilities, Genotype, VariantSite,
};
use crate::store::ObservationStore;
use crate::vcf::SitePair;

pub struct Params {
    pub policy: FractionPolicy,
    pub max_fragments: Option<usize>,
}

/// Index of each parent within the parental records' extracted samples.
pub const MOTHER: usize = 0;
pub const FATHER: usize = 1;

pub fn call_site(
    site: &VariantSite,
    maternal: Genotype,
    paternal: Option<Genotype>,
    params: &Params,
    stores: &[ObservationStore],
) -> Result<FetalCall, Error> {
    let (priors, source) = calculate_priors(Some(maternal), paternal);
    let likelihoods = calculate_likelihoods(
        site,
        maternal,
        &params.policy,
        stores,
        params.max_fragments,
    )?;
    let posterior = calculate_posteriors(&priors, &likelihoods);
    log::trace!(
        "{}:{}: priors from {}, call {} (Q{:.2})",
        site.chrom,
        site.pos,
        source,
        posterior.prediction,
        posterior.quality
    );

    Ok(FetalCall {
        prediction: posterior.prediction,
        quality: posterior.quality,
        priors: prior_probabilities(&priors),
        posteriors: posterior.probabilities(),
        normalized_likelihoods: normalized_likelihoods(&likelihoods),
    })
}

/// Decides the outcome for one pair of records. Never fails: any problem
/// at a single site becomes a no-call.
pub fn analyze_pair(pair: &SitePair, params: &Params, stores: &[ObservationStore]) -> SiteOutcome {
    let (cfdna, parents) = match (&pair.cfdna, &pair.parents) {
        (_, None) => return SiteOutcome::Unsupported,
        (None, Some(_)) => return SiteOutcome::ParentalOnly,
        (Some(cfdna), Some(parents)) => (cfdna, parents),
    };

    let Some(maternal) = parents.genotype(MOTHER) else {
        return SiteOutcome::NoCall(NoCallReason::MaternalGenotype);
    };
    if !cfdna.is_biallelic() {
        log::warn!(
            "{}:{}: skipping site with {} alternate alleles",
            cfdna.chrom,
            cfdna.pos,
            cfdna.alt_alleles().len()
        );
        return SiteOutcome::NoCall(NoCallReason::MultiAllelic);
    }

    let site = VariantSite {
        chrom: cfdna.chrom.clone(),
        pos: cfdna.pos,
        ref_allele: String::from_utf8_lossy(cfdna.ref_allele()).into_owned(),
        alt_allele: String::from_utf8_lossy(&cfdna.alleles[1]).into_owned(),
    };
    match call_site(&site, maternal, parents.genotype(FATHER), params, stores) {
        Ok(call) => SiteOutcome::Called(call),
        Err(err @ Error::NoEvidence { .. }) => {
            log::debug!("{}", err);
            SiteOutcome::NoCall(NoCallReason::NoEvidence)
        }
        Err(err) => {
            log::warn!("{}:{}: {}", site.chrom, site.pos, err);
            SiteOutcome::NoCall(NoCallReason::Unreadable)
        }
    }
}
