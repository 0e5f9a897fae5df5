mod gt;
mod likelihood;
mod posterior;
mod priors;

pub use gt::Genotype;
pub use likelihood::{
    calculate_fragment_likelihood, calculate_likelihoods, likelihoods_from_observations,
    VariantSite,
};
pub use posterior::{
    calculate_posteriors, normalized_likelihoods, phred_quality, Posterior, MAX_QUALITY,
};
pub use priors::{calculate_priors, has_priors, prior_probabilities, PriorSource, Priors};
