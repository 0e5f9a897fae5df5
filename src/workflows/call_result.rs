use crate::genotype::Genotype;

/// Fetal genotype call at one site.
#[derive(Debug, Clone, PartialEq)]
pub struct FetalCall {
    pub prediction: Genotype,
    /// Phred-scaled
    pub quality: f64,
    /// Prior probabilities per fetal genotype, absent without parental genotypes.
    pub priors: Option<[f64; 3]>,
    pub posteriors: [f64; 3],
    /// Log10 likelihoods relative to the best genotype.
    pub normalized_likelihoods: [f64; 3],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoCallReason {
    MaternalGenotype,
    MultiAllelic,
    NoEvidence,
    Unreadable,
}

/// What the caller decided for one pair of input records.
#[derive(Debug, Clone, PartialEq)]
pub enum SiteOutcome {
    /// cfDNA site absent from the parental call set.
    Unsupported,
    /// Parental site without a cfDNA record.
    ParentalOnly,
    NoCall(NoCallReason),
    Called(FetalCall),
}

impl SiteOutcome {
    pub fn quality(&self) -> f64 {
        match self {
            SiteOutcome::Called(call) => call.quality,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct CallSummary {
    pub called: usize,
    pub no_call: usize,
    pub unsupported: usize,
    pub parental_only: usize,
}

impl CallSummary {
    pub fn add(&mut self, outcome: &SiteOutcome) {
        match outcome {
            SiteOutcome::Called(_) => self.called += 1,
            SiteOutcome::NoCall(_) => self.no_call += 1,
            SiteOutcome::Unsupported => self.unsupported += 1,
            SiteOutcome::ParentalOnly => self.parental_only += 1,
        }
    }

    pub fn total(&self) -> usize {
        self.called + self.no_call + self.unsupported + self.parental_only
    }
}
