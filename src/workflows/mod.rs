mod call;
mod call_result;

pub use call::{analyze_pair, call_site, Params, FATHER, MOTHER};
pub use call_result::{CallSummary, FetalCall, NoCallReason, SiteOutcome};
