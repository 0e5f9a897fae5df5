mod correlate;
mod observation;
#[allow(clippy::module_inception)]
mod store;
mod trace;

pub use correlate::{AlignmentSource, CorrelationStats, Correlator, NoParents, ParentalSource};
pub use observation::{FractionTag, LengthObservation, Observation, ParentalSite};
pub use store::ObservationStore;
pub use trace::{parse_line, stream_trace_into_channel, TraceEvent};
