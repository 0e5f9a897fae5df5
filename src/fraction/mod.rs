mod collect;
mod policy;
mod table;

pub use collect::{collect_lengths, default_thread_count, resolve_shards};
pub use policy::{FractionModel, FractionPolicy, DEFAULT_ORIGIN_FRACTION};
pub use table::{FetalFraction, FractionTable, DEFAULT_BIN_WIDTH, DEFAULT_MAX_LENGTH};
