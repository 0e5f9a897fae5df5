mod pairing;
mod parents;
mod record;
mod write_vcf;

pub use pairing::{CallSetReader, ContigOrder, PairedSites, SitePair};
pub use parents::VcfParents;
pub use record::{contig_rid, resolve_sample, FieldSchema, FieldValue, SampleGenotype, SiteRecord};
pub use write_vcf::{OutputType, VcfWriter};
