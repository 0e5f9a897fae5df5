mod bam_utils;
mod readers;
mod region;

pub use bam_utils::{open_indexed_bam, BamWindow};
pub use readers::{open_text_reader, read_name_set};
pub use region::{normalize_chrom, GenomicRegion};

pub type Result<T> = std::result::Result<T, String>;

pub fn handle_error_and_exit(err: String) -> ! {
    log::error!("{}", err);
    std::process::exit(1);
}
