pub mod cli;
pub mod commands;
pub mod errors;
pub mod fraction;
pub mod genotype;
pub mod store;
pub mod utils;
pub mod vcf;
pub mod workflows;
