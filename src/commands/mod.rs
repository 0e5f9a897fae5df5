pub mod build;
pub mod call;
pub mod fraction;
