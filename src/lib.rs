pub mod assembler;
pub mod core;
pub mod error;
pub mod metrics;
pub mod step;
pub mod word;
