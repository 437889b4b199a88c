//! Helpers shared by the coratools binaries.

pub mod build;
mod macros;
