// Shared modules
pub(crate) mod cli;
mod metadata;
mod profiling;
mod run;

// Entry points
pub mod main;
