pub mod data;
mod error;
pub mod service;
pub mod source;

pub use error::{Result, SourceError};
pub use source::{FeatureSource, SourceOptions};
