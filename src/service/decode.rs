//! Tile response decoding

use super::{PbfDecoder, QueryFormat, check_error_payload};
use crate::Result;
use crate::data::FeatureCollection;
use std::sync::Arc;

/// Turns a raw tile response body into features
pub trait TileDecoder: Send + Sync {
    /// Encoding this decoder expects
    fn format(&self) -> QueryFormat;

    fn decode(&self, body: &[u8]) -> Result<FeatureCollection>;
}

/// Decoder for `f=geojson` responses
#[derive(Clone, Copy, Debug, Default)]
pub struct GeoJsonDecoder;

impl TileDecoder for GeoJsonDecoder {
    fn format(&self) -> QueryFormat {
        QueryFormat::GeoJson
    }

    fn decode(&self, body: &[u8]) -> Result<FeatureCollection> {
        let value: serde_json::Value = serde_json::from_slice(body)?;
        check_error_payload(&value)?;
        Ok(serde_json::from_value(value)?)
    }
}

/// Decoder matching a negotiated format
pub fn decoder_for(format: QueryFormat) -> Arc<dyn TileDecoder> {
    match format {
        QueryFormat::Pbf => Arc::new(PbfDecoder),
        QueryFormat::GeoJson => Arc::new(GeoJsonDecoder),
    }
}
