//! Everything that talks to the feature server: transport, metadata,
//! extent reprojection, query URLs, tile fetching and decoding.

mod decode;
mod fetch;
mod metadata;
mod pbf;
mod projection;
mod query;
mod transport;

pub use decode::{GeoJsonDecoder, TileDecoder, decoder_for};
pub use fetch::TileFetcher;
pub use metadata::{MetadataResolver, QueryFormat, ServiceMetadata, UniqueIdField};
pub use pbf::PbfDecoder;
pub use projection::{ExtentNormalizer, FALLBACK_PROJECTION_ENDPOINT, default_projection_endpoint};
pub use query::{DEFAULT_POINT_RADIUS, QueryParams, TimeRange, ids_query_url, point_query_url, tile_query_url};
pub use transport::{HttpTransport, Transport};

use crate::{Result, SourceError};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

/// Fail on the `{"error": {...}}` payload the server sends with a 200 status
pub fn check_error_payload(value: &Value) -> Result<()> {
    let Some(error) = value.get("error") else {
        return Ok(());
    };
    let code = error.get("code").and_then(Value::as_i64).unwrap_or_default();
    let message = error
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("unknown error")
        .to_string();
    Err(SourceError::Server { code, message })
}

/// GET a JSON document, treating an error payload as a failure
pub async fn request_json<T: DeserializeOwned>(transport: &dyn Transport, url: Url) -> Result<T> {
    let body = transport.get(url).await?;
    let value: Value = serde_json::from_slice(&body)?;
    check_error_payload(&value)?;
    Ok(serde_json::from_value(value)?)
}
