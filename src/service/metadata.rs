//! Service metadata: capabilities, identifier field, extent and attribution

use super::{Transport, request_json};
use crate::data::Envelope;
use crate::{Result, SourceError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::OnceCell;
use url::Url;

/// Encoding requested for tile queries
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryFormat {
    #[default]
    Pbf,
    GeoJson,
}

impl QueryFormat {
    /// Value of the `f` query parameter
    pub fn as_param(&self) -> &'static str {
        match self {
            QueryFormat::Pbf => "pbf",
            QueryFormat::GeoJson => "geojson",
        }
    }

    /// Name as advertised in `supportedQueryFormats`
    fn advertised_name(&self) -> &'static str {
        match self {
            QueryFormat::Pbf => "PBF",
            QueryFormat::GeoJson => "geoJSON",
        }
    }

    fn other(&self) -> Self {
        match self {
            QueryFormat::Pbf => QueryFormat::GeoJson,
            QueryFormat::GeoJson => QueryFormat::Pbf,
        }
    }
}

impl fmt::Display for QueryFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.advertised_name())
    }
}

/// Field the server guarantees unique per feature
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UniqueIdField {
    pub name: String,
    #[serde(default)]
    pub is_system_maintained: bool,
}

/// Layer description returned by `{url}?f=json`; unknown members are ignored
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ServiceMetadata {
    pub name: Option<String>,
    /// Comma separated list, e.g. `"JSON, geoJSON, PBF"`
    pub supported_query_formats: String,
    pub unique_id_field: Option<UniqueIdField>,
    pub object_id_field: Option<String>,
    pub extent: Option<Envelope>,
    pub copyright_text: Option<String>,
    pub max_record_count: Option<u64>,
}

impl ServiceMetadata {
    pub fn supports(&self, format: QueryFormat) -> bool {
        self.supported_query_formats
            .split(',')
            .any(|f| f.trim() == format.advertised_name())
    }

    /// Pick `preferred` if advertised, else the other encoding
    pub fn negotiate_format(&self, preferred: QueryFormat) -> Result<QueryFormat> {
        [preferred, preferred.other()]
            .into_iter()
            .find(|f| self.supports(*f))
            .ok_or_else(|| SourceError::UnsupportedFormat(self.supported_query_formats.clone()))
    }

    /// Name of the identifier field, falling back to the object id field
    pub fn id_field(&self) -> Option<&str> {
        self.unique_id_field
            .as_ref()
            .map(|f| f.name.as_str())
            .or(self.object_id_field.as_deref())
    }

    /// Copyright text, if present and non-empty
    pub fn attribution(&self) -> Option<&str> {
        self.copyright_text.as_deref().filter(|t| !t.trim().is_empty())
    }
}

/// Fetches the layer metadata once and serves the cached copy afterwards
#[derive(Debug)]
pub struct MetadataResolver {
    url: Url,
    cell: OnceCell<ServiceMetadata>,
}

impl MetadataResolver {
    pub fn new(service_url: &Url) -> Self {
        let mut url = service_url.clone();
        url.query_pairs_mut().append_pair("f", "json");
        Self {
            url,
            cell: OnceCell::new(),
        }
    }

    /// Metadata, fetching it on first call. Failures are not cached.
    pub async fn get(&self, transport: &dyn Transport) -> Result<&ServiceMetadata> {
        self.cell
            .get_or_try_init(|| async {
                tracing::debug!("Fetching service metadata from {}", self.url);
                let metadata: ServiceMetadata = request_json(transport, self.url.clone()).await?;
                tracing::info!(
                    "Service {:?}: formats [{}], id field {:?}",
                    metadata.name.as_deref().unwrap_or("<unnamed>"),
                    metadata.supported_query_formats,
                    metadata.id_field()
                );
                Ok::<_, SourceError>(metadata)
            })
            .await
    }

    /// Already fetched metadata, without touching the network
    pub fn cached(&self) -> Option<&ServiceMetadata> {
        self.cell.get()
    }

    pub fn url(&self) -> &Url {
        &self.url
    }
}
