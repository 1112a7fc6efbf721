//! Source configuration

use crate::data::{ResolverConfig, ZoomPolicy};
use crate::service::{QueryFormat, QueryParams, TimeRange, default_projection_endpoint};
use crate::{Result, SourceError};
use serde::{Deserialize, Serialize};
use url::Url;

/// Options of a [`FeatureSource`](super::FeatureSource).
///
/// Deserializes from camelCase JSON; every member but `url` has a default.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SourceOptions {
    /// Feature layer URL, e.g. `https://host/arcgis/rest/services/Parcels/FeatureServer/0`
    pub url: String,
    /// Cache everything in one bucket at `min_zoom` instead of per zoom pair
    pub use_static_zoom_level: bool,
    /// No requests below this zoom; defaults to 7 with a static zoom level, else 2
    pub min_zoom: Option<f64>,
    /// Zoom levels sharing a bucket in dynamic mode
    pub zoom_stride: u8,
    /// Multiplier on the pixel size sent as quantization tolerance
    pub simplify_factor: f64,
    /// Decimal places of returned coordinates
    pub precision: u32,
    #[serde(rename = "where")]
    pub where_clause: String,
    pub time: Option<TimeRange>,
    pub out_fields: String,
    /// Copy the service copyright text onto the map source
    pub set_attribution_from_service: bool,
    /// Preferred tile encoding; the other one is used if the server lacks it
    pub format: QueryFormat,
    /// Skip views outside the service extent
    pub use_service_bounds: bool,
    /// Geometry service used to reproject the service extent
    pub projection_endpoint: Option<String>,
}

impl Default for SourceOptions {
    fn default() -> Self {
        Self {
            url: String::new(),
            use_static_zoom_level: false,
            min_zoom: None,
            zoom_stride: 2,
            simplify_factor: 0.3,
            precision: 8,
            where_clause: "1=1".into(),
            time: None,
            out_fields: "*".into(),
            set_attribution_from_service: true,
            format: QueryFormat::Pbf,
            use_service_bounds: true,
            projection_endpoint: None,
        }
    }
}

impl SourceOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    /// Minimum zoom, explicit or the mode's default
    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
            .unwrap_or(if self.use_static_zoom_level { 7.0 } else { 2.0 })
    }

    pub fn zoom_policy(&self) -> ZoomPolicy {
        if self.use_static_zoom_level {
            ZoomPolicy::Static {
                level: self.min_zoom().clamp(0.0, f64::from(crate::data::tile::MAX_ZOOM)) as u8,
            }
        } else {
            ZoomPolicy::Dynamic {
                stride: self.zoom_stride,
            }
        }
    }

    pub fn resolver_config(&self) -> ResolverConfig {
        ResolverConfig {
            min_zoom: self.min_zoom(),
            policy: self.zoom_policy(),
            simplify_factor: self.simplify_factor,
        }
    }

    /// Initial query parameters, before format negotiation
    pub fn query_params(&self) -> QueryParams {
        QueryParams {
            format: self.format,
            where_clause: self.where_clause.clone(),
            out_fields: self.out_fields.clone(),
            precision: self.precision,
            time: self.time,
        }
    }

    /// Configured projection endpoint, or the one next to the service
    pub fn projection_endpoint(&self) -> String {
        self.projection_endpoint
            .clone()
            .unwrap_or_else(|| default_projection_endpoint(&self.url))
    }

    /// Check the options and return the parsed service URL
    pub fn validate(&self) -> Result<Url> {
        if self.url.trim().is_empty() {
            return Err(SourceError::Config("a service url must be supplied".into()));
        }
        let url = Url::parse(self.url.trim())?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(SourceError::Config(format!("unsupported scheme in {url}")));
        }
        if !(self.simplify_factor.is_finite() && self.simplify_factor >= 0.0) {
            return Err(SourceError::Config(format!(
                "simplify factor must be a non-negative number, got {}",
                self.simplify_factor
            )));
        }
        if self.zoom_stride == 0 {
            return Err(SourceError::Config("zoom stride must be at least 1".into()));
        }
        Url::parse(&self.projection_endpoint())?;
        Ok(url)
    }
}
