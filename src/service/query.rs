//! Query URLs for the layer's `/query` endpoint

use super::QueryFormat;
use crate::data::{Envelope, FeatureId, Tile, WGS84_WKID};
use crate::{Result, SourceError};
use serde::{Deserialize, Serialize};
use serde_json::json;
use url::Url;

/// Search radius of point queries, in meters
pub const DEFAULT_POINT_RADIUS: f64 = 20.0;

/// Time extent filter, in epoch milliseconds; both bounds are required
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub from: i64,
    pub to: i64,
}

impl TimeRange {
    pub fn new(from: i64, to: i64) -> Self {
        Self { from, to }
    }

    /// Value of the `time` query parameter
    pub fn as_param(&self) -> String {
        format!("{},{}", self.from, self.to)
    }
}

/// Query-affecting parameters shared by every tile request of a pass
#[derive(Clone, Debug, PartialEq)]
pub struct QueryParams {
    pub format: QueryFormat,
    pub where_clause: String,
    pub out_fields: String,
    pub precision: u32,
    pub time: Option<TimeRange>,
}

impl Default for QueryParams {
    fn default() -> Self {
        Self {
            format: QueryFormat::default(),
            where_clause: "1=1".into(),
            out_fields: "*".into(),
            precision: 8,
            time: None,
        }
    }
}

fn query_endpoint(service: &Url) -> Result<Url> {
    let mut url = service.clone();
    url.path_segments_mut()
        .map_err(|_| SourceError::Config(format!("{service} cannot be used as a base URL")))?
        .pop_if_empty()
        .push("query");
    Ok(url)
}

/// Query for all features intersecting a tile, quantized for display
pub fn tile_query_url(service: &Url, tile: &Tile, tolerance: f64, params: &QueryParams) -> Result<Url> {
    let envelope = Envelope::from_rect(tile.bbox());
    let geometry = serde_json::to_string(&envelope)?;
    let quantization = json!({
        "extent": envelope,
        "tolerance": tolerance,
        "mode": "view",
    });
    let wgs84 = WGS84_WKID.to_string();

    let mut url = query_endpoint(service)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("f", params.format.as_param())
            .append_pair("geometry", &geometry)
            .append_pair("where", &params.where_clause)
            .append_pair("outFields", &params.out_fields)
            .append_pair("outSR", &wgs84)
            .append_pair("returnZ", "false")
            .append_pair("returnM", "false")
            .append_pair("precision", &params.precision.to_string())
            .append_pair("quantizationParameters", &quantization.to_string())
            .append_pair("resultType", "tile")
            .append_pair("spatialRel", "esriSpatialRelIntersects")
            .append_pair("geometryType", "esriGeometryEnvelope")
            .append_pair("inSR", &wgs84);
        if let Some(time) = &params.time {
            query.append_pair("time", &time.as_param());
        }
    }
    Ok(url)
}

/// Query for features within `radius` meters of a point
pub fn point_query_url(
    service: &Url,
    lon: f64,
    lat: f64,
    radius: f64,
    return_geometry: bool,
    time: Option<&TimeRange>,
) -> Result<Url> {
    let geometry = json!({
        "x": lon,
        "y": lat,
        "spatialReference": { "wkid": WGS84_WKID },
    });

    let mut url = query_endpoint(service)?;
    {
        let mut query = url.query_pairs_mut();
        query
            .append_pair("sr", &WGS84_WKID.to_string())
            .append_pair("geometryType", "esriGeometryPoint")
            .append_pair("geometry", &geometry.to_string())
            .append_pair("returnGeometry", &return_geometry.to_string());
        if let Some(time) = time {
            query.append_pair("time", &time.as_param());
        }
        query
            .append_pair("outFields", "*")
            .append_pair("spatialRel", "esriSpatialRelIntersects")
            .append_pair("units", "esriSRUnit_Meter")
            .append_pair("distance", &radius.to_string())
            .append_pair("f", "geojson");
    }
    Ok(url)
}

/// Query for features by identifier
pub fn ids_query_url(service: &Url, ids: &[FeatureId], return_geometry: bool) -> Result<Url> {
    let object_ids = ids.iter().map(ToString::to_string).collect::<Vec<_>>().join(",");

    let mut url = query_endpoint(service)?;
    url.query_pairs_mut()
        .append_pair("sr", &WGS84_WKID.to_string())
        .append_pair("objectIds", &object_ids)
        .append_pair("returnGeometry", &return_geometry.to_string())
        .append_pair("outFields", "*")
        .append_pair("f", "geojson");
    Ok(url)
}
