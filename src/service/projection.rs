//! Extent normalization: bring the service extent into WGS84, reprojecting
//! through a geometry service when needed

use super::{Transport, request_json};
use crate::data::{Envelope, WGS84_WKID};
use crate::{Result, SourceError};
use geo::Rect;
use serde::Deserialize;
use serde_json::json;
use url::Url;

/// Public geometry service used when the server's own one fails
pub const FALLBACK_PROJECTION_ENDPOINT: &str =
    "https://tasks.arcgisonline.com/arcgis/rest/services/Geometry/GeometryServer/project";

/// Geometry service sitting next to the feature service:
/// everything before `rest/services` plus `rest/services/Geometry/GeometryServer/project`
pub fn default_projection_endpoint(service_url: &str) -> String {
    let root = service_url.split("rest/services").next().unwrap_or(service_url);
    format!("{root}rest/services/Geometry/GeometryServer/project")
}

#[derive(Deserialize)]
struct ProjectResponse {
    #[serde(default)]
    geometries: Vec<Envelope>,
}

/// Converts the service extent to a WGS84 rectangle
#[derive(Clone, Debug)]
pub struct ExtentNormalizer {
    endpoint: Url,
    fallback: Url,
}

impl ExtentNormalizer {
    pub fn new(endpoint: Url) -> Result<Self> {
        Ok(Self {
            endpoint,
            fallback: Url::parse(FALLBACK_PROJECTION_ENDPOINT)?,
        })
    }

    /// Override the fallback endpoint
    pub fn with_fallback(mut self, fallback: Url) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }

    /// WGS84 rectangle for `extent`.
    ///
    /// Extents already in 4326 are used as is. Otherwise the primary endpoint
    /// is tried, then the fallback endpoint once.
    pub async fn normalize(&self, transport: &dyn Transport, extent: &Envelope) -> Result<Rect<f64>> {
        if extent.spatial_reference.is_wgs84() {
            return Ok(extent.to_rect());
        }

        match self.project(transport, &self.endpoint, extent).await {
            Ok(rect) => Ok(rect),
            Err(e) => {
                tracing::warn!(
                    "Projection through {} failed ({e}), retrying with {}",
                    self.endpoint,
                    self.fallback
                );
                self.project(transport, &self.fallback, extent)
                    .await
                    .map_err(|e| SourceError::Projection(format!("{}: {e}", self.fallback)))
            }
        }
    }

    fn request_url(endpoint: &Url, extent: &Envelope) -> Result<Url> {
        let in_sr = extent
            .spatial_reference
            .id()
            .ok_or_else(|| SourceError::Projection("service extent has no wkid".into()))?;
        let geometries = json!({
            "geometryType": "esriGeometryEnvelope",
            "geometries": [extent],
        });

        let mut url = endpoint.clone();
        url.query_pairs_mut()
            .append_pair("geometries", &geometries.to_string())
            .append_pair("inSR", &in_sr.to_string())
            .append_pair("outSR", &WGS84_WKID.to_string())
            .append_pair("f", "json");
        Ok(url)
    }

    async fn project(&self, transport: &dyn Transport, endpoint: &Url, extent: &Envelope) -> Result<Rect<f64>> {
        let url = Self::request_url(endpoint, extent)?;
        let response: ProjectResponse = request_json(transport, url).await?;
        let projected = response
            .geometries
            .first()
            .ok_or_else(|| SourceError::Projection("empty projection response".into()))?;
        if !projected.is_finite() {
            return Err(SourceError::Projection(format!("non-finite extent {projected:?}")));
        }
        tracing::debug!("Projected service extent to {projected:?}");
        Ok(projected.to_rect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::SpatialReference;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Fails every request to hosts in `down`, answers the rest with `body`
    struct FlakyTransport {
        down: Vec<&'static str>,
        body: &'static str,
        seen: Mutex<Vec<Url>>,
    }

    #[async_trait]
    impl Transport for FlakyTransport {
        async fn get(&self, url: Url) -> Result<Vec<u8>> {
            self.seen.lock().unwrap().push(url.clone());
            if self.down.iter().any(|h| url.host_str() == Some(*h)) {
                return Err(SourceError::Transport("connection refused".into()));
            }
            Ok(self.body.as_bytes().to_vec())
        }
    }

    fn mercator_extent() -> Envelope {
        Envelope {
            xmin: -8_240_000.0,
            ymin: 4_960_000.0,
            xmax: -8_230_000.0,
            ymax: 4_980_000.0,
            spatial_reference: SpatialReference {
                wkid: Some(102100),
                latest_wkid: Some(3857),
            },
        }
    }

    const PROJECTED: &str = r#"{"geometries":[{"xmin":-74.02,"ymin":40.7,"xmax":-73.93,"ymax":40.8}]}"#;

    #[test]
    fn test_default_endpoint() {
        assert_eq!(
            default_projection_endpoint("https://host/arcgis/rest/services/Parcels/FeatureServer/0"),
            "https://host/arcgis/rest/services/Geometry/GeometryServer/project"
        );
    }

    #[tokio::test]
    async fn test_wgs84_used_directly() {
        let transport = FlakyTransport {
            down: vec![],
            body: "{}",
            seen: Mutex::new(vec![]),
        };
        let normalizer = ExtentNormalizer::new(Url::parse("https://host/project").unwrap()).unwrap();
        let extent = Envelope {
            spatial_reference: SpatialReference::wgs84(),
            ..mercator_extent()
        };
        let rect = normalizer.normalize(&transport, &extent).await.unwrap();
        assert_eq!(rect, extent.to_rect());
        assert!(transport.seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_primary_projection() {
        let transport = FlakyTransport {
            down: vec![],
            body: PROJECTED,
            seen: Mutex::new(vec![]),
        };
        let normalizer = ExtentNormalizer::new(Url::parse("https://host/project").unwrap()).unwrap();
        let rect = normalizer.normalize(&transport, &mercator_extent()).await.unwrap();
        assert_eq!(rect.min().x, -74.02);
        assert_eq!(rect.max().y, 40.8);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        let q: std::collections::HashMap<_, _> = seen[0].query_pairs().into_owned().collect();
        assert_eq!(q["inSR"], "102100");
        assert_eq!(q["outSR"], "4326");
        assert_eq!(q["f"], "json");
        let geometries: serde_json::Value = serde_json::from_str(&q["geometries"]).unwrap();
        assert_eq!(geometries["geometryType"], "esriGeometryEnvelope");
        assert_eq!(geometries["geometries"][0]["xmin"], -8_240_000.0);
    }

    #[tokio::test]
    async fn test_fallback_after_network_error() {
        let transport = FlakyTransport {
            down: vec!["host"],
            body: PROJECTED,
            seen: Mutex::new(vec![]),
        };
        let normalizer = ExtentNormalizer::new(Url::parse("https://host/project").unwrap()).unwrap();
        let rect = normalizer.normalize(&transport, &mercator_extent()).await.unwrap();
        assert_eq!(rect.max().x, -73.93);

        let seen = transport.seen.lock().unwrap();
        assert_eq!(seen.len(), 2);
        assert_eq!(seen[1].host_str(), Some("tasks.arcgisonline.com"));
    }

    #[tokio::test]
    async fn test_both_endpoints_fail() {
        let transport = FlakyTransport {
            down: vec!["host", "backup"],
            body: PROJECTED,
            seen: Mutex::new(vec![]),
        };
        let normalizer = ExtentNormalizer::new(Url::parse("https://host/project").unwrap())
            .unwrap()
            .with_fallback(Url::parse("https://backup/project").unwrap());
        let err = normalizer.normalize(&transport, &mercator_extent()).await.unwrap_err();
        assert!(matches!(err, SourceError::Projection(_)));
        assert_eq!(transport.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_error_payload_triggers_fallback() {
        struct ErrorThenOk;
        #[async_trait]
        impl Transport for ErrorThenOk {
            async fn get(&self, url: Url) -> Result<Vec<u8>> {
                let body = if url.host_str() == Some("host") {
                    r#"{"error":{"code":404,"message":"Not Found"}}"#
                } else {
                    PROJECTED
                };
                Ok(body.as_bytes().to_vec())
            }
        }
        let normalizer = ExtentNormalizer::new(Url::parse("https://host/project").unwrap()).unwrap();
        assert!(normalizer.normalize(&ErrorThenOk, &mercator_extent()).await.is_ok());
    }
}
