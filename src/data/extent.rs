//! Extents as reported by the feature service, and the overlap test used to
//! decide whether a viewport or tile touches them

use geo::{Coord, Intersects, Rect};
use serde::{Deserialize, Serialize};

/// Well-known id of WGS84 longitude/latitude
pub const WGS84_WKID: u32 = 4326;

/// Spatial reference attached to service geometry
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpatialReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wkid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_wkid: Option<u32>,
}

impl SpatialReference {
    /// WGS84 reference, with both ids set
    pub fn wgs84() -> Self {
        Self {
            wkid: Some(WGS84_WKID),
            latest_wkid: Some(WGS84_WKID),
        }
    }

    /// Id to send as `inSR`; the legacy `wkid` wins over `latestWkid`
    pub fn id(&self) -> Option<u32> {
        self.wkid.or(self.latest_wkid)
    }

    /// Whether coordinates in this reference are already longitude/latitude
    pub fn is_wgs84(&self) -> bool {
        self.wkid == Some(WGS84_WKID) || self.latest_wkid == Some(WGS84_WKID)
    }
}

/// Envelope geometry in the service's JSON representation
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub xmin: f64,
    pub ymin: f64,
    pub xmax: f64,
    pub ymax: f64,
    #[serde(default)]
    pub spatial_reference: SpatialReference,
}

impl Envelope {
    /// Envelope in WGS84 from a longitude/latitude box
    pub fn from_rect(rect: Rect<f64>) -> Self {
        Self {
            xmin: rect.min().x,
            ymin: rect.min().y,
            xmax: rect.max().x,
            ymax: rect.max().y,
            spatial_reference: SpatialReference::wgs84(),
        }
    }

    /// Corners as a rectangle, ignoring the spatial reference
    pub fn to_rect(&self) -> Rect<f64> {
        Rect::new(
            Coord {
                x: self.xmin,
                y: self.ymin,
            },
            Coord {
                x: self.xmax,
                y: self.ymax,
            },
        )
    }

    /// Whether all four corner values are finite numbers
    pub fn is_finite(&self) -> bool {
        [self.xmin, self.ymin, self.xmax, self.ymax]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Inclusive axis-aligned overlap test; touching edges count as overlapping
#[inline]
pub fn overlaps(a: &Rect<f64>, b: &Rect<f64>) -> bool {
    a.intersects(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect(w: f64, s: f64, e: f64, n: f64) -> Rect<f64> {
        Rect::new(Coord { x: w, y: s }, Coord { x: e, y: n })
    }

    #[test]
    fn test_overlap_inside_and_outside() {
        let extent = rect(-10.0, -10.0, 10.0, 10.0);
        assert!(overlaps(&extent, &rect(-1.0, -1.0, 1.0, 1.0)));
        assert!(overlaps(&extent, &rect(5.0, 5.0, 20.0, 20.0)));
        assert!(!overlaps(&extent, &rect(11.0, -1.0, 12.0, 1.0)));
        assert!(!overlaps(&extent, &rect(-1.0, 11.0, 1.0, 12.0)));
        assert!(!overlaps(&extent, &rect(-20.0, -1.0, -11.0, 1.0)));
        assert!(!overlaps(&extent, &rect(-1.0, -20.0, 1.0, -11.0)));
    }

    #[test]
    fn test_overlap_edge_touching() {
        let a = rect(0.0, 0.0, 1.0, 1.0);
        assert!(overlaps(&a, &rect(1.0, 0.0, 2.0, 1.0)));
        assert!(overlaps(&a, &rect(0.0, 1.0, 1.0, 2.0)));
        assert!(overlaps(&a, &rect(1.0, 1.0, 2.0, 2.0)));
    }

    #[test]
    fn test_spatial_reference_wgs84() {
        let sr: SpatialReference = serde_json::from_str(r#"{"wkid":102100,"latestWkid":3857}"#).unwrap();
        assert!(!sr.is_wgs84());
        assert_eq!(sr.id(), Some(102100));

        let sr: SpatialReference = serde_json::from_str(r#"{"latestWkid":4326}"#).unwrap();
        assert!(sr.is_wgs84());
    }

    #[test]
    fn test_envelope_json() {
        let env: Envelope = serde_json::from_str(
            r#"{"xmin":-1.5,"ymin":2.0,"xmax":3.0,"ymax":4.0,"spatialReference":{"wkid":4326}}"#,
        )
        .unwrap();
        assert!(env.spatial_reference.is_wgs84());
        let r = env.to_rect();
        assert_eq!(r.min(), Coord { x: -1.5, y: 2.0 });
        assert_eq!(r.max(), Coord { x: 3.0, y: 4.0 });

        let out = serde_json::to_value(Envelope::from_rect(r)).unwrap();
        assert_eq!(out["spatialReference"]["latestWkid"], 4326);
        assert_eq!(out["xmin"], -1.5);
    }
}
