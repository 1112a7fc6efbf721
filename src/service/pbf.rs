//! Decoder for `f=pbf` query responses (`FeatureCollectionPBuffer`).
//!
//! Only the members needed to rebuild GeoJSON are declared; everything else
//! on the wire is skipped by prost. Oneof members are declared as optional
//! fields, which is wire compatible.

use super::{QueryFormat, TileDecoder};
use crate::data::{Feature, FeatureCollection, FeatureId};
use crate::{Result, SourceError};
use prost::Message;
use serde_json::{Map, Value as Json, json};

#[derive(Clone, PartialEq, Message)]
struct FeatureCollectionPBuffer {
    #[prost(string, tag = "1")]
    version: String,
    #[prost(message, optional, tag = "2")]
    query_result: Option<QueryResult>,
}

#[derive(Clone, PartialEq, Message)]
struct QueryResult {
    #[prost(message, optional, tag = "1")]
    feature_result: Option<FeatureResult>,
}

#[derive(Clone, PartialEq, Message)]
struct FeatureResult {
    #[prost(string, tag = "1")]
    object_id_field_name: String,
    #[prost(enumeration = "GeometryType", tag = "7")]
    geometry_type: i32,
    #[prost(bool, tag = "9")]
    exceeded_transfer_limit: bool,
    #[prost(bool, tag = "10")]
    has_z: bool,
    #[prost(bool, tag = "11")]
    has_m: bool,
    #[prost(message, optional, tag = "12")]
    transform: Option<Transform>,
    #[prost(message, repeated, tag = "13")]
    fields: Vec<Field>,
    #[prost(message, repeated, tag = "15")]
    features: Vec<PbfFeature>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum GeometryType {
    Point = 0,
    Multipoint = 1,
    Polyline = 2,
    Polygon = 3,
    Multipatch = 4,
    NoGeometry = 127,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
enum QuantizeOriginPosition {
    UpperLeft = 0,
    LowerLeft = 1,
}

#[derive(Clone, PartialEq, Message)]
struct Transform {
    #[prost(enumeration = "QuantizeOriginPosition", tag = "1")]
    quantize_origin_position: i32,
    #[prost(message, optional, tag = "2")]
    scale: Option<Scale>,
    #[prost(message, optional, tag = "3")]
    translate: Option<Translate>,
}

#[derive(Clone, PartialEq, Message)]
struct Scale {
    #[prost(double, tag = "1")]
    x_scale: f64,
    #[prost(double, tag = "2")]
    y_scale: f64,
}

#[derive(Clone, PartialEq, Message)]
struct Translate {
    #[prost(double, tag = "1")]
    x_translate: f64,
    #[prost(double, tag = "2")]
    y_translate: f64,
}

#[derive(Clone, PartialEq, Message)]
struct Field {
    #[prost(string, tag = "1")]
    name: String,
}

#[derive(Clone, PartialEq, Message)]
struct Value {
    #[prost(string, optional, tag = "1")]
    string_value: Option<String>,
    #[prost(float, optional, tag = "2")]
    float_value: Option<f32>,
    #[prost(double, optional, tag = "3")]
    double_value: Option<f64>,
    #[prost(sint32, optional, tag = "4")]
    sint_value: Option<i32>,
    #[prost(uint32, optional, tag = "5")]
    uint_value: Option<u32>,
    #[prost(int64, optional, tag = "6")]
    int64_value: Option<i64>,
    #[prost(uint64, optional, tag = "7")]
    uint64_value: Option<u64>,
    #[prost(sint64, optional, tag = "8")]
    sint64_value: Option<i64>,
    #[prost(bool, optional, tag = "9")]
    bool_value: Option<bool>,
}

#[derive(Clone, PartialEq, Message)]
struct PbfFeature {
    #[prost(message, repeated, tag = "1")]
    attributes: Vec<Value>,
    #[prost(message, optional, tag = "2")]
    geometry: Option<Geometry>,
}

#[derive(Clone, PartialEq, Message)]
struct Geometry {
    #[prost(uint32, repeated, tag = "2")]
    lengths: Vec<u32>,
    #[prost(sint64, repeated, tag = "3")]
    coords: Vec<i64>,
}

impl Value {
    fn to_json(&self) -> Json {
        if let Some(s) = &self.string_value {
            json!(s)
        } else if let Some(v) = self.float_value {
            json!(v)
        } else if let Some(v) = self.double_value {
            json!(v)
        } else if let Some(v) = self.sint_value {
            json!(v)
        } else if let Some(v) = self.uint_value {
            json!(v)
        } else if let Some(v) = self.int64_value {
            json!(v)
        } else if let Some(v) = self.uint64_value {
            json!(v)
        } else if let Some(v) = self.sint64_value {
            json!(v)
        } else if let Some(v) = self.bool_value {
            json!(v)
        } else {
            Json::Null
        }
    }
}

/// Maps quantized integer coordinates back to map units
struct Quantization {
    scale: [f64; 2],
    translate: [f64; 2],
    upper_left: bool,
}

impl Quantization {
    fn new(transform: Option<&Transform>) -> Self {
        let Some(t) = transform else {
            return Self {
                scale: [1.0, 1.0],
                translate: [0.0, 0.0],
                upper_left: false,
            };
        };
        let scale = t.scale.as_ref().map_or([1.0, 1.0], |s| [s.x_scale, s.y_scale]);
        let translate = t
            .translate
            .as_ref()
            .map_or([0.0, 0.0], |t| [t.x_translate, t.y_translate]);
        Self {
            scale,
            translate,
            upper_left: t.quantize_origin_position == QuantizeOriginPosition::UpperLeft as i32,
        }
    }

    fn apply(&self, x: i64, y: i64) -> [f64; 2] {
        let x = x as f64 * self.scale[0] + self.translate[0];
        let y = if self.upper_left {
            self.translate[1] - y as f64 * self.scale[1]
        } else {
            y as f64 * self.scale[1] + self.translate[1]
        };
        [x, y]
    }
}

type Ring = Vec<[f64; 2]>;

/// Undo delta encoding; deltas run on across all parts of a feature
fn decode_points(coords: &[i64], stride: usize, quantization: &Quantization) -> Vec<[f64; 2]> {
    let (mut x, mut y) = (0i64, 0i64);
    coords
        .chunks_exact(stride)
        .map(|c| {
            x += c[0];
            y += c[1];
            quantization.apply(x, y)
        })
        .collect()
}

fn split_parts(points: Vec<[f64; 2]>, lengths: &[u32]) -> Vec<Ring> {
    if lengths.is_empty() {
        return vec![points];
    }
    let mut points = points.into_iter();
    lengths
        .iter()
        .map(|&n| points.by_ref().take(n as usize).collect())
        .collect()
}

/// Shoelace sum; negative for clockwise rings
fn signed_area(ring: &[[f64; 2]]) -> f64 {
    ring.windows(2)
        .map(|w| w[0][0] * w[1][1] - w[1][0] * w[0][1])
        .sum::<f64>()
        / 2.0
}

/// Clockwise rings start a new polygon; counter-clockwise rings are holes of
/// the polygon before them
fn group_rings(rings: Vec<Ring>) -> Vec<Vec<Ring>> {
    let mut polygons: Vec<Vec<Ring>> = Vec::new();
    for ring in rings {
        match polygons.last_mut() {
            Some(polygon) if signed_area(&ring) > 0.0 => polygon.push(ring),
            _ => polygons.push(vec![ring]),
        }
    }
    polygons
}

fn to_geojson_geometry(kind: GeometryType, geometry: &Geometry, stride: usize, q: &Quantization) -> Option<Json> {
    let points = decode_points(&geometry.coords, stride, q);
    if points.is_empty() {
        return None;
    }
    match kind {
        GeometryType::Point => Some(json!({"type": "Point", "coordinates": points[0]})),
        GeometryType::Multipoint => Some(json!({"type": "MultiPoint", "coordinates": points})),
        GeometryType::Polyline => {
            let mut parts = split_parts(points, &geometry.lengths);
            if parts.len() == 1 {
                Some(json!({"type": "LineString", "coordinates": parts.remove(0)}))
            } else {
                Some(json!({"type": "MultiLineString", "coordinates": parts}))
            }
        }
        GeometryType::Polygon => {
            let mut polygons = group_rings(split_parts(points, &geometry.lengths));
            if polygons.len() == 1 {
                Some(json!({"type": "Polygon", "coordinates": polygons.remove(0)}))
            } else {
                Some(json!({"type": "MultiPolygon", "coordinates": polygons}))
            }
        }
        GeometryType::Multipatch | GeometryType::NoGeometry => None,
    }
}

fn to_feature_collection(result: FeatureResult) -> Result<FeatureCollection> {
    let kind = GeometryType::try_from(result.geometry_type)
        .map_err(|_| SourceError::Decode(format!("unknown geometry type {}", result.geometry_type)))?;
    let quantization = Quantization::new(result.transform.as_ref());
    let stride = 2 + usize::from(result.has_z) + usize::from(result.has_m);
    let id_index = result
        .fields
        .iter()
        .position(|f| f.name == result.object_id_field_name);

    if result.exceeded_transfer_limit {
        tracing::debug!("Tile exceeded the server transfer limit; features are truncated");
    }

    let features = result
        .features
        .iter()
        .map(|f| {
            let properties: Map<String, Json> = result
                .fields
                .iter()
                .zip(&f.attributes)
                .map(|(field, value)| (field.name.clone(), value.to_json()))
                .collect();
            let id = id_index
                .and_then(|i| f.attributes.get(i))
                .and_then(|v| FeatureId::from_value(&v.to_json()));
            let geometry = f
                .geometry
                .as_ref()
                .and_then(|g| to_geojson_geometry(kind, g, stride, &quantization));
            Feature {
                id,
                geometry,
                properties: Some(properties),
            }
        })
        .collect::<Vec<_>>();

    Ok(features.into())
}

/// Decoder for `f=pbf` responses
#[derive(Clone, Copy, Debug, Default)]
pub struct PbfDecoder;

impl TileDecoder for PbfDecoder {
    fn format(&self) -> QueryFormat {
        QueryFormat::Pbf
    }

    fn decode(&self, body: &[u8]) -> Result<FeatureCollection> {
        profiling::scope!("pbf::decode");
        let message = FeatureCollectionPBuffer::decode(body)?;
        let result = message
            .query_result
            .and_then(|q| q.feature_result)
            .ok_or_else(|| SourceError::Decode("response holds no feature result".into()))?;
        to_feature_collection(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str) -> Field {
        Field { name: name.into() }
    }

    fn encode(result: FeatureResult) -> Vec<u8> {
        FeatureCollectionPBuffer {
            version: "1.0".into(),
            query_result: Some(QueryResult {
                feature_result: Some(result),
            }),
        }
        .encode_to_vec()
    }

    #[test]
    fn test_point_with_upper_left_transform() {
        let body = encode(FeatureResult {
            object_id_field_name: "OBJECTID".into(),
            geometry_type: GeometryType::Point as i32,
            transform: Some(Transform {
                quantize_origin_position: QuantizeOriginPosition::UpperLeft as i32,
                scale: Some(Scale {
                    x_scale: 0.5,
                    y_scale: 0.5,
                }),
                translate: Some(Translate {
                    x_translate: 10.0,
                    y_translate: 50.0,
                }),
            }),
            fields: vec![field("OBJECTID"), field("NAME")],
            features: vec![PbfFeature {
                attributes: vec![
                    Value {
                        uint64_value: Some(7),
                        ..Default::default()
                    },
                    Value {
                        string_value: Some("Main St".into()),
                        ..Default::default()
                    },
                ],
                geometry: Some(Geometry {
                    lengths: vec![],
                    coords: vec![4, 6],
                }),
            }],
            ..Default::default()
        });

        let fc = PbfDecoder.decode(&body).unwrap();
        assert_eq!(fc.len(), 1);
        let feature = &fc.features[0];
        assert_eq!(feature.id, Some(FeatureId::Number(7)));
        let props = feature.properties.as_ref().unwrap();
        assert_eq!(props["NAME"], "Main St");
        assert_eq!(props["OBJECTID"], 7);
        assert_eq!(
            feature.geometry,
            Some(json!({"type": "Point", "coordinates": [12.0, 47.0]}))
        );
    }

    #[test]
    fn test_polygon_with_hole() {
        // Outer ring clockwise, hole counter-clockwise; deltas continue from
        // the last vertex of the outer ring into the hole
        let coords = vec![
            0, 0, 0, 10, 10, 0, 0, -10, -10, 0, //
            2, 2, 2, 0, 0, 2, -2, 0, 0, -2,
        ];
        let body = encode(FeatureResult {
            geometry_type: GeometryType::Polygon as i32,
            transform: Some(Transform {
                quantize_origin_position: QuantizeOriginPosition::LowerLeft as i32,
                scale: None,
                translate: None,
            }),
            features: vec![PbfFeature {
                attributes: vec![],
                geometry: Some(Geometry {
                    lengths: vec![5, 5],
                    coords,
                }),
            }],
            ..Default::default()
        });

        let fc = PbfDecoder.decode(&body).unwrap();
        let geometry = fc.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry["type"], "Polygon");
        let rings = geometry["coordinates"].as_array().unwrap();
        assert_eq!(rings.len(), 2);
        assert_eq!(rings[0][1], json!([0.0, 10.0]));
        assert_eq!(rings[1][0], json!([2.0, 2.0]));
        assert_eq!(rings[1][2], json!([4.0, 4.0]));
        assert_eq!(fc.features[0].id, None);
    }

    #[test]
    fn test_two_outer_rings_make_multipolygon() {
        let square = |x0: f64| -> Ring { vec![[x0, 0.0], [x0, 1.0], [x0 + 1.0, 1.0], [x0 + 1.0, 0.0], [x0, 0.0]] };
        let polygons = group_rings(vec![square(0.0), square(5.0)]);
        assert_eq!(polygons.len(), 2);
        assert!(signed_area(&square(0.0)) < 0.0);
    }

    #[test]
    fn test_polyline_parts() {
        let body = encode(FeatureResult {
            geometry_type: GeometryType::Polyline as i32,
            has_z: true,
            features: vec![PbfFeature {
                attributes: vec![],
                geometry: Some(Geometry {
                    lengths: vec![2, 1],
                    // x, y, z triples
                    coords: vec![1, 1, 9, 1, 0, 9, 1, 1, 9],
                }),
            }],
            ..Default::default()
        });
        let fc = PbfDecoder.decode(&body).unwrap();
        assert_eq!(
            fc.features[0].geometry,
            Some(json!({
                "type": "MultiLineString",
                "coordinates": [[[1.0, 1.0], [2.0, 1.0]], [[3.0, 2.0]]]
            }))
        );
    }

    #[test]
    fn test_missing_feature_result() {
        let body = FeatureCollectionPBuffer {
            version: "1.0".into(),
            query_result: None,
        }
        .encode_to_vec();
        assert!(matches!(PbfDecoder.decode(&body), Err(SourceError::Decode(_))));
    }

    #[test]
    fn test_garbage_input() {
        assert!(PbfDecoder.decode(&[0xff, 0xff, 0xff]).is_err());
    }
}
