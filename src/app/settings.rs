use clap::{Parser, Subcommand};
use feature_tile_source::data::FeatureId;
use geo::{Coord, Rect};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[clap(author, version, about, long_about = None)]
/// Feature Tile Source - Load a remote feature layer tile by tile, the way a map view would
pub struct Settings {
    /// Feature layer URL; falls back to the FEATURE_SOURCE_URL environment variable
    #[clap(long, global = true)]
    pub url: Option<String>,

    /// JSON file with source options (camelCase keys, as in the library)
    #[clap(long, global = true)]
    pub config: Option<PathBuf>,

    /// Attribute filter sent with every query
    #[clap(long = "where", global = true)]
    pub where_clause: Option<String>,

    /// Prefer GeoJSON tiles over PBF
    #[clap(long, global = true)]
    pub geojson: bool,

    #[clap(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Load every tile covering a view and print the merged feature collection
    Tiles {
        /// View bounds as W,S,E,N in degrees
        #[clap(long, value_parser = parse_bbox, allow_hyphen_values = true)]
        bbox: Rect<f64>,

        /// Map zoom of the view
        #[clap(long)]
        zoom: f64,

        /// Width of the view in pixels
        #[clap(long, default_value_t = 1024)]
        canvas_width: u32,

        /// Write the collection here instead of stdout
        #[clap(long)]
        output: Option<PathBuf>,
    },
    /// Query features around a point
    Point {
        #[clap(long, allow_negative_numbers = true)]
        lon: f64,

        #[clap(long, allow_negative_numbers = true)]
        lat: f64,

        /// Search radius in meters
        #[clap(long)]
        radius: Option<f64>,

        /// Include geometries in the response
        #[clap(long)]
        geometry: bool,
    },
    /// Query features by identifier
    Ids {
        /// Comma separated identifiers
        #[clap(long, value_delimiter = ',', required = true, value_parser = parse_feature_id)]
        ids: Vec<FeatureId>,

        /// Include geometries in the response
        #[clap(long)]
        geometry: bool,
    },
}

fn parse_bbox(s: &str) -> Result<Rect<f64>, String> {
    let values = s
        .split(',')
        .map(|v| v.trim().parse::<f64>().map_err(|e| format!("{v:?}: {e}")))
        .collect::<Result<Vec<_>, _>>()?;
    let [w, south, e, n] = values[..] else {
        return Err(format!("expected 4 comma separated numbers, got {}", values.len()));
    };
    if w > e || south > n {
        return Err("expected W,S,E,N with W <= E and S <= N".into());
    }
    Ok(Rect::new(Coord { x: w, y: south }, Coord { x: e, y: n }))
}

fn parse_feature_id(s: &str) -> Result<FeatureId, String> {
    let s = s.trim();
    if s.is_empty() {
        return Err("empty identifier".into());
    }
    Ok(s.parse::<i64>().map(FeatureId::Number).unwrap_or_else(|_| FeatureId::from(s)))
}
