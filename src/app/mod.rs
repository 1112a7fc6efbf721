//! Command line driver: runs the source against a headless map

pub(crate) mod settings;

use crate::entrypoints::cli::get_env;
use feature_tile_source::data::{FeatureCollection, ViewState};
use feature_tile_source::service::{HttpTransport, QueryFormat};
use feature_tile_source::source::MemoryMap;
use feature_tile_source::{FeatureSource, SourceError, SourceOptions};
use settings::{Command, Settings};
use std::path::Path;
use std::sync::Arc;

/// Id of the map source the driver feeds
const SOURCE_ID: &str = "features";

/// Environment variable holding the default layer URL
const URL_ENV: &str = "FEATURE_SOURCE_URL";

/// Error types for the command line driver
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error(transparent)]
    Source(#[from] SourceError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Source options from the options file, then the command line and environment
fn load_options(settings: &Settings) -> Result<SourceOptions, AppError> {
    let mut options = match &settings.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => SourceOptions::default(),
    };
    if let Some(url) = settings.url.clone().or_else(|| get_env(URL_ENV)) {
        options.url = url;
    }
    if let Some(where_clause) = &settings.where_clause {
        options.where_clause = where_clause.clone();
    }
    if settings.geojson {
        options.format = QueryFormat::GeoJson;
    }
    Ok(options)
}

fn write_collection(fc: &FeatureCollection, output: Option<&Path>) -> Result<(), AppError> {
    let json = serde_json::to_string_pretty(fc)?;
    match output {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!("Wrote {} features to {}", fc.len(), path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

pub async fn run(settings: Settings) -> Result<(), AppError> {
    let options = load_options(&settings)?;
    let transport = Arc::new(HttpTransport::new()?);

    match settings.command {
        Command::Tiles {
            bbox,
            zoom,
            canvas_width,
            output,
        } => {
            let map = Arc::new(MemoryMap::new(ViewState {
                bounds: bbox,
                zoom,
                canvas_width,
            }));
            let source = FeatureSource::new(SOURCE_ID, map.clone(), transport, options)?;
            match source.initialize().await {
                // Tiles were still loaded, just without the extent check
                Err(SourceError::Projection(e)) => tracing::warn!("Service extent unknown: {e}"),
                other => other?,
            }
            source.disable_requests();

            let stats = source.cache_stats().await;
            tracing::info!(
                "{} tiles requested over {} buckets, {} features",
                stats.requested_tiles,
                stats.bucket_count,
                stats.features
            );
            for credit in map.custom_attribution() {
                tracing::info!("Credit: {credit}");
            }
            if let Some(text) = map.source(SOURCE_ID).and_then(|s| s.attribution) {
                tracing::info!("Data: {text}");
            }

            let fc = map.source(SOURCE_ID).map(|s| s.data).unwrap_or_default();
            write_collection(&fc, output.as_deref())
        }
        Command::Point {
            lon,
            lat,
            radius,
            geometry,
        } => {
            let map = Arc::new(MemoryMap::new(point_view(lon, lat)));
            let source = FeatureSource::new(SOURCE_ID, map, transport, options)?;
            let fc = source.features_at(lon, lat, radius, geometry).await?;
            write_collection(&fc, None)
        }
        Command::Ids { ids, geometry } => {
            let map = Arc::new(MemoryMap::new(point_view(0.0, 0.0)));
            let source = FeatureSource::new(SOURCE_ID, map, transport, options)?;
            let fc = source.features_by_ids(&ids, geometry).await?;
            write_collection(&fc, None)
        }
    }
}

/// Degenerate view for the queries that bypass tiling
fn point_view(lon: f64, lat: f64) -> ViewState {
    let at = geo::Coord { x: lon, y: lat };
    ViewState {
        bounds: geo::Rect::new(at, at),
        zoom: 0.0,
        canvas_width: 1,
    }
}
