//! Tile fetching: one query per tile, never failing the batch

use super::{QueryParams, TileDecoder, Transport, tile_query_url};
use crate::Result;
use crate::data::{FeatureCollection, Tile, TileOutcome};
use futures::future::join_all;
use std::sync::Arc;
use url::Url;

/// Requests and decodes tiles for one resolution pass
#[derive(Clone)]
pub struct TileFetcher {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn TileDecoder>,
    service: Url,
}

impl TileFetcher {
    pub fn new(transport: Arc<dyn Transport>, decoder: Arc<dyn TileDecoder>, service: Url) -> Self {
        Self {
            transport,
            decoder,
            service,
        }
    }

    async fn try_fetch(&self, tile: &Tile, tolerance: f64, params: &QueryParams) -> Result<FeatureCollection> {
        let url = tile_query_url(&self.service, tile, tolerance, params)?;
        let body = self.transport.get(url).await?;
        self.decoder.decode(&body)
    }

    /// Fetch a single tile; failures become [`TileOutcome::Failed`]
    pub async fn fetch(&self, tile: &Tile, tolerance: f64, params: &QueryParams) -> TileOutcome {
        match self.try_fetch(tile, tolerance, params).await {
            Ok(fc) if fc.is_empty() => TileOutcome::Empty,
            Ok(fc) => {
                tracing::trace!("Tile {tile}: {} features", fc.len());
                TileOutcome::Features(fc)
            }
            Err(e) => {
                tracing::warn!("Tile {tile} failed: {e}");
                TileOutcome::Failed(e)
            }
        }
    }

    /// Fetch all tiles concurrently; outcomes keep the order of `tiles`
    pub async fn fetch_all(&self, tiles: &[Tile], tolerance: f64, params: &QueryParams) -> Vec<TileOutcome> {
        join_all(tiles.iter().map(|tile| self.fetch(tile, tolerance, params))).await
    }
}
