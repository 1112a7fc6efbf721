//! Per-bucket tile bookkeeping and feature deduplication
//!
//! Every zoom bucket owns three pieces of state, created lazily on first use:
//! the set of tile keys already requested, the set of feature identifiers
//! already merged, and the merged feature collection itself. Within a bucket
//! all three only ever grow; [`TileCache::clear`] is the only way to shrink them.

use crate::SourceError;
use crate::data::feature::{FeatureCollection, FeatureId};
use crate::data::tile::Tile;
use std::collections::{HashMap, HashSet};

/// What a single tile request contributed to a resolution pass
#[derive(Debug)]
pub enum TileOutcome {
    /// The tile decoded into a (possibly empty) collection
    Features(FeatureCollection),
    /// The server answered without a usable collection
    Empty,
    /// Transport or decoding failed; merged as if empty
    Failed(SourceError),
}

/// Cached state of one zoom bucket
#[derive(Debug, Default)]
pub struct BucketState {
    requested: HashSet<String>,
    feature_ids: HashSet<FeatureId>,
    collection: FeatureCollection,
}

impl BucketState {
    /// Whether the tile was already requested in this bucket
    pub fn is_requested(&self, tile: &Tile) -> bool {
        self.requested.contains(&tile.quadkey())
    }

    pub fn requested_count(&self) -> usize {
        self.requested.len()
    }

    /// Whether a feature with this identifier was already merged
    pub fn contains_feature(&self, id: &FeatureId) -> bool {
        self.feature_ids.contains(id)
    }

    /// Merged collection for the bucket
    pub fn collection(&self) -> &FeatureCollection {
        &self.collection
    }
}

/// Counters from one merge
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MergeStats {
    /// Features appended to the bucket
    pub added: usize,
    /// Features dropped because their identifier was already present
    pub duplicates: usize,
    /// Tiles that failed and contributed nothing
    pub failed_tiles: usize,
}

/// Cache statistics for logging and the command line driver
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub bucket_count: usize,
    pub requested_tiles: usize,
    pub features: usize,
}

/// Tile and feature cache keyed by zoom bucket
#[derive(Debug, Default)]
pub struct TileCache {
    buckets: HashMap<u8, BucketState>,
    /// Property holding the feature identifier, when features lack a GeoJSON `id`
    id_field: Option<String>,
}

impl TileCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the property used to identify features without a GeoJSON `id`
    pub fn set_id_field(&mut self, id_field: Option<String>) {
        self.id_field = id_field;
    }

    /// State of a bucket, if it was ever touched
    pub fn bucket(&self, bucket: u8) -> Option<&BucketState> {
        self.buckets.get(&bucket)
    }

    /// State of a bucket, created empty on first access
    fn bucket_mut(&mut self, bucket: u8) -> &mut BucketState {
        self.buckets.entry(bucket).or_default()
    }

    /// Filter `candidates` down to tiles never requested in `bucket`, and
    /// record them as requested.
    ///
    /// Tiles are recorded before any request is made, so a later pass that
    /// overlaps an in-flight one never asks for the same tile again.
    pub fn claim_tiles(&mut self, bucket: u8, candidates: Vec<Tile>) -> Vec<Tile> {
        let state = self.bucket_mut(bucket);
        candidates
            .into_iter()
            .filter(|tile| state.requested.insert(tile.quadkey()))
            .collect()
    }

    /// Merge tile outcomes into a bucket, keeping one feature per identifier.
    ///
    /// Features are appended in outcome order, then in-tile order.
    pub fn merge<I>(&mut self, bucket: u8, outcomes: I) -> MergeStats
    where
        I: IntoIterator<Item = TileOutcome>,
    {
        profiling::scope!("cache::merge");

        let id_field = self.id_field.clone();
        let state = self.bucket_mut(bucket);
        let mut stats = MergeStats::default();

        for outcome in outcomes {
            let tile_fc = match outcome {
                TileOutcome::Features(fc) => fc,
                TileOutcome::Empty => continue,
                TileOutcome::Failed(e) => {
                    tracing::warn!("Tile failed in bucket {bucket}, merging as empty: {e}");
                    stats.failed_tiles += 1;
                    continue;
                }
            };
            for feature in tile_fc.features {
                match feature.identifier(id_field.as_deref()) {
                    Some(id) => {
                        if state.feature_ids.insert(id) {
                            state.collection.features.push(feature);
                            stats.added += 1;
                        } else {
                            stats.duplicates += 1;
                        }
                    }
                    None => {
                        tracing::trace!("Feature without identifier in bucket {bucket}");
                        state.collection.features.push(feature);
                        stats.added += 1;
                    }
                }
            }
        }

        tracing::debug!(
            "Bucket {bucket}: +{} features, {} duplicates, {} failed tiles (total {})",
            stats.added,
            stats.duplicates,
            stats.failed_tiles,
            state.collection.len()
        );
        stats
    }

    /// Copy of the merged collection for a bucket (empty if never touched)
    pub fn collection(&self, bucket: u8) -> FeatureCollection {
        self.buckets
            .get(&bucket)
            .map(|state| state.collection().clone())
            .unwrap_or_default()
    }

    /// Drop every bucket: requested tiles, feature ids and collections
    pub fn clear(&mut self) {
        self.buckets.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            bucket_count: self.buckets.len(),
            requested_tiles: self.buckets.values().map(BucketState::requested_count).sum(),
            features: self.buckets.values().map(|b| b.collection().len()).sum(),
        }
    }
}
