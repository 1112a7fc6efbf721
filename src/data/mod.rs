//! Tile and Feature Data Module
//!
//! Pure, synchronous core of the source: everything here can be exercised
//! without a network or a map.
//!
//! # Architecture
//!
//! - **[`Tile`]**: slippy-map tile addressing, subdivision and quadkeys
//! - **[`ZoomPolicy`]**: maps a live zoom onto a cache bucket
//! - **[`ViewportResolver`]**: turns a view into the tiles still to fetch
//! - **[`TileCache`]**: per-bucket requested tiles, feature ids and merged collections
//! - **[`Feature`]**/**[`FeatureCollection`]**: the GeoJSON model handed to the map
//!
//! # Usage Example
//!
//! ```rust
//! use feature_tile_source::data::{
//!     ResolverConfig, Resolution, TileCache, ViewState, ViewportResolver, ZoomPolicy,
//! };
//! use geo::{Coord, Rect};
//!
//! let resolver = ViewportResolver::new(ResolverConfig {
//!     min_zoom: 2.0,
//!     policy: ZoomPolicy::default(),
//!     simplify_factor: 0.3,
//! });
//! let mut cache = TileCache::new();
//! let view = ViewState {
//!     bounds: Rect::new(Coord { x: -74.0, y: 40.7 }, Coord { x: -73.99, y: 40.71 }),
//!     zoom: 13.0,
//!     canvas_width: 800,
//! };
//!
//! let Resolution::Fetch(plan) = resolver.resolve(&view, None, &mut cache) else {
//!     unreachable!()
//! };
//! assert_eq!(plan.bucket, 12);
//! // A second pass over the same view has nothing left to fetch
//! assert_eq!(
//!     resolver.resolve(&view, None, &mut cache),
//!     Resolution::UpToDate { bucket: 12 }
//! );
//! ```

mod bucket;
mod cache;
pub mod extent;
mod feature;
mod resolver;
pub mod tile;

// Public API exports
pub use bucket::ZoomPolicy;
pub use cache::{BucketState, CacheStats, MergeStats, TileCache, TileOutcome};
pub use extent::{Envelope, SpatialReference, WGS84_WKID};
pub use feature::{Feature, FeatureCollection, FeatureId};
pub use resolver::{Resolution, ResolverConfig, TilePlan, ViewState, ViewportResolver};
pub use tile::Tile;
