//! Viewport resolution: from the live map view to the tiles still to fetch

use crate::data::bucket::ZoomPolicy;
use crate::data::cache::TileCache;
use crate::data::extent::overlaps;
use crate::data::tile::Tile;
use geo::Rect;

/// Snapshot of the map view that drives a resolution pass
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewState {
    /// Visible bounds in longitude/latitude degrees
    pub bounds: Rect<f64>,
    /// Live (fractional) zoom
    pub zoom: f64,
    /// Width of the drawing surface in pixels
    pub canvas_width: u32,
}

/// Tunables for the resolver
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ResolverConfig {
    /// Views zoomed out further than this never query
    pub min_zoom: f64,
    /// How live zoom maps to a cache bucket
    pub policy: ZoomPolicy,
    /// Multiplier on the size of one pixel, sent as quantization tolerance
    pub simplify_factor: f64,
}

/// Tiles to fetch for one pass
#[derive(Clone, Debug, PartialEq)]
pub struct TilePlan {
    pub bucket: u8,
    pub tiles: Vec<Tile>,
    /// Quantization tolerance in map units
    pub tolerance: f64,
}

/// Result of resolving a view
#[derive(Clone, Debug, PartialEq)]
pub enum Resolution {
    /// Zoomed out beyond the minimum zoom; nothing to do
    BelowMinZoom,
    /// The view does not touch the service extent; nothing to do
    OutsideExtent,
    /// Every needed tile was already requested; republish the bucket as is
    UpToDate { bucket: u8 },
    /// New tiles must be fetched
    Fetch(TilePlan),
}

/// Maps a view onto the set of tiles not yet requested in its bucket
#[derive(Clone, Copy, Debug)]
pub struct ViewportResolver {
    config: ResolverConfig,
}

impl ViewportResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ResolverConfig {
        &self.config
    }

    /// Resolve a view against the cache.
    ///
    /// New tiles in the returned plan are already recorded as requested in
    /// `cache`. `extent` is the service's valid area; `None` disables the check.
    pub fn resolve(
        &self,
        view: &ViewState,
        extent: Option<&Rect<f64>>,
        cache: &mut TileCache,
    ) -> Resolution {
        profiling::scope!("resolver::resolve");

        if view.zoom < self.config.min_zoom {
            tracing::trace!("Zoom {} below minimum {}", view.zoom, self.config.min_zoom);
            return Resolution::BelowMinZoom;
        }

        let primary = Tile::covering(view.bounds);

        if let Some(extent) = extent {
            if !overlaps(extent, &view.bounds) {
                tracing::debug!("View {:?} outside service extent", view.bounds);
                return Resolution::OutsideExtent;
            }
        }

        let bucket = self.config.policy.bucket(view.zoom);
        let candidates = self.candidates(primary, bucket, &view.bounds);
        let tiles = cache.claim_tiles(bucket, candidates);

        if tiles.is_empty() {
            return Resolution::UpToDate { bucket };
        }

        let tolerance = self.tolerance(view);
        tracing::debug!(
            "Bucket {bucket}: {} new tiles around {primary}, tolerance {tolerance}",
            tiles.len()
        );
        Resolution::Fetch(TilePlan {
            bucket,
            tiles,
            tolerance,
        })
    }

    /// Candidate tiles covering `bounds` at the bucket zoom
    fn candidates(&self, primary: Tile, bucket: u8, bounds: &Rect<f64>) -> Vec<Tile> {
        if primary.z < bucket {
            primary.descendants_touching(bucket, bounds)
        } else {
            vec![primary]
        }
    }

    /// Width of one pixel in map units, scaled by the simplification factor
    fn tolerance(&self, view: &ViewState) -> f64 {
        let map_width = view.bounds.width().abs();
        map_width / f64::from(view.canvas_width.max(1)) * self.config.simplify_factor
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::Coord;

    fn rect(w: f64, s: f64, e: f64, n: f64) -> Rect<f64> {
        Rect::new(Coord { x: w, y: s }, Coord { x: e, y: n })
    }

    fn resolver(min_zoom: f64, policy: ZoomPolicy) -> ViewportResolver {
        ViewportResolver::new(ResolverConfig {
            min_zoom,
            policy,
            simplify_factor: 0.3,
        })
    }

    fn view(bounds: Rect<f64>, zoom: f64) -> ViewState {
        ViewState {
            bounds,
            zoom,
            canvas_width: 1000,
        }
    }

    #[test]
    fn test_below_min_zoom() {
        let r = resolver(2.0, ZoomPolicy::default());
        let mut cache = TileCache::new();
        let res = r.resolve(&view(rect(-10.0, -10.0, 10.0, 10.0), 1.5), None, &mut cache);
        assert_eq!(res, Resolution::BelowMinZoom);
        assert!(cache.is_empty());
    }

    #[test]
    fn test_outside_extent_requests_nothing() {
        let r = resolver(2.0, ZoomPolicy::default());
        let mut cache = TileCache::new();
        let extent = rect(100.0, 10.0, 110.0, 20.0);
        let res = r.resolve(&view(rect(-10.0, 40.0, -9.0, 41.0), 8.0), Some(&extent), &mut cache);
        assert_eq!(res, Resolution::OutsideExtent);
        assert_eq!(cache.stats().requested_tiles, 0);
    }

    #[test]
    fn test_native_tile_when_not_coarser() {
        // Live zoom 5 maps to bucket 4; a small view resolves to a tile deeper
        // than 4, so it is requested directly
        let r = resolver(2.0, ZoomPolicy::default());
        let mut cache = TileCache::new();
        let bounds = rect(-74.0, 40.7, -73.99, 40.71);
        let res = r.resolve(&view(bounds, 5.0), None, &mut cache);
        let Resolution::Fetch(plan) = res else {
            panic!("expected fetch, got {res:?}");
        };
        assert_eq!(plan.bucket, 4);
        assert_eq!(plan.tiles, vec![Tile::covering(bounds)]);
        assert!(plan.tiles[0].z >= 4);
    }

    #[test]
    fn test_subdivides_coarse_tile() {
        // The box straddles the prime meridian and the equator, so it only
        // fits tile 0/0/0; at bucket 2 only the four central tiles touch it
        let r = resolver(0.0, ZoomPolicy::Static { level: 2 });
        let mut cache = TileCache::new();
        let bounds = rect(-10.0, -10.0, 10.0, 10.0);
        let Resolution::Fetch(plan) = r.resolve(&view(bounds, 3.0), None, &mut cache) else {
            panic!("expected fetch");
        };
        assert_eq!(plan.bucket, 2);
        let mut tiles = plan.tiles.clone();
        tiles.sort_by_key(|t| (t.x, t.y));
        assert_eq!(
            tiles,
            vec![
                Tile::new(1, 1, 2),
                Tile::new(1, 2, 2),
                Tile::new(2, 1, 2),
                Tile::new(2, 2, 2),
            ]
        );
        for tile in &plan.tiles {
            assert!(overlaps(&tile.bbox(), &bounds));
        }
    }

    #[test]
    fn test_subdivision_excludes_siblings() {
        // Fits in 2/0/1; at zoom 3 only its western children touch the box
        let r = resolver(0.0, ZoomPolicy::Static { level: 3 });
        let mut cache = TileCache::new();
        let bounds = rect(-170.0, 1.0, -140.0, 60.0);
        assert_eq!(Tile::covering(bounds), Tile::new(0, 1, 2));
        let Resolution::Fetch(plan) = r.resolve(&view(bounds, 3.0), None, &mut cache) else {
            panic!("expected fetch");
        };
        let mut tiles = plan.tiles.clone();
        tiles.sort_by_key(|t| (t.x, t.y));
        assert_eq!(tiles, vec![Tile::new(0, 2, 3), Tile::new(0, 3, 3)]);
    }

    #[test]
    fn test_deep_bucket_across_meridian() {
        // Greenwich straddles the prime meridian, so the covering tile is the
        // whole world; only the handful of tiles under the view are expanded
        let r = resolver(2.0, ZoomPolicy::default());
        let cases = [
            (rect(-0.001, 51.5, 0.001, 51.501), 16.0),
            (rect(-0.000_001, 51.5, 0.000_001, 51.500_001), 24.5),
        ];
        for (bounds, zoom) in cases {
            assert_eq!(Tile::covering(bounds), Tile::new(0, 0, 0));
            let mut cache = TileCache::new();
            let started = std::time::Instant::now();
            let Resolution::Fetch(plan) = r.resolve(&view(bounds, zoom), None, &mut cache) else {
                panic!("expected fetch at zoom {zoom}");
            };
            assert!(started.elapsed() < std::time::Duration::from_secs(1));
            assert!(!plan.tiles.is_empty() && plan.tiles.len() <= 4, "{:?}", plan.tiles);
            assert!(plan.tiles.iter().all(|t| t.z == plan.bucket));
            assert!(plan.tiles.iter().all(|t| overlaps(&t.bbox(), &bounds)));
        }
    }

    #[test]
    fn test_repeat_pass_is_up_to_date() {
        let r = resolver(2.0, ZoomPolicy::default());
        let mut cache = TileCache::new();
        let v = view(rect(-74.0, 40.7, -73.99, 40.71), 12.3);
        assert!(matches!(r.resolve(&v, None, &mut cache), Resolution::Fetch(_)));
        for _ in 0..5 {
            assert_eq!(r.resolve(&v, None, &mut cache), Resolution::UpToDate { bucket: 12 });
        }
        assert_eq!(cache.stats().requested_tiles, 1);
    }

    #[test]
    fn test_static_bucket_constant() {
        let r = resolver(7.0, ZoomPolicy::Static { level: 7 });
        let mut cache = TileCache::new();
        let bounds = rect(-74.0, 40.7, -73.99, 40.71);
        for zoom in [7.0, 9.5, 14.0] {
            match r.resolve(&view(bounds, zoom), None, &mut cache) {
                Resolution::Fetch(plan) => assert_eq!(plan.bucket, 7),
                Resolution::UpToDate { bucket } => assert_eq!(bucket, 7),
                other => panic!("unexpected {other:?}"),
            }
        }
    }

    #[test]
    fn test_tolerance_from_pixel_size() {
        let r = resolver(0.0, ZoomPolicy::default());
        let mut cache = TileCache::new();
        let Resolution::Fetch(plan) = r.resolve(&view(rect(0.5, 0.5, 10.5, 5.0), 6.0), None, &mut cache)
        else {
            panic!("expected fetch");
        };
        // 10 degrees over 1000 px, times 0.3
        assert!((plan.tolerance - 0.003).abs() < 1e-12);
    }
}
