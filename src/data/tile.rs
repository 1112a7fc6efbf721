//! Tile geometry: slippy-map tile addressing on the WGS84 / Web Mercator grid
//!
//! Bounding boxes are `geo::Rect<f64>` in longitude/latitude degrees
//! (`min` = south-west, `max` = north-east).

use crate::data::extent::overlaps;
use geo::{Coord, Rect};
use std::f64::consts::PI;
use std::fmt;

/// Deepest zoom a bounding box is ever resolved to
pub const MAX_ZOOM: u8 = 28;

/// Fixed-point resolution used when resolving a bounding box to a tile
const POINT_ZOOM: u32 = 32;

/// A single map tile
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// The four children one zoom level deeper, in NW, NE, SE, SW order
    pub fn children(&self) -> [Tile; 4] {
        let (x, y, z) = (self.x * 2, self.y * 2, self.z + 1);
        [
            Tile::new(x, y, z),
            Tile::new(x + 1, y, z),
            Tile::new(x + 1, y + 1, z),
            Tile::new(x, y + 1, z),
        ]
    }

    /// Descendants at `target_z` whose bounding box touches `bounds`.
    ///
    /// Subdivision proceeds one whole zoom level at a time and only tiles
    /// touching `bounds` are split further, so the work follows the number of
    /// visible tiles. Returns only this tile when `target_z` is not deeper
    /// than the tile itself.
    pub fn descendants_touching(&self, target_z: u8, bounds: &Rect<f64>) -> Vec<Tile> {
        let mut tiles = vec![*self];
        while tiles.first().is_some_and(|t| t.z < target_z) {
            tiles = tiles
                .iter()
                .flat_map(Tile::children)
                .filter(|tile| overlaps(&tile.bbox(), bounds))
                .collect();
        }
        tiles
    }

    /// Bounding box of the tile in longitude/latitude degrees
    pub fn bbox(&self) -> Rect<f64> {
        let west = tile_to_lon(self.x, self.z);
        let east = tile_to_lon(self.x + 1, self.z);
        let north = tile_to_lat(self.y, self.z);
        let south = tile_to_lat(self.y + 1, self.z);
        Rect::new(Coord { x: west, y: south }, Coord { x: east, y: north })
    }

    /// Quadkey string for the tile; one base-4 digit per zoom level
    pub fn quadkey(&self) -> String {
        let mut key = String::with_capacity(self.z as usize);
        for z in (1..=self.z).rev() {
            let mask = 1u32 << (z - 1);
            let mut digit = b'0';
            if self.x & mask != 0 {
                digit += 1;
            }
            if self.y & mask != 0 {
                digit += 2;
            }
            key.push(digit as char);
        }
        key
    }

    /// Smallest tile fully covering the bounding box
    pub fn covering(bbox: Rect<f64>) -> Tile {
        let min = point_to_tile(bbox.min().x, bbox.min().y, POINT_ZOOM);
        let max = point_to_tile(bbox.max().x, bbox.max().y, POINT_ZOOM);
        let z = bbox_zoom(min, max);
        if z == 0 {
            return Tile::new(0, 0, 0);
        }
        let shift = POINT_ZOOM - u32::from(z);
        Tile::new((min.0 >> shift) as u32, (min.1 >> shift) as u32, z)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Fractional tile coordinates of a point at zoom `z`, floored and clamped
/// onto the grid. Longitude wraps around the antimeridian.
fn point_to_tile(lon: f64, lat: f64, z: u32) -> (u64, u64) {
    let n = (1u64 << z) as f64;
    let sin = lat.to_radians().sin();
    let mut x = n * (lon / 360.0 + 0.5);
    let y = n * (0.5 - 0.25 * ((1.0 + sin) / (1.0 - sin)).ln() / PI);
    x %= n;
    if x < 0.0 {
        x += n;
    }
    let last = n - 1.0;
    (x.floor().clamp(0.0, last) as u64, y.floor().clamp(0.0, last) as u64)
}

/// Zoom at which the two corner tiles first diverge
fn bbox_zoom(min: (u64, u64), max: (u64, u64)) -> u8 {
    for z in 0..MAX_ZOOM {
        let mask = 1u64 << (POINT_ZOOM - (u32::from(z) + 1));
        if (min.0 & mask) != (max.0 & mask) || (min.1 & mask) != (max.1 & mask) {
            return z;
        }
    }
    MAX_ZOOM
}

fn tile_to_lon(x: u32, z: u8) -> f64 {
    f64::from(x) / (1u64 << z) as f64 * 360.0 - 180.0
}

fn tile_to_lat(y: u32, z: u8) -> f64 {
    let n = PI - 2.0 * PI * f64::from(y) / (1u64 << z) as f64;
    n.sinh().atan().to_degrees()
}
