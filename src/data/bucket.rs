//! Zoom bucketing: which cache level a live zoom value reads and writes

use crate::data::tile::MAX_ZOOM;

/// Policy mapping a continuous map zoom onto a cache bucket
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum ZoomPolicy {
    /// Every zoom shares one bucket at a fixed level
    Static { level: u8 },
    /// Zoom is floored to a multiple of `stride`, so neighbouring zooms share data
    Dynamic { stride: u8 },
}

impl ZoomPolicy {
    /// Bucket for the given live zoom
    pub fn bucket(&self, zoom: f64) -> u8 {
        match *self {
            ZoomPolicy::Static { level } => level,
            ZoomPolicy::Dynamic { stride } => {
                let stride = f64::from(stride.max(1));
                let z = zoom.max(0.0);
                let bucket = stride * (z / stride).floor();
                bucket.min(f64::from(MAX_ZOOM)) as u8
            }
        }
    }
}

impl Default for ZoomPolicy {
    fn default() -> Self {
        ZoomPolicy::Dynamic { stride: 2 }
    }
}
