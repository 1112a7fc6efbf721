//! The map the source feeds, and a headless in-memory implementation

use super::lock;
use crate::data::{FeatureCollection, ViewState};
use std::collections::HashMap;
use std::sync::Mutex;
use tokio::sync::broadcast;

/// Capacity of the view-change channel of [`MemoryMap`]
const VIEW_EVENT_CAPACITY: usize = 64;

/// What the source needs from a map renderer
pub trait MapRenderer: Send + Sync {
    /// Current view
    fn view(&self) -> ViewState;

    /// Stream of "view changed" events, one per finished move
    fn subscribe(&self) -> broadcast::Receiver<ViewState>;

    /// Register a named data source holding `data`
    fn add_source(&self, id: &str, data: FeatureCollection);

    /// Replace the data of a source; ignored if the source does not exist
    fn set_source_data(&self, id: &str, data: FeatureCollection);

    fn remove_source(&self, id: &str);

    /// Add a map-wide credit line; adding the same text twice has no effect
    fn add_custom_attribution(&self, text: &str);

    /// Set the credit shown for one source
    fn set_source_attribution(&self, id: &str, text: &str);
}

/// Data source as held by [`MemoryMap`]
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MemorySource {
    pub data: FeatureCollection,
    pub attribution: Option<String>,
    /// Times the data was replaced
    pub updates: usize,
}

/// Headless map: keeps sources in memory and broadcasts view changes
#[derive(Debug)]
pub struct MemoryMap {
    view: Mutex<ViewState>,
    events: broadcast::Sender<ViewState>,
    sources: Mutex<HashMap<String, MemorySource>>,
    attribution: Mutex<Vec<String>>,
}

impl MemoryMap {
    pub fn new(view: ViewState) -> Self {
        let (events, _) = broadcast::channel(VIEW_EVENT_CAPACITY);
        Self {
            view: Mutex::new(view),
            events,
            sources: Mutex::new(HashMap::new()),
            attribution: Mutex::new(Vec::new()),
        }
    }

    /// Move the view and notify subscribers
    pub fn set_view(&self, view: ViewState) {
        *lock(&self.view) = view;
        // No subscribers is fine: requests may be disabled
        let _ = self.events.send(view);
    }

    pub fn source(&self, id: &str) -> Option<MemorySource> {
        lock(&self.sources).get(id).cloned()
    }

    pub fn has_source(&self, id: &str) -> bool {
        lock(&self.sources).contains_key(id)
    }

    /// Map-wide credit lines, in insertion order
    pub fn custom_attribution(&self) -> Vec<String> {
        lock(&self.attribution).clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.events.receiver_count()
    }
}

impl MapRenderer for MemoryMap {
    fn view(&self) -> ViewState {
        *lock(&self.view)
    }

    fn subscribe(&self) -> broadcast::Receiver<ViewState> {
        self.events.subscribe()
    }

    fn add_source(&self, id: &str, data: FeatureCollection) {
        lock(&self.sources).insert(
            id.to_string(),
            MemorySource {
                data,
                ..Default::default()
            },
        );
    }

    fn set_source_data(&self, id: &str, data: FeatureCollection) {
        match lock(&self.sources).get_mut(id) {
            Some(source) => {
                source.data = data;
                source.updates += 1;
            }
            None => tracing::debug!("Dropping data for unknown source {id:?}"),
        }
    }

    fn remove_source(&self, id: &str) {
        lock(&self.sources).remove(id);
    }

    fn add_custom_attribution(&self, text: &str) {
        let mut attribution = lock(&self.attribution);
        if !attribution.iter().any(|a| a == text) {
            attribution.push(text.to_string());
        }
    }

    fn set_source_attribution(&self, id: &str, text: &str) {
        if let Some(source) = lock(&self.sources).get_mut(id) {
            source.attribution = Some(text.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::Feature;
    use geo::{Coord, Rect};

    fn view(zoom: f64) -> ViewState {
        ViewState {
            bounds: Rect::new(Coord { x: 0.0, y: 0.0 }, Coord { x: 1.0, y: 1.0 }),
            zoom,
            canvas_width: 512,
        }
    }

    #[test]
    fn test_sources() {
        let map = MemoryMap::new(view(3.0));
        map.set_source_data("missing", FeatureCollection::new());
        assert!(!map.has_source("missing"));

        map.add_source("parcels", FeatureCollection::new());
        map.set_source_data("parcels", vec![Feature::default()].into());
        map.set_source_attribution("parcels", "County GIS");
        let source = map.source("parcels").unwrap();
        assert_eq!(source.data.len(), 1);
        assert_eq!(source.updates, 1);
        assert_eq!(source.attribution.as_deref(), Some("County GIS"));

        map.remove_source("parcels");
        assert!(map.source("parcels").is_none());
    }

    #[test]
    fn test_custom_attribution_once() {
        let map = MemoryMap::new(view(3.0));
        map.add_custom_attribution("Powered by Esri");
        map.add_custom_attribution("Other");
        map.add_custom_attribution("Powered by Esri");
        assert_eq!(map.custom_attribution(), vec!["Powered by Esri", "Other"]);
    }

    #[tokio::test]
    async fn test_view_events() {
        let map = MemoryMap::new(view(3.0));
        let mut rx = map.subscribe();
        assert_eq!(map.subscriber_count(), 1);
        map.set_view(view(9.0));
        assert_eq!(rx.recv().await.unwrap().zoom, 9.0);
        assert_eq!(map.view().zoom, 9.0);
    }
}
