//! Feature Source Module
//!
//! [`FeatureSource`] binds a remote feature layer to a named data source of a
//! [`MapRenderer`]. Every finished map move triggers a resolution pass:
//!
//! 1. The [`ViewportResolver`] picks the zoom bucket and the tiles of the
//!    view not yet requested in it, claiming them in the [`TileCache`]
//! 2. The [`TileFetcher`] requests those tiles concurrently
//! 3. The outcomes are merged into the bucket without duplicate features
//! 4. The bucket's collection is pushed to the map
//!
//! Cache state sits behind an async mutex that is only held while planning
//! and merging, never across a network call. A filter or time change wipes
//! the cache; passes that started before the wipe drop their results.

mod options;
mod renderer;

pub use options::SourceOptions;
pub use renderer::{MapRenderer, MemoryMap, MemorySource};

use crate::data::{
    CacheStats, FeatureCollection, FeatureId, MergeStats, Resolution, TileCache, ViewState, ViewportResolver,
};
use crate::service::{
    DEFAULT_POINT_RADIUS, ExtentNormalizer, MetadataResolver, QueryFormat, QueryParams, ServiceMetadata,
    TileDecoder, TileFetcher, TimeRange, Transport, decoder_for, ids_query_url, point_query_url, request_json,
};
use crate::{Result, SourceError};
use geo::Rect;
use std::fmt;
use std::sync::{Arc, MutexGuard, PoisonError, Weak};
use tokio::sync::{Mutex, broadcast};
use tokio::task::JoinHandle;
use url::Url;

/// Credit line added to the map for every source
pub const POWERED_BY_ESRI: &str = r#"Powered by <a href="https://www.esri.com">Esri</a>"#;

fn lock<T>(mutex: &std::sync::Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// What a resolution pass did
#[derive(Clone, Debug, PartialEq)]
pub enum PassReport {
    BelowMinZoom,
    OutsideExtent,
    /// Nothing new to fetch; the bucket was republished as is
    UpToDate { bucket: u8, features: usize },
    Fetched {
        bucket: u8,
        tiles: usize,
        merge: MergeStats,
        /// Features in the bucket after the merge
        features: usize,
    },
    /// The cache was reset while the tiles were in flight; results dropped
    Superseded { bucket: u8 },
}

struct State {
    cache: TileCache,
    params: QueryParams,
    /// Service extent in WGS84, once known
    extent: Option<Rect<f64>>,
    /// Set by a successful initialization
    decoder: Option<Arc<dyn TileDecoder>>,
    /// Bumped on every reset
    generation: u64,
}

struct Inner {
    id: String,
    service: Url,
    options: SourceOptions,
    resolver: ViewportResolver,
    renderer: Arc<dyn MapRenderer>,
    transport: Arc<dyn Transport>,
    metadata: MetadataResolver,
    normalizer: ExtentNormalizer,
    state: Mutex<State>,
    listener: std::sync::Mutex<Option<JoinHandle<()>>>,
}

impl Inner {
    fn publish(&self, fc: FeatureCollection) {
        self.renderer.set_source_data(&self.id, fc);
    }

    async fn find_and_map_data(&self, view: ViewState) -> Result<PassReport> {
        let (plan, params, decoder, generation) = {
            let mut guard = self.state.lock().await;
            let state = &mut *guard;
            let decoder = state.decoder.clone().ok_or(SourceError::NotInitialized)?;
            let extent = if self.options.use_service_bounds {
                state.extent
            } else {
                None
            };
            match self.resolver.resolve(&view, extent.as_ref(), &mut state.cache) {
                Resolution::BelowMinZoom => return Ok(PassReport::BelowMinZoom),
                Resolution::OutsideExtent => return Ok(PassReport::OutsideExtent),
                Resolution::UpToDate { bucket } => {
                    let fc = state.cache.collection(bucket);
                    drop(guard);
                    let features = fc.len();
                    self.publish(fc);
                    return Ok(PassReport::UpToDate { bucket, features });
                }
                Resolution::Fetch(plan) => (plan, state.params.clone(), decoder, state.generation),
            }
        };

        let fetcher = TileFetcher::new(self.transport.clone(), decoder, self.service.clone());
        let outcomes = fetcher.fetch_all(&plan.tiles, plan.tolerance, &params).await;

        let (merge, fc) = {
            let mut state = self.state.lock().await;
            if state.generation != generation {
                tracing::debug!("Dropping {} tiles of bucket {} fetched before a reset", plan.tiles.len(), plan.bucket);
                return Ok(PassReport::Superseded { bucket: plan.bucket });
            }
            let merge = state.cache.merge(plan.bucket, outcomes);
            (merge, state.cache.collection(plan.bucket))
        };

        let features = fc.len();
        self.publish(fc);
        Ok(PassReport::Fetched {
            bucket: plan.bucket,
            tiles: plan.tiles.len(),
            merge,
            features,
        })
    }

    /// Forget every bucket and run a pass over the current view
    async fn reset_and_refresh(&self) -> Result<PassReport> {
        {
            let mut state = self.state.lock().await;
            state.cache.clear();
            state.generation += 1;
        }
        tracing::debug!("Source {:?}: cache cleared", self.id);
        self.find_and_map_data(self.renderer.view()).await
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let listener = self.listener.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = listener.take() {
            handle.abort();
        }
    }
}

/// A remote feature layer feeding a map data source.
///
/// Cheap to clone; clones share the same cache and listener.
#[derive(Clone)]
pub struct FeatureSource {
    inner: Arc<Inner>,
}

impl fmt::Debug for FeatureSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("FeatureSource")
            .field("id", &self.inner.id)
            .field("service", &self.inner.service.as_str())
            .finish_non_exhaustive()
    }
}

impl FeatureSource {
    /// Create the source and register an empty data source on the map.
    ///
    /// Nothing is requested until [`FeatureSource::initialize`] runs.
    pub fn new(
        id: impl Into<String>,
        renderer: Arc<dyn MapRenderer>,
        transport: Arc<dyn Transport>,
        options: SourceOptions,
    ) -> Result<Self> {
        let id = id.into();
        if id.trim().is_empty() {
            return Err(SourceError::Config("a source id must be supplied".into()));
        }
        let service = options.validate()?;
        let normalizer = ExtentNormalizer::new(Url::parse(&options.projection_endpoint())?)?;

        renderer.add_source(&id, FeatureCollection::new());

        let state = State {
            cache: TileCache::new(),
            params: options.query_params(),
            extent: None,
            decoder: None,
            generation: 0,
        };
        let inner = Inner {
            metadata: MetadataResolver::new(&service),
            resolver: ViewportResolver::new(options.resolver_config()),
            id,
            service,
            options,
            renderer,
            transport,
            normalizer,
            state: Mutex::new(state),
            listener: std::sync::Mutex::new(None),
        };
        Ok(Self { inner: Arc::new(inner) })
    }

    /// Fetch metadata, negotiate the encoding, set attribution, start
    /// listening to the map and load the current view.
    ///
    /// Without a usable encoding the map source is removed. A failed extent
    /// reprojection is returned after the source has started anyway, without
    /// extent checks.
    pub async fn initialize(&self) -> Result<()> {
        let inner = &self.inner;
        let metadata = inner.metadata.get(inner.transport.as_ref()).await?;

        let format = match metadata.negotiate_format(inner.options.format) {
            Ok(format) => format,
            Err(e) => {
                tracing::error!("Source {:?}: {e}", inner.id);
                inner.renderer.remove_source(&inner.id);
                return Err(e);
            }
        };
        if format != inner.options.format {
            tracing::info!("Source {:?}: server lacks {}, using {format}", inner.id, inner.options.format);
        }

        {
            let mut state = inner.state.lock().await;
            state.params.format = format;
            state.decoder = Some(decoder_for(format));
            state.cache.set_id_field(metadata.id_field().map(str::to_string));
            if let Some(id_field) = metadata.id_field() {
                let out_fields = &mut state.params.out_fields;
                if out_fields.trim() != "*" && !out_fields.split(',').any(|f| f.trim() == id_field) {
                    out_fields.push(',');
                    out_fields.push_str(id_field);
                }
            }
        }

        self.set_attribution(metadata);
        self.enable_requests();

        let mut result = Ok(());
        if inner.options.use_service_bounds {
            match &metadata.extent {
                Some(extent) => match inner.normalizer.normalize(inner.transport.as_ref(), extent).await {
                    Ok(rect) => inner.state.lock().await.extent = Some(rect),
                    Err(e) => {
                        tracing::warn!("Source {:?}: extent unknown, views are not bounded: {e}", inner.id);
                        result = Err(e);
                    }
                },
                None => tracing::debug!("Source {:?}: service reports no extent", inner.id),
            }
        }

        match inner.reset_and_refresh().await {
            Ok(report) => tracing::info!("Source {:?} initialized ({format}): {report:?}", inner.id),
            Err(e) => tracing::warn!("Source {:?}: initial pass failed: {e}", inner.id),
        }
        result
    }

    fn set_attribution(&self, metadata: &ServiceMetadata) {
        let inner = &self.inner;
        inner.renderer.add_custom_attribution(POWERED_BY_ESRI);
        if inner.options.set_attribution_from_service {
            if let Some(text) = metadata.attribution() {
                inner.renderer.set_source_attribution(&inner.id, text);
            }
        }
    }

    /// Start reacting to view changes. Must be called within a tokio runtime.
    pub fn enable_requests(&self) {
        let mut events = self.inner.renderer.subscribe();
        let weak: Weak<Inner> = Arc::downgrade(&self.inner);
        let handle = tokio::spawn(async move {
            loop {
                let view = match events.recv().await {
                    Ok(view) => view,
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::debug!("Skipped {skipped} view events");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else { break };
                tokio::spawn(async move {
                    if let Err(e) = inner.find_and_map_data(view).await {
                        tracing::warn!("Source {:?}: pass failed: {e}", inner.id);
                    }
                });
            }
        });
        if let Some(previous) = lock(&self.inner.listener).replace(handle) {
            previous.abort();
        }
    }

    /// Stop reacting to view changes; passes already running still finish
    pub fn disable_requests(&self) {
        if let Some(handle) = lock(&self.inner.listener).take() {
            handle.abort();
        }
    }

    pub fn requests_enabled(&self) -> bool {
        lock(&self.inner.listener).as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Detach from the map and remove the data source
    pub fn destroy(&self) {
        self.disable_requests();
        self.inner.renderer.remove_source(&self.inner.id);
        tracing::debug!("Source {:?} destroyed", self.inner.id);
    }

    /// Clear the cache and reload the current view
    pub async fn refresh(&self) -> Result<PassReport> {
        self.inner.reset_and_refresh().await
    }

    /// Run one pass over `view` without clearing anything
    pub async fn update(&self, view: ViewState) -> Result<PassReport> {
        self.inner.find_and_map_data(view).await
    }

    /// Replace the attribute filter, clear the cache and reload
    pub async fn set_where(&self, where_clause: impl Into<String>) -> Result<PassReport> {
        self.inner.state.lock().await.params.where_clause = where_clause.into();
        self.refresh().await
    }

    pub async fn clear_where(&self) -> Result<PassReport> {
        self.set_where("1=1").await
    }

    /// Replace the time filter, clear the cache and reload
    pub async fn set_time_range(&self, range: TimeRange) -> Result<PassReport> {
        self.inner.state.lock().await.params.time = Some(range);
        self.refresh().await
    }

    pub async fn clear_time_range(&self) -> Result<PassReport> {
        self.inner.state.lock().await.params.time = None;
        self.refresh().await
    }

    /// Features within `radius` meters (default 20) of a point
    pub async fn features_at(
        &self,
        lon: f64,
        lat: f64,
        radius: Option<f64>,
        return_geometry: bool,
    ) -> Result<FeatureCollection> {
        let time = self.inner.state.lock().await.params.time;
        let url = point_query_url(
            &self.inner.service,
            lon,
            lat,
            radius.unwrap_or(DEFAULT_POINT_RADIUS),
            return_geometry,
            time.as_ref(),
        )?;
        request_json(self.inner.transport.as_ref(), url).await
    }

    /// Features with the given identifiers
    pub async fn features_by_ids(&self, ids: &[FeatureId], return_geometry: bool) -> Result<FeatureCollection> {
        let url = ids_query_url(&self.inner.service, ids, return_geometry)?;
        request_json(self.inner.transport.as_ref(), url).await
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn options(&self) -> &SourceOptions {
        &self.inner.options
    }

    /// Service metadata, once fetched
    pub fn metadata(&self) -> Option<&ServiceMetadata> {
        self.inner.metadata.cached()
    }

    /// Negotiated encoding, once initialized
    pub async fn format(&self) -> Option<QueryFormat> {
        let state = self.inner.state.lock().await;
        state.decoder.as_ref().map(|d| d.format())
    }

    /// Service extent in WGS84, once known
    pub async fn extent(&self) -> Option<Rect<f64>> {
        self.inner.state.lock().await.extent
    }

    /// Parameters the next tile requests will use
    pub async fn query_params(&self) -> QueryParams {
        self.inner.state.lock().await.params.clone()
    }

    pub async fn cache_stats(&self) -> CacheStats {
        self.inner.state.lock().await.cache.stats()
    }

    /// Current merged collection of a bucket
    pub async fn bucket_collection(&self, bucket: u8) -> FeatureCollection {
        self.inner.state.lock().await.cache.collection(bucket)
    }
}
