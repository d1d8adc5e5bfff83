//! Client sessions and the artifacts cached in them.
//!
//! A client that asks for scene caching gets a [`SessionContext`] holding
//! the last terrain grid, drape and encoded height field built for it. On
//! every request the context compares the new [`RequestFingerprint`] with
//! the previous one and drops whatever the change made stale. Cached files
//! live in the session's own [`TempArtifactLedger`] and are deleted when
//! they go stale or the session ends.

use crate::config::SessionConfig;
use crate::ledger::{LedgerScope, TempArtifactLedger};
use async_trait::async_trait;
use lru::LruCache;
use metrics::{counter, gauge};
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use terrain_common::{ElevationGrid, Envelope, TerrainResult};
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info};

/// Request parameters the cached artifacts depend on.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestFingerprint {
    pub bbox: Envelope,
    pub drape: String,
    pub layers: String,
}

impl RequestFingerprint {
    pub fn new(bbox: Envelope, drape: impl Into<String>, layers: impl Into<String>) -> Self {
        Self {
            bbox,
            drape: drape.into(),
            layers: layers.into(),
        }
    }
}

/// Which cached artifacts a fingerprint change invalidated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Invalidation {
    pub terrain: bool,
    pub drape: bool,
}

/// A drape image on disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrapeArtifact {
    pub path: PathBuf,
    /// Whether the file was created for this request and must be cleaned
    /// up. The configured default drape is not.
    pub temporary: bool,
}

impl DrapeArtifact {
    pub fn temporary(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: true,
        }
    }

    pub fn shared(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            temporary: false,
        }
    }
}

/// Per-client cache state.
#[derive(Debug)]
pub struct SessionContext {
    id: String,
    terrain: Option<Arc<ElevationGrid>>,
    drape: Option<DrapeArtifact>,
    encoded_dem: Option<PathBuf>,
    fingerprint: Option<RequestFingerprint>,
    ledger: Arc<TempArtifactLedger>,
}

impl SessionContext {
    fn new(id: String) -> Self {
        Self {
            ledger: Arc::new(TempArtifactLedger::new(LedgerScope::Session, id.clone())),
            id,
            terrain: None,
            drape: None,
            encoded_dem: None,
            fingerprint: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn terrain(&self) -> Option<&Arc<ElevationGrid>> {
        self.terrain.as_ref()
    }

    pub fn drape(&self) -> Option<&DrapeArtifact> {
        self.drape.as_ref()
    }

    pub fn encoded_dem(&self) -> Option<&Path> {
        self.encoded_dem.as_deref()
    }

    pub fn ledger(&self) -> &TempArtifactLedger {
        &self.ledger
    }

    /// Compare `current` with the previous request's fingerprint, evict
    /// what it makes stale and remember `current`.
    ///
    /// A changed bounding box invalidates the terrain, the encoded height
    /// field and the drape. A changed drape or layer list invalidates the
    /// drape only.
    pub fn apply_fingerprint(&mut self, current: &RequestFingerprint) -> Invalidation {
        let mut invalidation = Invalidation::default();

        if let Some(previous) = &self.fingerprint {
            invalidation.terrain = !previous.bbox.is_spatially_equivalent(&current.bbox);
            invalidation.drape = invalidation.terrain
                || previous.drape != current.drape
                || previous.layers != current.layers;
        }

        if invalidation.terrain {
            self.evict_terrain();
        }
        if invalidation.drape {
            self.evict_drape();
        }
        if invalidation.terrain || invalidation.drape {
            debug!(
                session = %self.id,
                terrain = invalidation.terrain,
                drape = invalidation.drape,
                "Session cache invalidated"
            );
        }

        self.fingerprint = Some(current.clone());
        invalidation
    }

    fn evict_terrain(&mut self) {
        self.terrain = None;
        if let Some(path) = self.encoded_dem.take() {
            self.ledger.untrack(&path);
        }
    }

    fn evict_drape(&mut self) {
        if let Some(drape) = self.drape.take() {
            if drape.temporary {
                self.ledger.untrack(&drape.path);
            }
        }
    }

    /// Drop every cached artifact and delete the session's files.
    fn teardown(&mut self) -> usize {
        self.terrain = None;
        self.drape = None;
        self.encoded_dem = None;
        self.fingerprint = None;
        self.ledger.purge()
    }
}

struct SessionEntry {
    context: Arc<Mutex<SessionContext>>,
    last_seen: Instant,
}

/// Reference to an open session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    id: String,
    is_new: bool,
    context: Arc<Mutex<SessionContext>>,
}

impl SessionHandle {
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Whether this request created the session.
    pub fn is_new(&self) -> bool {
        self.is_new
    }

    pub fn context(&self) -> &Arc<Mutex<SessionContext>> {
        &self.context
    }
}

/// All live sessions, with inactivity expiry and a size bound.
///
/// Each session has its own lock, so requests of different clients never
/// wait on each other.
pub struct SessionStore {
    sessions: std::sync::Mutex<LruCache<String, SessionEntry>>,
    max_inactive: Duration,
}

impl SessionStore {
    pub fn new(config: &SessionConfig) -> Self {
        let capacity = NonZeroUsize::new(config.max_count).unwrap_or(NonZeroUsize::MIN);
        Self {
            sessions: std::sync::Mutex::new(LruCache::new(capacity)),
            max_inactive: config.max_inactive(),
        }
    }

    fn sessions(&self) -> std::sync::MutexGuard<'_, LruCache<String, SessionEntry>> {
        self.sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn len(&self) -> usize {
        self.sessions().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions().is_empty()
    }

    /// Continue the session `id`, or start a new one when the id is unknown
    /// or expired.
    pub async fn open(&self, id: Option<&str>) -> SessionHandle {
        let mut stale = Vec::new();
        let handle = {
            let mut sessions = self.sessions();
            let now = Instant::now();

            let mut existing = None;
            if let Some(id) = id {
                let live = sessions
                    .peek(id)
                    .map(|entry| now - entry.last_seen <= self.max_inactive);
                match live {
                    Some(true) => {
                        if let Some(entry) = sessions.get_mut(id) {
                            entry.last_seen = now;
                            existing = Some(SessionHandle {
                                id: id.to_string(),
                                is_new: false,
                                context: entry.context.clone(),
                            });
                        }
                    }
                    Some(false) => {
                        if let Some(entry) = sessions.pop(id) {
                            info!(session = %id, "Session expired");
                            stale.push(entry);
                        }
                    }
                    None => {}
                }
            }

            match existing {
                Some(handle) => handle,
                None => {
                    let new_id = uuid::Uuid::new_v4().to_string();
                    let context = Arc::new(Mutex::new(SessionContext::new(new_id.clone())));
                    let entry = SessionEntry {
                        context: context.clone(),
                        last_seen: now,
                    };
                    if let Some((evicted_id, evicted)) = sessions.push(new_id.clone(), entry) {
                        if evicted_id != new_id {
                            info!(session = %evicted_id, "Session limit reached, dropping least recently used");
                            stale.push(evicted);
                        }
                    }
                    info!(session = %new_id, "Session created");
                    SessionHandle {
                        id: new_id,
                        is_new: true,
                        context,
                    }
                }
            }
        };

        self.tear_down(stale).await;
        gauge!("terrain_sessions_active").set(self.len() as f64);
        handle
    }

    /// End the session `id` and delete its files. Returns whether it existed.
    pub async fn invalidate(&self, id: &str) -> bool {
        let entry = self.sessions().pop(id);
        let found = entry.is_some();
        if let Some(entry) = entry {
            info!(session = %id, "Session invalidated");
            self.tear_down(vec![entry]).await;
        }
        gauge!("terrain_sessions_active").set(self.len() as f64);
        found
    }

    /// End every session idle for longer than the inactivity limit.
    /// Returns the number of sessions removed.
    pub async fn sweep_expired(&self) -> usize {
        let expired: Vec<SessionEntry> = {
            let mut sessions = self.sessions();
            let now = Instant::now();
            let ids: Vec<String> = sessions
                .iter()
                .filter(|(_, entry)| now - entry.last_seen > self.max_inactive)
                .map(|(id, _)| id.clone())
                .collect();
            ids.iter().filter_map(|id| sessions.pop(id)).collect()
        };
        let count = expired.len();
        if count > 0 {
            info!(count = count, "Expired sessions removed");
        }
        self.tear_down(expired).await;
        gauge!("terrain_sessions_active").set(self.len() as f64);
        count
    }

    async fn tear_down(&self, entries: Vec<SessionEntry>) {
        for entry in entries {
            let mut context = entry.context.lock().await;
            let deleted = context.teardown();
            debug!(session = %context.id(), files = deleted, "Session torn down");
        }
    }
}

/// Builds the artifacts a view request needs when the cache has none.
///
/// `ledger` is the ledger of the scope the artifact is built for. A builder
/// tracks every file in it before creating the file, so a cancelled build
/// leaves nothing behind.
#[async_trait]
pub trait ArtifactBuilder: Send + Sync {
    async fn build_terrain(&self, fingerprint: &RequestFingerprint) -> TerrainResult<ElevationGrid>;

    async fn build_drape(
        &self,
        fingerprint: &RequestFingerprint,
        terrain: &ElevationGrid,
        ledger: &Arc<TempArtifactLedger>,
    ) -> TerrainResult<DrapeArtifact>;

    /// Encode the terrain for the renderer and return the file written.
    async fn encode_dem(
        &self,
        terrain: &ElevationGrid,
        ledger: &Arc<TempArtifactLedger>,
    ) -> TerrainResult<PathBuf>;
}

/// Where built artifacts are kept.
pub enum ArtifactScope<'a> {
    /// Cached in the session; files belong to the session ledger.
    Session(&'a SessionHandle),
    /// Used for this request only; files belong to the request ledger.
    Request(&'a Arc<TempArtifactLedger>),
}

/// Which artifacts came from the cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheHits {
    pub terrain: bool,
    pub drape: bool,
    pub encoded_dem: bool,
}

/// Artifacts for one view request.
#[derive(Debug, Clone)]
pub struct SessionArtifacts {
    pub terrain: Arc<ElevationGrid>,
    pub drape: DrapeArtifact,
    pub encoded_dem: PathBuf,
    pub hits: CacheHits,
}

/// Cache hit and miss totals.
#[derive(Debug, Default)]
pub struct CacheStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
}

/// Resolves the terrain, drape and encoded height field of a request,
/// reusing a session's artifacts where they are still valid.
#[derive(Debug, Default)]
pub struct SessionArtifactCache {
    stats: CacheStats,
}

impl SessionArtifactCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &CacheStats {
        &self.stats
    }

    pub async fn get_or_build(
        &self,
        scope: ArtifactScope<'_>,
        fingerprint: &RequestFingerprint,
        builder: &dyn ArtifactBuilder,
    ) -> TerrainResult<SessionArtifacts> {
        match scope {
            ArtifactScope::Session(handle) => self.resolve(handle, fingerprint, builder).await,
            ArtifactScope::Request(ledger) => {
                let terrain = Arc::new(builder.build_terrain(fingerprint).await?);
                let drape = builder.build_drape(fingerprint, &terrain, ledger).await?;
                if drape.temporary {
                    ledger.track(&drape.path);
                }
                let encoded_dem = builder.encode_dem(&terrain, ledger).await?;
                ledger.track(&encoded_dem);
                Ok(SessionArtifacts {
                    terrain,
                    drape,
                    encoded_dem,
                    hits: CacheHits::default(),
                })
            }
        }
    }

    /// Invalidate against `fingerprint`, then return cached artifacts or
    /// build the missing ones. The session stays locked throughout, so
    /// concurrent requests of one client are applied one after the other.
    async fn resolve(
        &self,
        handle: &SessionHandle,
        fingerprint: &RequestFingerprint,
        builder: &dyn ArtifactBuilder,
    ) -> TerrainResult<SessionArtifacts> {
        let mut context = handle.context.lock().await;
        context.apply_fingerprint(fingerprint);
        let ledger = context.ledger.clone();
        let mut hits = CacheHits::default();

        let terrain = match context.terrain.clone() {
            Some(terrain) => {
                hits.terrain = true;
                terrain
            }
            None => {
                // A height field encoded from an older grid is stale too.
                context.evict_terrain();
                let terrain = Arc::new(builder.build_terrain(fingerprint).await?);
                context.terrain = Some(terrain.clone());
                terrain
            }
        };

        let drape = match context.drape.clone() {
            Some(drape) => {
                hits.drape = true;
                drape
            }
            None => {
                let drape = builder.build_drape(fingerprint, &terrain, &ledger).await?;
                if drape.temporary {
                    ledger.track(&drape.path);
                }
                context.drape = Some(drape.clone());
                drape
            }
        };

        let encoded_dem = match context.encoded_dem.clone() {
            Some(path) => {
                hits.encoded_dem = true;
                path
            }
            None => {
                let path = builder.encode_dem(&terrain, &ledger).await?;
                ledger.track(&path);
                context.encoded_dem = Some(path.clone());
                path
            }
        };

        self.record(&hits);
        debug!(
            session = %handle.id,
            terrain_hit = hits.terrain,
            drape_hit = hits.drape,
            dem_hit = hits.encoded_dem,
            "Session artifacts resolved"
        );

        Ok(SessionArtifacts {
            terrain,
            drape,
            encoded_dem,
            hits,
        })
    }

    fn record(&self, hits: &CacheHits) {
        for (artifact, hit) in [
            ("terrain", hits.terrain),
            ("drape", hits.drape),
            ("encoded_dem", hits.encoded_dem),
        ] {
            if hit {
                self.stats.hits.fetch_add(1, Ordering::Relaxed);
                counter!("terrain_session_cache_hits_total", "artifact" => artifact).increment(1);
            } else {
                self.stats.misses.fetch_add(1, Ordering::Relaxed);
                counter!("terrain_session_cache_misses_total", "artifact" => artifact).increment(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use terrain_common::CrsCode;

    fn fingerprint(x: f64, drape: &str) -> RequestFingerprint {
        RequestFingerprint::new(
            Envelope::new(x, 0.0, x + 1000.0, 1000.0, CrsCode::Epsg25832),
            drape,
            "",
        )
    }

    #[test]
    fn test_first_fingerprint_invalidates_nothing() {
        let mut context = SessionContext::new("s".into());
        assert_eq!(context.apply_fingerprint(&fingerprint(0.0, "")), Invalidation::default());
    }

    #[test]
    fn test_bbox_change_invalidates_everything() {
        let mut context = SessionContext::new("s".into());
        context.apply_fingerprint(&fingerprint(0.0, ""));
        let inv = context.apply_fingerprint(&fingerprint(10.0, ""));
        assert!(inv.terrain && inv.drape);
    }

    #[test]
    fn test_layer_change_invalidates_drape_only() {
        let mut context = SessionContext::new("s".into());
        context.apply_fingerprint(&fingerprint(0.0, "http://wms"));
        let mut next = fingerprint(0.0, "http://wms");
        next.layers = "roads".into();
        let inv = context.apply_fingerprint(&next);
        assert!(!inv.terrain && inv.drape);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_reuses_live_session() {
        let store = SessionStore::new(&SessionConfig::default());
        let first = store.open(None).await;
        assert!(first.is_new());

        let again = store.open(Some(first.id())).await;
        assert!(!again.is_new());
        assert_eq!(again.id(), first.id());
        assert!(Arc::ptr_eq(again.context(), first.context()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_is_replaced() {
        let store = SessionStore::new(&SessionConfig {
            max_inactive_secs: 10,
            ..Default::default()
        });
        let first = store.open(None).await;
        tokio::time::advance(Duration::from_secs(11)).await;

        let next = store.open(Some(first.id())).await;
        assert!(next.is_new());
        assert_ne!(next.id(), first.id());
        assert_eq!(store.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_idle_sessions() {
        let store = SessionStore::new(&SessionConfig {
            max_inactive_secs: 10,
            ..Default::default()
        });
        let idle = store.open(None).await;
        tokio::time::advance(Duration::from_secs(6)).await;
        let active = store.open(None).await;
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(store.sweep_expired().await, 1);
        assert_eq!(store.len(), 1);
        assert!(!store.open(Some(active.id())).await.is_new());
        assert!(store.open(Some(idle.id())).await.is_new());
    }

    #[tokio::test]
    async fn test_session_limit_drops_least_recent() {
        let store = SessionStore::new(&SessionConfig {
            max_count: 2,
            ..Default::default()
        });
        let a = store.open(None).await;
        let b = store.open(None).await;
        store.open(Some(a.id())).await;
        store.open(None).await;

        assert_eq!(store.len(), 2);
        assert!(!store.open(Some(a.id())).await.is_new());
        assert!(store.open(Some(b.id())).await.is_new());
    }
}
