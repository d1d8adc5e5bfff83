//! Temporary file bookkeeping.
//!
//! Every file a request or session creates in the working directory is
//! registered in a [`TempArtifactLedger`]. The ledger is the only place such
//! files are deleted from.

use metrics::counter;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Lifetime a ledger is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedgerScope {
    Request,
    Session,
}

impl LedgerScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            LedgerScope::Request => "request",
            LedgerScope::Session => "session",
        }
    }
}

/// Files owned by one request or one session.
///
/// Dropping the ledger purges it unless [`preserve`](Self::preserve) was
/// called.
#[derive(Debug)]
pub struct TempArtifactLedger {
    scope: LedgerScope,
    label: String,
    paths: Mutex<Vec<PathBuf>>,
    preserved: AtomicBool,
}

impl TempArtifactLedger {
    pub fn new(scope: LedgerScope, label: impl Into<String>) -> Self {
        Self {
            scope,
            label: label.into(),
            paths: Mutex::new(Vec::new()),
            preserved: AtomicBool::new(false),
        }
    }

    pub fn scope(&self) -> LedgerScope {
        self.scope
    }

    fn entries(&self) -> MutexGuard<'_, Vec<PathBuf>> {
        self.paths.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a file. Registering the same path twice is a no-op.
    pub fn track(&self, path: impl Into<PathBuf>) {
        let path = path.into();
        let mut paths = self.entries();
        if !paths.contains(&path) {
            debug!(scope = self.scope.as_str(), label = %self.label, path = %path.display(), "Tracking temp file");
            paths.push(path);
        }
    }

    /// Delete one tracked file and forget it.
    ///
    /// Returns whether the path was tracked. Untracked paths are never
    /// deleted.
    pub fn untrack(&self, path: &Path) -> bool {
        let removed = {
            let mut paths = self.entries();
            match paths.iter().position(|p| p == path) {
                Some(pos) => {
                    paths.remove(pos);
                    true
                }
                None => false,
            }
        };
        if removed {
            self.delete(path);
        }
        removed
    }

    /// Delete `path` unless the ledger tracks it.
    ///
    /// For writers that can finish after the owner untracked or purged the
    /// path. Returns whether a file was deleted.
    pub fn reclaim(&self, path: &Path) -> bool {
        if self.contains(path) {
            return false;
        }
        let deleted = self.delete(path);
        if deleted {
            debug!(scope = self.scope.as_str(), label = %self.label, path = %path.display(), "Reclaimed late temp file");
        }
        deleted
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.entries().iter().any(|p| p == path)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Delete every tracked file.
    ///
    /// Purging an empty or already purged ledger does nothing. Returns the
    /// number of files deleted.
    pub fn purge(&self) -> usize {
        let paths = std::mem::take(&mut *self.entries());
        let deleted = paths.iter().filter(|p| self.delete(p)).count();
        if !paths.is_empty() {
            debug!(
                scope = self.scope.as_str(),
                label = %self.label,
                tracked = paths.len(),
                deleted = deleted,
                "Purged temp files"
            );
        }
        deleted
    }

    /// Keep the tracked files when the ledger is dropped.
    pub fn preserve(&self) {
        self.preserved.store(true, Ordering::Relaxed);
    }

    pub fn is_preserved(&self) -> bool {
        self.preserved.load(Ordering::Relaxed)
    }

    fn delete(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                counter!("terrain_temp_files_purged_total", "scope" => self.scope.as_str())
                    .increment(1);
                true
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to delete temp file");
                false
            }
        }
    }
}

impl Drop for TempArtifactLedger {
    fn drop(&mut self) {
        if self.is_preserved() {
            let paths = self.entries();
            if !paths.is_empty() {
                warn!(
                    label = %self.label,
                    files = paths.len(),
                    "Keeping temp files for inspection"
                );
            }
            return;
        }
        self.purge();
    }
}

/// Ledgers kept after failed renders.
///
/// Their files stay on disk for inspection until [`expire`](Self::expire)
/// purges ledgers older than the retention limit.
#[derive(Debug, Default)]
pub struct PreservedLedgers {
    entries: Mutex<Vec<(Instant, Arc<TempArtifactLedger>)>>,
}

impl PreservedLedgers {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, Vec<(Instant, Arc<TempArtifactLedger>)>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Mark `ledger` preserved and hold on to it.
    pub fn keep(&self, ledger: Arc<TempArtifactLedger>) {
        ledger.preserve();
        self.entries().push((Instant::now(), ledger));
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Purge every ledger kept for at least `max_age`. Returns the number
    /// of files deleted.
    pub fn expire(&self, max_age: Duration) -> usize {
        let now = Instant::now();
        let expired: Vec<Arc<TempArtifactLedger>> = {
            let mut entries = self.entries();
            let (expired, kept) = std::mem::take(&mut *entries)
                .into_iter()
                .partition(|(kept_at, _)| now - *kept_at >= max_age);
            *entries = kept;
            expired.into_iter().map(|(_, ledger)| ledger).collect()
        };
        let deleted = expired.iter().map(|ledger| ledger.purge()).sum();
        if !expired.is_empty() {
            info!(ledgers = expired.len(), files = deleted, "Expired preserved temp files");
        }
        deleted
    }
}

/// Generates the per-request temp name `~{counter}_{millis}`.
///
/// The name prefixes every file a request writes and keys its log records.
#[derive(Debug, Default)]
pub struct TempNameGenerator {
    counter: AtomicU64,
}

impl TempNameGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_name(&self) -> String {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        format!("~{}_{}", n, chrono::Utc::now().timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn touch(dir: &Path, name: &str) -> PathBuf {
        let path = dir.join(name);
        fs::write(&path, b"x").unwrap();
        path
    }

    #[test]
    fn test_purge_twice_is_noop() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TempArtifactLedger::new(LedgerScope::Request, "~0_1");
        let a = touch(dir.path(), "a.pov");
        let b = touch(dir.path(), "b.png");
        ledger.track(&a);
        ledger.track(&b);

        assert_eq!(ledger.purge(), 2);
        assert!(!a.exists() && !b.exists());
        assert_eq!(ledger.purge(), 0);
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_track_deduplicates() {
        let ledger = TempArtifactLedger::new(LedgerScope::Session, "s");
        ledger.track("/tmp/does-not-matter");
        ledger.track("/tmp/does-not-matter");
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_untrack_deletes_only_tracked() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TempArtifactLedger::new(LedgerScope::Session, "s");
        let tracked = touch(dir.path(), "drape.jpg");
        let foreign = touch(dir.path(), "default.jpg");
        ledger.track(&tracked);

        assert!(ledger.untrack(&tracked));
        assert!(!tracked.exists());
        assert!(!ledger.untrack(&foreign));
        assert!(foreign.exists());
        assert!(!ledger.untrack(&tracked));
    }

    #[test]
    fn test_missing_files_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TempArtifactLedger::new(LedgerScope::Request, "r");
        ledger.track(dir.path().join("never-written.png"));
        assert_eq!(ledger.purge(), 0);
    }

    #[test]
    fn test_drop_purges_unless_preserved() {
        let dir = tempfile::tempdir().unwrap();
        let purged = touch(dir.path(), "purged.pov");
        let kept = touch(dir.path(), "kept.pov");

        {
            let ledger = TempArtifactLedger::new(LedgerScope::Request, "r1");
            ledger.track(&purged);
        }
        {
            let ledger = TempArtifactLedger::new(LedgerScope::Request, "r2");
            ledger.track(&kept);
            ledger.preserve();
        }

        assert!(!purged.exists());
        assert!(kept.exists());
    }

    #[test]
    fn test_reclaim_spares_tracked_files() {
        let dir = tempfile::tempdir().unwrap();
        let ledger = TempArtifactLedger::new(LedgerScope::Session, "s");
        let tracked = touch(dir.path(), "~0_1-hf.png");
        ledger.track(&tracked);
        assert!(!ledger.reclaim(&tracked));
        assert!(tracked.exists());

        // purged while a writer was still busy with it
        ledger.purge();
        let late = touch(dir.path(), "~0_1-hf.png");
        assert!(ledger.reclaim(&late));
        assert!(!late.exists());
    }

    #[tokio::test(start_paused = true)]
    async fn test_preserved_ledgers_expire_by_age() {
        let dir = tempfile::tempdir().unwrap();
        let preserved = PreservedLedgers::new();

        let old = Arc::new(TempArtifactLedger::new(LedgerScope::Request, "~0_1"));
        let old_file = touch(dir.path(), "~0_1.pov");
        old.track(&old_file);
        preserved.keep(old.clone());
        drop(old);

        tokio::time::advance(Duration::from_secs(30)).await;
        let recent = Arc::new(TempArtifactLedger::new(LedgerScope::Request, "~1_1"));
        let recent_file = touch(dir.path(), "~1_1.pov");
        recent.track(&recent_file);
        preserved.keep(recent.clone());
        assert!(recent.is_preserved());
        drop(recent);

        assert!(old_file.exists() && recent_file.exists());
        assert_eq!(preserved.expire(Duration::from_secs(20)), 1);
        assert!(!old_file.exists());
        assert!(recent_file.exists());
        assert_eq!(preserved.len(), 1);
    }

    #[test]
    fn test_temp_names_are_unique() {
        let names = TempNameGenerator::new();
        let a = names.next_name();
        let b = names.next_name();
        assert!(a.starts_with("~0_"));
        assert!(b.starts_with("~1_"));
        assert_ne!(a, b);
    }
}
