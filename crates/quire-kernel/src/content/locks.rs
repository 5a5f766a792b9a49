//! Per-path serialization of check-then-act sequences.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

/// Async mutexes keyed by VFS path, created on demand and dropped once no
/// one holds or waits on them.
#[derive(Debug, Clone, Default)]
pub struct PathLocks {
    map: Arc<LockMap>,
}

/// Held while an operation owns a path.
#[derive(Debug)]
pub struct PathGuard {
    guard: Option<OwnedMutexGuard<()>>,
    path: String,
    map: Arc<LockMap>,
}

impl Drop for PathGuard {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Only the map's own reference left: nobody holds or waits.
        self.map
            .remove_if(&self.path, |_, lock| Arc::strong_count(lock) == 1);
    }
}

impl PathLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, path: &str) -> PathGuard {
        let lock = self.map.entry(path.to_string()).or_default().clone();
        PathGuard {
            guard: Some(lock.lock_owned().await),
            path: path.to_string(),
            map: self.map.clone(),
        }
    }

    /// Lock two paths in a fixed order. Equal paths take one lock.
    pub async fn lock_pair(&self, a: &str, b: &str) -> (PathGuard, Option<PathGuard>) {
        if a == b {
            return (self.lock(a).await, None);
        }
        let (first, second) = if a < b { (a, b) } else { (b, a) };
        let first = self.lock(first).await;
        let second = self.lock(second).await;
        (first, Some(second))
    }

    /// Number of paths with a live lock.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_lock_serializes_same_path() {
        let locks = PathLocks::new();
        let guard = locks.lock("posts/a.md").await;

        let contender = locks.clone();
        let waiter = tokio::spawn(async move {
            let _g = contender.lock("posts/a.md").await;
        });
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
        assert!(locks.is_empty());
    }

    #[tokio::test]
    async fn test_distinct_paths_independent() {
        let locks = PathLocks::new();
        let _a = locks.lock("pages/a.html").await;
        let _b = locks.lock("pages/b.html").await;
        assert_eq!(locks.len(), 2);
    }

    #[tokio::test]
    async fn test_lock_pair_same_path() {
        let locks = PathLocks::new();
        let (_a, b) = locks.lock_pair("notes/x.md", "notes/x.md").await;
        assert!(b.is_none());
        assert_eq!(locks.len(), 1);
    }
}
