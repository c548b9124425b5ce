//! Per-request index directories.
//!
//! Every request gets its own directory `root/<scope>/<uuid>`, so answers
//! being built concurrently can never read each other's index.  The
//! directory lives as long as the returned [`IndexLease`].

use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Clone)]
pub struct IndexArena {
    root: PathBuf,
    keep_after_use: bool,
}

impl IndexArena {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            keep_after_use: false,
        }
    }

    /// Leave index directories on disk after the lease is dropped, for
    /// debugging.
    pub fn keep_after_use(mut self, keep: bool) -> Self {
        self.keep_after_use = keep;
        self
    }

    /// Reserve a fresh directory path under `scope`.  Nothing is created on
    /// disk until an index is built there.
    pub fn allocate(&self, scope: &str) -> IndexLease {
        let path = self.root.join(scope).join(Uuid::new_v4().to_string());
        debug!(path = %path.display(), "index path allocated");
        IndexLease {
            path,
            keep: self.keep_after_use,
        }
    }
}

#[derive(Debug)]
pub struct IndexLease {
    path: PathBuf,
    keep: bool,
}

impl IndexLease {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for IndexLease {
    fn drop(&mut self) {
        if self.keep || !self.path.exists() {
            return;
        }
        if let Err(err) = std::fs::remove_dir_all(&self.path) {
            warn!(path = %self.path.display(), %err, "failed to release index directory");
            return;
        }
        // Fails while other leases in the same scope are alive; that's fine.
        if let Some(scope_dir) = self.path.parent() {
            let _ = std::fs::remove_dir(scope_dir);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn leases_are_unique_and_scoped() {
        let root = tempfile::tempdir().unwrap();
        let arena = IndexArena::new(root.path());
        let a = arena.allocate("alice");
        let b = arena.allocate("alice");
        let c = arena.allocate("bob");
        assert_ne!(a.path(), b.path());
        assert!(a.path().starts_with(root.path().join("alice")));
        assert!(c.path().starts_with(root.path().join("bob")));
        assert!(!a.path().exists());
    }

    #[test]
    fn drop_removes_directory() {
        let root = tempfile::tempdir().unwrap();
        let arena = IndexArena::new(root.path());
        let lease = arena.allocate("alice");
        std::fs::create_dir_all(lease.path()).unwrap();
        std::fs::write(lease.path().join("index.json"), "{}").unwrap();
        let path = lease.path().to_path_buf();
        drop(lease);
        assert!(!path.exists());
        assert!(!root.path().join("alice").exists());
    }

    #[test]
    fn sibling_lease_keeps_scope_dir() {
        let root = tempfile::tempdir().unwrap();
        let arena = IndexArena::new(root.path());
        let first = arena.allocate("alice");
        let second = arena.allocate("alice");
        std::fs::create_dir_all(first.path()).unwrap();
        std::fs::create_dir_all(second.path()).unwrap();
        drop(first);
        assert!(second.path().exists());
    }

    #[test]
    fn keep_flag_preserves_directory() {
        let root = tempfile::tempdir().unwrap();
        let arena = IndexArena::new(root.path()).keep_after_use(true);
        let lease = arena.allocate("alice");
        std::fs::create_dir_all(lease.path()).unwrap();
        let path = lease.path().to_path_buf();
        drop(lease);
        assert!(path.exists());
    }
}
