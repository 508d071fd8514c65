//! Scoped-resource guard for a pack `.keep` lock file.
//!
//! `Transport::fetch_refs` creates a `.keep` file alongside the incoming
//! pack so a concurrent `git gc` cannot remove it before the
//! orchestrator has updated the refs that point into it. Releasing that
//! lock on every exit path (success, per-ref rejection, or
//! cancellation) is expressed as a `Drop` impl rather than a dedicated
//! signal handler; a signal handler is layered on top only as a
//! last-chance belt, never the primary release mechanism.

use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct Keepfile {
    path: PathBuf,
}

impl Keepfile {
    pub fn new<P: AsRef<Path>>(path: P) -> Option<Self> {
        let path = path.as_ref();
        match path.extension() {
            Some(ext) if ext == "keep" => Some(Self {
                path: path.to_path_buf(),
            }),
            _ => None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Releases the lock without waiting for drop, surfacing the error
    /// instead of only logging it. Used by the orchestrator once it has
    /// durably committed the refs that depend on this pack.
    pub fn release(self) -> std::io::Result<()> {
        let path = self.path.clone();
        std::mem::forget(self);
        fs::remove_file(path)
    }
}

impl Drop for Keepfile {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            if e.kind() != std::io::ErrorKind::NotFound {
                log::warn!(target: "fetch", "failed to remove {:?}: {e}", self.path);
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn rejects_non_keep_extension() {
        assert!(Keepfile::new("/tmp/pack-abc.pack").is_none());
    }

    #[test]
    fn drop_removes_the_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pack-abc.keep");
        fs::write(&path, b"").unwrap();
        {
            let _guard = Keepfile::new(&path).unwrap();
        }
        assert!(!path.exists());
    }

    #[test]
    fn release_removes_without_double_free_on_drop() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("pack-abc.keep");
        fs::write(&path, b"").unwrap();
        let guard = Keepfile::new(&path).unwrap();
        guard.release().unwrap();
        assert!(!path.exists());
    }
}
