//! Storage medium claim and file-backed persistence.
//!
//! Only one component may touch the storage medium at a time. A
//! [`StorageMedium`] hands out a [`MediumClaim`] guard; a second claim
//! while the first is alive fails immediately with
//! [`Error::MediumBusy`]. The claim is released when the guard drops.
//!
//! [`FileStore`] implements [`Persistence`] on top of a claimed medium and
//! replaces its file atomically (temp file then rename), so a crash while
//! saving leaves either the old or the new blob, never a mix.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tracing::debug;

use crate::error::{Error, Result};

/// A blob store for one persisted record.
pub trait Persistence {
    /// Stored blob, or `None` when nothing was saved yet.
    fn load(&self) -> Result<Option<Vec<u8>>>;

    /// Replace the stored blob.
    fn save(&self, bytes: &[u8]) -> Result<()>;
}

/// Single-owner access to a storage root.
#[derive(Clone, Debug)]
pub struct StorageMedium {
    root: PathBuf,
    held: Arc<AtomicBool>,
}

impl StorageMedium {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            held: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Take exclusive ownership of the medium, or fail fast.
    pub fn claim(&self) -> Result<MediumClaim> {
        if self
            .held
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::MediumBusy(self.root.display().to_string()));
        }
        Ok(MediumClaim {
            held: Arc::clone(&self.held),
        })
    }
}

/// Guard for a claimed [`StorageMedium`].
#[derive(Debug)]
pub struct MediumClaim {
    held: Arc<AtomicBool>,
}

impl Drop for MediumClaim {
    fn drop(&mut self) {
        self.held.store(false, Ordering::Release);
    }
}

/// One file under a storage medium.
#[derive(Clone, Debug)]
pub struct FileStore {
    medium: StorageMedium,
    path: PathBuf,
}

impl FileStore {
    /// Store at `file_name` relative to the medium root.
    pub fn new(medium: StorageMedium, file_name: impl AsRef<Path>) -> Self {
        let path = medium.root().join(file_name);
        Self { medium, path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Persistence for FileStore {
    fn load(&self) -> Result<Option<Vec<u8>>> {
        let _claim = self.medium.claim()?;
        match fs::read(&self.path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save(&self, bytes: &[u8]) -> Result<()> {
        let _claim = self.medium.claim()?;
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp = self.path.with_extension("tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(bytes)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path().display(), len = bytes.len(), "saved blob");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_claim_is_busy_until_release() {
        let medium = StorageMedium::new("/unused");
        let claim = medium.claim().unwrap();
        assert!(matches!(medium.clone().claim(), Err(Error::MediumBusy(_))));

        drop(claim);
        assert!(medium.claim().is_ok());
    }

    #[test]
    fn missing_file_loads_as_none() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(StorageMedium::new(dir.path()), "snapshot.dat");
        assert_eq!(store.load().unwrap(), None);
    }

    #[test]
    fn save_replaces_previous_blob() {
        let dir = TempDir::new().unwrap();
        let store = FileStore::new(StorageMedium::new(dir.path()), "nested/snapshot.dat");

        store.save(b"first").unwrap();
        store.save(b"second").unwrap();

        assert_eq!(store.load().unwrap().as_deref(), Some(&b"second"[..]));
        assert!(!store.path().with_extension("tmp").exists());
    }

    #[test]
    fn store_fails_while_medium_is_claimed() {
        let dir = TempDir::new().unwrap();
        let medium = StorageMedium::new(dir.path());
        let store = FileStore::new(medium.clone(), "settings.dat");

        let _held = medium.claim().unwrap();
        assert!(matches!(store.save(b"x"), Err(Error::MediumBusy(_))));
        assert!(matches!(store.load(), Err(Error::MediumBusy(_))));
    }
}
