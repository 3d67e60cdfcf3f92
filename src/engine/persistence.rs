use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use log::{debug, info};
use tempfile::NamedTempFile;
use thiserror::Error;
use crate::Record;

#[allow(unused_imports)]
use crate::engine::DocumentStore;

/// Failures reading or writing the backing document.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("could not access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed document {}: {source}", path.display())]
    Malformed {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Whole-document storage behind a [`DocumentStore`].
pub trait Backend: Send + Sync {
    /// Reads the full document.
    fn load(&self) -> Result<Vec<Record>, StorageError>;
    /// Replaces the full document.
    fn save(&self, records: &[Record]) -> Result<(), StorageError>;
}

/// Handles disk I/O for the [`DocumentStore`].
///
/// The document is one JSON array of records. Every save rewrites the whole
/// file through a temporary sibling that is renamed over the target, so a
/// reader never observes a half-written document.
pub struct Persistence {
    path: PathBuf,
}

impl Persistence {
    /// Opens the document at `path`, creating it (holding `[]`) if it is absent.
    ///
    /// On unix the file is restricted to owner read/write, including when it
    /// already existed.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let io_err = |source| StorageError::Io { path: path.clone(), source };

        if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
            if !dir.exists() {
                fs::create_dir_all(dir).map_err(io_err)?;
            }
        }

        let persistence = Self { path: path.clone() };
        if !path.exists() {
            info!("Creating empty document at {}", path.display());
            persistence.save(&[])?;
        }
        restrict_permissions(&path).map_err(io_err)?;

        Ok(persistence)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads and parses the whole document.
    pub fn load(&self) -> Result<Vec<Record>, StorageError> {
        let content = fs::read(&self.path).map_err(|source| StorageError::Io {
            path: self.path.clone(),
            source,
        })?;
        serde_json::from_slice(&content).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })
    }

    /// Replaces the document with `records`, pretty-printed with 2-space indent.
    ///
    /// The temp file is created next to the target (same filesystem, so the
    /// rename is atomic) with owner-only permissions.
    pub fn save(&self, records: &[Record]) -> Result<(), StorageError> {
        let io_err = |source| StorageError::Io { path: self.path.clone(), source };

        let bytes = serde_json::to_vec_pretty(records).map_err(|source| StorageError::Malformed {
            path: self.path.clone(),
            source,
        })?;

        let dir = match self.path.parent() {
            Some(d) if !d.as_os_str().is_empty() => d,
            _ => Path::new("."),
        };
        let mut tmp = NamedTempFile::new_in(dir).map_err(io_err)?;
        tmp.write_all(&bytes).map_err(io_err)?;
        tmp.as_file().sync_all().map_err(io_err)?;
        tmp.persist(&self.path).map_err(|e| io_err(e.error))?;

        debug!("Wrote {} records to {}", records.len(), self.path.display());
        Ok(())
    }
}

impl Backend for Persistence {
    fn load(&self) -> Result<Vec<Record>, StorageError> {
        Persistence::load(self)
    }

    fn save(&self, records: &[Record]) -> Result<(), StorageError> {
        Persistence::save(self, records)
    }
}

#[cfg(unix)]
fn restrict_permissions(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    fs::set_permissions(path, fs::Permissions::from_mode(0o600))
}

#[cfg(not(unix))]
fn restrict_permissions(_path: &Path) -> io::Result<()> {
    Ok(())
}
