// Audit Storage
//
// Durability contract for audit records, plus the filesystem and
// in-memory implementations.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{AuditEntry, AuditError};

/// Where a record was stored.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AuditLocation(String);

impl AuditLocation {
    pub fn new(location: impl Into<String>) -> Self {
        Self(location.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AuditLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Storage backend for the audit log.
///
/// Implementations MUST NOT:
/// - overwrite an existing record
/// - mutate a record once stored
pub trait AuditStore: Send + Sync {
    /// Persist a new record.
    fn append(&mut self, entry: &AuditEntry) -> Result<AuditLocation, AuditError>;

    /// Reload a stored record.
    fn load(&self, location: &AuditLocation) -> Result<AuditEntry, AuditError>;
}

/// One indented JSON document per record in a directory.
#[derive(Debug, Clone)]
pub struct FsAuditStore {
    dir: PathBuf,
}

impl FsAuditStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn io_error(path: &Path, source: std::io::Error) -> AuditError {
        AuditError::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

impl AuditStore for FsAuditStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<AuditLocation, AuditError> {
        fs::create_dir_all(&self.dir).map_err(|e| Self::io_error(&self.dir, e))?;

        let path = self.dir.join(format!("{}.json", entry.file_stem()));
        let body = serde_json::to_string_pretty(entry)?;

        write_new(&path, |file| {
            file.write_all(body.as_bytes())?;
            file.sync_all()
        })?;

        Ok(AuditLocation::new(path.display().to_string()))
    }

    fn load(&self, location: &AuditLocation) -> Result<AuditEntry, AuditError> {
        let path = Path::new(location.as_str());
        let body = fs::read_to_string(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => AuditError::NotFound(location.to_string()),
            _ => Self::io_error(path, e),
        })?;
        Ok(serde_json::from_str(&body)?)
    }
}

/// Create `path` exclusively and fill it with `write`.
///
/// A failed write removes the file so no partial record is left behind.
fn write_new(
    path: &Path,
    write: impl FnOnce(&mut File) -> std::io::Result<()>,
) -> Result<(), AuditError> {
    let mut file = OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| match e.kind() {
            ErrorKind::AlreadyExists => AuditError::AlreadyExists(path.display().to_string()),
            _ => FsAuditStore::io_error(path, e),
        })?;

    write(&mut file).map_err(|e| {
        drop(file);
        let _ = fs::remove_file(path);
        FsAuditStore::io_error(path, e)
    })
}

/// Serialized records kept in memory, in append order.
#[derive(Debug, Default)]
pub struct InMemoryAuditStore {
    records: Vec<(AuditLocation, String)>,
}

impl InMemoryAuditStore {
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn raw(&self, location: &AuditLocation) -> Option<&str> {
        self.records
            .iter()
            .find(|(l, _)| l == location)
            .map(|(_, body)| body.as_str())
    }
}

impl AuditStore for InMemoryAuditStore {
    fn append(&mut self, entry: &AuditEntry) -> Result<AuditLocation, AuditError> {
        let location = AuditLocation::new(entry.file_stem());
        if self.raw(&location).is_some() {
            return Err(AuditError::AlreadyExists(location.to_string()));
        }
        let body = serde_json::to_string_pretty(entry)?;
        self.records.push((location.clone(), body));
        Ok(location)
    }

    fn load(&self, location: &AuditLocation) -> Result<AuditEntry, AuditError> {
        let body = self
            .raw(location)
            .ok_or_else(|| AuditError::NotFound(location.to_string()))?;
        Ok(serde_json::from_str(body)?)
    }
}
