//! `Resource`: a minimal abstraction over "a byte stream with a
//! last-modified timestamp", used to decouple [`crate::key_strategy`]
//! backends from any particular storage medium (filesystem, classpath,
//! in-memory fixture).
//!
//! Mirrors the shape of a `StorageBackend`, but is deliberately narrower:
//! `KeyStrategy` only ever needs to read a resource in full and ask whether
//! it has changed since it was last read.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use parking_lot::RwLock;

/// A readable byte source that can report when it last changed, used by the
/// reloading `KeyStrategy` variants to decide whether a reload is worth
/// attempting at all.
pub trait Resource: Send + Sync + fmt::Debug {
    /// Reads the resource's full contents.
    fn read(&self) -> io::Result<Vec<u8>>;

    /// The resource's last-modified time, if the backing medium tracks one.
    /// `None` means "assume it may have changed"; callers should treat that
    /// as "always attempt a reload when asked".
    fn last_modified(&self) -> Option<SystemTime>;

    /// A human-readable description for log messages and error contexts.
    fn description(&self) -> String;
}

/// A resource backed by a file on disk.
#[derive(Debug, Clone)]
pub struct FileResource {
    path: PathBuf,
}

impl FileResource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl Resource for FileResource {
    fn read(&self) -> io::Result<Vec<u8>> {
        fs::read(&self.path)
    }

    fn last_modified(&self) -> Option<SystemTime> {
        fs::metadata(&self.path).ok()?.modified().ok()
    }

    fn description(&self) -> String {
        format!("file:{}", self.path.display())
    }
}

/// A resource whose contents live entirely in memory. The test suite uses
/// this to simulate a key-version file advancing without touching the
/// filesystem, and to exercise the "no modification time available" path
/// via [`InMemoryResource::without_modification_tracking`].
pub struct InMemoryResource {
    label: String,
    content: RwLock<Vec<u8>>,
    modified: RwLock<Option<SystemTime>>,
    track_modification: bool,
}

impl fmt::Debug for InMemoryResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("InMemoryResource")
            .field("label", &self.label)
            .finish()
    }
}

impl InMemoryResource {
    pub fn new(label: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            content: RwLock::new(content.into()),
            modified: RwLock::new(Some(SystemTime::now())),
            track_modification: true,
        }
    }

    pub fn without_modification_tracking(label: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self {
            label: label.into(),
            content: RwLock::new(content.into()),
            modified: RwLock::new(None),
            track_modification: false,
        }
    }

    /// Replaces the content and, unless modification tracking is disabled,
    /// bumps the last-modified timestamp so the next `should_reload` check
    /// observes the change.
    pub fn set_content(&self, content: impl Into<Vec<u8>>, now: SystemTime) {
        *self.content.write() = content.into();
        if self.track_modification {
            *self.modified.write() = Some(now);
        }
    }
}

impl Resource for InMemoryResource {
    fn read(&self) -> io::Result<Vec<u8>> {
        Ok(self.content.read().clone())
    }

    fn last_modified(&self) -> Option<SystemTime> {
        *self.modified.read()
    }

    fn description(&self) -> String {
        format!("memory:{}", self.label)
    }
}

/// Convenience constructor mirroring [`FileResource::new`] for call sites
/// that only have a borrowed path.
pub fn file(path: &Path) -> FileResource {
    FileResource::new(path.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn in_memory_resource_reports_updated_modification_time() {
        let res = InMemoryResource::new("versions", b"1".to_vec());
        let first = res.last_modified().unwrap();
        let later = first + Duration::from_secs(1);
        res.set_content(b"2".to_vec(), later);
        assert_eq!(res.read().unwrap(), b"2");
        assert_eq!(res.last_modified().unwrap(), later);
    }

    #[test]
    fn file_resource_roundtrips_through_tempfile() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("keystore.txt");
        fs::write(&path, b"hello").unwrap();
        let res = FileResource::new(&path);
        assert_eq!(res.read().unwrap(), b"hello");
        assert!(res.last_modified().is_some());
    }
}
