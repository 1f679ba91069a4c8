//! File access for module resolvers.

use crate::{BridgeError, BridgeResult};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::path::Path;
use std::time::UNIX_EPOCH;

/// Read-only file access used to resolve and load module sources.
///
/// Paths use `/` separators.
pub trait FileSystem {
    /// Whether a regular file exists at `path`.
    fn exists(&self, path: &str) -> bool;

    /// Reads a whole file as UTF-8.
    fn read_to_string(&self, path: &str) -> BridgeResult<String>;

    /// A stamp that changes whenever the file changes, if known.
    fn modified(&self, path: &str) -> Option<u64>;
}

/// The local file system.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeFileSystem;

impl FileSystem for NativeFileSystem {
    fn exists(&self, path: &str) -> bool {
        Path::new(path).is_file()
    }

    fn read_to_string(&self, path: &str) -> BridgeResult<String> {
        std::fs::read_to_string(path).map_err(|err| BridgeError::Io {
            path: path.to_string(),
            message: err.to_string(),
        })
    }

    fn modified(&self, path: &str) -> Option<u64> {
        let modified = std::fs::metadata(path).ok()?.modified().ok()?;
        let elapsed = modified.duration_since(UNIX_EPOCH).ok()?;
        Some(elapsed.as_nanos() as u64)
    }
}

/// An in-memory file system.
///
/// Every write bumps the file's stamp, so reload detection works without
/// relying on timestamp resolution.
///
/// # Examples
///
/// ```
/// use bridge::{FileSystem, MemoryFileSystem};
///
/// let fs = MemoryFileSystem::new();
/// fs.write("res/config.json", "{}");
/// let first = fs.modified("res/config.json");
/// fs.write("res/config.json", r#"{"speed": 2}"#);
///
/// assert!(fs.exists("res/config.json"));
/// assert_ne!(fs.modified("res/config.json"), first);
/// ```
#[derive(Debug, Default)]
pub struct MemoryFileSystem {
    files: RefCell<HashMap<String, (String, u64)>>,
    clock: Cell<u64>,
}

impl MemoryFileSystem {
    /// Creates an empty file system.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or replaces a file.
    pub fn write(&self, path: &str, contents: &str) {
        let stamp = self.clock.get() + 1;
        self.clock.set(stamp);
        self.files
            .borrow_mut()
            .insert(path.to_string(), (contents.to_string(), stamp));
    }

    /// Removes a file. Returns false if it did not exist.
    pub fn remove(&self, path: &str) -> bool {
        self.files.borrow_mut().remove(path).is_some()
    }
}

impl FileSystem for MemoryFileSystem {
    fn exists(&self, path: &str) -> bool {
        self.files.borrow().contains_key(path)
    }

    fn read_to_string(&self, path: &str) -> BridgeResult<String> {
        self.files
            .borrow()
            .get(path)
            .map(|(contents, _)| contents.clone())
            .ok_or_else(|| BridgeError::Io {
                path: path.to_string(),
                message: "file not found".to_string(),
            })
    }

    fn modified(&self, path: &str) -> Option<u64> {
        self.files.borrow().get(path).map(|(_, stamp)| *stamp)
    }
}
