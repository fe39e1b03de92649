//! JSON persistence for servers, records, cache and blocklist.
//!
//! The pipeline never touches disk; these files are loaded before the
//! proxy starts and written by commands or at shutdown.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use crate::cache::CachedRecord;
use crate::error::StoreError;
use crate::records::Record;
use crate::servers::UpstreamServer;

/// A JSON document holding a `T`.
///
/// A missing or empty file loads as `T::default()`.
pub struct JsonFile<T> {
    path: PathBuf,
    _doc: PhantomData<fn() -> T>,
}

impl<T> JsonFile<T>
where
    T: Serialize + DeserializeOwned + Default,
{
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _doc: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn load(&self) -> Result<T, StoreError> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
            Err(source) => return Err(self.io_err(source)),
        };
        if text.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&text).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })
    }

    /// Write via a temporary file and rename, so readers never see a partial document.
    pub fn save(&self, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: self.path.display().to_string(),
            source,
        })?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| self.io_err(e))?;
        }

        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, json).map_err(|e| self.io_err(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_err(e))
    }

    fn io_err(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.display().to_string(),
            source,
        }
    }
}

/// Directory holding the proxy's JSON documents.
#[derive(Debug, Clone)]
pub struct DataDir {
    root: PathBuf,
}

impl DataDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn servers(&self) -> JsonFile<Vec<UpstreamServer>> {
        JsonFile::new(self.root.join("servers.json"))
    }

    pub fn records(&self) -> JsonFile<Vec<Record>> {
        JsonFile::new(self.root.join("records.json"))
    }

    pub fn cache(&self) -> JsonFile<Vec<CachedRecord>> {
        JsonFile::new(self.root.join("cache.json"))
    }

    pub fn blocklist(&self) -> JsonFile<Vec<String>> {
        JsonFile::new(self.root.join("blocklist.json"))
    }
}
