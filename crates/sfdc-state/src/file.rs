//! JSON file watermark store
//!
//! The file holds one JSON object mapping query keys to RFC 3339 strings.
//! Every commit rewrites the whole file through a sibling temp file and a
//! rename, so a crash mid-write leaves the previous state intact.

use crate::error::{StoreError, StoreResult};
use crate::watermark::{check_monotonic, WatermarkStore};
use parking_lot::Mutex;
use sfdc_query::{QueryKey, Watermark};
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Watermark store persisted to a JSON file
#[derive(Debug)]
pub struct JsonFileWatermarkStore {
    path: PathBuf,
    entries: Mutex<BTreeMap<String, String>>,
}

impl JsonFileWatermarkStore {
    /// Open the store at `path`
    ///
    /// A missing file is an empty store; it is created on first commit.
    ///
    /// # Errors
    /// Returns `StoreError` if the file exists but cannot be read or parsed
    pub fn open(path: impl Into<PathBuf>) -> StoreResult<Self> {
        let path = path.into();
        let entries = match fs::read(&path) {
            Ok(bytes) if bytes.iter().all(u8::is_ascii_whitespace) => BTreeMap::new(),
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| StoreError::Serde {
                path: path.clone(),
                source,
            })?,
            Err(e) if e.kind() == ErrorKind::NotFound => BTreeMap::new(),
            Err(e) => return Err(StoreError::io_error(path, e)),
        };
        tracing::debug!(path = %path.display(), watermarks = entries.len(), "opened state file");
        Ok(Self {
            path,
            entries: Mutex::new(entries),
        })
    }

    /// Path of the state file
    #[inline]
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, entries: &BTreeMap<String, String>) -> StoreResult<()> {
        let bytes = serde_json::to_vec_pretty(entries).map_err(|source| StoreError::Serde {
            path: self.path.clone(),
            source,
        })?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, bytes).map_err(|e| StoreError::io_error(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| StoreError::io_error(&self.path, e))
    }
}

fn parse(key: &QueryKey, raw: Option<&String>) -> StoreResult<Option<Watermark>> {
    raw.map(|value| {
        Watermark::parse(value).map_err(|source| StoreError::InvalidTimestamp {
            key: key.clone(),
            source,
        })
    })
    .transpose()
}

impl WatermarkStore for JsonFileWatermarkStore {
    fn load(&self, key: &QueryKey) -> StoreResult<Option<Watermark>> {
        parse(key, self.entries.lock().get(key.as_str()))
    }

    fn commit(&self, key: &QueryKey, watermark: Watermark) -> StoreResult<()> {
        let mut entries = self.entries.lock();
        let stored = parse(key, entries.get(key.as_str()))?;
        check_monotonic(key, stored, watermark)?;

        let previous = entries.insert(key.to_string(), watermark.to_string());
        if let Err(e) = self.persist(&entries) {
            match previous {
                Some(value) => entries.insert(key.to_string(), value),
                None => entries.remove(key.as_str()),
            };
            return Err(e);
        }
        tracing::debug!(%key, %watermark, path = %self.path.display(), "watermark persisted");
        Ok(())
    }
}
