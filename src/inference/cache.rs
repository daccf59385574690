//! Fingerprint-keyed memo of resolved parse parameters.
//!
//! Entries are immutable once inserted and replaced wholesale on update;
//! a changed file yields a new fingerprint, which is the only invalidation.

use crate::inference::params::ParseParameters;
use crate::spreadsheet::FileStat;
use chrono::DateTime;
use chrono::Utc;
use serde::Deserialize;
use serde::Serialize;
use sha2::Digest;
use sha2::Sha256;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::sync::PoisonError;
use std::sync::RwLock;
use std::time::UNIX_EPOCH;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Access cache file '{path}' failed: {source}")]
    IoError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid cache file '{path}': {source}")]
    FormatError {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Identifies one version of one sheet: sha256 over path, size, mtime and sheet id.
pub fn fingerprint(path: &Path, stat: &FileStat, sheet: Option<&str>) -> String {
    let mtime = stat.modified.duration_since(UNIX_EPOCH).map(|it| it.as_nanos()).unwrap_or(0);
    let mut hasher = Sha256::new();
    hasher.update(path.to_string_lossy().as_bytes());
    hasher.update([0u8]);
    hasher.update(stat.size.to_le_bytes());
    hasher.update(mtime.to_le_bytes());
    hasher.update([0u8]);
    hasher.update(sheet.unwrap_or_default().as_bytes());
    hex::encode(hasher.finalize())
}

#[derive(Clone, Debug, PartialEq)]
pub struct CacheEntry {
    pub fingerprint: String,
    pub params: ParseParameters,
    pub created_at: DateTime<Utc>,
}

/// On-disk form: the parameters flattened next to their timestamp.
#[derive(Serialize, Deserialize)]
struct StoredEntry {
    #[serde(flatten)]
    params: ParseParameters,
    timestamp: DateTime<Utc>,
}

/// Thread-safe map from fingerprint to resolved parameters, last writer wins.
#[derive(Debug, Default)]
pub struct FingerprintCache {
    entries: RwLock<HashMap<String, Arc<CacheEntry>>>,
}

impl FingerprintCache {
    pub fn new() -> FingerprintCache {
        FingerprintCache::default()
    }

    pub fn get(&self, fingerprint: &str) -> Option<ParseParameters> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(fingerprint).map(|entry| entry.params.clone())
    }

    /// Returns the whole entry, including its creation time.
    pub fn entry(&self, fingerprint: &str) -> Option<Arc<CacheEntry>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.get(fingerprint).cloned()
    }

    pub fn set(&self, fingerprint: impl Into<String>, params: ParseParameters) {
        let fingerprint = fingerprint.into();
        let entry = Arc::new(CacheEntry {
            fingerprint: fingerprint.clone(),
            params,
            created_at: Utc::now(),
        });
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        entries.insert(fingerprint, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.entries.write().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Writes the cache as a JSON map `fingerprint -> {skip_rows, header, confidence, warnings, tips, timestamp}`.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<(), CacheError> {
        let path = path.as_ref();
        let stored: BTreeMap<String, StoredEntry> = {
            let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
            entries
                .iter()
                .map(|(fingerprint, entry)| {
                    let stored = StoredEntry {
                        params: entry.params.clone(),
                        timestamp: entry.created_at,
                    };
                    (fingerprint.to_owned(), stored)
                })
                .collect()
        };
        let json = serde_json::to_string_pretty(&stored).map_err(|source| CacheError::FormatError {
            path: path.display().to_string(),
            source,
        })?;
        std::fs::write(path, json).map_err(|source| CacheError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        debug!(path = %path.display(), entries = stored.len(), "saved cache");
        Ok(())
    }

    /// Reads a cache written by [`FingerprintCache::save`].
    pub fn load<P: AsRef<Path>>(path: P) -> Result<FingerprintCache, CacheError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| CacheError::IoError {
            path: path.display().to_string(),
            source,
        })?;
        let stored: HashMap<String, StoredEntry> = serde_json::from_str(&json).map_err(|source| CacheError::FormatError {
            path: path.display().to_string(),
            source,
        })?;
        let entries = stored
            .into_iter()
            .map(|(fingerprint, stored)| {
                let entry = CacheEntry {
                    fingerprint: fingerprint.clone(),
                    params: stored.params,
                    created_at: stored.timestamp,
                };
                (fingerprint, Arc::new(entry))
            })
            .collect::<HashMap<_, _>>();
        debug!(path = %path.display(), entries = entries.len(), "loaded cache");
        Ok(FingerprintCache {
            entries: RwLock::new(entries),
        })
    }
}
