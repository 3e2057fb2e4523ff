//! Reader for the App Store client's URL cache.
//!
//! The client keeps a CFNetwork cache: `Cache.db` indexes every response
//! by request url, and the body is either stored inline as a blob or, for
//! larger responses, in a file under `fsCachedData/` named by the text
//! stored in its place.

pub mod decode;

use chrono::{DateTime, NaiveDateTime, Utc};
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::error::Result;

pub const INDEX_FILE: &str = "Cache.db";
pub const DATA_DIR: &str = "fsCachedData";
pub const API_PREFIX: &str = "https://api.apps.apple.com/v1/";

/// Why a single cached response could not be turned into a document.
#[derive(Debug, Error)]
pub enum PayloadError {
    #[error("cached file {path} could not be read: {source}")]
    Unreadable {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cached data is not in a known format: {0}")]
    Unrecognized(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverData {
    Inline(Vec<u8>),
    /// Name of a file in fsCachedData.
    OnDisk(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct CachedResponse {
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: ReceiverData,
    /// What the index claims about where the body lives.
    pub on_fs: bool,
}

pub struct CacheDir {
    root: PathBuf,
}

impl CacheDir {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        CacheDir { root: root.into() }
    }

    pub fn index_path(&self) -> PathBuf {
        self.root.join(INDEX_FILE)
    }

    pub fn data_dir(&self) -> PathBuf {
        self.root.join(DATA_DIR)
    }

    pub fn exists(&self) -> bool {
        self.index_path().is_file()
    }

    /// All cached MAS api responses, in index order.
    ///
    /// Rows with an unreadable timestamp or an empty body are skipped with
    /// a warning.
    pub fn read_responses(&self) -> Result<Vec<CachedResponse>> {
        let conn = Connection::open_with_flags(
            self.index_path(),
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        let mut stmt = conn.prepare(
            "SELECT
                 cfurl_cache_response.request_key,
                 cfurl_cache_response.time_stamp,
                 cfurl_cache_receiver_data.receiver_data,
                 cfurl_cache_receiver_data.isDataOnFS
             FROM cfurl_cache_response, cfurl_cache_receiver_data
             WHERE cfurl_cache_response.entry_ID = cfurl_cache_receiver_data.entry_ID
               AND cfurl_cache_response.request_key LIKE ?1
             ORDER BY cfurl_cache_response.entry_ID",
        )?;

        let pattern = format!("{API_PREFIX}%");
        let mut rows = stmt.query([pattern])?;
        let mut responses = Vec::new();

        while let Some(row) = rows.next()? {
            let source: String = row.get(0)?;
            let raw_timestamp: String = row.get(1)?;
            let on_fs = row.get::<_, Option<i64>>(3)?.unwrap_or(0) != 0;

            let Some(timestamp) = parse_cache_timestamp(&raw_timestamp) else {
                tracing::warn!(source = %source, timestamp = %raw_timestamp, "unreadable cache timestamp, skipping");
                continue;
            };

            let data = match row.get_ref(2)? {
                ValueRef::Blob(bytes) => ReceiverData::Inline(bytes.to_vec()),
                ValueRef::Text(text) => ReceiverData::OnDisk(String::from_utf8_lossy(text).into_owned()),
                ValueRef::Null | ValueRef::Integer(_) | ValueRef::Real(_) => {
                    tracing::warn!(source = %source, "cache entry has no body, skipping");
                    continue;
                }
            };

            responses.push(CachedResponse { source, timestamp, data, on_fs });
        }

        Ok(responses)
    }

    /// Loads and decodes the body of a cached response.
    pub fn load(&self, response: &CachedResponse) -> std::result::Result<Value, PayloadError> {
        match &response.data {
            ReceiverData::Inline(bytes) => decode::decode(bytes),
            ReceiverData::OnDisk(name) => {
                if !response.on_fs {
                    tracing::warn!(resource = %name, "resource might not be cached, trying to locate anyway");
                }
                let path = self.data_dir().join(name);
                let bytes = std::fs::read(&path).map_err(|source| PayloadError::Unreadable { path, source })?;
                decode::decode(&bytes)
            }
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

const NAIVE_FORMATS: [&str; 2] = ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"];

/// Cache timestamps are UTC without a zone ("2020-05-01 10:00:00", with a
/// space or a 'T'); a zoned RFC 3339 value is accepted as well.
pub fn parse_cache_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(naive.and_utc());
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
