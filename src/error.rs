//! Crate-wide error type.

use std::path::PathBuf;

use crate::model::AppId;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid settings file {path}: {reason}")]
    Settings { path: PathBuf, reason: String },

    #[error("could not determine {0} directory")]
    NoProjectDir(&'static str),

    #[error("the App Store cache only exists on macOS, pass --cache-dir to scan a copied cache")]
    UnsupportedPlatform,

    #[error("invalid store country code '{0}', expected two lowercase letters")]
    InvalidCountry(String),

    #[error("unknown store: {0}")]
    UnknownStore(String),

    #[error("unknown genre: {0}")]
    UnknownGenre(u32),

    #[error("no stores in the database, run 'mas-cache scan' first")]
    NoStores,

    #[error("No charts found.")]
    NoCharts,

    #[error("application not found: {0}")]
    UnknownApplication(AppId),

    #[error("ID belongs to an application bundle: {0}")]
    ApplicationBundle(String),

    #[error("No metadata for app: {0}")]
    NoMetadata(String),

    #[error("aborted: cached metadata for {app} in {store} differs from the stored observation ({source_url} at {timestamp})")]
    ConflictAborted {
        app: AppId,
        store: String,
        source_url: String,
        timestamp: String,
    },
}
