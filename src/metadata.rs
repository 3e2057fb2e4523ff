//! Latest cached metadata of a single application.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::AppId;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetadataReport {
    pub store: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

/// Newest observation of `app_id` in `country` that carries attributes.
///
/// Placeholders are skipped. App bundles are reported as an error since
/// their data has a different shape.
pub fn latest(store: &Store, country: &str, app_id: AppId) -> Result<MetadataReport> {
    let app = store
        .get_application(app_id)?
        .ok_or(Error::UnknownApplication(app_id))?;

    for metadata in store.metadata_for(app_id, country)? {
        if metadata.data.get("attributes").is_none() {
            continue;
        }
        if metadata.data.get("type").and_then(Value::as_str) == Some("app-bundles") {
            return Err(Error::ApplicationBundle(app.to_string()));
        }
        return Ok(MetadataReport {
            store: metadata.store,
            source: metadata.source,
            timestamp: metadata.timestamp,
            data: metadata.data,
        });
    }

    Err(Error::NoMetadata(app.to_string()))
}
