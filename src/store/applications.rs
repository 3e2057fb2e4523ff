use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};
use serde_json::Value;

use super::{ConflictPolicy, Store};
use crate::error::{Error, Result};
use crate::model::{AppId, AppKind, AppObservation, AppStore, Application, Metadata};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplicationChange {
    Created,
    Updated,
    Unchanged,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetadataChange {
    Inserted,
    /// Same identity, same data.
    Unchanged,
    /// Same identity, different data, stored copy kept.
    Kept,
    /// Same identity, different data, stored copy replaced.
    Replaced,
}

const APPLICATION_COLUMNS: &str =
    "itunes_id, bundle_id, name, genre, kind, metadata, metadata_at, last_seen";

pub(super) fn application_from_row(row: &Row, offset: usize) -> rusqlite::Result<Application> {
    let kind: String = row.get(offset + 4)?;
    Ok(Application {
        itunes_id: row.get(offset)?,
        bundle_id: row.get(offset + 1)?,
        name: row.get(offset + 2)?,
        genre: row.get(offset + 3)?,
        kind: AppKind::from_db(&kind),
        metadata: row.get(offset + 5)?,
        metadata_at: row.get(offset + 6)?,
        last_seen: row.get(offset + 7)?,
    })
}

impl Store {
    pub fn get_application(&self, itunes_id: AppId) -> Result<Option<Application>> {
        let sql = format!("SELECT {APPLICATION_COLUMNS} FROM applications WHERE itunes_id = ?1");
        let app = self
            .conn
            .query_row(&sql, params![itunes_id], |row| application_from_row(row, 0))
            .optional()?;
        Ok(app)
    }

    pub fn count_applications(&self) -> Result<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM applications", [], |row| row.get(0))?;
        Ok(count.max(0) as u64)
    }

    fn bundle_owner(&self, bundle_id: &str) -> Result<Option<AppId>> {
        let owner = self
            .conn
            .query_row(
                "SELECT itunes_id FROM applications WHERE bundle_id = ?1",
                params![bundle_id],
                |row| row.get(0),
            )
            .optional()?;
        Ok(owner)
    }

    /// Creates or merges the application row for one observation.
    ///
    /// Rows are keyed by iTunes id, so observing the same app any number
    /// of times leaves a single row.
    pub fn observe_application(&self, obs: &AppObservation, at: DateTime<Utc>) -> Result<ApplicationChange> {
        let existing = self.get_application(obs.itunes_id)?;
        let (mut app, change) = match existing {
            Some(mut app) => {
                let changed = app.observe(obs, at);
                if !changed {
                    return Ok(ApplicationChange::Unchanged);
                }
                (app, ApplicationChange::Updated)
            }
            None => (Application::from_observation(obs, at), ApplicationChange::Created),
        };

        if let Some(bundle_id) = app.bundle_id.clone() {
            if let Some(owner) = self.bundle_owner(&bundle_id)? {
                if owner != app.itunes_id {
                    tracing::warn!(
                        bundle_id = %bundle_id,
                        owner,
                        itunes_id = app.itunes_id,
                        "bundle id already belongs to another application, not reassigning"
                    );
                    app.bundle_id = self
                        .get_application(app.itunes_id)?
                        .and_then(|stored| stored.bundle_id);
                }
            }
        }

        self.conn.execute(
            "INSERT INTO applications (itunes_id, bundle_id, name, genre, kind, metadata, metadata_at, last_seen)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(itunes_id) DO UPDATE SET
                 bundle_id = excluded.bundle_id,
                 name = excluded.name,
                 genre = excluded.genre,
                 kind = excluded.kind,
                 metadata = excluded.metadata,
                 metadata_at = excluded.metadata_at,
                 last_seen = excluded.last_seen",
            params![
                app.itunes_id,
                app.bundle_id,
                app.name,
                app.genre,
                app.kind.as_str(),
                app.metadata,
                app.metadata_at,
                app.last_seen,
            ],
        )?;

        if change == ApplicationChange::Created {
            tracing::info!(app = %app, "added new application");
        }

        Ok(change)
    }

    /// Stores the raw app object seen at `source` / `at` in `store`.
    ///
    /// The application row must already exist.
    pub fn record_metadata(
        &self,
        obs: &AppObservation,
        store: &AppStore,
        source: &str,
        at: DateTime<Utc>,
        policy: ConflictPolicy,
    ) -> Result<MetadataChange> {
        let existing: Option<(i64, Value)> = self
            .conn
            .query_row(
                "SELECT id, data FROM metadata
                 WHERE itunes_id = ?1 AND store = ?2 AND source = ?3 AND timestamp = ?4",
                params![obs.itunes_id, store.country(), source, at],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((id, stored)) = existing else {
            self.conn.execute(
                "INSERT INTO metadata (itunes_id, store, source, timestamp, data)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![obs.itunes_id, store.country(), source, at, obs.data],
            )?;
            return Ok(MetadataChange::Inserted);
        };

        if stored == obs.data {
            return Ok(MetadataChange::Unchanged);
        }

        tracing::warn!(
            app = obs.itunes_id,
            store = %store,
            source,
            timestamp = %at,
            "cached entries are different"
        );
        for line in changed_lines(&stored, &obs.data) {
            tracing::debug!("{line}");
        }

        match policy {
            ConflictPolicy::Keep => Ok(MetadataChange::Kept),
            ConflictPolicy::Update => {
                self.conn.execute(
                    "UPDATE metadata SET data = ?2 WHERE id = ?1",
                    params![id, obs.data],
                )?;
                Ok(MetadataChange::Replaced)
            }
            ConflictPolicy::Abort => Err(Error::ConflictAborted {
                app: obs.itunes_id,
                store: store.country().to_string(),
                source_url: source.to_string(),
                timestamp: at.to_rfc3339(),
            }),
        }
    }

    /// Metadata of an application in a store, newest first.
    pub fn metadata_for(&self, itunes_id: AppId, store: &str) -> Result<Vec<Metadata>> {
        let mut stmt = self.conn.prepare(
            "SELECT itunes_id, store, source, timestamp, data
             FROM metadata
             WHERE itunes_id = ?1 AND store = ?2
             ORDER BY timestamp DESC, id DESC",
        )?;

        let rows = stmt
            .query_map(params![itunes_id, store], |row| {
                Ok(Metadata {
                    itunes_id: row.get(0)?,
                    store: row.get(1)?,
                    source: row.get(2)?,
                    timestamp: row.get(3)?,
                    data: row.get(4)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(rows)
    }
}

/// Lines of the pretty-printed documents that only one side has,
/// prefixed with `-` (stored) or `+` (cached).
fn changed_lines(stored: &Value, cached: &Value) -> Vec<String> {
    let render = |v: &Value| serde_json::to_string_pretty(v).unwrap_or_default();
    let old = render(stored);
    let new = render(cached);
    let old_lines: Vec<&str> = old.lines().collect();
    let new_lines: Vec<&str> = new.lines().collect();

    let removed = old_lines
        .iter()
        .filter(|l| !new_lines.contains(l))
        .map(|l| format!("- {l}"));
    let added = new_lines
        .iter()
        .filter(|l| !old_lines.contains(l))
        .map(|l| format!("+ {l}"));

    removed.chain(added).collect()
}
