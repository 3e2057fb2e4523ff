//! SQLite research database.
//!
//! Tables:
//! - stores, genres: storefronts and the genre tree
//! - applications: one row per iTunes id, merged from every observation
//! - metadata: raw app objects per (application, store, source, timestamp)
//! - charts, chart_entries: append-only chart snapshots
//! - scan_runs: one row per `scan` invocation
//!
//! Open once per command and reuse the handle for every operation.

pub mod applications;
pub mod charts;
pub mod schema;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;

use crate::error::{Error, Result};
use crate::model::{AppStore, ScanCounts, ScanRun};

pub use applications::{ApplicationChange, MetadataChange};
pub use charts::GenreChange;

/// How to treat a cached app object that differs from the stored
/// observation with the same application, store, source, and timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum ConflictPolicy {
    /// Keep the stored observation
    #[default]
    Keep,
    /// Replace it with the cached one
    Update,
    /// Stop the scan
    Abort,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::migrate(&conn)?;
        Ok(Store { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::migrate(&conn)?;
        Ok(Store { conn })
    }

    /// Runs `f` inside one transaction; any error rolls everything back.
    pub fn atomically<T>(&self, f: impl FnOnce(&Store) -> Result<T>) -> Result<T> {
        let tx = self.conn.unchecked_transaction()?;
        let value = f(self)?;
        tx.commit()?;
        Ok(value)
    }

    /// Returns true if the store was not known yet.
    pub fn ensure_store(&self, store: &AppStore) -> Result<bool> {
        let inserted = self.conn.execute(
            "INSERT OR IGNORE INTO stores (country) VALUES (?1)",
            params![store.country()],
        )?;
        Ok(inserted == 1)
    }

    pub fn store_exists(&self, country: &str) -> Result<bool> {
        let found = self
            .conn
            .query_row("SELECT 1 FROM stores WHERE country = ?1", params![country], |_| Ok(()))
            .optional()?;
        Ok(found.is_some())
    }

    /// First store by country code; most databases only ever see one.
    pub fn first_store(&self) -> Result<Option<String>> {
        let country = self
            .conn
            .query_row("SELECT country FROM stores ORDER BY country LIMIT 1", [], |row| row.get(0))
            .optional()?;
        Ok(country)
    }

    /// The requested store if it is known, otherwise the first store.
    pub fn resolve_store(&self, requested: Option<&str>) -> Result<String> {
        match requested {
            Some(country) => {
                let store = AppStore::new(country)?;
                if !self.store_exists(store.country())? {
                    return Err(Error::UnknownStore(country.to_string()));
                }
                Ok(store.country().to_string())
            }
            None => self.first_store()?.ok_or(Error::NoStores),
        }
    }

    pub fn begin_scan_run(&self, cache_file: &str, started_at: DateTime<Utc>) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO scan_runs (started_at, cache_file) VALUES (?1, ?2)",
            params![started_at, cache_file],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    pub fn finish_scan_run(&self, id: i64, counts: &ScanCounts, finished_at: DateTime<Utc>) -> Result<()> {
        self.conn.execute(
            "UPDATE scan_runs SET finished_at = ?2, resources = ?3, skipped = ?4,
                 applications_added = ?5, observations_added = ?6, genres_added = ?7, charts_added = ?8
             WHERE id = ?1",
            params![
                id,
                finished_at,
                to_sql_count(counts.resources),
                to_sql_count(counts.skipped),
                to_sql_count(counts.applications_added),
                to_sql_count(counts.observations_added),
                to_sql_count(counts.genres_added),
                to_sql_count(counts.charts_added),
            ],
        )?;
        Ok(())
    }

    /// Scan runs, newest first.
    pub fn list_scan_runs(&self, limit: usize) -> Result<Vec<ScanRun>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, started_at, finished_at, cache_file, resources, skipped,
                    applications_added, observations_added, genres_added, charts_added
             FROM scan_runs
             ORDER BY started_at DESC, id DESC
             LIMIT ?1",
        )?;

        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let runs = stmt
            .query_map(params![limit], |row| {
                Ok(ScanRun {
                    id: row.get(0)?,
                    started_at: row.get(1)?,
                    finished_at: row.get(2)?,
                    cache_file: row.get(3)?,
                    counts: ScanCounts {
                        resources: from_sql_count(row.get(4)?),
                        skipped: from_sql_count(row.get(5)?),
                        applications_added: from_sql_count(row.get(6)?),
                        observations_added: from_sql_count(row.get(7)?),
                        genres_added: from_sql_count(row.get(8)?),
                        charts_added: from_sql_count(row.get(9)?),
                    },
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(runs)
    }
}

fn to_sql_count(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn from_sql_count(value: i64) -> u64 {
    value.max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn stores_are_inserted_once() {
        let store = Store::open_in_memory().unwrap();
        let us = AppStore::new("us").unwrap();
        assert!(store.ensure_store(&us).unwrap());
        assert!(!store.ensure_store(&us).unwrap());
        assert!(store.store_exists("us").unwrap());
        assert!(!store.store_exists("de").unwrap());
    }

    #[test]
    fn first_store_orders_by_country() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.first_store().unwrap(), None);
        store.ensure_store(&AppStore::new("us").unwrap()).unwrap();
        store.ensure_store(&AppStore::new("de").unwrap()).unwrap();
        assert_eq!(store.first_store().unwrap().as_deref(), Some("de"));
    }

    #[test]
    fn resolve_store_checks_requested_country() {
        let store = Store::open_in_memory().unwrap();
        assert!(matches!(store.resolve_store(None), Err(Error::NoStores)));

        store.ensure_store(&AppStore::new("us").unwrap()).unwrap();
        assert_eq!(store.resolve_store(None).unwrap(), "us");
        assert_eq!(store.resolve_store(Some("us")).unwrap(), "us");
        assert!(matches!(store.resolve_store(Some("de")), Err(Error::UnknownStore(_))));
        assert!(matches!(store.resolve_store(Some("USA")), Err(Error::InvalidCountry(_))));
    }

    #[test]
    fn failed_transaction_rolls_back() {
        let store = Store::open_in_memory().unwrap();
        let result: Result<()> = store.atomically(|s| {
            s.ensure_store(&AppStore::new("us").unwrap())?;
            Err(Error::NoCharts)
        });
        assert!(result.is_err());
        assert!(!store.store_exists("us").unwrap());
    }

    #[test]
    fn scan_runs_record_counts() {
        let store = Store::open_in_memory().unwrap();
        let first = Utc.with_ymd_and_hms(2020, 5, 1, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2020, 5, 2, 10, 0, 0).unwrap();

        let a = store.begin_scan_run("/cache/Cache.db", first).unwrap();
        let b = store.begin_scan_run("/cache/Cache.db", second).unwrap();
        let counts = ScanCounts { resources: 3, charts_added: 2, ..ScanCounts::default() };
        store.finish_scan_run(b, &counts, second).unwrap();

        let runs = store.list_scan_runs(10).unwrap();
        assert_eq!(runs.len(), 2);
        assert_eq!(runs[0].id, b);
        assert_eq!(runs[0].counts, counts);
        assert_eq!(runs[0].finished_at, Some(second));
        assert_eq!(runs[1].id, a);
        assert_eq!(runs[1].finished_at, None);

        assert_eq!(store.list_scan_runs(1).unwrap().len(), 1);
    }
}
