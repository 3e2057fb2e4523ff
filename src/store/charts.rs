use chrono::{DateTime, Utc};
use rusqlite::{params, OptionalExtension, Row};

use super::applications::application_from_row;
use super::Store;
use crate::error::Result;
use crate::model::{AppId, AppStore, Chart, ChartEntry, ChartType, Genre};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenreChange {
    Created,
    Updated,
    Unchanged,
}

fn chart_from_row(row: &Row) -> rusqlite::Result<Chart> {
    let chart_type: String = row.get(3)?;
    let chart_type: ChartType = chart_type
        .parse()
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e)))?;

    Ok(Chart {
        id: row.get(0)?,
        store: row.get(1)?,
        genre: row.get(2)?,
        chart_type,
        timestamp: row.get(4)?,
        scan_run: row.get(5)?,
    })
}

impl Store {
    /// Creates the genre or fills in a changed name or parent.
    ///
    /// `None` leaves the stored value alone, so a chart that only knows the
    /// genre id never erases a name learned from the category listing.
    pub fn upsert_genre(&self, itunes_id: u32, name: Option<&str>, parent: Option<u32>) -> Result<GenreChange> {
        let Some(current) = self.get_genre(itunes_id)? else {
            self.conn.execute(
                "INSERT INTO genres (itunes_id, name, parent_id) VALUES (?1, ?2, ?3)",
                params![itunes_id, name, parent],
            )?;
            let genre = Genre { itunes_id, name: name.map(str::to_string), parent };
            tracing::info!(genre = %genre, "added genre");
            return Ok(GenreChange::Created);
        };

        let new_name = name.filter(|n| current.name.as_deref() != Some(*n));
        let new_parent = parent.filter(|p| current.parent != Some(*p));
        if new_name.is_none() && new_parent.is_none() {
            return Ok(GenreChange::Unchanged);
        }

        self.conn.execute(
            "UPDATE genres SET name = COALESCE(?2, name), parent_id = COALESCE(?3, parent_id)
             WHERE itunes_id = ?1",
            params![itunes_id, new_name, new_parent],
        )?;
        tracing::info!(genre = itunes_id, name = ?new_name, parent = ?new_parent, "updated genre");
        Ok(GenreChange::Updated)
    }

    pub fn get_genre(&self, itunes_id: u32) -> Result<Option<Genre>> {
        let genre = self
            .conn
            .query_row(
                "SELECT itunes_id, name, parent_id FROM genres WHERE itunes_id = ?1",
                params![itunes_id],
                |row| Ok(Genre { itunes_id: row.get(0)?, name: row.get(1)?, parent: row.get(2)? }),
            )
            .optional()?;
        Ok(genre)
    }

    /// All genres, ordered by name then id (unnamed genres last).
    pub fn list_genres(&self) -> Result<Vec<Genre>> {
        let mut stmt = self.conn.prepare(
            "SELECT itunes_id, name, parent_id FROM genres
             ORDER BY name IS NULL, name, itunes_id",
        )?;
        let genres = stmt
            .query_map([], |row| {
                Ok(Genre { itunes_id: row.get(0)?, name: row.get(1)?, parent: row.get(2)? })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(genres)
    }

    pub fn chart_exists(&self, store: &AppStore, genre: u32, chart_type: ChartType, at: DateTime<Utc>) -> Result<bool> {
        let found = self
            .conn
            .query_row(
                "SELECT 1 FROM charts
                 WHERE store = ?1 AND genre = ?2 AND chart_type = ?3 AND timestamp = ?4",
                params![store.country(), genre, chart_type.as_str(), at],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    /// Inserts a chart snapshot with its applications in rank order.
    ///
    /// Positions are 1-based and follow the order of `app_ids`. An id that
    /// shows up twice keeps its first position. Every application must
    /// already exist.
    pub fn insert_chart(
        &self,
        store: &AppStore,
        genre: u32,
        chart_type: ChartType,
        at: DateTime<Utc>,
        scan_run: Option<i64>,
        app_ids: &[AppId],
    ) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO charts (store, genre, chart_type, timestamp, scan_run)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![store.country(), genre, chart_type.as_str(), at, scan_run],
        )?;
        let chart_id = self.conn.last_insert_rowid();

        let mut stmt = self.conn.prepare_cached(
            "INSERT OR IGNORE INTO chart_entries (chart_id, position, itunes_id) VALUES (?1, ?2, ?3)",
        )?;
        for (index, app_id) in app_ids.iter().enumerate() {
            let position = u32::try_from(index + 1).unwrap_or(u32::MAX);
            if stmt.execute(params![chart_id, position, app_id])? == 0 {
                tracing::warn!(chart = chart_id, app = app_id, position, "application listed twice in chart");
            }
        }

        Ok(chart_id)
    }

    /// Most recent chart for (store, genre, type).
    pub fn latest_chart(&self, store: &str, genre: u32, chart_type: ChartType) -> Result<Option<Chart>> {
        let chart = self
            .conn
            .query_row(
                "SELECT id, store, genre, chart_type, timestamp, scan_run
                 FROM charts
                 WHERE store = ?1 AND genre = ?2 AND chart_type = ?3
                 ORDER BY timestamp DESC, id DESC
                 LIMIT 1",
                params![store, genre, chart_type.as_str()],
                chart_from_row,
            )
            .optional()?;
        Ok(chart)
    }

    /// Entries of a chart by ascending position.
    pub fn chart_entries(&self, chart_id: i64) -> Result<Vec<ChartEntry>> {
        let mut stmt = self.conn.prepare(
            "SELECT e.position, a.itunes_id, a.bundle_id, a.name, a.genre, a.kind,
                    a.metadata, a.metadata_at, a.last_seen
             FROM chart_entries e
             JOIN applications a ON a.itunes_id = e.itunes_id
             WHERE e.chart_id = ?1
             ORDER BY e.position ASC",
        )?;

        let entries = stmt
            .query_map(params![chart_id], |row| {
                Ok(ChartEntry {
                    position: row.get(0)?,
                    application: application_from_row(row, 1)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}
