//! Schema migrations, tracked in `PRAGMA user_version`.

use rusqlite::Connection;

pub const SCHEMA_VERSION: i64 = 2;

pub fn migrate(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "PRAGMA foreign_keys = ON;
         PRAGMA journal_mode = WAL;
         PRAGMA synchronous = NORMAL;",
    )?;

    let mut version: i64 = conn.pragma_query_value(None, "user_version", |row| row.get(0))?;

    if version < 1 {
        apply_migration_1(conn)?;
        version = 1;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version < 2 {
        apply_migration_2(conn)?;
        version = 2;
        conn.pragma_update(None, "user_version", version)?;
    }

    if version > SCHEMA_VERSION {
        tracing::warn!(version, expected = SCHEMA_VERSION, "database was written by a newer mas-cache");
    }

    Ok(())
}

fn apply_migration_1(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS stores (
            country TEXT PRIMARY KEY CHECK (length(country) = 2)
        );

        CREATE TABLE IF NOT EXISTS genres (
            itunes_id INTEGER PRIMARY KEY,
            name TEXT,
            parent_id INTEGER REFERENCES genres(itunes_id) ON DELETE CASCADE
        );

        CREATE TABLE IF NOT EXISTS applications (
            itunes_id INTEGER PRIMARY KEY,
            bundle_id TEXT UNIQUE,
            name TEXT,
            genre TEXT,
            kind TEXT NOT NULL DEFAULT 'app',
            metadata TEXT,
            metadata_at TEXT,
            last_seen TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS metadata (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            itunes_id INTEGER NOT NULL REFERENCES applications(itunes_id) ON DELETE CASCADE,
            store TEXT NOT NULL REFERENCES stores(country) ON DELETE CASCADE,
            source TEXT NOT NULL,
            timestamp TEXT NOT NULL,
            data TEXT NOT NULL,
            UNIQUE (itunes_id, store, source, timestamp)
        );

        CREATE TABLE IF NOT EXISTS scan_runs (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            started_at TEXT NOT NULL,
            finished_at TEXT,
            cache_file TEXT NOT NULL,
            resources INTEGER NOT NULL DEFAULT 0,
            skipped INTEGER NOT NULL DEFAULT 0,
            applications_added INTEGER NOT NULL DEFAULT 0,
            observations_added INTEGER NOT NULL DEFAULT 0,
            genres_added INTEGER NOT NULL DEFAULT 0,
            charts_added INTEGER NOT NULL DEFAULT 0
        );

        CREATE TABLE IF NOT EXISTS charts (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            store TEXT NOT NULL REFERENCES stores(country) ON DELETE CASCADE,
            genre INTEGER NOT NULL REFERENCES genres(itunes_id) ON DELETE CASCADE,
            chart_type TEXT NOT NULL CHECK (chart_type IN ('free', 'paid')),
            timestamp TEXT NOT NULL,
            scan_run INTEGER REFERENCES scan_runs(id) ON DELETE SET NULL,
            UNIQUE (store, genre, chart_type, timestamp)
        );

        CREATE TABLE IF NOT EXISTS chart_entries (
            chart_id INTEGER NOT NULL REFERENCES charts(id) ON DELETE CASCADE,
            position INTEGER NOT NULL CHECK (position > 0),
            itunes_id INTEGER NOT NULL REFERENCES applications(itunes_id) ON DELETE CASCADE,
            PRIMARY KEY (chart_id, position),
            UNIQUE (chart_id, itunes_id)
        );
        ",
    )
}

fn apply_migration_2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        CREATE INDEX IF NOT EXISTS idx_metadata_app_store_ts ON metadata(itunes_id, store, timestamp);
        CREATE INDEX IF NOT EXISTS idx_charts_lookup ON charts(store, genre, chart_type, timestamp);
        CREATE INDEX IF NOT EXISTS idx_chart_entries_app ON chart_entries(itunes_id);
        ",
    )
}
