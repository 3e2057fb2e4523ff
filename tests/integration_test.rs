use rusqlite::{params, Connection};
use serde_json::{json, Value};
use std::path::Path;
use tempfile::TempDir;

use mas_cache::cache::{CacheDir, DATA_DIR, INDEX_FILE};
use mas_cache::charts::{self, ChartFilter, ChartReport};
use mas_cache::error::Error;
use mas_cache::metadata;
use mas_cache::model::ChartType;
use mas_cache::report;
use mas_cache::scan;
use mas_cache::store::{ConflictPolicy, Store};

const CHARTS_URL: &str = "https://api.apps.apple.com/v1/catalog/us/charts?genre=36&types=apps&chart=top-free,top-paid";
const APPS_URL: &str = "https://api.apps.apple.com/v1/catalog/us/apps?ids=497799835,409183694";
const CATEGORIES_URL: &str = "https://api.apps.apple.com/v1/editorial/us/categories?platform=osx";

enum Body {
    Inline(Value),
    OnDisk(&'static str),
    /// A file name the index does not flag as stored on disk.
    Unflagged(&'static str),
}

/// A CFNetwork cache with the two tables the scanner reads.
struct FakeCache {
    dir: TempDir,
    conn: Connection,
    next_id: i64,
}

impl FakeCache {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join(DATA_DIR)).unwrap();
        let conn = Connection::open(dir.path().join(INDEX_FILE)).unwrap();
        conn.execute_batch(
            "CREATE TABLE cfurl_cache_response (
                 entry_ID INTEGER PRIMARY KEY AUTOINCREMENT UNIQUE,
                 version INTEGER, hash_value INTEGER, storage_policy INTEGER,
                 request_key TEXT UNIQUE, time_stamp NOT NULL DEFAULT CURRENT_TIMESTAMP,
                 partition TEXT);
             CREATE TABLE cfurl_cache_receiver_data (
                 entry_ID INTEGER PRIMARY KEY, isDataOnFS INTEGER, receiver_data BLOB);",
        )
        .unwrap();
        FakeCache { dir, conn, next_id: 1 }
    }

    fn add(&mut self, url: &str, time_stamp: &str, body: Body) {
        let id = self.next_id;
        self.next_id += 1;
        self.conn
            .execute(
                "INSERT INTO cfurl_cache_response (entry_ID, request_key, time_stamp) VALUES (?1, ?2, ?3)",
                params![id, url, time_stamp],
            )
            .unwrap();
        match body {
            Body::Inline(value) => {
                let bytes = serde_json::to_vec(&value).unwrap();
                self.conn
                    .execute(
                        "INSERT INTO cfurl_cache_receiver_data (entry_ID, isDataOnFS, receiver_data) VALUES (?1, 0, ?2)",
                        params![id, bytes],
                    )
                    .unwrap();
            }
            Body::OnDisk(name) | Body::Unflagged(name) => {
                let on_fs = matches!(body, Body::OnDisk(_));
                self.conn
                    .execute(
                        "INSERT INTO cfurl_cache_receiver_data (entry_ID, isDataOnFS, receiver_data) VALUES (?1, ?2, ?3)",
                        params![id, on_fs, name],
                    )
                    .unwrap();
            }
        }
    }

    fn write_file(&self, name: &str, value: &Value) {
        let path = self.dir.path().join(DATA_DIR).join(name);
        std::fs::write(path, serde_json::to_vec(value).unwrap()).unwrap();
    }

    fn cache_dir(&self) -> CacheDir {
        CacheDir::new(self.dir.path())
    }
}

fn app(id: &str, name: &str, bundle: &str) -> Value {
    json!({
        "id": id,
        "type": "apps",
        "attributes": {
            "name": name,
            "genreDisplayName": "Developer Tools",
            "platformAttributes": {"osx": {"bundleId": bundle}}
        }
    })
}

fn charts_body() -> Value {
    json!({
        "results": {"apps": [
            {"chart": "top-free", "data": [
                app("497799835", "Xcode", "com.apple.dt.Xcode"),
                {"id": "1295203466", "type": "apps"},
                {"id": "1274495053", "type": "app-bundles", "attributes": {"name": "Microsoft 365"}},
                app("409183694", "Keynote", "com.apple.iWork.Keynote")
            ]},
            {"chart": "top-paid", "data": [
                app("1289583905", "Pixelmator Pro", "com.pixelmatorteam.pixelmator.x")
            ]}
        ]}
    })
}

fn open_store(dir: &Path) -> Store {
    Store::open(&dir.join("research.db")).unwrap()
}

fn scan(cache: &FakeCache, store: &Store) -> scan::ScanResult {
    scan::run(&cache.cache_dir(), store, ConflictPolicy::Keep).unwrap()
}

#[test]
fn scanning_twice_adds_no_duplicates() {
    let mut cache = FakeCache::new();
    cache.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let db_dir = tempfile::tempdir().unwrap();
    let store = open_store(db_dir.path());

    let first = scan(&cache, &store);
    assert_eq!(first.counts.resources, 1);
    assert_eq!(first.counts.skipped, 0);
    assert_eq!(first.counts.applications_added, 5);
    assert_eq!(first.counts.charts_added, 2);
    assert!(first.diagnostics.is_empty());

    let second = scan(&cache, &store);
    assert_eq!(second.counts.applications_added, 0);
    assert_eq!(second.counts.observations_added, 0);
    assert_eq!(second.counts.charts_added, 0);
    assert_eq!(store.count_applications().unwrap(), 5);

    let runs = store.list_scan_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert!(runs.iter().all(|run| run.finished_at.is_some()));
}

#[test]
fn chart_is_sorted_by_position_and_round_trips_as_json() {
    let mut cache = FakeCache::new();
    cache.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let store = Store::open_in_memory().unwrap();
    scan(&cache, &store);

    let chart = charts::latest(&store, "us", 36, ChartType::Free, ChartFilter::default()).unwrap();
    let positions: Vec<u32> = chart.entries.iter().map(|row| row.position).collect();
    assert_eq!(positions, vec![1, 2, 3, 4]);
    assert_eq!(chart.entries[0].app_id, 497799835);
    assert_eq!(chart.entries[0].bundle_id.as_deref(), Some("com.apple.dt.Xcode"));
    assert_eq!(chart.entries[1].name, None);

    let text = report::json::render_chart(&chart);
    let parsed: ChartReport = serde_json::from_str(&text).unwrap();
    assert_eq!(parsed, chart);

    let table = report::table::render_chart(&chart);
    let xcode = table.find("com.apple.dt.Xcode").unwrap();
    let keynote = table.find("com.apple.iWork.Keynote").unwrap();
    assert!(xcode < keynote);
}

#[test]
fn chart_filters_drop_bundles_and_unknown_apps() {
    let mut cache = FakeCache::new();
    cache.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let store = Store::open_in_memory().unwrap();
    scan(&cache, &store);

    let filter = ChartFilter { skip_bundles: true, skip_unknown: true };
    let chart = charts::latest(&store, "us", 36, ChartType::Free, filter).unwrap();
    let ids: Vec<u64> = chart.entries.iter().map(|row| row.app_id).collect();
    assert_eq!(ids, vec![497799835, 409183694]);
    assert_eq!(report::render_list(&chart), "497799835\n409183694\n");
}

#[test]
fn newest_snapshot_wins() {
    let mut cache = FakeCache::new();
    cache.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let store = Store::open_in_memory().unwrap();
    scan(&cache, &store);

    let mut later = FakeCache::new();
    let reordered = json!({
        "results": {"apps": [
            {"chart": "top-free", "data": [
                app("409183694", "Keynote", "com.apple.iWork.Keynote"),
                app("497799835", "Xcode", "com.apple.dt.Xcode")
            ]}
        ]}
    });
    later.add(CHARTS_URL, "2020-05-02 10:00:00", Body::Inline(reordered));
    scan(&later, &store);

    let chart = charts::latest(&store, "us", 36, ChartType::Free, ChartFilter::default()).unwrap();
    assert_eq!(chart.entries.len(), 2);
    assert_eq!(chart.entries[0].app_id, 409183694);
    assert_eq!(chart.timestamp.to_rfc3339(), "2020-05-02T10:00:00+00:00");
}

#[test]
fn metadata_for_unknown_id_is_not_found() {
    let store = Store::open_in_memory().unwrap();
    let err = metadata::latest(&store, "us", 123456).unwrap_err();
    assert!(matches!(err, Error::UnknownApplication(123456)));
    assert!(err.to_string().contains("not found"));
}

#[test]
fn metadata_comes_from_files_on_disk() {
    let mut cache = FakeCache::new();
    cache.write_file(
        "5E1F8B6C-2A1D-4A6B-9A44-0C5A7A3E1F00",
        &json!({"data": [app("497799835", "Xcode", "com.apple.dt.Xcode")]}),
    );
    cache.add(APPS_URL, "2020-05-01 10:00:00", Body::OnDisk("5E1F8B6C-2A1D-4A6B-9A44-0C5A7A3E1F00"));
    let store = Store::open_in_memory().unwrap();
    scan(&cache, &store);

    let found = metadata::latest(&store, "us", 497799835).unwrap();
    assert_eq!(found.store, "us");
    assert_eq!(found.source, APPS_URL);
    assert_eq!(found.data["attributes"]["name"], "Xcode");
}

#[test]
fn missing_cached_file_is_skipped() {
    let mut cache = FakeCache::new();
    cache.add(APPS_URL, "2020-05-01 10:00:00", Body::OnDisk("does-not-exist"));
    cache.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let store = Store::open_in_memory().unwrap();

    let result = scan(&cache, &store);
    assert_eq!(result.counts.resources, 2);
    assert_eq!(result.counts.skipped, 1);
    assert_eq!(result.diagnostics.len(), 1);
    assert!(result.diagnostics[0].contains("does-not-exist"));
    assert_eq!(result.counts.charts_added, 2);
}

#[test]
fn unknown_endpoints_and_other_hosts_are_ignored() {
    let mut cache = FakeCache::new();
    cache.add(
        "https://api.apps.apple.com/v1/catalog/us/search?term=xcode",
        "2020-05-01 10:00:00",
        Body::Inline(json!({"results": {}})),
    );
    cache.add("https://example.com/v1/catalog/us/apps", "2020-05-01 10:00:00", Body::Inline(json!({})));
    let store = Store::open_in_memory().unwrap();

    let result = scan(&cache, &store);
    assert_eq!(result.counts.resources, 1);
    assert_eq!(result.counts.skipped, 1);
    assert_eq!(store.count_applications().unwrap(), 0);
}

#[test]
fn categories_build_the_genre_tree() {
    let mut cache = FakeCache::new();
    cache.add(
        CATEGORIES_URL,
        "2020-05-01 10:00:00",
        Body::Inline(json!({
            "results": {"categories": [
                {"genre": 36, "name": "App Store", "children": [
                    {"genre": "6026", "name": "Developer Tools"},
                    {"genre": "6000", "name": "Business"}
                ]}
            ]}
        })),
    );
    let store = Store::open_in_memory().unwrap();
    let result = scan(&cache, &store);
    assert_eq!(result.counts.genres_added, 3);

    let tools = store.get_genre(6026).unwrap().unwrap();
    assert_eq!(tools.name.as_deref(), Some("Developer Tools"));
    assert_eq!(tools.parent, Some(36));

    let tree = report::table::render_genres(&store.list_genres().unwrap());
    assert!(tree.lines().next().unwrap().starts_with("36 "));
}

#[test]
fn abort_policy_stops_on_conflicting_metadata() {
    let store = Store::open_in_memory().unwrap();

    let mut cache = FakeCache::new();
    cache.add(
        APPS_URL,
        "2020-05-01 10:00:00",
        Body::Inline(json!({"data": [app("497799835", "Xcode", "com.apple.dt.Xcode")]})),
    );
    scan::run(&cache.cache_dir(), &store, ConflictPolicy::Abort).unwrap();

    let mut changed = FakeCache::new();
    changed.add(
        APPS_URL,
        "2020-05-01 10:00:00",
        Body::Inline(json!({"data": [app("497799835", "Xcode 12", "com.apple.dt.Xcode")]})),
    );
    let err = scan::run(&changed.cache_dir(), &store, ConflictPolicy::Abort).unwrap_err();
    assert!(matches!(err, Error::ConflictAborted { app: 497799835, .. }));

    let kept = metadata::latest(&store, "us", 497799835).unwrap();
    assert_eq!(kept.data["attributes"]["name"], "Xcode");
}

#[test]
fn unflagged_file_is_still_read() {
    let mut cache = FakeCache::new();
    cache.write_file("7C0A", &json!({"data": [app("409183694", "Keynote", "com.apple.iWork.Keynote")]}));
    cache.add(APPS_URL, "2020-05-01 10:00:00", Body::Unflagged("7C0A"));
    let store = Store::open_in_memory().unwrap();

    let result = scan(&cache, &store);
    assert_eq!(result.counts.skipped, 0);
    assert_eq!(result.counts.applications_added, 1);
    let found = metadata::latest(&store, "us", 409183694).unwrap();
    assert_eq!(found.data["attributes"]["name"], "Keynote");
}

#[test]
fn known_chart_type_does_not_block_the_other() {
    let store = Store::open_in_memory().unwrap();

    let mut free_only = FakeCache::new();
    free_only.add(
        CHARTS_URL,
        "2020-05-01 10:00:00",
        Body::Inline(json!({
            "results": {"apps": [
                {"chart": "top-free", "data": [app("497799835", "Xcode", "com.apple.dt.Xcode")]}
            ]}
        })),
    );
    assert_eq!(scan(&free_only, &store).counts.charts_added, 1);

    let mut both = FakeCache::new();
    both.add(CHARTS_URL, "2020-05-01 10:00:00", Body::Inline(charts_body()));
    let result = scan(&both, &store);
    assert_eq!(result.counts.charts_added, 1);

    let paid = charts::latest(&store, "us", 36, ChartType::Paid, ChartFilter::default()).unwrap();
    let ids: Vec<u64> = paid.entries.iter().map(|row| row.app_id).collect();
    assert_eq!(ids, vec![1289583905]);

    // the free chart keeps its first snapshot
    let free = charts::latest(&store, "us", 36, ChartType::Free, ChartFilter::default()).unwrap();
    assert_eq!(free.entries.len(), 1);
}

#[test]
fn ten_digit_app_ids_are_ingested() {
    let mut cache = FakeCache::new();
    cache.add(
        CHARTS_URL,
        "2020-05-01 10:00:00",
        Body::Inline(json!({
            "results": {"apps": [
                {"chart": "top-free", "data": [
                    app("497799835", "Xcode", "com.apple.dt.Xcode"),
                    app("6448311069", "Newcomer", "com.example.newcomer")
                ]}
            ]}
        })),
    );
    let store = Store::open_in_memory().unwrap();

    let result = scan(&cache, &store);
    assert_eq!(result.counts.skipped, 0);
    assert_eq!(result.counts.charts_added, 1);

    let chart = charts::latest(&store, "us", 36, ChartType::Free, ChartFilter::default()).unwrap();
    let ids: Vec<u64> = chart.entries.iter().map(|row| row.app_id).collect();
    assert_eq!(ids, vec![497799835, 6448311069]);

    let found = metadata::latest(&store, "us", 6448311069).unwrap();
    assert_eq!(found.data["attributes"]["name"], "Newcomer");
}
