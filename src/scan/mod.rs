pub mod resource;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::cache::{CacheDir, CachedResponse, PayloadError};
use crate::error::Result;
use crate::model::{AppId, AppObservation, AppStore, ScanCounts};
use crate::store::{ApplicationChange, ConflictPolicy, GenreChange, MetadataChange, Store};
use resource::{Payload, ResourceError};

#[derive(Debug, Serialize)]
pub struct ScanResult {
    pub cache_file: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scan_run: Option<i64>,
    pub counts: ScanCounts,
    pub diagnostics: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u128>,
}

impl ScanResult {
    pub fn empty(cache_file: String) -> Self {
        ScanResult {
            cache_file,
            scan_run: None,
            counts: ScanCounts::default(),
            diagnostics: Vec::new(),
            duration_ms: None,
        }
    }
}

/// Why one cached response was left out of a scan.
#[derive(Debug, Error)]
enum Skip {
    #[error(transparent)]
    Payload(#[from] PayloadError),
    #[error(transparent)]
    Resource(#[from] ResourceError),
    #[error("invalid store '{0}'")]
    Country(String),
}

/// Reads every cached MAS response and merges it into the store.
///
/// A missing or unreadable cache only produces diagnostics, as does any
/// single response that cannot be understood. Database failures and an
/// aborted metadata conflict end the scan with an error.
pub fn run(cache: &CacheDir, store: &Store, policy: ConflictPolicy) -> Result<ScanResult> {
    let start = std::time::Instant::now();
    let cache_file = cache.index_path().display().to_string();
    let mut scan_result = ScanResult::empty(cache_file.clone());

    if !cache.exists() {
        let msg = format!("cache file not found: {cache_file}");
        tracing::warn!("{msg}");
        scan_result.diagnostics.push(msg);
        return Ok(scan_result);
    }

    let responses = match cache.read_responses() {
        Ok(responses) => responses,
        Err(e) => {
            let msg = format!("cache file {cache_file} is not in a recognized format: {e}");
            tracing::warn!("{msg}");
            scan_result.diagnostics.push(msg);
            return Ok(scan_result);
        }
    };

    let run_id = store.begin_scan_run(&cache_file, Utc::now())?;
    scan_result.scan_run = Some(run_id);
    tracing::info!(run = run_id, responses = responses.len(), "scanning {cache_file}");

    for response in &responses {
        scan_result.counts.resources += 1;
        match ingest_response(cache, store, run_id, response, policy)? {
            Ok(counts) => scan_result.counts.absorb(&counts),
            Err(skip) => {
                let msg = format!("{}: {skip}", response.source);
                tracing::warn!("skipping {msg}");
                scan_result.counts.skipped += 1;
                scan_result.diagnostics.push(msg);
            }
        }
    }

    store.finish_scan_run(run_id, &scan_result.counts, Utc::now())?;
    scan_result.duration_ms = Some(start.elapsed().as_millis());
    Ok(scan_result)
}

fn ingest_response(
    cache: &CacheDir,
    store: &Store,
    run_id: i64,
    response: &CachedResponse,
    policy: ConflictPolicy,
) -> Result<std::result::Result<ScanCounts, Skip>> {
    let locator = match resource::classify(&response.source) {
        Ok(locator) => locator,
        Err(e) => return Ok(Err(e.into())),
    };
    let Ok(app_store) = AppStore::new(&locator.country) else {
        return Ok(Err(Skip::Country(locator.country)));
    };
    let document = match cache.load(response) {
        Ok(document) => document,
        Err(e) => return Ok(Err(e.into())),
    };
    let payload = match resource::parse(&locator.endpoint, &document) {
        Ok(payload) => payload,
        Err(e) => return Ok(Err(e.into())),
    };

    let context = Observed {
        store: &app_store,
        source: &response.source,
        at: response.timestamp,
        run_id,
        policy,
    };
    let counts = store.atomically(|s| ingest_payload(s, &context, &payload))?;
    Ok(Ok(counts))
}

struct Observed<'a> {
    store: &'a AppStore,
    source: &'a str,
    at: DateTime<Utc>,
    run_id: i64,
    policy: ConflictPolicy,
}

/// Writes one parsed response. Runs inside a single transaction.
fn ingest_payload(store: &Store, ctx: &Observed<'_>, payload: &Payload) -> Result<ScanCounts> {
    let mut counts = ScanCounts::default();

    if store.ensure_store(ctx.store)? {
        tracing::info!(store = %ctx.store, "added new store");
    }

    match payload {
        Payload::Apps(apps) => {
            for app in apps {
                add_application(store, ctx, app, &mut counts)?;
            }
        }
        Payload::Charts { genre, charts } => {
            if store.upsert_genre(*genre, None, None)? == GenreChange::Created {
                counts.genres_added += 1;
            }

            // some chart entries come with prefetched metadata
            for (_, apps) in charts {
                for app in apps {
                    add_application(store, ctx, app, &mut counts)?;
                }
            }

            for (chart_type, apps) in charts {
                if store.chart_exists(ctx.store, *genre, *chart_type, ctx.at)? {
                    tracing::debug!(store = %ctx.store, genre, chart = %chart_type, at = %ctx.at, "chart already known");
                    continue;
                }
                let ids: Vec<AppId> = apps.iter().map(|a| a.itunes_id).collect();
                store.insert_chart(ctx.store, *genre, *chart_type, ctx.at, Some(ctx.run_id), &ids)?;
                counts.charts_added += 1;
                tracing::info!(
                    store = %ctx.store,
                    genre,
                    chart = chart_type.label(),
                    at = %ctx.at,
                    entries = ids.len(),
                    "added chart"
                );
            }
        }
        Payload::Categories(categories) => {
            for category in categories {
                if store.upsert_genre(category.genre, Some(&category.name), None)? == GenreChange::Created {
                    counts.genres_added += 1;
                }
                for (child, name) in &category.children {
                    if store.upsert_genre(*child, Some(name), Some(category.genre))? == GenreChange::Created {
                        counts.genres_added += 1;
                    }
                }
            }
        }
    }

    Ok(counts)
}

fn add_application(store: &Store, ctx: &Observed<'_>, app: &AppObservation, counts: &mut ScanCounts) -> Result<()> {
    if store.observe_application(app, ctx.at)? == ApplicationChange::Created {
        counts.applications_added += 1;
    }
    if store.record_metadata(app, ctx.store, ctx.source, ctx.at, ctx.policy)? == MetadataChange::Inserted {
        counts.observations_added += 1;
    }
    Ok(())
}
