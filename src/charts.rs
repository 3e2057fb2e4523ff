//! Latest chart for a (store, genre, type) as a report, shared by the
//! table, JSON, and list output.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{AppId, ChartEntry, ChartType};
use crate::store::Store;

#[derive(Debug, Clone, Copy, Default)]
pub struct ChartFilter {
    pub skip_bundles: bool,
    pub skip_unknown: bool,
}

impl ChartFilter {
    fn keeps(&self, entry: &ChartEntry) -> bool {
        !(self.skip_bundles && entry.application.is_bundle())
            && !(self.skip_unknown && !entry.application.is_known())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartReport {
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub genre: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub genre_name: Option<String>,
    pub store: String,
    pub timestamp: DateTime<Utc>,
    pub entries: Vec<ChartRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChartRow {
    /// Rank in the chart as published, before filtering.
    pub position: u32,
    pub app_id: AppId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bundle_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl From<&ChartEntry> for ChartRow {
    fn from(entry: &ChartEntry) -> Self {
        ChartRow {
            position: entry.position,
            app_id: entry.application.itunes_id,
            bundle_id: entry.application.bundle_id.clone(),
            name: entry.application.name.clone(),
        }
    }
}

/// Builds the report for the newest chart matching store, genre, and type.
pub fn latest(
    store: &Store,
    country: &str,
    genre: u32,
    chart_type: ChartType,
    filter: ChartFilter,
) -> Result<ChartReport> {
    let genre_row = store.get_genre(genre)?.ok_or(Error::UnknownGenre(genre))?;
    let chart = store
        .latest_chart(country, genre, chart_type)?
        .ok_or(Error::NoCharts)?;

    let entries = store
        .chart_entries(chart.id)?
        .iter()
        .filter(|entry| filter.keeps(entry))
        .map(ChartRow::from)
        .collect();

    Ok(ChartReport {
        chart_type,
        genre,
        genre_name: genre_row.name,
        store: chart.store,
        timestamp: chart.timestamp,
        entries,
    })
}
