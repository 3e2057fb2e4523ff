//! Domain types shared by the scanner, the store, and the reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use thiserror::Error as ThisError;

use crate::error::{Error, Result};

/// Root genre of the Mac App Store; charts default to it.
pub const APP_STORE_GENRE: u32 = 36;

/// iTunes id of an application. Current ids no longer fit in 32 bits.
pub type AppId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, clap::ValueEnum)]
pub enum ChartType {
    #[serde(rename = "top-free", alias = "free")]
    #[value(name = "free")]
    Free,
    #[serde(rename = "top-paid", alias = "paid")]
    #[value(name = "paid")]
    Paid,
}

impl ChartType {
    /// Parses the chart name the MAS api uses ("top-free", "top-paid").
    pub fn from_api(value: &str) -> Option<Self> {
        match value {
            "top-free" => Some(ChartType::Free),
            "top-paid" => Some(ChartType::Paid),
            _ => None,
        }
    }

    pub fn to_api(self) -> &'static str {
        match self {
            ChartType::Free => "top-free",
            ChartType::Paid => "top-paid",
        }
    }

    /// Short name used on the command line, in settings, and in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            ChartType::Free => "free",
            ChartType::Paid => "paid",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ChartType::Free => "Top Free Apps",
            ChartType::Paid => "Top Paid Apps",
        }
    }
}

impl fmt::Display for ChartType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("unknown chart type '{0}'")]
pub struct ParseChartTypeError(String);

/// Parses the short name ("free", "paid").
impl FromStr for ChartType {
    type Err = ParseChartTypeError;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value {
            "free" => Ok(ChartType::Free),
            "paid" => Ok(ChartType::Paid),
            other => Err(ParseChartTypeError(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AppKind {
    App,
    Bundle,
}

impl AppKind {
    pub fn from_api(value: Option<&str>) -> Self {
        match value {
            Some("app-bundles") => AppKind::Bundle,
            _ => AppKind::App,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppKind::App => "app",
            AppKind::Bundle => "bundle",
        }
    }

    pub fn from_db(value: &str) -> Self {
        match value {
            "bundle" => AppKind::Bundle,
            _ => AppKind::App,
        }
    }
}

/// A regional storefront, keyed by its two letter country code.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AppStore {
    country: String,
}

impl AppStore {
    pub fn new(country: &str) -> Result<Self> {
        let valid = country.len() == 2 && country.bytes().all(|b| b.is_ascii_lowercase());
        if !valid {
            return Err(Error::InvalidCountry(country.to_string()));
        }
        Ok(AppStore { country: country.to_string() })
    }

    pub fn country(&self) -> &str {
        &self.country
    }
}

impl fmt::Display for AppStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.country)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Genre {
    pub itunes_id: u32,
    pub name: Option<String>,
    pub parent: Option<u32>,
}

impl fmt::Display for Genre {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} [{}]", self.itunes_id),
            None => write!(f, "{}", self.itunes_id),
        }
    }
}

/// One sighting of an application inside a cached MAS response.
#[derive(Debug, Clone, PartialEq)]
pub struct AppObservation {
    pub itunes_id: AppId,
    pub kind: AppKind,
    pub name: Option<String>,
    pub bundle_id: Option<String>,
    pub genre: Option<String>,
    /// The app object exactly as the MAS returned it.
    pub data: Value,
}

impl AppObservation {
    /// Lazily fetched apps only carry an id and a type, no attributes.
    pub fn is_placeholder(&self) -> bool {
        self.data.get("attributes").is_none()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Application {
    pub itunes_id: AppId,
    pub bundle_id: Option<String>,
    pub name: Option<String>,
    pub genre: Option<String>,
    pub kind: AppKind,
    /// Newest full (non-placeholder) app object seen for this application.
    pub metadata: Option<Value>,
    pub metadata_at: Option<DateTime<Utc>>,
    pub last_seen: DateTime<Utc>,
}

impl Application {
    pub fn from_observation(obs: &AppObservation, at: DateTime<Utc>) -> Self {
        let mut app = Application {
            itunes_id: obs.itunes_id,
            bundle_id: None,
            name: None,
            genre: None,
            kind: obs.kind,
            metadata: None,
            metadata_at: None,
            last_seen: at,
        };
        app.observe(obs, at);
        app
    }

    /// Merges a sighting into the stored row.
    ///
    /// Full observations replace the descriptive fields when they are at
    /// least as new as the current metadata. Placeholders never erase what
    /// is already known. Returns true if anything changed.
    pub fn observe(&mut self, obs: &AppObservation, at: DateTime<Utc>) -> bool {
        let before = self.clone();

        if at >= self.last_seen {
            self.last_seen = at;
            self.kind = obs.kind;
        }

        let newer = self.metadata_at.map_or(true, |current| at >= current);
        if !obs.is_placeholder() && newer {
            if obs.name.is_some() {
                self.name = obs.name.clone();
            }
            if obs.bundle_id.is_some() {
                self.bundle_id = obs.bundle_id.clone();
            }
            if obs.genre.is_some() {
                self.genre = obs.genre.clone();
            }
            self.kind = obs.kind;
            self.metadata = Some(obs.data.clone());
            self.metadata_at = Some(at);
        }

        *self != before
    }

    /// Known applications have at least one full metadata observation.
    pub fn is_known(&self) -> bool {
        self.metadata.is_some()
    }

    pub fn is_bundle(&self) -> bool {
        self.kind == AppKind::Bundle
    }
}

impl fmt::Display for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{name} ({})", self.itunes_id),
            None => write!(f, "{}", self.itunes_id),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Metadata {
    pub itunes_id: AppId,
    pub store: String,
    pub source: String,
    pub timestamp: DateTime<Utc>,
    pub data: Value,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Chart {
    pub id: i64,
    pub store: String,
    pub genre: u32,
    pub chart_type: ChartType,
    pub timestamp: DateTime<Utc>,
    pub scan_run: Option<i64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ChartEntry {
    /// 1-based rank within the chart.
    pub position: u32,
    pub application: Application,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanCounts {
    pub resources: u64,
    pub skipped: u64,
    pub applications_added: u64,
    pub observations_added: u64,
    pub genres_added: u64,
    pub charts_added: u64,
}

impl ScanCounts {
    pub fn absorb(&mut self, other: &ScanCounts) {
        self.resources += other.resources;
        self.skipped += other.skipped;
        self.applications_added += other.applications_added;
        self.observations_added += other.observations_added;
        self.genres_added += other.genres_added;
        self.charts_added += other.charts_added;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScanRun {
    pub id: i64,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    pub cache_file: String,
    pub counts: ScanCounts,
}
