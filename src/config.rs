//! Settings file and resolved per-invocation configuration.
//!
//! Settings live in `settings.json` under the platform config directory
//! (`~/.config/mas-cache` on Linux, `~/Library/Application Support/mas-cache`
//! on macOS). Every field is optional; command line flags take precedence.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::model::{ChartType, APP_STORE_GENRE};
use crate::platform::{self, Platform};

const SETTINGS_FILE: &str = "settings.json";
const DATABASE_FILE: &str = "mas-cache.db";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    /// Path of the research database.
    pub database: Option<PathBuf>,
    /// App Store container to scan instead of the one in the home directory.
    pub container: Option<PathBuf>,
    /// Default store for `charts` and `metadata`.
    pub store: Option<String>,
    /// Default genre for `charts`.
    pub genre: Option<u32>,
    /// Default chart type for `charts`.
    pub chart_type: Option<ChartType>,
}

impl Settings {
    /// Loads settings from `path`, or from the default location when `None`.
    ///
    /// A missing default file yields default settings; a missing explicit
    /// file is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, explicit) = match path {
            Some(p) => (p.to_path_buf(), true),
            None => match default_settings_path() {
                Some(p) => (p, false),
                None => return Ok(Settings::default()),
            },
        };

        let text = match std::fs::read_to_string(&path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Settings::default());
            }
            Err(e) => {
                return Err(Error::Settings { path, reason: e.to_string() });
            }
        };

        Self::parse(&text).map_err(|e| Error::Settings { path, reason: e.to_string() })
    }

    pub fn parse(text: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }
}

fn project_dirs() -> Option<directories::ProjectDirs> {
    directories::ProjectDirs::from("", "", "mas-cache")
}

fn default_settings_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(SETTINGS_FILE))
}

/// Get the default database path (~/.local/share/mas-cache/mas-cache.db or platform equivalent)
fn default_db_path() -> Result<PathBuf> {
    let data_dir = project_dirs()
        .ok_or(Error::NoProjectDir("data"))?
        .data_dir()
        .to_path_buf();

    std::fs::create_dir_all(&data_dir)?;
    Ok(data_dir.join(DATABASE_FILE))
}

pub struct Config {
    pub database: PathBuf,
    pub settings: Settings,
    pub platform: Platform,
}

impl Config {
    pub fn resolve(settings_path: Option<&Path>, database: Option<&Path>) -> Result<Self> {
        let settings = Settings::load(settings_path)?;

        let database = match database.or(settings.database.as_deref()) {
            Some(path) => path.to_path_buf(),
            None => default_db_path()?,
        };

        Ok(Config {
            database,
            settings,
            platform: platform::detect(),
        })
    }

    /// Directory holding Cache.db and fsCachedData.
    ///
    /// An explicit directory is used as is. Otherwise the configured or
    /// default App Store container is used, which only exists on macOS.
    pub fn cache_dir(&self, explicit: Option<&Path>) -> Result<PathBuf> {
        if let Some(dir) = explicit {
            return Ok(dir.to_path_buf());
        }
        if let Some(container) = &self.settings.container {
            return Ok(platform::cache_dir_in(container));
        }
        if self.platform != Platform::MacOS {
            return Err(Error::UnsupportedPlatform);
        }
        platform::appstore_container()
            .map(|container| platform::cache_dir_in(&container))
            .ok_or(Error::NoProjectDir("home"))
    }

    pub fn chart_type(&self, explicit: Option<ChartType>) -> ChartType {
        explicit.or(self.settings.chart_type).unwrap_or(ChartType::Free)
    }

    pub fn genre(&self, explicit: Option<u32>) -> u32 {
        explicit.or(self.settings.genre).unwrap_or(APP_STORE_GENRE)
    }

    /// Store requested on the command line or in settings, if any.
    pub fn store<'a>(&'a self, explicit: Option<&'a str>) -> Option<&'a str> {
        explicit.or(self.settings.store.as_deref())
    }
}
