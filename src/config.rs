use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use chrono_tz::Tz;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::editor::FirstActivation;
use crate::preview::PreviewDelivery;
use crate::recurrence::{WeekdayNames, DEFAULT_PLACEHOLDER};

pub const DEFAULT_CONFIG_PATH: &str = "trainings.toml";

/// Global timezone setting for the application
static APP_TIMEZONE: OnceLock<Tz> = OnceLock::new();

/// Initialize the timezone from the given string
pub fn init_timezone(tz_str: &str) {
    let timezone: Tz = tz_str.parse().unwrap_or_else(|_| {
        warn!(timezone = tz_str, "invalid timezone, falling back to UTC");
        chrono_tz::UTC
    });

    if APP_TIMEZONE.set(timezone).is_err() {
        debug!("timezone already initialized");
    }
}

/// Get the configured timezone
pub fn get_timezone() -> Tz {
    *APP_TIMEZONE.get().unwrap_or(&chrono_tz::UTC)
}

/// Today's date in the configured timezone.
pub fn today() -> NaiveDate {
    Utc::now().with_timezone(&get_timezone()).date_naive()
}

/// Settings for the admin panel, read from `trainings.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub bind: String,
    pub static_dir: PathBuf,
    pub log_level: String,
    pub timezone: String,
    pub placeholder: String,
    pub weekday_names: WeekdayNames,
    pub preview_delivery: PreviewDelivery,
    pub first_activation: FirstActivation,
    pub schedule_url: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:3000".to_string(),
            static_dir: PathBuf::from("static"),
            log_level: "info".to_string(),
            timezone: "Europe/Warsaw".to_string(),
            placeholder: DEFAULT_PLACEHOLDER.to_string(),
            weekday_names: WeekdayNames::default(),
            preview_delivery: PreviewDelivery::default(),
            first_activation: FirstActivation::default(),
            schedule_url: "/admin/trainings/schedule".to_string(),
        }
    }
}

impl AppConfig {
    pub fn from_toml(source: &str) -> Result<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Load `.env`, then the TOML file, then environment overrides.
    ///
    /// The file is `path` if given, else `TRAININGS_CONFIG`, else
    /// `trainings.toml`. A missing file means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        // dotenvy 0.15: read `./.env` without touching the process env.
        let dotenv: std::collections::HashMap<String, String> = dotenvy::from_path_iter(".env")
            .and_then(|iter| iter.collect())
            .unwrap_or_default();
        let lookup = |key: &str| {
            dotenv
                .get(key)
                .cloned()
                .or_else(|| std::env::var(key).ok())
        };

        let path = path
            .map(Path::to_path_buf)
            .or_else(|| lookup("TRAININGS_CONFIG").map(PathBuf::from))
            .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));

        let mut config = if path.exists() {
            let source = fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            Self::from_toml(&source).with_context(|| format!("parsing {}", path.display()))?
        } else {
            debug!(path = %path.display(), "no config file, using defaults");
            Self::default()
        };

        config.apply_env(lookup);
        Ok(config)
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(bind) = lookup("TRAININGS_BIND") {
            self.bind = bind;
        }
        if let Some(tz) = lookup("TRAININGS_TZ") {
            self.timezone = tz;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_file() {
        let config = AppConfig::from_toml("").unwrap();
        assert_eq!(config.bind, "0.0.0.0:3000");
        assert_eq!(config.placeholder, "–");
        assert_eq!(config.preview_delivery, PreviewDelivery::Modal);
        assert_eq!(config.first_activation, FirstActivation::SeedFromField);
        assert_eq!(config.weekday_names.label(0), "Poniedziałek");
    }

    #[test]
    fn test_overrides() {
        let config = AppConfig::from_toml(
            r#"
            bind = "127.0.0.1:8080"
            placeholder = "-"
            preview_delivery = "new_tab"
            first_activation = "capture_editor"
            weekday_names = ["Mon", "Tue", "Wed", "Thu", "Fri", "Sat", "Sun"]
            "#,
        )
        .unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert_eq!(config.placeholder, "-");
        assert_eq!(config.preview_delivery, PreviewDelivery::NewTab);
        assert_eq!(config.first_activation, FirstActivation::CaptureEditor);
        assert_eq!(config.weekday_names.label(6), "Sun");
    }

    #[test]
    fn test_bad_weekday_names_rejected() {
        assert!(AppConfig::from_toml(r#"weekday_names = ["Mon"]"#).is_err());
        assert!(AppConfig::from_toml(r#"preview_delivery = "popup""#).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let mut config = AppConfig::default();
        config.apply_env(|key| match key {
            "TRAININGS_BIND" => Some("127.0.0.1:9000".to_string()),
            _ => None,
        });
        assert_eq!(config.bind, "127.0.0.1:9000");
        assert_eq!(config.timezone, "Europe/Warsaw");
    }

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = AppConfig::load(Some(Path::new("does/not/exist.toml"))).unwrap();
        assert_eq!(config.schedule_url, "/admin/trainings/schedule");
    }
}
