use std::{fs, path::Path};

use serde::Deserialize;
use tracing::warn;

pub const SETTINGS_FILE: &str = "planner.toml";

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Settings {
    pub api_url: String,
    pub database_url: String,
    pub debounce_ms: u64,
    pub default_platform: String,
    pub valid_platforms: Vec<String>,
    pub request_timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: "http://127.0.0.1:8016".into(),
            database_url: "sqlite://./data/planner.db".into(),
            debounce_ms: 500,
            default_platform: "standard".into(),
            valid_platforms: vec!["standard".into()],
            request_timeout_secs: 10,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileSettings {
    api_url: Option<String>,
    database_url: Option<String>,
    debounce_ms: Option<u64>,
    default_platform: Option<String>,
    valid_platforms: Option<Vec<String>>,
    request_timeout_secs: Option<u64>,
}

/// Defaults, then `planner.toml` in the working directory, then the
/// environment.
pub fn load_settings() -> Settings {
    load_settings_from(Path::new(SETTINGS_FILE))
}

pub fn load_settings_from(path: &Path) -> Settings {
    let mut settings = Settings::default();

    if let Ok(raw) = fs::read_to_string(path) {
        apply_file_settings(&mut settings, &raw);
    }

    if let Ok(v) = std::env::var("PLANNER_API_URL") {
        settings.api_url = v;
    }
    if let Ok(v) = std::env::var("APP__API_URL") {
        settings.api_url = v;
    }

    if let Ok(v) = std::env::var("PLANNER_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Ok(v) = std::env::var("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Ok(v) = std::env::var("APP__DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.debounce_ms = parsed;
        }
    }
    if let Ok(v) = std::env::var("APP__DEFAULT_PLATFORM") {
        settings.default_platform = v;
    }
    if let Ok(v) = std::env::var("APP__REQUEST_TIMEOUT_SECS") {
        if let Ok(parsed) = v.parse::<u64>() {
            settings.request_timeout_secs = parsed;
        }
    }

    if !settings
        .valid_platforms
        .contains(&settings.default_platform)
    {
        settings
            .valid_platforms
            .push(settings.default_platform.clone());
    }

    settings
}

fn apply_file_settings(settings: &mut Settings, raw: &str) {
    let file_cfg = match toml::from_str::<FileSettings>(raw) {
        Ok(file_cfg) => file_cfg,
        Err(err) => {
            warn!("ignoring unreadable {SETTINGS_FILE}: {err}");
            return;
        }
    };
    if let Some(v) = file_cfg.api_url {
        settings.api_url = v;
    }
    if let Some(v) = file_cfg.database_url {
        settings.database_url = v;
    }
    if let Some(v) = file_cfg.debounce_ms {
        settings.debounce_ms = v;
    }
    if let Some(v) = file_cfg.default_platform {
        settings.default_platform = v;
    }
    if let Some(v) = file_cfg.valid_platforms {
        settings.valid_platforms = v;
    }
    if let Some(v) = file_cfg.request_timeout_secs {
        settings.request_timeout_secs = v;
    }
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return Settings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_plain_file_path_to_sqlite_url() {
        assert_eq!(
            normalize_database_url("./data/planner.db"),
            "sqlite://./data/planner.db"
        );
        assert_eq!(normalize_database_url("sqlite:plans.db"), "sqlite://plans.db");
        assert_eq!(normalize_database_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(normalize_database_url("  "), Settings::default().database_url);
    }

    #[test]
    fn creates_parent_dir_for_file_database() {
        let temp_root = tempfile::tempdir().expect("tempdir");
        let db_path = temp_root.path().join("state").join("planner.db");

        let url = prepare_database_url(&db_path.to_string_lossy()).expect("prepare db url");
        assert!(url.starts_with("sqlite://"));
        assert!(temp_root.path().join("state").exists());
    }

    #[test]
    fn file_settings_override_defaults_field_by_field() {
        let mut settings = Settings::default();
        apply_file_settings(
            &mut settings,
            r#"
            api_url = "https://solver.example"
            debounce_ms = 250
            valid_platforms = ["standard", "corvette"]
            "#,
        );
        assert_eq!(settings.api_url, "https://solver.example");
        assert_eq!(settings.debounce_ms, 250);
        assert_eq!(settings.valid_platforms, vec!["standard", "corvette"]);
        assert_eq!(settings.request_timeout_secs, 10);
    }

    #[test]
    fn unreadable_file_keeps_defaults() {
        let mut settings = Settings::default();
        apply_file_settings(&mut settings, "debounce_ms = \"soon\"");
        assert_eq!(settings, Settings::default());
    }

    #[test]
    fn missing_file_yields_defaults_plus_default_platform() {
        let temp_root = tempfile::tempdir().expect("tempdir");
        let settings = load_settings_from(&temp_root.path().join("absent.toml"));
        assert!(settings
            .valid_platforms
            .contains(&settings.default_platform));
    }
}
