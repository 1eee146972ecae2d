use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::config::schema::Settings;
use crate::error::ConfigError;

/// Prefix for environment overrides, e.g. `FILENORM_MAX_RETRIES=5`.
pub const ENV_PREFIX: &str = "FILENORM_";

pub fn load_settings<P: AsRef<Path>>(path: P) -> Result<Settings, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_settings_from_str(&content)
}

pub fn load_settings_from_str(content: &str) -> Result<Settings, ConfigError> {
    let settings: Settings = serde_json::from_str(content)?;
    settings.validate()?;
    Ok(settings)
}

impl Settings {
    /// Defaults overridden by `FILENORM_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides()
    }

    pub fn with_env_overrides(self) -> Result<Self, ConfigError> {
        let settings = apply_env_overrides(self, |key| std::env::var(key).ok());
        settings.validate()?;
        Ok(settings)
    }
}

/// Applies overrides from `lookup`, which receives full variable names.
///
/// Values that fail to parse keep the current setting and log a warning.
pub fn apply_env_overrides<F>(mut settings: Settings, lookup: F) -> Settings
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

    if let Some(v) = get("STORAGE_ROOT") {
        settings.storage_root = PathBuf::from(v);
    }
    if let Some(v) = get("INCOMING_DIR") {
        settings.incoming_dir = v;
    }
    if let Some(v) = get("PROCESSED_DIR") {
        settings.processed_dir = v;
    }
    if let Some(v) = get("QUARANTINE_DIR") {
        settings.quarantine_dir = v;
    }
    if let Some(v) = get("DATABASE_PATH") {
        settings.database_path = PathBuf::from(v);
    }
    if let Some(v) = get("MAX_CONCURRENT_JOBS") {
        settings.max_concurrent_jobs =
            parse_or_keep("MAX_CONCURRENT_JOBS", &v, settings.max_concurrent_jobs);
    }
    if let Some(v) = get("MAX_RETRIES") {
        settings.max_retries = parse_or_keep("MAX_RETRIES", &v, settings.max_retries);
    }
    if let Some(v) = get("RETRY_BACKOFF_FACTOR") {
        settings.retry_backoff_factor =
            parse_or_keep("RETRY_BACKOFF_FACTOR", &v, settings.retry_backoff_factor);
    }
    if let Some(v) = get("RETRY_INITIAL_DELAY") {
        settings.retry_initial_delay_secs =
            parse_or_keep("RETRY_INITIAL_DELAY", &v, settings.retry_initial_delay_secs);
    }
    if let Some(v) = get("POLLING_INTERVAL") {
        settings.polling_interval_secs =
            parse_or_keep("POLLING_INTERVAL", &v, settings.polling_interval_secs);
    }
    if let Some(v) = get("JOURNAL_PAGE_SIZE") {
        settings.journal_page_size =
            parse_or_keep("JOURNAL_PAGE_SIZE", &v, settings.journal_page_size);
    }
    if let Some(v) = get("ENABLE_SCHEDULER") {
        settings.enable_scheduler = parse_bool("ENABLE_SCHEDULER", &v, settings.enable_scheduler);
    }
    if let Some(v) = get("QUEUE_CAPACITY") {
        settings.queue_capacity = parse_or_keep("QUEUE_CAPACITY", &v, settings.queue_capacity);
    }
    if let Some(v) = get("WORKER_POLL_INTERVAL_MS") {
        settings.worker_poll_interval_ms =
            parse_or_keep("WORKER_POLL_INTERVAL_MS", &v, settings.worker_poll_interval_ms);
    }
    if let Some(v) = get("LOG_LEVEL") {
        settings.logging.level = v;
    }
    if let Some(v) = get("LOG_JSON") {
        settings.logging.json = parse_bool("LOG_JSON", &v, settings.logging.json);
    }

    settings
}

fn parse_or_keep<T: FromStr>(name: &str, value: &str, current: T) -> T {
    match value.trim().parse() {
        Ok(parsed) => parsed,
        Err(_) => {
            log::warn!(
                "Ignoring invalid value '{}' for {}{}",
                value,
                ENV_PREFIX,
                name
            );
            current
        }
    }
}

fn parse_bool(name: &str, value: &str, current: bool) -> bool {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => true,
        "0" | "false" | "no" | "off" => false,
        _ => {
            log::warn!(
                "Ignoring invalid boolean '{}' for {}{}",
                value,
                ENV_PREFIX,
                name
            );
            current
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::collections::HashMap;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_load_minimal_json_uses_defaults() {
        let settings = load_settings_from_str("{}").unwrap();
        assert_eq!(settings.incoming_dir, "incoming");
        assert_eq!(settings.polling_interval_secs, 300);
        assert!(settings.enable_scheduler);
        assert!(!settings.logging.json);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::with_suffix(".json").unwrap();
        write!(
            file,
            r#"{{"storage_root": "/data", "max_retries": 5, "logging": {{"level": "debug", "json": true}}}}"#
        )
        .unwrap();

        let settings = load_settings(file.path()).unwrap();
        assert_eq!(settings.storage_root, PathBuf::from("/data"));
        assert_eq!(settings.max_retries, 5);
        assert_eq!(settings.logging.level, "debug");
        assert!(settings.logging.json);
    }

    #[test]
    fn test_load_missing_file() {
        let result = load_settings("/nonexistent/filenorm.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }

    #[test]
    fn test_load_rejects_invalid_json() {
        assert!(matches!(
            load_settings_from_str("{not json"),
            Err(ConfigError::ParseJson(_))
        ));
    }

    #[test]
    fn test_load_runs_validation() {
        let result = load_settings_from_str(r#"{"max_concurrent_jobs": 0}"#);
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_env_overrides_apply() {
        let lookup = lookup_from(&[
            ("FILENORM_MAX_RETRIES", "7"),
            ("FILENORM_RETRY_BACKOFF_FACTOR", "1.5"),
            ("FILENORM_ENABLE_SCHEDULER", "off"),
            ("FILENORM_QUARANTINE_DIR", "dead"),
        ]);
        let settings = apply_env_overrides(Settings::default(), lookup);
        assert_eq!(settings.max_retries, 7);
        assert_eq!(settings.retry_backoff_factor, 1.5);
        assert!(!settings.enable_scheduler);
        assert_eq!(settings.quarantine_dir, "dead");
    }

    #[test]
    fn test_env_invalid_values_fall_back() {
        let lookup = lookup_from(&[
            ("FILENORM_MAX_RETRIES", "many"),
            ("FILENORM_ENABLE_SCHEDULER", "maybe"),
        ]);
        let settings = apply_env_overrides(Settings::default(), lookup);
        assert_eq!(settings.max_retries, 3);
        assert!(settings.enable_scheduler);
    }

    #[test]
    #[serial]
    fn test_from_env_reads_process_environment() {
        std::env::set_var("FILENORM_POLLING_INTERVAL", "42");
        let settings = Settings::from_env();
        std::env::remove_var("FILENORM_POLLING_INTERVAL");

        assert_eq!(settings.unwrap().polling_interval_secs, 42);
    }

    #[test]
    #[serial]
    fn test_from_env_validates() {
        std::env::set_var("FILENORM_QUEUE_CAPACITY", "0");
        let settings = Settings::from_env();
        std::env::remove_var("FILENORM_QUEUE_CAPACITY");

        assert!(settings.is_err());
    }
}
