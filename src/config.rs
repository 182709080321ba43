use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};

const DEFAULT_UPDATE_INTERVAL_SECS: u64 = 3600;

/// Whether `secs` fits a `chrono::Duration`.
fn interval_in_range(secs: u64) -> bool {
    i64::try_from(secs)
        .ok()
        .and_then(chrono::Duration::try_seconds)
        .is_some()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Fixer-compatible endpoint returning `{"base", "date", "rates"}`
    pub latest_url: String,
    /// Endpoint returning a code → display name map
    pub currencies_url: Option<String>,
    pub update_interval_secs: u64,
    pub request_timeout_secs: u64,
    pub database_url: String,
    /// Settings file; the platform configuration directory when unset
    pub settings_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            latest_url: "https://api.frankfurter.app/latest?from=USD".to_string(),
            currencies_url: Some("https://api.frankfurter.app/currencies".to_string()),
            update_interval_secs: DEFAULT_UPDATE_INTERVAL_SECS,
            request_timeout_secs: 10,
            database_url: "sqlite://rates.db".to_string(),
            settings_path: None,
        }
    }
}

impl Config {
    pub fn update_interval(&self) -> chrono::Duration {
        i64::try_from(self.update_interval_secs)
            .ok()
            .and_then(chrono::Duration::try_seconds)
            .unwrap_or_else(|| chrono::Duration::seconds(DEFAULT_UPDATE_INTERVAL_SECS as i64))
    }

    /// Resets values that cannot be represented to their defaults.
    fn validated(mut self) -> Self {
        if !interval_in_range(self.update_interval_secs) {
            warn!(
                update_interval_secs = self.update_interval_secs,
                "update interval out of range, using default"
            );
            self.update_interval_secs = DEFAULT_UPDATE_INTERVAL_SECS;
        }
        self
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Applies `RATES_API_URL`, `CURRENCIES_API_URL`, `DATABASE_URL` and `UPDATE_INTERVAL_SECS`.
    pub fn with_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(url) = lookup("RATES_API_URL") {
            self.latest_url = url;
        }
        if let Some(url) = lookup("CURRENCIES_API_URL") {
            self.currencies_url = (!url.is_empty()).then_some(url);
        }
        if let Some(url) = lookup("DATABASE_URL") {
            self.database_url = url;
        }
        if let Some(secs) = lookup("UPDATE_INTERVAL_SECS").and_then(|s| s.parse().ok()) {
            if interval_in_range(secs) {
                self.update_interval_secs = secs;
            } else {
                warn!(secs, "UPDATE_INTERVAL_SECS out of range, ignored");
            }
        }
        self
    }
}

pub fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var("CONVERTER_CONFIG") {
        return PathBuf::from(path);
    }

    let mut path = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
    path.push("config.toml");
    path
}

pub fn load_config_from(path: &PathBuf) -> anyhow::Result<Config> {
    let config_str = fs::read_to_string(path)?;
    let config: Config = toml::from_str(&config_str)?;
    Ok(config.validated())
}

pub fn save_config_to(config: &Config, path: &PathBuf) -> anyhow::Result<()> {
    let config_str = toml::to_string_pretty(config)?;
    fs::write(path, config_str)?;
    Ok(())
}

/// config.toml if readable, defaults otherwise, then environment overrides
pub fn load_config() -> Config {
    let path = get_config_path();
    let config = load_config_from(&path).unwrap_or_else(|e| {
        debug!(path = %path.display(), error = %e, "using default configuration");
        Config::default()
    });

    config.with_overrides(|key| env::var(key).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    #[test]
    fn test_partial_file_keeps_defaults() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "update_interval_secs = 60\n")?;

        let config = load_config_from(&path)?;
        assert_eq!(config.update_interval_secs, 60);
        assert_eq!(config.latest_url, Config::default().latest_url);
        Ok(())
    }

    #[test]
    fn test_save_and_reload() -> anyhow::Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        let config = Config {
            settings_path: Some(dir.path().join("settings.toml")),
            ..Default::default()
        };

        save_config_to(&config, &path)?;
        assert_eq!(load_config_from(&path)?, config);
        Ok(())
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("RATES_API_URL", "http://localhost:8080/latest"),
            ("CURRENCIES_API_URL", ""),
            ("UPDATE_INTERVAL_SECS", "not a number"),
        ]
        .into_iter()
        .collect();

        let config = Config::default().with_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.latest_url, "http://localhost:8080/latest");
        assert_eq!(config.currencies_url, None);
        assert_eq!(config.update_interval_secs, 3600);
        assert_eq!(config.database_url, "sqlite://rates.db");
    }

    #[test]
    fn test_out_of_range_interval_falls_back_to_default() -> anyhow::Result<()> {
        for secs in ["18446744073709551615", "10000000000000000"] {
            let config =
                Config::default().with_overrides(|key| (key == "UPDATE_INTERVAL_SECS").then(|| secs.to_string()));
            assert_eq!(config.update_interval_secs, 3600);
            assert_eq!(config.update_interval(), chrono::Duration::seconds(3600));
        }

        let dir = tempdir()?;
        let path = dir.path().join("config.toml");
        fs::write(&path, "update_interval_secs = 9223372036854775807\n")?;
        let config = load_config_from(&path)?;
        assert_eq!(config.update_interval_secs, 3600);

        // Even an unchecked value never panics or goes negative
        let config = Config {
            update_interval_secs: u64::MAX,
            ..Default::default()
        };
        assert_eq!(config.update_interval(), chrono::Duration::seconds(3600));
        Ok(())
    }
}
