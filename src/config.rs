//! Configuration loading and defaults for session-watchdog.

use std::path::Path;
use std::path::PathBuf;

use anyhow::Context;
use anyhow::Result;
use serde::Deserialize;
use serde::Serialize;

use crate::domain::WatchdogTimings;
use crate::error::ConfigError;

/// Directory name under the user config dir.
const CONFIG_DIR_NAME: &str = "session-watchdog";

/// Main configuration for session-watchdog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    /// Total idle budget before forced logout, in milliseconds (default: 60000).
    pub timeout_ms: u64,

    /// Lead time before expiry at which the warning is shown, in
    /// milliseconds (default: 30000). Must not exceed `timeout_ms`.
    pub warning_lead_ms: u64,

    /// Route navigated to after sign-out (default: "welcome").
    pub entry_route: String,

    /// Optional HTTP endpoint that receives the sign-out request.
    /// If unset, sign-out is only logged.
    pub sign_out_endpoint: Option<String>,

    /// Bearer token sent with the sign-out request.
    pub sign_out_token: Option<String>,

    /// Sign-out request timeout in seconds (default: 10).
    pub sign_out_timeout_seconds: u64,

    /// Dry run mode: log the sign-out instead of performing it.
    pub dry_run: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_ms: WatchdogTimings::DEFAULT_TIMEOUT_MS,
            warning_lead_ms: WatchdogTimings::DEFAULT_WARNING_LEAD_MS,
            entry_route: "welcome".to_string(),
            sign_out_endpoint: None,
            sign_out_token: None,
            sign_out_timeout_seconds: 10,
            dry_run: false,
        }
    }
}

impl Config {
    /// Load configuration from a file path.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;
        Ok(config)
    }

    /// Load configuration from the given path, else the default path, else
    /// return defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        if let Some(p) = path {
            return Self::load(p);
        }

        if let Some(default_path) = Self::default_path()
            && default_path.exists()
        {
            return Self::load(&default_path);
        }

        Ok(Self::default())
    }

    /// `<config dir>/session-watchdog/config.toml`, if a config dir exists.
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join(CONFIG_DIR_NAME).join("config.toml"))
    }

    /// Validated watchdog timings.
    pub fn timings(&self) -> Result<WatchdogTimings, ConfigError> {
        WatchdogTimings::from_millis(self.timeout_ms, self.warning_lead_ms)
    }

    /// Whether sign-out should go over HTTP.
    pub fn uses_remote_sign_out(&self) -> bool {
        !self.dry_run && self.sign_out_endpoint.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.warning_lead_ms, 30_000);
        assert_eq!(config.entry_route, "welcome");
        assert_eq!(config.sign_out_timeout_seconds, 10);
        assert!(config.sign_out_endpoint.is_none());
        assert!(!config.dry_run);
        assert!(config.timings().is_ok());
    }

    #[test]
    fn test_parse_toml() {
        let toml_str = r#"
            timeout_ms = 120000
            warning_lead_ms = 15000
            entry_route = "login"
            sign_out_endpoint = "https://auth.example/signout"
            sign_out_token = "secret"
            dry_run = true
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.timeout_ms, 120_000);
        assert_eq!(config.warning_lead_ms, 15_000);
        assert_eq!(config.entry_route, "login");
        assert_eq!(
            config.sign_out_endpoint.as_deref(),
            Some("https://auth.example/signout")
        );
        assert_eq!(config.sign_out_token.as_deref(), Some("secret"));
        assert_eq!(config.sign_out_timeout_seconds, 10);
        assert!(config.dry_run);

        let timings = config.timings().unwrap();
        assert_eq!(timings.until_warning(), Duration::from_secs(105));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config: Config = toml::from_str("warning_lead_ms = 10000").unwrap();
        assert_eq!(config.timeout_ms, 60_000);
        assert_eq!(config.warning_lead_ms, 10_000);
        assert_eq!(config.entry_route, "welcome");
    }

    #[test]
    fn test_negative_values_fail_to_parse() {
        assert!(toml::from_str::<Config>("timeout_ms = -5").is_err());
    }

    #[test]
    fn test_invalid_timings_rejected() {
        let config = Config {
            timeout_ms: 10_000,
            warning_lead_ms: 20_000,
            ..Default::default()
        };
        assert!(matches!(
            config.timings(),
            Err(ConfigError::WarningLeadExceedsTimeout { .. })
        ));
    }

    #[test]
    fn test_uses_remote_sign_out() {
        let mut config = Config::default();
        assert!(!config.uses_remote_sign_out());

        config.sign_out_endpoint = Some("http://localhost/signout".to_string());
        assert!(config.uses_remote_sign_out());

        config.dry_run = true;
        assert!(!config.uses_remote_sign_out());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = 90000").unwrap();

        let config = Config::load(file.path()).unwrap();
        assert_eq!(config.timeout_ms, 90_000);
        assert_eq!(config.warning_lead_ms, 30_000);
    }

    #[test]
    fn test_load_reports_path_on_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "timeout_ms = \"soon\"").unwrap();

        let err = Config::load(file.path()).unwrap_err();
        assert!(format!("{err}").contains("Failed to parse config file"));
    }

    #[test]
    fn test_load_missing_explicit_path_fails() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(Config::load_or_default(Some(&missing)).is_err());
    }

    #[test]
    #[serial]
    #[cfg(target_os = "linux")]
    fn test_load_or_default_uses_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let previous = std::env::var_os("XDG_CONFIG_HOME");
        // SAFETY: serialized with other env-mutating tests.
        unsafe { std::env::set_var("XDG_CONFIG_HOME", dir.path()) };

        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config, Config::default());

        let config_dir = dir.path().join(CONFIG_DIR_NAME);
        std::fs::create_dir_all(&config_dir).unwrap();
        std::fs::write(config_dir.join("config.toml"), "entry_route = \"home\"\n").unwrap();

        let config = Config::load_or_default(None).unwrap();
        assert_eq!(config.entry_route, "home");

        // SAFETY: as above.
        unsafe {
            match previous {
                Some(value) => std::env::set_var("XDG_CONFIG_HOME", value),
                None => std::env::remove_var("XDG_CONFIG_HOME"),
            }
        }
    }
}
