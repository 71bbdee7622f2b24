// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use torre_app::{FilterScope, TripScope};

pub const APP_NAME: &str = "torre";
const CONFIG_VERSION: i64 = 1;
const DEFAULT_API_BASE_URL: &str = "http://localhost:3000";
const DEFAULT_API_TIMEOUT: &str = "10s";
const DEFAULT_SETTLE_DELAY: &str = "3s";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub version: i64,
    #[serde(default)]
    pub api: Api,
    #[serde(default)]
    pub view: View,
    #[serde(default)]
    pub log: Log,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api: Api::default(),
            view: View::default(),
            log: Log::default(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Api {
    pub base_url: Option<String>,
    pub timeout: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct View {
    pub scope: Option<String>,
    pub filter_scope: Option<String>,
    #[serde(default)]
    pub projects: Vec<String>,
    pub settle_delay: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Log {
    pub level: Option<String>,
    pub file: Option<String>,
}

impl Config {
    pub fn default_path() -> Result<PathBuf> {
        if let Some(path) = env::var_os("TORRE_CONFIG_PATH") {
            return Ok(PathBuf::from(path));
        }

        let config_root = dirs::config_dir().ok_or_else(|| {
            anyhow!("cannot resolve config directory; set TORRE_CONFIG_PATH to the config file")
        })?;
        Ok(config_root.join(APP_NAME).join("config.toml"))
    }

    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = fs::read_to_string(path)
            .with_context(|| format!("read config file {}", path.display()))?;
        let value: toml::Value = toml::from_str(&raw)
            .with_context(|| format!("parse TOML config {}", path.display()))?;

        let version = value
            .get("version")
            .and_then(toml::Value::as_integer)
            .ok_or_else(|| {
                anyhow!(
                    "config file {} has no version; add `version = 1` and place values under [api], [view], and [log]",
                    path.display()
                )
            })?;
        if version != CONFIG_VERSION {
            bail!(
                "unsupported config version {} in {}; expected version = 1",
                version,
                path.display()
            );
        }

        let config: Config = value
            .try_into()
            .with_context(|| format!("decode config {}", path.display()))?;
        config.validate(path)?;
        Ok(config)
    }

    fn validate(&self, path: &Path) -> Result<()> {
        if let Some(base_url) = &self.api.base_url
            && !(base_url.starts_with("http://") || base_url.starts_with("https://"))
        {
            bail!(
                "api.base_url in {} must start with http:// or https://, got {:?}",
                path.display(),
                base_url
            );
        }

        for (key, raw) in [
            ("api.timeout", self.api.timeout.as_deref()),
            ("view.settle_delay", self.view.settle_delay.as_deref()),
        ] {
            let Some(raw) = raw else { continue };
            if parse_duration(raw)? <= Duration::ZERO {
                bail!("{key} in {} must be positive, got {raw}", path.display());
            }
        }

        if let Some(scope) = &self.view.scope
            && TripScope::parse(scope).is_none()
        {
            bail!(
                "view.scope in {} must be \"today\" or \"all\", got {scope:?}",
                path.display()
            );
        }
        if let Some(filter_scope) = &self.view.filter_scope
            && FilterScope::parse(filter_scope).is_none()
        {
            bail!(
                "view.filter_scope in {} must be \"view\" or \"global\", got {filter_scope:?}",
                path.display()
            );
        }
        if self.view.projects.iter().any(|project| project.trim().is_empty()) {
            bail!("view.projects in {} contains an empty name", path.display());
        }

        Ok(())
    }

    /// Config value first, then `TORRE_API_URL`, then the local default.
    pub fn api_base_url(&self) -> String {
        if let Some(url) = &self.api.base_url {
            return url.clone();
        }
        match env::var("TORRE_API_URL") {
            Ok(url) if !url.trim().is_empty() => url,
            _ => DEFAULT_API_BASE_URL.to_owned(),
        }
    }

    pub fn api_timeout(&self) -> Result<Duration> {
        parse_duration(self.api.timeout.as_deref().unwrap_or(DEFAULT_API_TIMEOUT))
    }

    pub fn trip_scope(&self) -> TripScope {
        self.view
            .scope
            .as_deref()
            .and_then(TripScope::parse)
            .unwrap_or_default()
    }

    pub fn filter_scope(&self) -> FilterScope {
        self.view
            .filter_scope
            .as_deref()
            .and_then(FilterScope::parse)
            .unwrap_or_default()
    }

    pub fn projects(&self) -> Vec<String> {
        self.view
            .projects
            .iter()
            .map(|project| project.trim().to_owned())
            .collect()
    }

    pub fn settle_delay(&self) -> Result<Duration> {
        parse_duration(
            self.view
                .settle_delay
                .as_deref()
                .unwrap_or(DEFAULT_SETTLE_DELAY),
        )
    }

    pub fn log_level(&self) -> &str {
        self.log.level.as_deref().unwrap_or(DEFAULT_LOG_LEVEL)
    }

    pub fn log_file(&self) -> Result<PathBuf> {
        if let Some(file) = &self.log.file {
            return Ok(PathBuf::from(file));
        }
        let data_root = dirs::data_local_dir().ok_or_else(|| {
            anyhow!("cannot resolve data directory; set [log].file in the config")
        })?;
        Ok(data_root.join(APP_NAME).join("torre.log"))
    }

    pub fn example_config(path: &Path) -> String {
        format!(
            "# torre config\n# Place this file at: {}\n\nversion = 1\n\n[api]\n# TORRE_API_URL is used when base_url is unset\nbase_url = \"{}\"\ntimeout = \"{}\"\n\n[view]\nscope = \"today\"        # today | all\nfilter_scope = \"view\"  # view | global\nprojects = []\nsettle_delay = \"{}\"\n\n[log]\nlevel = \"{}\"\n# Optional. Default is the platform data dir (for example ~/.local/share/torre/torre.log)\n# file = \"/absolute/path/to/torre.log\"\n",
            path.display(),
            DEFAULT_API_BASE_URL,
            DEFAULT_API_TIMEOUT,
            DEFAULT_SETTLE_DELAY,
            DEFAULT_LOG_LEVEL,
        )
    }
}

fn parse_duration(raw: &str) -> Result<Duration> {
    let parse = |value: &str| -> Result<u64> {
        value
            .trim()
            .parse()
            .with_context(|| format!("invalid duration {raw:?}"))
    };
    if let Some(value) = raw.strip_suffix("ms") {
        return Ok(Duration::from_millis(parse(value)?));
    }
    if let Some(value) = raw.strip_suffix('s') {
        return Ok(Duration::from_secs(parse(value)?));
    }
    if let Some(value) = raw.strip_suffix('m') {
        return Ok(Duration::from_secs(parse(value)? * 60));
    }

    bail!("invalid duration {raw:?}; use one of: <N>ms, <N>s, <N>m (for example 500ms or 10s)")
}

#[cfg(test)]
mod tests {
    use super::{Config, parse_duration};
    use anyhow::Result;
    use std::path::PathBuf;
    use std::sync::{Mutex, OnceLock};
    use std::time::Duration;
    use torre_app::{FilterScope, TripScope};

    fn write_config(content: &str) -> Result<(tempfile::TempDir, PathBuf)> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        std::fs::write(&path, content)?;
        Ok((temp, path))
    }

    fn env_lock() -> std::sync::MutexGuard<'static, ()> {
        static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
        match ENV_LOCK.get_or_init(|| Mutex::new(())).lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    #[test]
    fn missing_config_uses_defaults() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let config = Config::load(&temp.path().join("missing.toml"))?;
        assert_eq!(config.version, 1);
        assert_eq!(config.trip_scope(), TripScope::Today);
        assert_eq!(config.filter_scope(), FilterScope::View);
        assert!(config.projects().is_empty());
        assert_eq!(config.api_timeout()?, Duration::from_secs(10));
        assert_eq!(config.settle_delay()?, Duration::from_secs(3));
        assert_eq!(config.log_level(), "info");
        Ok(())
    }

    #[test]
    fn unversioned_config_is_rejected_with_actionable_message() -> Result<()> {
        let (_temp, path) = write_config("[api]\nbase_url = \"http://fleet\"\n")?;
        let error = Config::load(&path).expect_err("unversioned config should fail");
        let message = error.to_string();
        assert!(message.contains("version = 1"));
        assert!(message.contains("[api], [view], and [log]"));
        Ok(())
    }

    #[test]
    fn full_config_parses() -> Result<()> {
        let (_temp, path) = write_config(
            "version = 1\n[api]\nbase_url = \"https://fleet.example/api\"\ntimeout = \"500ms\"\n[view]\nscope = \"all\"\nfilter_scope = \"global\"\nprojects = [\"Retail\", \" Farma \"]\nsettle_delay = \"1s\"\n[log]\nlevel = \"debug\"\nfile = \"/var/log/torre.log\"\n",
        )?;

        let config = Config::load(&path)?;
        assert_eq!(config.api_base_url(), "https://fleet.example/api");
        assert_eq!(config.api_timeout()?, Duration::from_millis(500));
        assert_eq!(config.trip_scope(), TripScope::All);
        assert_eq!(config.filter_scope(), FilterScope::Global);
        assert_eq!(config.projects(), vec!["Retail", "Farma"]);
        assert_eq!(config.settle_delay()?, Duration::from_secs(1));
        assert_eq!(config.log_level(), "debug");
        assert_eq!(config.log_file()?, PathBuf::from("/var/log/torre.log"));
        Ok(())
    }

    #[test]
    fn malformed_config_returns_parse_error() -> Result<()> {
        let (_temp, path) = write_config("{{not toml")?;
        let error = Config::load(&path).expect_err("malformed config should fail");
        assert!(error.to_string().contains("parse TOML config"));
        Ok(())
    }

    #[test]
    fn unsupported_config_version_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 2\n")?;
        let error = Config::load(&path).expect_err("v2 config should fail");
        assert!(error.to_string().contains("unsupported config version 2"));
        Ok(())
    }

    #[test]
    fn invalid_view_values_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[view]\nscope = \"week\"\n")?;
        let error = Config::load(&path).expect_err("unknown scope should fail");
        assert!(error.to_string().contains("view.scope"));

        let (_temp, path) = write_config("version = 1\n[view]\nfilter_scope = \"tab\"\n")?;
        let error = Config::load(&path).expect_err("unknown filter scope should fail");
        assert!(error.to_string().contains("view.filter_scope"));

        let (_temp, path) = write_config("version = 1\n[view]\nprojects = [\"Retail\", \" \"]\n")?;
        let error = Config::load(&path).expect_err("blank project should fail");
        assert!(error.to_string().contains("empty name"));
        Ok(())
    }

    #[test]
    fn non_http_base_url_is_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\nbase_url = \"ftp://fleet\"\n")?;
        let error = Config::load(&path).expect_err("ftp base url should fail");
        assert!(error.to_string().contains("api.base_url"));
        Ok(())
    }

    #[test]
    fn zero_durations_are_rejected() -> Result<()> {
        let (_temp, path) = write_config("version = 1\n[api]\ntimeout = \"0s\"\n")?;
        let error = Config::load(&path).expect_err("zero timeout should fail");
        assert!(error.to_string().contains("api.timeout"));
        assert!(error.to_string().contains("must be positive"));

        let (_temp, path) = write_config("version = 1\n[view]\nsettle_delay = \"0ms\"\n")?;
        let error = Config::load(&path).expect_err("zero settle delay should fail");
        assert!(error.to_string().contains("view.settle_delay"));
        Ok(())
    }

    #[test]
    fn duration_parses_ms_seconds_and_minutes() -> Result<()> {
        assert_eq!(parse_duration("500ms")?, Duration::from_millis(500));
        assert_eq!(parse_duration("10s")?, Duration::from_secs(10));
        assert_eq!(parse_duration("2m")?, Duration::from_secs(120));
        Ok(())
    }

    #[test]
    fn duration_rejects_garbage() {
        let error = parse_duration("soon").expect_err("invalid duration should fail");
        assert!(error.to_string().contains("invalid duration"));
        let error = parse_duration("10h").expect_err("hours are not supported");
        assert!(error.to_string().contains("invalid duration"));
    }

    #[test]
    fn default_path_honors_env_override() -> Result<()> {
        let _guard = env_lock();
        let temp = tempfile::tempdir()?;
        let override_path = temp.path().join("custom-config.toml");
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TORRE_CONFIG_PATH", &override_path);
        }
        let resolved = Config::default_path();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TORRE_CONFIG_PATH");
        }
        assert_eq!(resolved?, override_path);
        Ok(())
    }

    #[test]
    fn base_url_prefers_config_over_env() -> Result<()> {
        let _guard = env_lock();
        let (_temp, path) =
            write_config("version = 1\n[api]\nbase_url = \"http://from-config:3000\"\n")?;
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::set_var("TORRE_API_URL", "http://from-env:3000");
        }
        let config = Config::load(&path);
        let from_default = Config::default().api_base_url();
        // SAFETY: test cleanup for process-local env mutation.
        unsafe {
            std::env::remove_var("TORRE_API_URL");
        }
        assert_eq!(config?.api_base_url(), "http://from-config:3000");
        assert_eq!(from_default, "http://from-env:3000");
        Ok(())
    }

    #[test]
    fn base_url_falls_back_to_localhost() {
        let _guard = env_lock();
        // SAFETY: test-only process-local env mutation.
        unsafe {
            std::env::remove_var("TORRE_API_URL");
        }
        assert_eq!(Config::default().api_base_url(), "http://localhost:3000");
    }

    #[test]
    fn log_file_defaults_under_data_dir() -> Result<()> {
        let config = Config::default();
        let path = config.log_file()?;
        assert!(path.ends_with("torre/torre.log"), "got {}", path.display());
        Ok(())
    }

    #[test]
    fn example_config_loads_cleanly() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("config.toml");
        let example = Config::example_config(&path);
        assert!(example.contains("version = 1"));
        assert!(example.contains("[api]"));
        assert!(example.contains("[view]"));
        assert!(example.contains("[log]"));

        std::fs::write(&path, &example)?;
        let config = Config::load(&path)?;
        assert_eq!(config.trip_scope(), TripScope::Today);
        Ok(())
    }
}
