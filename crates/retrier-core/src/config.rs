use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Report settings (optional section in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportConfig {
    /// Print a summary to stderr after every `retry run`.
    pub enabled: bool,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

/// Global configuration loaded from `~/.config/retrier/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrierConfig {
    /// Overall budget of a `retry run`, e.g. "1m" or "30s".
    pub timeout: String,
    /// Strategy flags used when the command line gives none,
    /// e.g. `["--limit=3", "--backoff=lin[1s]"]`.
    #[serde(default)]
    pub strategies: Vec<String>,
    /// Optional report settings; if missing, the report is printed.
    #[serde(default)]
    pub report: Option<ReportConfig>,
}

impl Default for RetrierConfig {
    fn default() -> Self {
        Self {
            timeout: "1m".to_string(),
            strategies: Vec::new(),
            report: None,
        }
    }
}

impl RetrierConfig {
    pub fn report_enabled(&self) -> bool {
        self.report.as_ref().map_or(true, |r| r.enabled)
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("retrier")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load configuration from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<RetrierConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = RetrierConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }
    load_from_path(&path)
}

/// Load configuration from an explicit path. The file must exist.
pub fn load_from_path(path: &Path) -> Result<RetrierConfig> {
    let data = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let cfg: RetrierConfig =
        toml::from_str(&data).with_context(|| format!("parsing config {}", path.display()))?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = RetrierConfig::default();
        assert_eq!(cfg.timeout, "1m");
        assert!(cfg.strategies.is_empty());
        assert!(cfg.report.is_none());
        assert!(cfg.report_enabled());
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = RetrierConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: RetrierConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.timeout, cfg.timeout);
        assert_eq!(parsed.strategies, cfg.strategies);
    }

    #[test]
    fn config_toml_custom_values() {
        let toml = r#"
            timeout = "30s"
            strategies = ["--limit=3", "--backoff=exp[10ms,2]"]

            [report]
            enabled = false
        "#;
        let cfg: RetrierConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.timeout, "30s");
        assert_eq!(cfg.strategies, vec!["--limit=3", "--backoff=exp[10ms,2]"]);
        assert!(!cfg.report_enabled());
    }

    #[test]
    fn config_toml_missing_optional_sections() {
        let cfg: RetrierConfig = toml::from_str(r#"timeout = "5m""#).unwrap();
        assert!(cfg.strategies.is_empty());
        assert!(cfg.report_enabled());
    }

    #[test]
    fn load_from_path_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout = \"2s\"\n").unwrap();
        let cfg = load_from_path(&path).unwrap();
        assert_eq!(cfg.timeout, "2s");
    }

    #[test]
    fn load_from_path_reports_bad_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "timeout = [").unwrap();
        let err = load_from_path(&path).unwrap_err();
        assert!(err.to_string().starts_with("parsing config"));
    }
}
