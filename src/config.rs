//! Configuration loader and validator for the clinic portal client.
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid configuration: {0}")]
    Invalid(&'static str),
}

/// Root configuration struct mirroring the YAML schema exactly.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Config {
    pub app: App,
    pub api: Api,
    #[serde(default)]
    pub session: Session,
}

/// App-level settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct App {
    pub data_dir: String,
}

/// Backend REST API settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Api {
    pub base_url: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

/// Temporary (guest) patient session settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Session {
    pub temporary_ttl_hours: u64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            temporary_ttl_hours: 24,
        }
    }
}

fn default_user_agent() -> String {
    "clinic-portal/0.1".to_string()
}

impl App {
    /// Expand a leading `~/` in `data_dir` to `$HOME`.
    pub fn resolved_data_dir(&self) -> PathBuf {
        match self.data_dir.strip_prefix("~/") {
            Some(rest) => match std::env::var("HOME") {
                Ok(home) => Path::new(&home).join(rest),
                Err(_) => PathBuf::from(&self.data_dir),
            },
            None => PathBuf::from(&self.data_dir),
        }
    }
}

impl Api {
    /// Parsed base URL, normalised to end with `/` so relative joins keep the `/api` prefix.
    pub fn url(&self) -> Result<Url, ConfigError> {
        let mut raw = self.base_url.trim().to_string();
        if !raw.ends_with('/') {
            raw.push('/');
        }
        Url::parse(&raw).map_err(|_| ConfigError::Invalid("api.base_url must be a valid URL"))
    }
}

impl Config {
    /// Ensure required directories exist (creates `app.data_dir` if missing).
    pub fn ensure_dirs(&self) -> Result<(), std::io::Error> {
        if self.app.data_dir.trim().is_empty() {
            return Ok(());
        }
        fs::create_dir_all(self.app.resolved_data_dir())
    }
}

/// Load configuration from a YAML file and validate it.
/// - If `path` is None, uses `config.yaml` in the current working directory.
pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = path.unwrap_or_else(|| Path::new("config.yaml"));
    let content = fs::read_to_string(path)?;
    let cfg: Config = serde_yaml::from_str(&content)?;
    validate(&cfg)?;
    Ok(cfg)
}

/// Validate a configuration instance.
fn validate(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.app.data_dir.trim().is_empty() {
        return Err(ConfigError::Invalid("app.data_dir must be non-empty"));
    }

    if cfg.api.base_url.trim().is_empty() {
        return Err(ConfigError::Invalid("api.base_url must be non-empty"));
    }
    let url = cfg.api.url()?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::Invalid("api.base_url must use http or https"));
    }
    if cfg.api.user_agent.trim().is_empty() {
        return Err(ConfigError::Invalid("api.user_agent must be non-empty"));
    }

    if cfg.session.temporary_ttl_hours == 0 {
        return Err(ConfigError::Invalid("session.temporary_ttl_hours must be > 0"));
    }

    Ok(())
}

/// Returns the canonical example YAML.
pub fn example() -> &'static str {
    r#"app:
  data_dir: "./data"

api:
  base_url: "http://localhost:3001/api/"
  user_agent: "clinic-portal/0.1"

session:
  temporary_ttl_hours: 24
"#
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn parse_example_ok() {
        let cfg: Config = serde_yaml::from_str(example()).unwrap();
        validate(&cfg).unwrap();
        assert_eq!(cfg.api.url().unwrap().as_str(), "http://localhost:3001/api/");
    }

    #[test]
    fn base_url_gets_trailing_slash() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "http://clinic.test/api".into();
        let url = cfg.api.url().unwrap();
        assert_eq!(url.join("appointments").unwrap().path(), "/api/appointments");
    }

    #[test]
    fn invalid_base_url() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("api.base_url")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "not a url".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.api.base_url = "ftp://clinic.test/api/".into();
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn invalid_data_dir_and_ttl() {
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = " ".into();
        let err = validate(&cfg).unwrap_err();
        match err {
            ConfigError::Invalid(msg) => assert!(msg.contains("data_dir")),
            _ => panic!("wrong error"),
        }

        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.session.temporary_ttl_hours = 0;
        assert!(matches!(validate(&cfg), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn session_section_defaults() {
        let raw = "app:\n  data_dir: ./d\napi:\n  base_url: http://localhost:3001/api/\n";
        let cfg: Config = serde_yaml::from_str(raw).unwrap();
        assert_eq!(cfg.session.temporary_ttl_hours, 24);
        assert_eq!(cfg.api.user_agent, "clinic-portal/0.1");
    }

    #[test]
    fn ensure_dirs_creates_data_dir() {
        let td = tempdir().unwrap();
        let data_path = td.path().join("data");
        let mut cfg: Config = serde_yaml::from_str(example()).unwrap();
        cfg.app.data_dir = data_path.to_string_lossy().to_string();
        cfg.ensure_dirs().unwrap();
        assert!(data_path.exists());
    }

    #[test]
    fn load_from_file_ok() {
        let td = tempdir().unwrap();
        let p = td.path().join("config.yaml");
        fs::write(&p, example()).unwrap();
        let cfg = load(Some(&p)).unwrap();
        assert_eq!(cfg.app.data_dir, "./data");
    }
}
