use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE: &str = "codechat.json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub model: String,
    pub ollama_url: String,
    pub sessions_dir: PathBuf,
    /// Default `tracing` filter; `RUST_LOG` takes precedence.
    pub log_filter: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            model: "qwen2.5-coder:1.5b".to_string(),
            ollama_url: "http://localhost:11434".to_string(),
            sessions_dir: PathBuf::from("sessions"),
            log_filter: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then `codechat.json` in the working directory, then environment.
    pub fn load() -> Result<Self> {
        let mut config = Self::from_file(Path::new(CONFIG_FILE))?;
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok(config)
    }

    /// A missing file yields the defaults; a malformed one is an error.
    pub fn from_file(path: &Path) -> Result<Self> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(err) => {
                return Err(Error::Config(format!(
                    "failed to read {}: {err}",
                    path.display()
                )))
            }
        };
        serde_json::from_str(&data)
            .map_err(|err| Error::Config(format!("failed to parse {}: {err}", path.display())))
    }

    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let lookup = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());
        if let Some(model) = lookup("CODECHAT_MODEL") {
            self.model = model;
        }
        if let Some(url) = lookup("OLLAMA_HOST") {
            self.ollama_url = normalize_host(&url);
        }
        if let Some(dir) = lookup("CODECHAT_SESSIONS_DIR") {
            self.sessions_dir = PathBuf::from(dir);
        }
        if let Some(filter) = lookup("CODECHAT_LOG") {
            self.log_filter = filter;
        }
    }
}

/// `OLLAMA_HOST` is often given as a bare `host:port`.
fn normalize_host(raw: &str) -> String {
    let raw = raw.trim();
    if raw.starts_with("http://") || raw.starts_with("https://") {
        raw.to_string()
    } else {
        format!("http://{raw}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let config = AppConfig::from_file(&temp_dir.path().join(CONFIG_FILE)).expect("load config");
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_file_keeps_other_defaults() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, r#"{"model":"llama3"}"#).expect("write fixture");

        let config = AppConfig::from_file(&path).expect("load config");
        assert_eq!(config.model, "llama3");
        assert_eq!(config.ollama_url, "http://localhost:11434");
        assert_eq!(config.sessions_dir, PathBuf::from("sessions"));
    }

    #[test]
    fn malformed_file_is_config_error() {
        let temp_dir = TempDir::new().expect("create temp dir");
        let path = temp_dir.path().join(CONFIG_FILE);
        fs::write(&path, "{model:").expect("write fixture");

        assert!(matches!(AppConfig::from_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn environment_overrides_win() {
        let env: HashMap<&str, &str> = [
            ("CODECHAT_MODEL", "mistral"),
            ("OLLAMA_HOST", "127.0.0.1:9999"),
            ("CODECHAT_SESSIONS_DIR", "/tmp/chats"),
            ("CODECHAT_LOG", " "),
        ]
        .into_iter()
        .collect();

        let mut config = AppConfig::default();
        config.apply_overrides(|key| env.get(key).map(|value| value.to_string()));

        assert_eq!(config.model, "mistral");
        assert_eq!(config.ollama_url, "http://127.0.0.1:9999");
        assert_eq!(config.sessions_dir, PathBuf::from("/tmp/chats"));
        assert_eq!(config.log_filter, "info");
    }
}
