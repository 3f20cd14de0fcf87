use std::{
    env,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::repository::EngineOptions;

/// Expand tilde (~) in path to user's home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Some(s) = path.to_str() {
        if let Some(stripped) = s.strip_prefix("~/") {
            if let Some(home) = dirs::home_dir() {
                return home.join(stripped);
            }
        } else if s == "~" {
            if let Some(home) = dirs::home_dir() {
                return home;
            }
        }
    }
    path.to_path_buf()
}

/// Configuration for gitlab-composer
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// GitLab API url including the version, e.g. https://gitlab.com/api/v4/
    #[serde(default)]
    pub url: String,
    /// GitLab API token
    #[serde(default)]
    pub token: String,
    /// Verify the GitLab TLS certificate
    #[serde(default = "defaults::verify_ssl")]
    pub verify_ssl: bool,
    /// Address the HTTP server listens on
    #[serde(default = "defaults::listen_addr")]
    pub listen_addr: String,
    /// Minutes between two polling cycles
    #[serde(default = "defaults::interval_minutes")]
    pub interval_minutes: u64,
    /// Projects requested per page
    #[serde(default = "defaults::per_page")]
    pub per_page: u32,
    /// Package metadata file read from each repository
    #[serde(default = "defaults::descriptor_path")]
    pub descriptor_path: String,
    /// Timeout of a single GitLab request
    #[serde(default = "defaults::request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Re-attempt failed references on the next cycle even if the project
    /// did not change
    #[serde(default = "defaults::retry_failed_references")]
    pub retry_failed_references: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            url: String::new(),
            token: String::new(),
            verify_ssl: defaults::verify_ssl(),
            listen_addr: defaults::listen_addr(),
            interval_minutes: defaults::interval_minutes(),
            per_page: defaults::per_page(),
            descriptor_path: defaults::descriptor_path(),
            request_timeout_secs: defaults::request_timeout_secs(),
            retry_failed_references: defaults::retry_failed_references(),
        }
    }
}

impl Config {
    /// Load configuration from the config file (if any) and environment
    /// variables. `path` overrides the default config file location and
    /// must exist when given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => Self::load_from_file(&expand_tilde(path))?,
            None => {
                let default_path = Self::config_file_path()?;
                tracing::debug!("loading gitlab-composer config from {:?}", default_path);
                if default_path.exists() {
                    Self::load_from_file(&default_path)?
                } else {
                    Self::default()
                }
            }
        };

        config.apply_env()?;
        Ok(config)
    }

    /// Load configuration from a file
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;

        serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {:?}", path))
    }

    /// Override fields from `GITLAB_COMPOSER_*` environment variables
    pub fn apply_env(&mut self) -> Result<()> {
        if let Ok(url) = env::var("GITLAB_COMPOSER_URL") {
            self.url = url;
        }

        if let Ok(token) = env::var("GITLAB_COMPOSER_TOKEN") {
            self.token = token;
        }

        if let Ok(verify) = env::var("GITLAB_COMPOSER_VERIFY_SSL") {
            self.verify_ssl = verify
                .parse()
                .context("Failed to parse GITLAB_COMPOSER_VERIFY_SSL as bool")?;
        }

        if let Ok(addr) = env::var("GITLAB_COMPOSER_ADDR") {
            self.listen_addr = addr;
        }

        if let Ok(interval) = env::var("GITLAB_COMPOSER_INTERVAL") {
            self.interval_minutes = interval
                .parse()
                .context("Failed to parse GITLAB_COMPOSER_INTERVAL as u64")?;
        }
        Ok(())
    }

    /// Check that the service can start with this configuration
    pub fn validate(&self) -> Result<()> {
        if self.url.trim().is_empty() {
            anyhow::bail!("GitLab API url is required (--url or GITLAB_COMPOSER_URL)");
        }
        if self.token.is_empty() {
            anyhow::bail!("GitLab API token is required (--token or GITLAB_COMPOSER_TOKEN)");
        }
        if self.listen_addr.trim().is_empty() {
            anyhow::bail!("listen address must not be empty");
        }
        if self.interval_minutes == 0 {
            anyhow::bail!("interval must be at least one minute");
        }
        if self.per_page == 0 {
            anyhow::bail!("per_page must be positive");
        }
        Ok(())
    }

    /// Get default config file path
    pub fn config_file_path() -> Result<PathBuf> {
        dirs::home_dir()
            .map(|home| home.join(".config/gitlab-composer/config.yaml"))
            .context("Could not determine home directory for config file")
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_minutes * 60)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Listen address, accepting the `:7070` shorthand for all interfaces
    pub fn socket_addr(&self) -> String {
        match self.listen_addr.strip_prefix(':') {
            Some(port) => format!("0.0.0.0:{port}"),
            None => self.listen_addr.clone(),
        }
    }

    pub fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            per_page: self.per_page,
            descriptor_path: self.descriptor_path.clone(),
            retry_failed_references: self.retry_failed_references,
        }
    }
}

mod defaults {
    pub(crate) fn verify_ssl() -> bool {
        true
    }

    pub(crate) fn listen_addr() -> String {
        ":7070".to_string()
    }

    pub(crate) fn interval_minutes() -> u64 {
        5
    }

    pub(crate) fn per_page() -> u32 {
        100
    }

    pub(crate) fn descriptor_path() -> String {
        "composer.json".to_string()
    }

    pub(crate) fn request_timeout_secs() -> u64 {
        30
    }

    pub(crate) fn retry_failed_references() -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_all_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(
            &config_path,
            r#"url: https://gitlab.example.com/api/v4/
token: secret
verify_ssl: false
listen_addr: "127.0.0.1:8080"
interval_minutes: 7
per_page: 20
descriptor_path: composer.json
request_timeout_secs: 5
retry_failed_references: false
"#,
        )
        .unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert_eq!(
            loaded,
            Config {
                url: "https://gitlab.example.com/api/v4/".to_string(),
                token: "secret".to_string(),
                verify_ssl: false,
                listen_addr: "127.0.0.1:8080".to_string(),
                interval_minutes: 7,
                per_page: 20,
                descriptor_path: "composer.json".to_string(),
                request_timeout_secs: 5,
                retry_failed_references: false,
            }
        );
        assert_eq!(loaded.request_timeout(), Duration::from_secs(5));
        assert!(!loaded.engine_options().retry_failed_references);
    }

    #[test]
    fn test_defaults_fill_missing_fields() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        let yaml = "url: https://gitlab.example.com/api/v3/\ntoken: t\n";
        std::fs::write(&config_path, yaml).unwrap();

        let loaded = Config::load_from_file(&config_path).unwrap();
        assert!(loaded.verify_ssl);
        assert_eq!(loaded.listen_addr, ":7070");
        assert_eq!(loaded.interval(), Duration::from_secs(300));
        assert_eq!(loaded.per_page, 100);
        assert_eq!(loaded.descriptor_path, "composer.json");
        loaded.validate().unwrap();
    }

    #[test]
    fn test_unknown_fields_rejected() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "url: x\nbogus: 1\n").unwrap();

        assert!(Config::load_from_file(&config_path).is_err());
    }

    #[test]
    fn test_explicit_path_must_exist() {
        let dir = tempdir().unwrap();
        assert!(Config::load(Some(dir.path().join("missing.yaml").as_path())).is_err());
    }

    #[test]
    fn test_env_override() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.yaml");
        std::fs::write(&config_path, "url: from-file\ntoken: t\n").unwrap();

        env::set_var("GITLAB_COMPOSER_INTERVAL", "10");
        env::set_var("GITLAB_COMPOSER_VERIFY_SSL", "false");

        let config = Config::load(Some(config_path.as_path())).unwrap();
        assert_eq!(config.url, "from-file");
        assert_eq!(config.interval_minutes, 10);
        assert!(!config.verify_ssl);

        env::remove_var("GITLAB_COMPOSER_INTERVAL");
        env::remove_var("GITLAB_COMPOSER_VERIFY_SSL");
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.url = "https://gitlab.example.com/api/v4/".to_string();
        assert!(config.validate().is_err());

        config.token = "t".to_string();
        config.validate().unwrap();

        config.interval_minutes = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tilde_expansion() {
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_tilde(Path::new("~/a/b.yaml")), home.join("a/b.yaml"));
            assert_eq!(expand_tilde(Path::new("~")), home);
        }
        assert_eq!(expand_tilde(Path::new("/etc/x.yaml")), PathBuf::from("/etc/x.yaml"));
    }

    #[test]
    fn test_socket_addr_shorthand() {
        let mut config = Config::default();
        assert_eq!(config.socket_addr(), "0.0.0.0:7070");

        config.listen_addr = "127.0.0.1:8080".to_string();
        assert_eq!(config.socket_addr(), "127.0.0.1:8080");
    }
}
