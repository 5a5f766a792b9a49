//! Operator configuration.
//!
//! Loaded from a TOML file; every field has a default so an empty file is
//! a valid single-user, authless setup rooted in the working directory.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::debug;

use quire_types::SitePrefix;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("parsing {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// How tenant sites are addressed on the content domain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum MultisiteMode {
    /// `alice.example.com`
    #[default]
    Subdomain,
    /// `example.com/alice/`
    Subdirectory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "kebab-case")]
pub struct QuireConfig {
    /// Root of the content tree.
    pub content_dir: PathBuf,

    /// Where in-flight writes are staged. Must share a volume with
    /// `content_dir`; defaults to a hidden sibling of it.
    pub staging_dir: Option<PathBuf>,

    /// Database DSN. Absent means authless single-tenant mode with
    /// stateless cookie sessions. `"sqlite"` means `quire.db` next to the
    /// content directory.
    pub database: Option<String>,

    /// `http://` or `https://`. Controls `Secure` cookies.
    pub scheme: String,

    pub admin_domain: String,

    pub content_domain: String,

    pub multisite_mode: MultisiteMode,

    pub session_ttl_secs: u64,

    pub reset_token_ttl_secs: u64,
}

impl Default for QuireConfig {
    fn default() -> Self {
        Self {
            content_dir: PathBuf::from("content"),
            staging_dir: None,
            database: None,
            scheme: "http://".to_string(),
            admin_domain: "localhost:6444".to_string(),
            content_domain: "localhost:6444".to_string(),
            multisite_mode: MultisiteMode::default(),
            session_ttl_secs: 300,
            reset_token_ttl_secs: 3600,
        }
    }
}

impl QuireConfig {
    /// Load from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from `path` if it exists, otherwise use defaults.
    pub fn load_or_default(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scheme != "http://" && self.scheme != "https://" {
            return Err(ConfigError::Invalid(format!(
                "scheme must be \"http://\" or \"https://\", got {:?}",
                self.scheme
            )));
        }
        if self.session_ttl_secs == 0 {
            return Err(ConfigError::Invalid("session-ttl-secs must be positive".into()));
        }
        Ok(())
    }

    pub fn staging_dir(&self) -> PathBuf {
        match &self.staging_dir {
            Some(dir) => dir.clone(),
            None => {
                let name = self
                    .content_dir
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "content".to_string());
                self.content_dir.with_file_name(format!(".{name}-staging"))
            }
        }
    }

    /// The DSN to hand to the driver registry, with `"sqlite"` expanded.
    pub fn database_dsn(&self) -> Option<String> {
        let dsn = self.database.as_deref()?.trim();
        if dsn.is_empty() {
            return None;
        }
        if dsn == "sqlite" {
            let path = self.content_dir.with_file_name("quire.db");
            return Some(path.to_string_lossy().into_owned());
        }
        Some(dsn.to_string())
    }

    pub fn is_secure(&self) -> bool {
        self.scheme == "https://"
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn reset_token_ttl(&self) -> Duration {
        Duration::from_secs(self.reset_token_ttl_secs)
    }

    /// Public URL of a site's content.
    pub fn content_site_url(&self, site: &SitePrefix) -> String {
        if site.is_default() {
            return format!("{}{}/", self.scheme, self.content_domain);
        }
        if site.is_custom_domain() {
            return format!("{}{}/", self.scheme, site.as_str());
        }
        match self.multisite_mode {
            MultisiteMode::Subdomain => {
                format!("{}{}.{}/", self.scheme, site.site_name(), self.content_domain)
            }
            MultisiteMode::Subdirectory => {
                format!("{}{}/{}/", self.scheme, self.content_domain, site.as_str())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_is_default() {
        let config: QuireConfig = toml::from_str("").unwrap();
        assert_eq!(config, QuireConfig::default());
        assert!(config.validate().is_ok());
        assert!(config.database_dsn().is_none());
    }

    #[test]
    fn test_parse_kebab_case() {
        let config: QuireConfig = toml::from_str(
            r#"
            content-dir = "/srv/quire/content"
            database = "sqlite"
            scheme = "https://"
            content-domain = "example.com"
            multisite-mode = "subdirectory"
            session-ttl-secs = 120
            "#,
        )
        .unwrap();
        assert!(config.is_secure());
        assert_eq!(config.session_ttl(), Duration::from_secs(120));
        assert_eq!(config.multisite_mode, MultisiteMode::Subdirectory);
        assert_eq!(config.database_dsn().as_deref(), Some("/srv/quire/quire.db"));
        assert_eq!(
            config.staging_dir(),
            PathBuf::from("/srv/quire/.content-staging")
        );
    }

    #[test]
    fn test_invalid_scheme() {
        let config = QuireConfig {
            scheme: "ftp://".into(),
            ..QuireConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn test_content_site_url() {
        let mut config = QuireConfig {
            scheme: "https://".into(),
            content_domain: "example.com".into(),
            ..QuireConfig::default()
        };
        let alice = SitePrefix::from_site_name("alice");
        let custom = SitePrefix::from_site_name("alice.dev");

        assert_eq!(config.content_site_url(&SitePrefix::default_site()), "https://example.com/");
        assert_eq!(config.content_site_url(&alice), "https://alice.example.com/");
        assert_eq!(config.content_site_url(&custom), "https://alice.dev/");

        config.multisite_mode = MultisiteMode::Subdirectory;
        assert_eq!(config.content_site_url(&alice), "https://example.com/@alice/");
    }
}
