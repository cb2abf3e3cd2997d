//! Controller configuration
//!
//! Loaded from TOML:
//!
//! ```toml
//! cluster_resource_namespace = "sentinel-system"
//!
//! [logging]
//! level = "info"
//! format = "json"
//!
//! [[issuers]]
//! name = "letsencrypt"
//! kind = "ClusterIssuer"
//!
//! [issuers.acme]
//! server = "https://acme-v02.api.letsencrypt.org/directory"
//! email = "ops@example.com"
//! private_key_secret = "letsencrypt-account-key"
//! http01 = {}
//!
//! [[issuers.acme.dns01.providers]]
//! name = "cloudflare"
//! provider = "cloudflare"
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use sentinel_common::LoggingConfig;

use crate::challenges::DEFAULT_ORDER_NAME_LABEL;
use crate::issuer::{Issuer, IssuerCatalog, IssuerContext};
use crate::resources::IssuerKind;

/// Errors loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Root configuration of the order controller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ControllerConfig {
    /// Namespace holding secrets of cluster issuers
    #[serde(default = "default_cluster_resource_namespace")]
    pub cluster_resource_namespace: String,

    /// Label key tying Challenges to their Order
    #[serde(default = "default_order_name_label")]
    pub order_name_label: String,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub issuers: Vec<Issuer>,
}

fn default_cluster_resource_namespace() -> String {
    "sentinel-system".to_string()
}

fn default_order_name_label() -> String {
    DEFAULT_ORDER_NAME_LABEL.to_string()
}

impl Default for ControllerConfig {
    fn default() -> Self {
        Self {
            cluster_resource_namespace: default_cluster_resource_namespace(),
            order_name_label: default_order_name_label(),
            logging: LoggingConfig::default(),
            issuers: Vec::new(),
        }
    }
}

impl ControllerConfig {
    /// Load and validate a TOML config file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(path = %path.display(), "Loaded controller config file");
        Self::from_toml_str(&content)
    }

    /// Parse and validate TOML config
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.order_name_label.trim().is_empty() {
            return Err(ConfigError::Invalid("order_name_label must not be empty".into()));
        }
        if self.cluster_resource_namespace.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "cluster_resource_namespace must not be empty".into(),
            ));
        }

        let mut seen = HashSet::new();
        for issuer in &self.issuers {
            if issuer.name.is_empty() {
                return Err(ConfigError::Invalid("issuer name must not be empty".into()));
            }
            if issuer.kind == IssuerKind::Issuer && issuer.namespace.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "issuer '{}' is namespaced but has no namespace",
                    issuer.name
                )));
            }
            if !seen.insert(issuer.key()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate {:?} '{}'",
                    issuer.kind, issuer.name
                )));
            }

            let Some(acme) = &issuer.acme else { continue };
            if acme.server.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "ACME issuer '{}' has no server URL",
                    issuer.name
                )));
            }
            if let Some(dns01) = &acme.dns01 {
                let mut providers = HashSet::new();
                for provider in &dns01.providers {
                    if provider.name.is_empty() {
                        return Err(ConfigError::Invalid(format!(
                            "ACME issuer '{}' has a DNS-01 provider without a name",
                            issuer.name
                        )));
                    }
                    if !providers.insert(provider.name.as_str()) {
                        return Err(ConfigError::Invalid(format!(
                            "ACME issuer '{}' defines DNS-01 provider '{}' twice",
                            issuer.name, provider.name
                        )));
                    }
                }
            }
        }
        Ok(())
    }

    /// Issuer catalog holding the configured issuers
    pub fn issuer_catalog(&self) -> IssuerCatalog {
        IssuerCatalog::new(self.issuers.iter().cloned())
    }

    /// Context handed to ACME client constructors
    pub fn issuer_context(&self) -> IssuerContext {
        IssuerContext {
            cluster_resource_namespace: self.cluster_resource_namespace.clone(),
        }
    }
}
