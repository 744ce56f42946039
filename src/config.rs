use std::collections::HashMap;
use std::path::PathBuf;

use anyhow::Result;
use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

mod defaults;
mod validation;

const DEFAULT_CONFIG_PATH: &str = "bootstrap.toml";
const ENV_PREFIX: &str = "VAULT";

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    /// Service address used once the cluster is live.
    pub addr: String,
    /// Comma-separated member URLs; the first is the bootstrap leader.
    pub cluster_members: String,
    pub key_shares: u32,
    pub key_threshold: u32,
    pub enable_init: bool,
    pub enable_k8ssecret: bool,
    pub enable_unseal: bool,
    pub enable_k8sauth: bool,
    /// Print generated material in cleartext. Debug only.
    pub log_secrets: bool,
    pub k8sauth_service_account: String,
    pub secret_root: String,
    pub secret_unseal: String,
    #[serde(default)]
    pub namespace: String,
    #[serde(default = "defaults::default_roles")]
    pub roles: Vec<RoleBinding>,
    #[serde(default)]
    pub kubernetes: KubernetesSettings,
}

/// Kubernetes auth role bound to a service account.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct RoleBinding {
    pub name: String,
    pub service_account: String,
    pub namespace: String,
    #[serde(default = "defaults::default_role_ttl")]
    pub ttl: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct KubernetesSettings {
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default = "defaults::default_kubernetes_port")]
    pub port: u16,
    #[serde(default = "defaults::default_token_path")]
    pub token_path: PathBuf,
    #[serde(default = "defaults::default_ca_path")]
    pub ca_path: PathBuf,
    #[serde(default = "defaults::default_namespace_path")]
    pub namespace_path: PathBuf,
}

impl Default for KubernetesSettings {
    fn default() -> Self {
        Self {
            host: None,
            port: defaults::default_kubernetes_port(),
            token_path: defaults::default_token_path(),
            ca_path: defaults::default_ca_path(),
            namespace_path: defaults::default_namespace_path(),
        }
    }
}

impl KubernetesSettings {
    /// API server URL, if a host is known.
    #[must_use]
    pub fn api_url(&self) -> Option<String> {
        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        if host.contains(':') && !host.starts_with('[') {
            Some(format!("https://[{host}]:{}", self.port))
        } else {
            Some(format!("https://{host}:{}", self.port))
        }
    }
}

impl Settings {
    /// Loads settings from defaults, an optional file and `VAULT_*` variables.
    ///
    /// # Errors
    /// Returns error if the file or an environment value cannot be parsed.
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        Self::load(config_path, None)
    }

    /// Like [`Settings::new`], reading variables from `env` instead of the
    /// process environment when given.
    ///
    /// # Errors
    /// Returns error if the file or an environment value cannot be parsed.
    pub fn load(
        config_path: Option<PathBuf>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let builder = defaults::apply_defaults(Config::builder())?;

        let path = config_path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH));
        let builder = builder
            .add_source(File::from(path).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).source(env));

        builder.build()?.try_deserialize()
    }

    /// Applies CLI and platform overrides on top of loaded settings.
    pub fn merge_with_args(&mut self, args: &crate::Args) {
        if let Some(namespace) = &args.namespace {
            namespace.clone_into(&mut self.namespace);
        }
        if let Some(host) = &args.kubernetes_host {
            self.kubernetes.host = Some(host.clone());
        }
        if let Some(port) = args.kubernetes_port {
            self.kubernetes.port = port;
        }
    }

    /// Falls back to the pod's service-account namespace when none is set.
    pub fn resolve_namespace(&mut self) {
        if !self.namespace.trim().is_empty() {
            return;
        }
        if let Ok(contents) = std::fs::read_to_string(&self.kubernetes.namespace_path) {
            contents.trim().clone_into(&mut self.namespace);
        }
    }

    /// Validates the settings before any network call is made.
    ///
    /// # Errors
    /// Returns error if any setting is invalid or phases are inconsistent.
    pub fn validate(&self) -> Result<()> {
        validation::validate_settings(self)
    }

    #[must_use]
    pub fn material_keys(&self) -> crate::material::MaterialKeys {
        crate::material::MaterialKeys {
            root_token: self.secret_root.clone(),
            unseal_keys: self.secret_unseal.clone(),
        }
    }
}
