use std::path::PathBuf;

use config::{ConfigBuilder, ConfigError, builder::DefaultState};

use super::RoleBinding;

const DEFAULT_ADDR: &str = "https://vault:8200";
const DEFAULT_CLUSTER_MEMBERS: &str = "https://vault:8200";
const DEFAULT_KEY_SHARES: u32 = 1;
const DEFAULT_KEY_THRESHOLD: u32 = 1;
const DEFAULT_ENABLE_INIT: bool = true;
const DEFAULT_ENABLE_K8SSECRET: bool = true;
const DEFAULT_ENABLE_UNSEAL: bool = true;
const DEFAULT_ENABLE_K8SAUTH: bool = true;
const DEFAULT_LOG_SECRETS: bool = false;
const DEFAULT_SERVICE_ACCOUNT: &str = "vault";
const DEFAULT_SECRET_ROOT: &str = "vault-root-token";
const DEFAULT_SECRET_UNSEAL: &str = "vault-unseal-keys";
const DEFAULT_ROLE_NAME: &str = "argocd-repo-server";
const DEFAULT_ROLE_NAMESPACE: &str = "argocd";
const DEFAULT_ROLE_TTL: &str = "1h";
const DEFAULT_KUBERNETES_PORT: u16 = 443;
const SERVICE_ACCOUNT_DIR: &str = "/var/run/secrets/kubernetes.io/serviceaccount";

pub(crate) fn apply_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    builder
        .set_default("addr", DEFAULT_ADDR)?
        .set_default("cluster_members", DEFAULT_CLUSTER_MEMBERS)?
        .set_default("key_shares", i64::from(DEFAULT_KEY_SHARES))?
        .set_default("key_threshold", i64::from(DEFAULT_KEY_THRESHOLD))?
        .set_default("enable_init", DEFAULT_ENABLE_INIT)?
        .set_default("enable_k8ssecret", DEFAULT_ENABLE_K8SSECRET)?
        .set_default("enable_unseal", DEFAULT_ENABLE_UNSEAL)?
        .set_default("enable_k8sauth", DEFAULT_ENABLE_K8SAUTH)?
        .set_default("log_secrets", DEFAULT_LOG_SECRETS)?
        .set_default("k8sauth_service_account", DEFAULT_SERVICE_ACCOUNT)?
        .set_default("secret_root", DEFAULT_SECRET_ROOT)?
        .set_default("secret_unseal", DEFAULT_SECRET_UNSEAL)
}

pub(crate) fn default_roles() -> Vec<RoleBinding> {
    vec![RoleBinding {
        name: DEFAULT_ROLE_NAME.to_string(),
        service_account: DEFAULT_ROLE_NAME.to_string(),
        namespace: DEFAULT_ROLE_NAMESPACE.to_string(),
        ttl: default_role_ttl(),
    }]
}

pub(crate) fn default_role_ttl() -> String {
    DEFAULT_ROLE_TTL.to_string()
}

pub(crate) fn default_kubernetes_port() -> u16 {
    DEFAULT_KUBERNETES_PORT
}

pub(crate) fn default_token_path() -> PathBuf {
    PathBuf::from(SERVICE_ACCOUNT_DIR).join("token")
}

pub(crate) fn default_ca_path() -> PathBuf {
    PathBuf::from(SERVICE_ACCOUNT_DIR).join("ca.crt")
}

pub(crate) fn default_namespace_path() -> PathBuf {
    PathBuf::from(SERVICE_ACCOUNT_DIR).join("namespace")
}
