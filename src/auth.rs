//! Kubernetes auth, access policy, role bindings and the KV v2 engine.

use std::path::PathBuf;

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::config::RoleBinding;
use crate::kubernetes::KubeClient;
use crate::retry::{RetryPolicy, poll_until};
use crate::vault::{KubernetesAuthConfig, KubernetesRole, VaultClient};

pub const AUTH_PATH: &str = "kubernetes";
const AUTH_TYPE: &str = "kubernetes";
pub const POLICY_NAME: &str = "secret-reader";
pub const SECRET_MOUNT: &str = "secret";
const DEFAULT_POLICY: &str = "default";

#[must_use]
pub fn policy_document() -> String {
    format!(
        r#"path "{SECRET_MOUNT}/data/*" {{
  capabilities = ["read", "list"]
}}
"#
    )
}

/// Where the auth backend learns how to reach the Kubernetes API.
#[derive(Debug, Clone)]
pub struct PlatformEndpoint {
    pub api_url: String,
    pub ca_path: PathBuf,
    pub token_path: PathBuf,
    pub service_account: String,
}

/// Waits for the cluster to report initialized and unsealed.
///
/// # Errors
/// Returns an error if the budget is exhausted.
pub async fn wait_until_ready(client: &VaultClient, policy: RetryPolicy) -> Result<()> {
    let ready = poll_until(policy, "k8s auth readiness", move |_| async move {
        let status = client.seal_status().await?;
        if !status.initialized || status.sealed {
            warn!("k8s auth: Vault not initialized/unsealed yet");
        }
        Ok(status.initialized && !status.sealed)
    })
    .await;
    if !ready {
        anyhow::bail!(
            "k8s auth: Vault not ready after {} attempts; cannot proceed",
            policy.attempts
        );
    }
    Ok(())
}

/// Applies auth, policy, roles and the secret engine. Every step can be
/// re-run safely.
///
/// # Errors
/// Returns an error on the first failed step.
pub async fn configure(
    client: &VaultClient,
    kube: &KubeClient,
    endpoint: &PlatformEndpoint,
    roles: &[RoleBinding],
) -> Result<()> {
    ensure_kubernetes_auth(client, kube, endpoint).await?;

    client
        .write_policy(POLICY_NAME, &policy_document())
        .await
        .with_context(|| format!("k8s auth: failed to write policy {POLICY_NAME}"))?;
    info!("k8s auth: policy '{POLICY_NAME}' applied");

    let policies = [POLICY_NAME.to_string(), DEFAULT_POLICY.to_string()];
    for role in roles {
        write_role(client, role, &policies).await?;
    }

    ensure_secret_engine(client).await
}

async fn ensure_kubernetes_auth(
    client: &VaultClient,
    kube: &KubeClient,
    endpoint: &PlatformEndpoint,
) -> Result<()> {
    let enabled = client
        .auth_method_enabled(AUTH_PATH)
        .await
        .context("k8s auth: failed to list auth methods")?;
    if enabled {
        info!("k8s auth already enabled");
        return Ok(());
    }

    client
        .enable_auth_method(AUTH_PATH, AUTH_TYPE)
        .await
        .context("k8s auth: failed to enable auth method")?;
    let config = resolve_auth_config(kube, endpoint).await?;
    client
        .write_kubernetes_auth_config(AUTH_PATH, &config)
        .await
        .context("k8s auth: failed to write auth config")?;
    info!("k8s auth: successfully enabled");
    Ok(())
}

/// Builds the auth backend config. The reviewer JWT comes from the service
/// account's token secret, or from our own mounted token when the account
/// has none.
async fn resolve_auth_config(
    kube: &KubeClient,
    endpoint: &PlatformEndpoint,
) -> Result<KubernetesAuthConfig> {
    let ca_cert = tokio::fs::read_to_string(&endpoint.ca_path)
        .await
        .with_context(|| {
            format!(
                "k8s auth: failed to read CA bundle {}",
                endpoint.ca_path.display()
            )
        })?;

    let reviewer = match kube
        .service_account_token(&endpoint.service_account)
        .await?
    {
        Some(token) => {
            info!(
                "k8s auth: using token secret of service account {}",
                endpoint.service_account
            );
            token
        }
        None => {
            info!(
                "k8s auth: service account {} has no token secret; using mounted token",
                endpoint.service_account
            );
            let token = tokio::fs::read_to_string(&endpoint.token_path)
                .await
                .with_context(|| {
                    format!(
                        "k8s auth: failed to read service account token {}",
                        endpoint.token_path.display()
                    )
                })?;
            token.trim().to_string()
        }
    };

    Ok(KubernetesAuthConfig {
        kubernetes_host: endpoint.api_url.clone(),
        kubernetes_ca_cert: ca_cert,
        token_reviewer_jwt: Some(reviewer),
    })
}

async fn write_role(client: &VaultClient, role: &RoleBinding, policies: &[String]) -> Result<()> {
    client
        .write_kubernetes_role(
            AUTH_PATH,
            &role.name,
            &KubernetesRole {
                bound_service_account_names: &role.service_account,
                bound_service_account_namespaces: &role.namespace,
                policies,
                ttl: &role.ttl,
            },
        )
        .await
        .with_context(|| format!("k8s auth: failed to write role {}", role.name))?;
    info!("k8s auth role '{}' configured", role.name);
    Ok(())
}

async fn ensure_secret_engine(client: &VaultClient) -> Result<()> {
    let enabled = client
        .secret_engine_enabled(SECRET_MOUNT)
        .await
        .context("failed to list secret engines")?;
    if enabled {
        info!("secret engine already enabled");
        return Ok(());
    }
    client
        .enable_kv_v2(SECRET_MOUNT)
        .await
        .context("failed to enable secret engine")?;
    info!("secret engine successfully enabled");
    Ok(())
}
