use anyhow::Result;

use super::{RoleBinding, Settings};
use crate::initialize::validate_shares;

pub(crate) fn validate_settings(settings: &Settings) -> Result<()> {
    if settings.addr.trim().is_empty() {
        anyhow::bail!("addr must not be empty");
    }
    if settings
        .cluster_members
        .split(',')
        .all(|member| member.trim().is_empty())
    {
        anyhow::bail!("cluster_members must not be empty");
    }
    validate_shares(settings.key_shares, settings.key_threshold)?;
    if settings.namespace.trim().is_empty() {
        anyhow::bail!("namespace must be set (NAMESPACE or service account namespace file)");
    }
    if settings.secret_root.trim().is_empty() {
        anyhow::bail!("secret_root must not be empty");
    }
    if settings.secret_unseal.trim().is_empty() {
        anyhow::bail!("secret_unseal must not be empty");
    }
    if settings.secret_root == settings.secret_unseal {
        anyhow::bail!("secret_root and secret_unseal must differ");
    }
    validate_phases(settings)?;
    for role in &settings.roles {
        validate_role(role)?;
    }
    Ok(())
}

fn validate_phases(settings: &Settings) -> Result<()> {
    if settings.enable_k8sauth && !settings.enable_unseal {
        anyhow::bail!(
            "enable_k8sauth requires enable_unseal; auth cannot be configured on a sealed cluster"
        );
    }
    let has_platform = settings.kubernetes.api_url().is_some();
    if settings.enable_k8sauth && !has_platform {
        anyhow::bail!("enable_k8sauth requires the Kubernetes API host (KUBERNETES_SERVICE_HOST)");
    }
    if !has_platform {
        if settings.enable_init && settings.enable_k8ssecret {
            anyhow::bail!(
                "enable_k8ssecret requires the Kubernetes API host (KUBERNETES_SERVICE_HOST)"
            );
        }
        if !settings.enable_init && settings.enable_unseal {
            anyhow::bail!(
                "enable_unseal without enable_init reads stored material and requires the Kubernetes API host (KUBERNETES_SERVICE_HOST)"
            );
        }
    }
    if settings.enable_k8sauth && settings.k8sauth_service_account.trim().is_empty() {
        anyhow::bail!("k8sauth_service_account must not be empty");
    }
    Ok(())
}

fn validate_role(role: &RoleBinding) -> Result<()> {
    if role.name.trim().is_empty() {
        anyhow::bail!("roles.name must not be empty");
    }
    if role.name.contains('/') {
        anyhow::bail!("roles.name must not contain '/': {}", role.name);
    }
    if role.service_account.trim().is_empty() {
        anyhow::bail!("roles.service_account must not be empty ({})", role.name);
    }
    if role.namespace.trim().is_empty() {
        anyhow::bail!("roles.namespace must not be empty ({})", role.name);
    }
    humantime::parse_duration(&role.ttl)
        .map_err(|err| anyhow::anyhow!("roles.ttl is invalid for {}: {err}", role.name))?;
    Ok(())
}
