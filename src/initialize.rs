use anyhow::{Context, Result};
use tracing::info;

use crate::material::UnsealMaterial;
use crate::membership::ClusterNode;
use crate::retry::{RetryPolicy, poll_until};

/// Result of the initialization phase.
#[derive(Debug)]
pub enum InitOutcome {
    /// This run initialized the cluster; the material exists nowhere else yet.
    Initialized(UnsealMaterial),
    /// The leader was initialized by an earlier run.
    AlreadyInitialized,
}

/// Checks the share parameters before anything is sent to the leader.
///
/// # Errors
/// Returns an error unless `1 <= threshold <= shares`.
pub fn validate_shares(shares: u32, threshold: u32) -> Result<()> {
    if shares == 0 {
        anyhow::bail!("key_shares must be greater than 0");
    }
    if threshold == 0 {
        anyhow::bail!("key_threshold must be greater than 0");
    }
    if threshold > shares {
        anyhow::bail!("key_threshold ({threshold}) must be <= key_shares ({shares})");
    }
    Ok(())
}

/// Initializes the leader unless it already reports initialized.
///
/// "Already initialized" is a skip signal, never an error, and init is never
/// sent twice.
///
/// # Errors
/// Returns an error if the share parameters are invalid, the init request is
/// rejected, or the leader does not report initialized within `confirm`.
pub async fn ensure_initialized(
    leader: &ClusterNode,
    shares: u32,
    threshold: u32,
    confirm: RetryPolicy,
) -> Result<InitOutcome> {
    validate_shares(shares, threshold)?;

    let initialized = leader
        .client
        .is_initialized()
        .await
        .with_context(|| format!("{}: failed to read init status", leader.name))?;
    if initialized {
        info!("{}: Vault already initialized", leader.name);
        return Ok(InitOutcome::AlreadyInitialized);
    }

    info!(
        "{}: initializing with {shares} key share(s), threshold {threshold}",
        leader.name
    );
    let response = leader
        .client
        .init(shares, threshold)
        .await
        .with_context(|| format!("{}: init request failed", leader.name))?;
    let keys = if response.keys.is_empty() {
        response.keys_base64.clone()
    } else {
        response.keys.clone()
    };
    let material = UnsealMaterial {
        root_token: response.root_token,
        keys,
        shares,
        threshold,
    };

    let label = format!("{}: init confirmation", leader.name);
    let confirmed = poll_until(confirm, &label, move |_| leader.client.is_initialized()).await;
    if !confirmed {
        anyhow::bail!(
            "{}: Vault not initialized after {} attempts; cannot proceed",
            leader.name,
            confirm.attempts
        );
    }
    info!("{}: Vault successfully initialized", leader.name);

    Ok(InitOutcome::Initialized(material))
}
