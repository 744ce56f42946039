use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::membership::{ClusterMembership, ClusterNode};

/// Unseals the leader, then joins and unseals each follower in order.
///
/// A follower is only unsealed after its join succeeded, and no follower is
/// touched before the leader is unsealed.
///
/// # Errors
/// Returns an error on the first rejected join or unseal; nothing is rolled
/// back.
pub async fn unseal_cluster(membership: &ClusterMembership, keys: &[String]) -> Result<()> {
    if keys.is_empty() {
        anyhow::bail!("No unseal keys available");
    }
    let leader = membership.leader();
    unseal_node(leader, keys).await?;

    for follower in membership.followers() {
        join_raft(follower, leader).await?;
        unseal_node(follower, keys).await?;
    }
    Ok(())
}

/// Submits key shares in order until the node reports unsealed.
///
/// Submitting to an already unsealed node is harmless, so seal status is not
/// checked first. A follower that has just joined keeps answering sealed
/// until it has caught up with the leader, so an accepted share is never
/// treated as a failure.
///
/// # Errors
/// Returns an error if a submission is rejected.
pub async fn unseal_node(node: &ClusterNode, keys: &[String]) -> Result<()> {
    for (index, key) in keys.iter().enumerate() {
        let status = node
            .client
            .unseal(key)
            .await
            .with_context(|| format!("{}: unseal request failed", node.name))?;
        debug!(
            "{}: submitted key share {}/{}",
            node.name,
            index + 1,
            keys.len()
        );
        if !status.sealed {
            info!("{}: unsealed", node.name);
            return Ok(());
        }
    }
    info!(
        "{}: {} key share(s) accepted; node unseals once raft has caught up",
        node.name,
        keys.len()
    );
    Ok(())
}

/// Asks `node` to join the raft cluster through `leader`.
///
/// A node that already reports initialized holds raft state from an earlier
/// join and is left alone.
///
/// # Errors
/// Returns an error if the join is rejected or the response is empty or
/// negative.
pub async fn join_raft(node: &ClusterNode, leader: &ClusterNode) -> Result<()> {
    let initialized = node
        .client
        .is_initialized()
        .await
        .with_context(|| format!("{}: failed to read init status", node.name))?;
    if initialized {
        info!("{}: already a raft member, skipping join", node.name);
        return Ok(());
    }

    debug!("{}: raft join via {}", node.name, leader.address);
    let response = node
        .client
        .raft_join(&leader.address)
        .await
        .with_context(|| format!("{}: raft join request failed", node.name))?;
    match response {
        Some(response) if response.joined => {
            info!("{}: node successfully joined raft", node.name);
            Ok(())
        }
        other => anyhow::bail!(
            "{}: empty or negative response from raft join request: {other:?}",
            node.name
        ),
    }
}
