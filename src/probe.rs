use std::time::Duration;

use reqwest::StatusCode;
use tokio::sync::mpsc;
use tracing::{debug, info};

use crate::membership::{ClusterMembership, ClusterNode};

/// `sys/health` codes that mean the process is up: active, standby,
/// DR secondary, performance standby, uninitialized, sealed.
const READY_STATUS_CODES: [u16; 6] = [200, 429, 472, 473, 501, 503];

#[must_use]
pub fn is_ready_status(status: StatusCode) -> bool {
    READY_STATUS_CODES.contains(&status.as_u16())
}

/// Blocks until every member answers its health endpoint with a ready code.
///
/// One task polls each node; completions fan in through a channel sized to
/// the membership. There is no timeout.
pub async fn wait_for_nodes(membership: &ClusterMembership, interval: Duration) {
    let count = membership.followers().len() + 1;
    let (tx, mut rx) = mpsc::channel(count);
    for node in membership.nodes() {
        debug!("Starting health probe for {}", node.name);
        let node = node.clone();
        let tx = tx.clone();
        tokio::spawn(async move {
            wait_for_node(&node, interval).await;
            let _ = tx.send(node.name).await;
        });
    }
    drop(tx);

    for _ in 0..count {
        match rx.recv().await {
            Some(name) => info!("{name} is running"),
            None => break,
        }
    }
}

async fn wait_for_node(node: &ClusterNode, interval: Duration) {
    loop {
        match node.client.health_status().await {
            Ok(status) if is_ready_status(status) => return,
            Ok(status) => debug!("{}: HTTP status {status}", node.name),
            Err(err) => debug!("{}: {err:#}", node.name),
        }
        tokio::time::sleep(interval).await;
    }
}
