use anyhow::{Context, Result};
use reqwest::Url;

use crate::vault::VaultClient;

/// One cluster member and the administrative client bound to it.
#[derive(Debug, Clone)]
pub struct ClusterNode {
    pub name: String,
    pub address: String,
    pub client: VaultClient,
}

impl ClusterNode {
    /// Builds a node from a member URL. The name is the first DNS label of
    /// the host, e.g. `vault-0` for `https://vault-0.vault-internal:8200`.
    ///
    /// # Errors
    /// Returns an error if the address is not a URL with a host.
    pub fn from_address(address: &str) -> Result<Self> {
        let url = Url::parse(address).with_context(|| format!("Invalid member URL: {address}"))?;
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Member URL has no host: {address}"))?;
        let name = host.split('.').next().unwrap_or(host).to_string();
        let client = VaultClient::new(address)?;
        Ok(Self {
            name,
            address: client.address().to_string(),
            client,
        })
    }
}

/// Ordered cluster members. The first configured member is the bootstrap
/// leader; it is never elected.
#[derive(Debug, Clone)]
pub struct ClusterMembership {
    leader: ClusterNode,
    followers: Vec<ClusterNode>,
}

impl ClusterMembership {
    /// Parses a comma-separated member list, preserving order.
    ///
    /// # Errors
    /// Returns an error if the list is empty or any member is invalid.
    pub fn parse(members: &str) -> Result<Self> {
        let mut nodes = members
            .split(',')
            .map(str::trim)
            .filter(|member| !member.is_empty())
            .map(ClusterNode::from_address)
            .collect::<Result<Vec<_>>>()?
            .into_iter();
        let leader = nodes
            .next()
            .ok_or_else(|| anyhow::anyhow!("Cluster member list is empty"))?;
        Ok(Self {
            leader,
            followers: nodes.collect(),
        })
    }

    #[must_use]
    pub fn leader(&self) -> &ClusterNode {
        &self.leader
    }

    #[must_use]
    pub fn followers(&self) -> &[ClusterNode] {
        &self.followers
    }

    /// All members, leader first.
    pub fn nodes(&self) -> impl Iterator<Item = &ClusterNode> {
        std::iter::once(&self.leader).chain(self.followers.iter())
    }
}
