use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::{Client, Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

const VAULT_TOKEN_HEADER: &str = "X-Vault-Token";
/// Upper bound for a single request, so retry budgets stay bounded in time.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Administrative client bound to a single Vault node (or the service address).
#[derive(Debug, Clone)]
pub struct VaultClient {
    base_url: String,
    client: Client,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct InitStatus {
    pub initialized: bool,
}

#[derive(Debug, Deserialize)]
pub struct SealStatus {
    #[serde(default)]
    pub initialized: bool,
    pub sealed: bool,
    #[serde(default)]
    pub t: Option<u32>,
    #[serde(default)]
    pub n: Option<u32>,
}

#[derive(Deserialize, Clone)]
pub struct InitResponse {
    #[serde(default)]
    pub keys: Vec<String>,
    #[serde(default)]
    pub keys_base64: Vec<String>,
    pub root_token: String,
}

impl std::fmt::Debug for InitResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitResponse")
            .field("keys", &self.keys.len())
            .field("root_token", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Deserialize)]
pub struct RaftJoinResponse {
    #[serde(default)]
    pub joined: bool,
}

#[derive(Debug, Serialize)]
pub struct KubernetesAuthConfig {
    pub kubernetes_host: String,
    pub kubernetes_ca_cert: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_reviewer_jwt: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct KubernetesRole<'a> {
    pub bound_service_account_names: &'a str,
    pub bound_service_account_namespaces: &'a str,
    pub policies: &'a [String],
    pub ttl: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    data: Option<serde_json::Value>,
    #[serde(flatten)]
    rest: serde_json::Map<String, serde_json::Value>,
}

impl ListResponse {
    /// Older servers return mounts at the top level, newer ones under `data`.
    fn has_path(&self, path: &str) -> bool {
        let key = format!("{}/", path.trim_end_matches('/'));
        self.data
            .as_ref()
            .and_then(serde_json::Value::as_object)
            .is_some_and(|map| map.contains_key(&key))
            || self.rest.contains_key(&key)
    }
}

impl VaultClient {
    /// Creates a client for `base_url`.
    ///
    /// Certificate verification is off: bootstrap runs before the cluster's
    /// trust material exists.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(base_url: &str) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    /// Like [`VaultClient::new`] with a custom per-request timeout.
    ///
    /// # Errors
    /// Returns an error if the HTTP client cannot be built.
    pub fn with_timeout(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .danger_accept_invalid_certs(true)
            .timeout(timeout)
            .build()
            .context("Failed to build Vault HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token: None,
        })
    }

    #[must_use]
    pub fn address(&self) -> &str {
        &self.base_url
    }

    pub fn set_token(&mut self, token: String) {
        self.token = Some(token);
    }

    /// Returns the raw status code of `sys/health`.
    ///
    /// # Errors
    /// Returns an error if the request cannot be sent.
    pub async fn health_status(&self) -> Result<StatusCode> {
        let response = self
            .client
            .get(self.endpoint("sys/health"))
            .send()
            .await
            .context("Vault health request failed")?;
        Ok(response.status())
    }

    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn is_initialized(&self) -> Result<bool> {
        let status: InitStatus = self.get_json("sys/init", false).await?;
        Ok(status.initialized)
    }

    /// Performs the one-time initialization. The returned keys and token are
    /// the only copies the server ever hands out.
    ///
    /// # Errors
    /// Returns an error if the server rejects the request.
    pub async fn init(&self, shares: u32, threshold: u32) -> Result<InitResponse> {
        #[derive(Serialize)]
        struct InitRequest {
            secret_shares: u32,
            secret_threshold: u32,
        }
        let response = self
            .client
            .post(self.endpoint("sys/init"))
            .json(&InitRequest {
                secret_shares: shares,
                secret_threshold: threshold,
            })
            .send()
            .await
            .context("Vault init request failed")?;
        Self::parse_response(response).await
    }

    /// # Errors
    /// Returns an error if the request fails or the response cannot be parsed.
    pub async fn seal_status(&self) -> Result<SealStatus> {
        self.get_json("sys/seal-status", false).await
    }

    /// # Errors
    /// Returns an error if the server rejects the key.
    pub async fn unseal(&self, key: &str) -> Result<SealStatus> {
        #[derive(Serialize)]
        struct UnsealRequest<'a> {
            key: &'a str,
        }
        let response = self
            .client
            .post(self.endpoint("sys/unseal"))
            .json(&UnsealRequest { key })
            .send()
            .await
            .context("Vault unseal request failed")?;
        Self::parse_response(response).await
    }

    /// Asks this node to join the raft cluster led by `leader_api_addr`.
    /// An empty response body yields `None`.
    ///
    /// # Errors
    /// Returns an error if the server rejects the join.
    pub async fn raft_join(&self, leader_api_addr: &str) -> Result<Option<RaftJoinResponse>> {
        #[derive(Serialize)]
        struct JoinRequest<'a> {
            leader_api_addr: &'a str,
        }
        let response = self
            .client
            .post(self.endpoint("sys/storage/raft/join"))
            .json(&JoinRequest { leader_api_addr })
            .send()
            .await
            .context("Vault raft join request failed")?;
        Self::parse_response(response).await
    }

    /// # Errors
    /// Returns an error if the auth method list cannot be read.
    pub async fn auth_method_enabled(&self, path: &str) -> Result<bool> {
        let auths: ListResponse = self.get_json("sys/auth", true).await?;
        Ok(auths.has_path(path))
    }

    /// # Errors
    /// Returns an error if the server rejects the request.
    pub async fn enable_auth_method(&self, path: &str, auth_type: &str) -> Result<()> {
        #[derive(Serialize)]
        struct AuthRequest<'a> {
            #[serde(rename = "type")]
            auth_type: &'a str,
        }
        let _: serde_json::Value = self
            .send_json(
                Method::POST,
                &format!("sys/auth/{path}"),
                &AuthRequest { auth_type },
            )
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the server rejects the configuration.
    pub async fn write_kubernetes_auth_config(
        &self,
        path: &str,
        config: &KubernetesAuthConfig,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(Method::POST, &format!("auth/{path}/config"), config)
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the server rejects the policy.
    pub async fn write_policy(&self, name: &str, policy: &str) -> Result<()> {
        #[derive(Serialize)]
        struct PolicyRequest<'a> {
            policy: &'a str,
        }
        let _: serde_json::Value = self
            .send_json(
                Method::PUT,
                &format!("sys/policies/acl/{name}"),
                &PolicyRequest { policy },
            )
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the server rejects the role.
    pub async fn write_kubernetes_role(
        &self,
        path: &str,
        name: &str,
        role: &KubernetesRole<'_>,
    ) -> Result<()> {
        let _: serde_json::Value = self
            .send_json(Method::POST, &format!("auth/{path}/role/{name}"), role)
            .await?;
        Ok(())
    }

    /// # Errors
    /// Returns an error if the mount list cannot be read.
    pub async fn secret_engine_enabled(&self, mount: &str) -> Result<bool> {
        let mounts: ListResponse = self.get_json("sys/mounts", true).await?;
        Ok(mounts.has_path(mount))
    }

    /// # Errors
    /// Returns an error if the server rejects the mount.
    pub async fn enable_kv_v2(&self, mount: &str) -> Result<()> {
        #[derive(Serialize)]
        struct MountRequest<'a> {
            #[serde(rename = "type")]
            mount_type: &'a str,
            options: MountOptions<'a>,
        }
        #[derive(Serialize)]
        struct MountOptions<'a> {
            version: &'a str,
        }
        let _: serde_json::Value = self
            .send_json(
                Method::POST,
                &format!("sys/mounts/{mount}"),
                &MountRequest {
                    mount_type: "kv",
                    options: MountOptions { version: "2" },
                },
            )
            .await?;
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/v1/{path}", self.base_url)
    }

    fn require_token(&self) -> Result<&str> {
        self.token
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("Vault token is not set"))
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, use_token: bool) -> Result<T> {
        let mut request = self.client.get(self.endpoint(path));
        if use_token {
            request = request.header(VAULT_TOKEN_HEADER, self.require_token()?);
        }
        let response = request
            .send()
            .await
            .with_context(|| format!("Vault request failed: {path}"))?;
        Self::parse_response(response)
            .await
            .with_context(|| format!("Vault response parse failed: {path}"))
    }

    async fn send_json<T: Serialize, R: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &T,
    ) -> Result<R> {
        let token = self.require_token()?;
        let response = self
            .client
            .request(method, self.endpoint(path))
            .header(VAULT_TOKEN_HEADER, token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("Vault request failed: {path}"))?;
        Self::parse_response(response)
            .await
            .with_context(|| format!("Vault response parse failed: {path}"))
    }

    async fn parse_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Vault response body")?;
        if !status.is_success() {
            anyhow::bail!("Vault API error ({status}): {text}");
        }
        let body = if text.trim().is_empty() || status == StatusCode::NO_CONTENT {
            "null"
        } else {
            text.as_str()
        };
        serde_json::from_str(body).context("Failed to parse Vault response")
    }
}
