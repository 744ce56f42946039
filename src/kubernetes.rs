//! Minimal in-cluster Kubernetes API client.
//!
//! Covers what bootstrap needs: listing pods for diagnostics, reading
//! service-account tokens, and get/create of `Secret` objects used as the
//! durable material store.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use reqwest::{Certificate, Client, StatusCode};
use serde::Deserialize;
use serde_json::json;

use crate::material::{SecretStore, SecretStoreError};

/// Data key under which bootstrap stores material in a `Secret`.
pub const SECRET_VALUE_KEY: &str = "value";
const SERVICE_ACCOUNT_TOKEN_KEY: &str = "token";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone)]
pub struct KubeClient {
    base_url: String,
    client: Client,
    token: String,
    namespace: String,
}

#[derive(Debug, Deserialize)]
struct ObjectMeta {
    #[serde(default)]
    name: Option<String>,
    #[serde(default, rename = "generateName")]
    generate_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct Pod {
    metadata: ObjectMeta,
}

#[derive(Debug, Deserialize)]
struct PodList {
    #[serde(default)]
    items: Vec<Pod>,
}

#[derive(Debug, Deserialize)]
struct ObjectReference {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ServiceAccount {
    #[serde(default)]
    secrets: Vec<ObjectReference>,
}

#[derive(Debug, Deserialize)]
struct Secret {
    #[serde(default)]
    data: std::collections::BTreeMap<String, String>,
}

impl KubeClient {
    /// Creates a client for `base_url` authenticated with `token`.
    ///
    /// When `ca_pem` is given it is added as a trusted root.
    ///
    /// # Errors
    /// Returns an error if the CA bundle is invalid or the HTTP client cannot
    /// be built.
    pub fn new(
        base_url: &str,
        token: String,
        namespace: String,
        ca_pem: Option<&[u8]>,
    ) -> Result<Self> {
        let mut builder = Client::builder().timeout(REQUEST_TIMEOUT);
        if let Some(pem) = ca_pem {
            let cert = Certificate::from_pem(pem).context("Invalid Kubernetes CA bundle")?;
            builder = builder.add_root_certificate(cert);
        }
        let client = builder
            .build()
            .context("Failed to build Kubernetes HTTP client")?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
            token,
            namespace,
        })
    }

    /// Builds a client from the pod's mounted service-account credentials.
    ///
    /// # Errors
    /// Returns an error if the token or CA bundle cannot be read.
    pub async fn in_cluster(
        api_url: &str,
        token_path: &Path,
        ca_path: &Path,
        namespace: String,
    ) -> Result<Self> {
        let token = tokio::fs::read_to_string(token_path)
            .await
            .with_context(|| {
                format!(
                    "Failed to read service account token: {}",
                    token_path.display()
                )
            })?;
        let ca = tokio::fs::read(ca_path)
            .await
            .with_context(|| format!("Failed to read Kubernetes CA: {}", ca_path.display()))?;
        Self::new(api_url, token.trim().to_string(), namespace, Some(&ca))
    }

    #[must_use]
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Names of the pods in the namespace, for diagnostics.
    ///
    /// # Errors
    /// Returns an error if the pod list cannot be read.
    pub async fn list_pod_names(&self) -> Result<Vec<String>> {
        let path = format!("api/v1/namespaces/{}/pods", self.namespace);
        let response = self.get_path(&path).await?;
        let pods: PodList = Self::parse_json(response, &path).await?;
        Ok(pods
            .items
            .into_iter()
            .filter_map(|pod| {
                pod.metadata.name.filter(|name| !name.is_empty()).or_else(|| {
                    pod.metadata
                        .generate_name
                        .map(|name| name.trim_end_matches('-').to_string())
                })
            })
            .collect())
    }

    /// Token of the first secret referenced by a service account.
    ///
    /// Returns `None` when the account has no token secret, which is the
    /// default on Kubernetes 1.24 and later.
    ///
    /// # Errors
    /// Returns an error if the account or its token secret cannot be read.
    pub async fn service_account_token(&self, name: &str) -> Result<Option<String>> {
        let path = format!(
            "api/v1/namespaces/{}/serviceaccounts/{name}",
            self.namespace
        );
        let response = self.get_path(&path).await?;
        let account: ServiceAccount = Self::parse_json(response, &path)
            .await
            .with_context(|| format!("Can't get service account {name}"))?;
        let Some(reference) = account.secrets.first() else {
            return Ok(None);
        };
        let token = self
            .get_secret_data(&reference.name, SERVICE_ACCOUNT_TOKEN_KEY)
            .await
            .with_context(|| format!("Can't get token for service account {name}"))?;
        Ok(Some(token))
    }

    /// # Errors
    /// Returns `NotFound` if the secret or the key is missing.
    pub async fn get_secret_data(&self, name: &str, key: &str) -> Result<String, SecretStoreError> {
        let path = self.secret_path(Some(name));
        let response = self.get_path(&path).await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SecretStoreError::NotFound(name.to_string()));
        }
        let secret: Secret = Self::parse_json(response, &path).await?;
        let encoded = secret
            .data
            .get(key)
            .ok_or_else(|| SecretStoreError::NotFound(format!("{name}/{key}")))?;
        let decoded = STANDARD
            .decode(encoded)
            .with_context(|| format!("Secret {name}/{key} is not valid base64"))?;
        let value = String::from_utf8(decoded)
            .with_context(|| format!("Secret {name}/{key} is not valid UTF-8"))?;
        Ok(value)
    }

    /// # Errors
    /// Returns `AlreadyExists` if a secret with this name exists.
    pub async fn create_secret(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        let path = self.secret_path(None);
        let body = json!({
            "apiVersion": "v1",
            "kind": "Secret",
            "metadata": { "name": name, "namespace": self.namespace },
            "type": "Opaque",
            "data": { SECRET_VALUE_KEY: STANDARD.encode(value) },
        });
        let response = self
            .client
            .post(self.endpoint(&path))
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Kubernetes request failed: {path}"))?;
        let status = response.status();
        if status == StatusCode::CONFLICT {
            return Err(SecretStoreError::AlreadyExists(name.to_string()));
        }
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(anyhow::anyhow!("Kubernetes API error ({status}): {text}").into());
        }
        Ok(())
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{path}", self.base_url)
    }

    fn secret_path(&self, name: Option<&str>) -> String {
        let base = format!("api/v1/namespaces/{}/secrets", self.namespace);
        match name {
            Some(name) => format!("{base}/{name}"),
            None => base,
        }
    }

    async fn get_path(&self, path: &str) -> Result<reqwest::Response> {
        self.client
            .get(self.endpoint(path))
            .bearer_auth(&self.token)
            .send()
            .await
            .with_context(|| format!("Kubernetes request failed: {path}"))
    }

    async fn parse_json<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
        path: &str,
    ) -> Result<T> {
        let status = response.status();
        let text = response
            .text()
            .await
            .context("Failed to read Kubernetes response body")?;
        if !status.is_success() {
            anyhow::bail!("Kubernetes API error ({status}) for {path}: {text}");
        }
        serde_json::from_str(&text).with_context(|| format!("Failed to parse response: {path}"))
    }
}

#[async_trait]
impl SecretStore for KubeClient {
    async fn get(&self, name: &str) -> Result<String, SecretStoreError> {
        self.get_secret_data(name, SECRET_VALUE_KEY).await
    }

    async fn create_if_absent(&self, name: &str, value: &str) -> Result<(), SecretStoreError> {
        self.create_secret(name, value).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_secret_paths() {
        let client =
            KubeClient::new("https://10.0.0.1:443/", "t".to_string(), "vault".to_string(), None)
                .unwrap();
        assert_eq!(
            client.endpoint(&client.secret_path(Some("vault-root-token"))),
            "https://10.0.0.1:443/api/v1/namespaces/vault/secrets/vault-root-token"
        );
        assert_eq!(
            client.secret_path(None),
            "api/v1/namespaces/vault/secrets"
        );
    }
}
