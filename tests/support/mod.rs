// Helpers are shared across test crates; not every helper is used by each.
#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde_json::{Value, json};
use tempfile::TempDir;
use vault_bootstrap::config::{KubernetesSettings, RoleBinding, Settings};
use vault_bootstrap::kubernetes::KubeClient;
use vault_bootstrap::retry::{RetryPolicy, Timings};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

pub(crate) const ROOT_TOKEN: &str = "root-token";
pub(crate) const UNSEAL_KEY: &str = "unseal-key-1";
pub(crate) const NAMESPACE: &str = "vault";
pub(crate) const KUBE_TOKEN: &str = "kube-token";
pub(crate) const REVIEWER_JWT: &str = "mounted-reviewer-jwt";
pub(crate) const CA_PEM: &str = "-----BEGIN CERTIFICATE-----\nMIIB\n-----END CERTIFICATE-----\n";

pub(crate) fn fast_timings() -> Timings {
    Timings {
        probe_interval: Duration::from_millis(10),
        init_confirm: RetryPolicy {
            attempts: 15,
            interval: Duration::from_millis(10),
        },
        auth_ready: RetryPolicy {
            attempts: 3,
            interval: Duration::from_millis(10),
        },
    }
}

/// Mounted service-account files for the auth configurator.
pub(crate) struct PlatformFiles {
    _dir: TempDir,
    pub(crate) ca_path: PathBuf,
    pub(crate) token_path: PathBuf,
}

pub(crate) fn platform_files() -> PlatformFiles {
    let dir = tempfile::tempdir().expect("temp dir");
    let ca_path = dir.path().join("ca.crt");
    let token_path = dir.path().join("token");
    std::fs::write(&ca_path, CA_PEM).expect("write ca");
    std::fs::write(&token_path, format!("{REVIEWER_JWT}\n")).expect("write token");
    PlatformFiles {
        _dir: dir,
        ca_path,
        token_path,
    }
}

pub(crate) fn test_settings(members: &[&MockServer], files: &PlatformFiles) -> Settings {
    let cluster_members = members
        .iter()
        .map(|server| server.uri())
        .collect::<Vec<_>>()
        .join(",");
    Settings {
        addr: members[0].uri(),
        cluster_members,
        key_shares: 1,
        key_threshold: 1,
        enable_init: true,
        enable_k8ssecret: true,
        enable_unseal: true,
        enable_k8sauth: true,
        log_secrets: false,
        k8sauth_service_account: "vault".to_string(),
        secret_root: "vault-root-token".to_string(),
        secret_unseal: "vault-unseal-keys".to_string(),
        namespace: NAMESPACE.to_string(),
        roles: vec![RoleBinding {
            name: "argocd-repo-server".to_string(),
            service_account: "argocd-repo-server".to_string(),
            namespace: "argocd".to_string(),
            ttl: "1h".to_string(),
        }],
        kubernetes: KubernetesSettings {
            host: Some("10.96.0.1".to_string()),
            ca_path: files.ca_path.clone(),
            token_path: files.token_path.clone(),
            ..KubernetesSettings::default()
        },
    }
}

pub(crate) fn kube_client(server: &MockServer) -> KubeClient {
    KubeClient::new(&server.uri(), KUBE_TOKEN.to_string(), NAMESPACE.to_string(), None)
        .expect("kube client")
}

pub(crate) fn secret_body(name: &str, value: &str) -> Value {
    json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": { "name": name, "namespace": NAMESPACE },
        "data": { "value": STANDARD.encode(value) },
    })
}

pub(crate) fn secret_path(name: &str) -> String {
    format!("/api/v1/namespaces/{NAMESPACE}/secrets/{name}")
}

pub(crate) fn secrets_path() -> String {
    format!("/api/v1/namespaces/{NAMESPACE}/secrets")
}

pub(crate) fn not_found() -> ResponseTemplate {
    ResponseTemplate::new(404).set_body_json(json!({
        "kind": "Status",
        "reason": "NotFound",
        "code": 404,
    }))
}

pub(crate) async fn mount_health(server: &MockServer, status: u16) {
    Mock::given(method("GET"))
        .and(path("/v1/sys/health"))
        .respond_with(ResponseTemplate::new(status))
        .mount(server)
        .await;
}

pub(crate) async fn mount_pods(server: &MockServer) {
    Mock::given(method("GET"))
        .and(path(format!("/api/v1/namespaces/{NAMESPACE}/pods")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "items": [
                { "metadata": { "name": "vault-0" } },
                { "metadata": { "name": "vault-1" } },
            ]
        })))
        .mount(server)
        .await;
}

/// Shared log of which mocked call happened when, across servers.
#[derive(Clone, Default)]
pub(crate) struct Recorder {
    events: Arc<Mutex<Vec<String>>>,
}

impl Recorder {
    pub(crate) fn respond(&self, label: &str, template: ResponseTemplate) -> Recording {
        Recording {
            label: label.to_string(),
            events: Arc::clone(&self.events),
            template,
        }
    }

    pub(crate) fn events(&self) -> Vec<String> {
        self.events.lock().expect("recorder lock").clone()
    }
}

pub(crate) struct Recording {
    label: String,
    events: Arc<Mutex<Vec<String>>>,
    template: ResponseTemplate,
}

impl Respond for Recording {
    fn respond(&self, _request: &Request) -> ResponseTemplate {
        self.events
            .lock()
            .expect("recorder lock")
            .push(self.label.clone());
        self.template.clone()
    }
}
