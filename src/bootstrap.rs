use std::sync::Arc;

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::auth::{self, PlatformEndpoint};
use crate::config::Settings;
use crate::initialize::{self, InitOutcome};
use crate::kubernetes::KubeClient;
use crate::material::{
    self, InMemoryMaterial, MaterialSource, SecretStore, StoredMaterial, UnsealMaterial,
};
use crate::membership::ClusterMembership;
use crate::probe;
use crate::retry::Timings;
use crate::unseal;
use crate::vault::VaultClient;

/// One bootstrap run: probe, initialize, unseal and join, configure auth.
pub struct Bootstrap {
    settings: Settings,
    membership: ClusterMembership,
    kube: Option<KubeClient>,
    timings: Timings,
}

impl Bootstrap {
    /// # Errors
    /// Returns an error if the member list cannot be parsed.
    pub fn new(settings: Settings, kube: Option<KubeClient>, timings: Timings) -> Result<Self> {
        let membership = ClusterMembership::parse(&settings.cluster_members)?;
        Ok(Self {
            settings,
            membership,
            kube,
            timings,
        })
    }

    #[must_use]
    pub fn membership(&self) -> &ClusterMembership {
        &self.membership
    }

    /// Runs every enabled phase in order. Phases are all-or-nothing; the
    /// first failure stops the run.
    ///
    /// # Errors
    /// Returns the first fatal error of any phase.
    pub async fn run(&self) -> Result<()> {
        self.log_pods().await;

        info!(
            "Waiting for {} cluster member(s); leader is {}",
            self.membership.followers().len() + 1,
            self.membership.leader().name
        );
        probe::wait_for_nodes(&self.membership, self.timings.probe_interval).await;

        let generated = if self.settings.enable_init {
            self.initialize().await?
        } else {
            info!("Initialization disabled");
            None
        };

        if self.settings.enable_unseal {
            let source = self.material_source(generated.as_ref())?;
            let keys = source
                .unseal_keys()
                .await
                .context("Cannot load unseal keys")?;
            unseal::unseal_cluster(&self.membership, &keys).await?;
        } else {
            info!("Unseal disabled");
        }

        if self.settings.enable_k8sauth {
            let source = self.material_source(generated.as_ref())?;
            self.configure_auth(source.as_ref()).await?;
        } else {
            info!("k8s auth disabled");
        }

        info!("Bootstrap complete");
        Ok(())
    }

    async fn initialize(&self) -> Result<Option<UnsealMaterial>> {
        let outcome = initialize::ensure_initialized(
            self.membership.leader(),
            self.settings.key_shares,
            self.settings.key_threshold,
            self.timings.init_confirm,
        )
        .await?;
        let generated = match outcome {
            InitOutcome::Initialized(material) => material,
            InitOutcome::AlreadyInitialized => {
                info!("Cluster already initialized; material will be read from the store");
                return Ok(None);
            }
        };

        let material = if self.settings.enable_k8ssecret {
            let store = self.store()?;
            material::persist_material(store.as_ref(), &self.settings.material_keys(), &generated)
                .await?
        } else {
            if !self.settings.log_secrets {
                warn!("Unseal material is neither persisted nor logged; it exists only in this run");
            }
            generated
        };
        if self.settings.log_secrets {
            material::log_material(&material);
        }
        Ok(Some(material))
    }

    async fn configure_auth(&self, source: &dyn MaterialSource) -> Result<()> {
        let token = source.root_token().await.context("Cannot load root token")?;
        let kube = self.kube()?;
        let endpoint = self.platform_endpoint()?;

        let mut client = VaultClient::new(&self.settings.addr)?;
        auth::wait_until_ready(&client, self.timings.auth_ready).await?;
        client.set_token(token);
        auth::configure(&client, kube, &endpoint, &self.settings.roles).await
    }

    /// Material from this run when there is some, the durable store otherwise.
    fn material_source(
        &self,
        generated: Option<&UnsealMaterial>,
    ) -> Result<Box<dyn MaterialSource>> {
        if let Some(material) = generated {
            return Ok(Box::new(InMemoryMaterial(material.clone())));
        }
        Ok(Box::new(StoredMaterial::new(
            self.store()?,
            self.settings.material_keys(),
        )))
    }

    fn store(&self) -> Result<Arc<dyn SecretStore>> {
        Ok(Arc::new(self.kube()?.clone()))
    }

    fn kube(&self) -> Result<&KubeClient> {
        self.kube
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("Kubernetes API is not configured"))
    }

    fn platform_endpoint(&self) -> Result<PlatformEndpoint> {
        let api_url = self
            .settings
            .kubernetes
            .api_url()
            .ok_or_else(|| anyhow::anyhow!("k8s auth: invalid Kubernetes API config"))?;
        Ok(PlatformEndpoint {
            api_url,
            ca_path: self.settings.kubernetes.ca_path.clone(),
            token_path: self.settings.kubernetes.token_path.clone(),
            service_account: self.settings.k8sauth_service_account.clone(),
        })
    }

    async fn log_pods(&self) {
        let Some(kube) = &self.kube else {
            return;
        };
        match kube.list_pod_names().await {
            Ok(pods) => debug!("Pods list: {}", pods.join(";")),
            Err(err) => warn!("Failed to list pods in {}: {err:#}", kube.namespace()),
        }
    }
}
