use anyhow::Result;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use vault_bootstrap::Args;
use vault_bootstrap::bootstrap::Bootstrap;
use vault_bootstrap::config::Settings;
use vault_bootstrap::kubernetes::KubeClient;
use vault_bootstrap::retry::Timings;

const DEFAULT_LOG_LEVEL: &str = "info";

#[tokio::main]
async fn main() {
    let args = Args::parse();
    init_tracing(&args.log_level);
    info!("Starting vault-bootstrap {}", env!("CARGO_PKG_VERSION"));

    if let Err(err) = run(&args).await {
        error!("Bootstrap failed: {err:#}");
        std::process::exit(1);
    }
}

fn init_tracing(level: &str) {
    let level = level.trim().to_lowercase();
    let (filter, fallback) = match EnvFilter::try_new(&level) {
        Ok(filter) => (filter, false),
        Err(_) => (EnvFilter::new(DEFAULT_LOG_LEVEL), true),
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();
    if fallback {
        warn!("Invalid log level '{level}'; using {DEFAULT_LOG_LEVEL}");
    } else {
        info!("Log level set to {level}");
    }
}

async fn run(args: &Args) -> Result<()> {
    let settings = load_settings(args)?;
    log_settings(&settings);

    let kube = match settings.kubernetes.api_url() {
        Some(api_url) => Some(
            KubeClient::in_cluster(
                &api_url,
                &settings.kubernetes.token_path,
                &settings.kubernetes.ca_path,
                settings.namespace.clone(),
            )
            .await?,
        ),
        None => None,
    };

    Bootstrap::new(settings, kube, Timings::default())?
        .run()
        .await
}

fn load_settings(args: &Args) -> Result<Settings> {
    let mut settings = Settings::new(args.config.clone())?;
    settings.merge_with_args(args);
    settings.resolve_namespace();
    settings.validate()?;
    Ok(settings)
}

fn log_settings(settings: &Settings) {
    info!("Namespace: {}", settings.namespace);
    info!("Cluster members: {}", settings.cluster_members);
    info!(
        "Phases: init={} k8s_secret={} unseal={} k8s_auth={}",
        settings.enable_init,
        settings.enable_k8ssecret,
        settings.enable_unseal,
        settings.enable_k8sauth
    );
    if settings.log_secrets {
        warn!("Secret logging is enabled; unseal material will be printed in cleartext");
    }
}
