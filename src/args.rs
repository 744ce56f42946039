use std::path::PathBuf;

use clap::Parser;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to configuration file (default: bootstrap.toml)
    #[arg(long, short)]
    pub config: Option<PathBuf>,

    /// Log level or tracing filter directive
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Namespace holding the Vault pods and bootstrap secrets
    #[arg(long, env = "NAMESPACE")]
    pub namespace: Option<String>,

    /// Kubernetes API host
    #[arg(long, env = "KUBERNETES_SERVICE_HOST")]
    pub kubernetes_host: Option<String>,

    /// Kubernetes API port
    #[arg(long, env = "KUBERNETES_SERVICE_PORT")]
    pub kubernetes_port: Option<u16>,
}
