//! VCD App Provider - launches desktop application containers on request
//!
//! Usage:
//!   vcd-app-provider --port 80 --base-dir /opt/vcde/
//!   curl -X POST localhost -H 'content-type: application/json' \
//!        -d '{"user":"'$USER'","app":"firefox"}'

use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use vcd_app_provider::AppState;
use vcd_launcher::{
    AppLauncher, CachedDocumentLoader, DockerRuntime, FileDocumentLoader, LauncherConfig,
    SecurityDocumentLoader,
};

#[derive(Parser, Debug)]
#[command(name = "vcd-app-provider")]
#[command(version)]
#[command(about = "Launches per-user desktop application containers")]
struct Args {
    /// Server port
    #[arg(short, long, default_value = "80", env = "PORT")]
    port: u16,

    /// Server host
    #[arg(long, default_value = "0.0.0.0", env = "HOST")]
    host: String,

    /// JSON launcher configuration; flags below override its values
    #[arg(long, env = "VCD_CONFIG")]
    config: Option<PathBuf>,

    /// Host directory holding user homes and the shared Public directory
    #[arg(long, env = "VCD_BASE_DIR")]
    base_dir: Option<String>,

    /// Docker network application containers join
    #[arg(long, env = "VCD_NETWORK")]
    network: Option<String>,

    /// Image repository prefix
    #[arg(long, env = "VCD_IMAGE_PREFIX")]
    image_prefix: Option<String>,

    /// Seccomp document for chrome
    #[arg(long, env = "VCD_SECCOMP_PROFILE")]
    seccomp_profile: Option<PathBuf>,

    /// Deadline in seconds for each Docker call
    #[arg(long, env = "VCD_RUNTIME_TIMEOUT")]
    runtime_timeout: Option<u64>,

    /// Maximum launches in flight
    #[arg(long, env = "VCD_MAX_CONCURRENT_LAUNCHES")]
    max_concurrent_launches: Option<usize>,
}

impl Args {
    fn launcher_config(&self) -> anyhow::Result<LauncherConfig> {
        let mut config = match &self.config {
            Some(path) => LauncherConfig::load(path)
                .with_context(|| format!("loading {}", path.display()))?,
            None => LauncherConfig::default(),
        };

        if let Some(base_dir) = &self.base_dir {
            config.base_dir = base_dir.clone();
        }
        if let Some(network) = &self.network {
            config.network_name = network.clone();
        }
        if let Some(prefix) = &self.image_prefix {
            config.image_prefix = prefix.clone();
        }
        if let Some(path) = &self.seccomp_profile {
            config.seccomp_profile_path = path.clone();
        }
        if let Some(secs) = self.runtime_timeout {
            config.runtime_timeout = Duration::from_secs(secs);
        }
        if let Some(max) = self.max_concurrent_launches {
            config.max_concurrent_launches = max;
        }

        config.validate()?;
        Ok(config)
    }
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("vcd_app_provider=debug".parse().unwrap())
                .add_directive("vcd_launcher=debug".parse().unwrap())
                .add_directive("info".parse().unwrap()),
        )
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_logging();

    let args = Args::parse();
    let config = args.launcher_config()?;

    info!("VCD App Provider v{}", env!("CARGO_PKG_VERSION"));
    info!("  Base directory: {}", config.base_dir);
    info!("  Network: {}", config.network_name);
    info!("  Applications: {}", config.applications.join(", "));

    let runtime = DockerRuntime::connect().await?;
    match runtime.network_exists(&config.network_name).await {
        Ok(true) => {}
        Ok(false) => warn!(
            network = %config.network_name,
            "Network not found; launches will fail until it is created"
        ),
        Err(e) => warn!(error = %e, "Could not list Docker networks"),
    }

    let loader = Arc::new(CachedDocumentLoader::new(FileDocumentLoader::new(
        &config.seccomp_profile_path,
    )));
    if let Err(e) = loader.load().await {
        warn!(
            path = %config.seccomp_profile_path.display(),
            error = %e,
            "Seccomp document not loaded; chrome launches will fail until it is readable"
        );
    }

    let launcher = AppLauncher::from_config(&config, Arc::new(runtime), loader);
    let state = Arc::new(AppState::new(launcher, config.max_concurrent_launches));

    let listener = tokio::net::TcpListener::bind(format!("{}:{}", args.host, args.port)).await?;
    vcd_app_provider::serve(listener, state).await?;

    Ok(())
}
