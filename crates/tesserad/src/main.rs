//! tesserad — operator binary.
//!
//! # Usage
//!
//! ```text
//! tesserad run --config /etc/tessera/tessera.toml
//! tesserad run --state /var/lib/tessera/state.redb
//! tesserad validate deployment.toml
//! tesserad apply --state /var/lib/tessera/state.redb --name db deployment.toml
//! tesserad delete --state /var/lib/tessera/state.redb db
//! tesserad features
//! tesserad crd > crd.json
//! ```

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use kube::CustomResourceExt;
use tokio::sync::watch;
use tracing::info;
use tracing_subscriber::EnvFilter;

use tessera_core::{Feature, OperatorConfig};
use tessera_kube::DatabaseDeployment;
use tesserad::local::{apply_spec_file, delete_deployment, open_state};
use tesserad::validate::validate_spec_file;
use tesserad::{KubeSource, Operator, build_router};

#[derive(Parser)]
#[command(name = "tesserad", about = "Tessera database cluster operator")]
struct Cli {
    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the operator.
    Run {
        /// Path to tessera.toml.
        #[arg(long, short)]
        config: Option<PathBuf>,

        /// Namespace to watch (overrides the config file).
        #[arg(long)]
        namespace: Option<String>,

        /// Admin API listen address (overrides the config file).
        #[arg(long)]
        api_listen: Option<SocketAddr>,

        /// Read deployments from this state file instead of custom resources.
        #[arg(long)]
        state: Option<PathBuf>,
    },
    /// Validate a deployment spec file.
    Validate {
        /// Path to a TOML deployment spec.
        spec: PathBuf,
    },
    /// Store a validated spec in a local state file.
    Apply {
        #[arg(long)]
        state: PathBuf,

        /// Deployment name.
        #[arg(long)]
        name: String,

        /// Path to a TOML deployment spec.
        spec: PathBuf,
    },
    /// Remove a deployment from a local state file.
    Delete {
        #[arg(long)]
        state: PathBuf,

        name: String,
    },
    /// List operator features and their defaults.
    Features,
    /// Print the custom resource definition as JSON.
    Crd,
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Command::Run {
            config,
            namespace,
            api_listen,
            state,
        } => {
            let config = match config {
                Some(path) => OperatorConfig::from_file(&path)
                    .with_context(|| format!("loading {}", path.display()))?,
                None => OperatorConfig::default(),
            };
            run_operator(config, namespace, api_listen, state).await
        }
        Command::Validate { spec } => {
            let checksum = validate_spec_file(&spec)?;
            println!("{}: valid (checksum {checksum})", spec.display());
            Ok(())
        }
        Command::Apply { state, name, spec } => {
            let store = open_state(&state)?;
            let checksum = apply_spec_file(&store, &name, &spec)?;
            println!("{name}: applied (checksum {checksum})");
            Ok(())
        }
        Command::Delete { state, name } => {
            delete_deployment(&open_state(&state)?, &name)?;
            println!("{name}: deleted");
            Ok(())
        }
        Command::Features => {
            for info in Feature::table() {
                let default = if info.enabled_by_default { "on" } else { "off" };
                println!("{:<20} {:<4} {}", info.name, default, info.description);
            }
            Ok(())
        }
        Command::Crd => {
            println!("{}", serde_json::to_string_pretty(&DatabaseDeployment::crd())?);
            Ok(())
        }
    }
}

async fn run_operator(
    config: OperatorConfig,
    namespace: Option<String>,
    api_listen: Option<SocketAddr>,
    state: Option<PathBuf>,
) -> anyhow::Result<()> {
    let client = kube::Client::try_default()
        .await
        .context("connecting to kubernetes")?;
    let namespace = namespace
        .or_else(|| config.operator.namespace.clone())
        .unwrap_or_else(|| client.default_namespace().to_string());
    let addr: SocketAddr = match api_listen {
        Some(addr) => addr,
        None => config
            .operator
            .api_listen
            .parse()
            .with_context(|| format!("invalid api_listen {}", config.operator.api_listen))?,
    };
    let discovery = config.discovery_interval();

    info!(%namespace, "tessera operator starting");

    let mut source = KubeSource::new(client, &namespace, config)?;
    if let Some(path) = &state {
        info!(state = %path.display(), "deployments read from local state file");
        source = source.with_local_state(open_state(path)?);
    }
    let operator = Arc::new(Operator::new(Arc::new(source)));

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let discovery_handle = {
        let operator = operator.clone();
        tokio::spawn(async move { operator.run(discovery, shutdown_rx).await })
    };

    // ── Admin API ──────────────────────────────────────────────

    let router = build_router(operator.clone());
    info!(%addr, "admin API starting");
    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "failed to listen for ctrl-c");
            }
            info!("shutdown signal received");
            let _ = shutdown_tx.send(true);
        })
        .await?;

    let _ = discovery_handle.await;
    info!("tessera operator stopped");
    Ok(())
}
