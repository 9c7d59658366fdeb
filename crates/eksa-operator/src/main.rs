//! EKS Anywhere operator - reconciles Cluster resources into Cluster API objects

mod controller_runner;
mod crds;

use std::time::Duration;

use clap::Parser;
use kube::Client;

use eksa_cluster::controller::Context;
use eksa_common::telemetry::{init_logging, LogFormat, DEFAULT_LOG_FILTER};

/// EKS Anywhere cluster lifecycle operator
#[derive(Parser, Debug)]
#[command(name = "eksa-operator", version, about, long_about = None)]
struct Cli {
    /// Print every CRD as YAML and exit
    #[arg(long)]
    crd: bool,

    /// Log output format: json or text
    #[arg(long, env = "EKSA_LOG_FORMAT", default_value = "json")]
    log_format: LogFormat,

    /// Seconds to wait before a requeue that does not name a delay
    #[arg(long, env = "EKSA_REQUEUE_INTERVAL_SECS", default_value_t = 300)]
    requeue_interval_secs: u64,

    /// Seconds to wait before retrying a retryable failure
    #[arg(long, env = "EKSA_ERROR_BACKOFF_SECS", default_value_t = 5)]
    error_backoff_secs: u64,

    /// Only watch Clusters in this namespace (all namespaces when unset)
    #[arg(long, env = "EKSA_WATCH_NAMESPACE")]
    watch_namespace: Option<String>,

    /// Do not install CRDs on start-up
    #[arg(long, env = "EKSA_SKIP_CRD_INSTALL")]
    skip_crd_install: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if cli.crd {
        println!("{}", crds::render_crds()?);
        return Ok(());
    }

    init_logging(cli.log_format, DEFAULT_LOG_FILTER)?;

    let client = Client::try_default()
        .await
        .map_err(|e| anyhow::anyhow!("failed to create kubernetes client: {}", e))?;

    if !cli.skip_crd_install {
        crds::ensure_crds_installed(&client).await?;
    }

    let ctx = Context::builder(client.clone())
        .requeue_interval(Duration::from_secs(cli.requeue_interval_secs))
        .error_backoff(Duration::from_secs(cli.error_backoff_secs))
        .build();

    tracing::info!(
        namespace = cli.watch_namespace.as_deref().unwrap_or("<all>"),
        providers = ?ctx.registry.kinds(),
        "starting cluster controller"
    );

    controller_runner::run_cluster_controller(client, ctx, cli.watch_namespace.as_deref()).await;

    tracing::info!("cluster controller stopped");
    Ok(())
}
