//! Controller runner - wires the Cluster reconciler into a kube-runtime controller

use std::sync::Arc;

use futures::StreamExt;
use kube::runtime::watcher::Config as WatcherConfig;
use kube::runtime::Controller;
use kube::{Api, Client};

use eksa_cluster::controller::{error_policy, reconcile, Context};
use eksa_common::crd::Cluster;

/// Watcher timeout (seconds) - must be less than client read_timeout (30s)
/// This forces the API server to close the watch before the client times out,
/// preventing "body read timed out" errors on idle watches.
const WATCH_TIMEOUT_SECS: u32 = 25;

/// Run the Cluster controller until a shutdown signal arrives
///
/// kube-runtime never reconciles the same Cluster concurrently; different
/// Clusters are reconciled in parallel.
pub async fn run_cluster_controller(client: Client, ctx: Context, namespace: Option<&str>) {
    let clusters: Api<Cluster> = match namespace {
        Some(ns) => Api::namespaced(client, ns),
        None => Api::all(client),
    };

    Controller::new(
        clusters,
        WatcherConfig::default().timeout(WATCH_TIMEOUT_SECS),
    )
    .shutdown_on_signal()
    .run(reconcile, error_policy, Arc::new(ctx))
    .for_each(log_reconcile_result("Cluster"))
    .await;
}

fn log_reconcile_result<T: std::fmt::Debug, E: std::fmt::Debug>(
    controller_name: &'static str,
) -> impl Fn(Result<T, E>) -> std::future::Ready<()> {
    move |result| {
        match result {
            Ok(action) => tracing::debug!(?action, "{} reconciliation completed", controller_name),
            Err(e) => tracing::warn!(error = ?e, "{} reconciliation error", controller_name),
        }
        std::future::ready(())
    }
}
