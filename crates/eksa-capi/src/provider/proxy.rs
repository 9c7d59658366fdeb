//! HTTP proxy configuration for containerd on CAPI-provisioned nodes.

use eksa_common::ClusterSpec;

/// systemd drop-in that sets containerd's proxy environment
const PROXY_DROP_IN_PATH: &str = "/etc/systemd/system/containerd.service.d/http-proxy.conf";

/// Destinations that always bypass the proxy
const ALWAYS_NO_PROXY: &[&str] = &["localhost", "127.0.0.1", ".svc"];

/// Build the NO_PROXY list for a cluster
///
/// Order: pod CIDRs, service CIDRs, user entries, local addresses, then the
/// control plane endpoint host.
pub fn no_proxy_list(spec: &ClusterSpec) -> Vec<String> {
    let network = &spec.spec().cluster_network;
    let user_entries = spec
        .spec()
        .proxy_configuration
        .as_ref()
        .map(|p| p.no_proxy.as_slice())
        .unwrap_or_default();

    network
        .pods
        .cidr_blocks
        .iter()
        .chain(network.services.cidr_blocks.iter())
        .chain(user_entries.iter())
        .cloned()
        .chain(ALWAYS_NO_PROXY.iter().map(|s| s.to_string()))
        .chain(std::iter::once(spec.control_plane_endpoint_host().to_string()))
        .collect()
}

/// Generate the containerd proxy drop-in file, if a proxy is configured
pub fn generate_proxy_file(spec: &ClusterSpec) -> Option<serde_json::Value> {
    let proxy = spec.spec().proxy_configuration.as_ref()?;
    let content = format!(
        "[Service]\nEnvironment=\"HTTP_PROXY={}\"\nEnvironment=\"HTTPS_PROXY={}\"\nEnvironment=\"NO_PROXY={}\"",
        proxy.http_proxy,
        proxy.https_proxy,
        no_proxy_list(spec).join(",")
    );

    Some(serde_json::json!({
        "content": content,
        "owner": "root:root",
        "path": PROXY_DROP_IN_PATH,
    }))
}

/// Commands that reload systemd units and restart containerd
pub fn proxy_commands() -> Vec<String> {
    vec![
        "sudo systemctl daemon-reload".to_string(),
        "sudo systemctl restart containerd".to_string(),
    ]
}
