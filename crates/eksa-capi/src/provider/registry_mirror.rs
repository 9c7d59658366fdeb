//! Registry mirror configuration for CAPI-provisioned nodes.
//!
//! Redirects pulls from the public EKS registry through the cluster's
//! configured mirror by appending a containerd config fragment, and installs
//! the mirror's CA certificate when one is given.

use eksa_common::crd::RegistryMirrorConfiguration;

/// Upstream registry that is mirrored
const MIRRORED_REGISTRY: &str = "public.ecr.aws";

/// Path of the containerd config fragment appended on boot
const CONFIG_APPEND_PATH: &str = "/etc/containerd/config_append.toml";

/// Default mirror port when none is configured
pub const DEFAULT_MIRROR_PORT: &str = "443";

/// `host:port` of the mirror, falling back to the default port
pub fn mirror_address(config: &RegistryMirrorConfiguration) -> String {
    let port = if config.port.is_empty() {
        DEFAULT_MIRROR_PORT
    } else {
        config.port.as_str()
    };
    format!("{}:{}", config.endpoint, port)
}

/// Path the mirror's CA certificate is written to
pub fn ca_cert_path(config: &RegistryMirrorConfiguration) -> String {
    format!("/etc/containerd/certs.d/{}/ca.crt", mirror_address(config))
}

/// Contents of the containerd config fragment
///
/// The TLS table is emitted only when a CA certificate is given or
/// verification is skipped.
pub fn containerd_config_append(config: &RegistryMirrorConfiguration) -> String {
    let address = mirror_address(config);
    let mut content = format!(
        "[plugins.\"io.containerd.grpc.v1.cri\".registry.mirrors]\n  \
         [plugins.\"io.containerd.grpc.v1.cri\".registry.mirrors.\"{MIRRORED_REGISTRY}\"]\n    \
         endpoint = [\"https://{address}\"]"
    );

    let ca_cert = config
        .ca_cert_content
        .as_deref()
        .filter(|c| !c.is_empty());

    if ca_cert.is_some() || config.insecure_skip_verify {
        content.push_str(&format!(
            "\n  [plugins.\"io.containerd.grpc.v1.cri\".registry.configs.\"{address}\".tls]"
        ));
        if ca_cert.is_some() {
            content.push_str(&format!("\n    ca_file = \"{}\"", ca_cert_path(config)));
        }
        if config.insecure_skip_verify {
            content.push_str("\n    insecure_skip_verify = true");
        }
    }

    content
}

/// Generate the bootstrap files for a registry mirror
///
/// Returns CAPI file entries: the containerd config fragment and, when a
/// CA certificate is configured, the certificate itself.
pub fn generate_mirror_files(config: &RegistryMirrorConfiguration) -> Vec<serde_json::Value> {
    let mut files = vec![serde_json::json!({
        "content": containerd_config_append(config),
        "owner": "root:root",
        "path": CONFIG_APPEND_PATH,
    })];

    if let Some(ca_cert) = config.ca_cert_content.as_deref().filter(|c| !c.is_empty()) {
        files.push(serde_json::json!({
            "content": ca_cert,
            "owner": "root:root",
            "path": ca_cert_path(config),
        }));
    }

    files
}

/// Commands that merge the fragment into containerd's config and restart it
pub fn mirror_commands() -> Vec<String> {
    vec![
        format!("cat {CONFIG_APPEND_PATH} >> /etc/containerd/config.toml"),
        "sudo systemctl daemon-reload".to_string(),
        "sudo systemctl restart containerd".to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIRROR_ONLY: &str = r#"[plugins."io.containerd.grpc.v1.cri".registry.mirrors]
  [plugins."io.containerd.grpc.v1.cri".registry.mirrors."public.ecr.aws"]
    endpoint = ["https://1.2.3.4:443"]"#;

    const TLS_TABLE: &str =
        r#"  [plugins."io.containerd.grpc.v1.cri".registry.configs."1.2.3.4:443".tls]"#;

    fn config(ca: Option<&str>, insecure: bool) -> RegistryMirrorConfiguration {
        RegistryMirrorConfiguration {
            endpoint: "1.2.3.4".to_string(),
            port: "443".to_string(),
            ca_cert_content: ca.map(str::to_string),
            insecure_skip_verify: insecure,
        }
    }

    #[test]
    fn mirror_without_ca_or_insecure_has_no_tls_table() {
        let cfg = config(None, false);
        assert_eq!(containerd_config_append(&cfg), MIRROR_ONLY);

        let files = generate_mirror_files(&cfg);
        assert_eq!(files.len(), 1);
        assert_eq!(files[0]["path"], "/etc/containerd/config_append.toml");
        assert_eq!(files[0]["owner"], "root:root");
    }

    #[test]
    fn mirror_with_ca_writes_ca_file_and_tls_table() {
        let cfg = config(Some("xyz"), false);
        let expected = format!(
            "{MIRROR_ONLY}\n{TLS_TABLE}\n    ca_file = \"/etc/containerd/certs.d/1.2.3.4:443/ca.crt\""
        );
        assert_eq!(containerd_config_append(&cfg), expected);

        let files = generate_mirror_files(&cfg);
        assert_eq!(files.len(), 2);
        assert_eq!(files[1]["path"], "/etc/containerd/certs.d/1.2.3.4:443/ca.crt");
        assert_eq!(files[1]["content"], "xyz");
    }

    #[test]
    fn mirror_with_insecure_skip_verify_only() {
        let cfg = config(None, true);
        let expected = format!("{MIRROR_ONLY}\n{TLS_TABLE}\n    insecure_skip_verify = true");
        assert_eq!(containerd_config_append(&cfg), expected);
        assert_eq!(generate_mirror_files(&cfg).len(), 1);
    }

    #[test]
    fn mirror_with_ca_and_insecure_lists_ca_file_first() {
        let cfg = config(Some("xyz"), true);
        let expected = r#"[plugins."io.containerd.grpc.v1.cri".registry.mirrors]
  [plugins."io.containerd.grpc.v1.cri".registry.mirrors."public.ecr.aws"]
    endpoint = ["https://1.2.3.4:443"]
  [plugins."io.containerd.grpc.v1.cri".registry.configs."1.2.3.4:443".tls]
    ca_file = "/etc/containerd/certs.d/1.2.3.4:443/ca.crt"
    insecure_skip_verify = true"#;
        assert_eq!(containerd_config_append(&cfg), expected);

        let files = generate_mirror_files(&cfg);
        assert_eq!(files.len(), 2);
        assert_eq!(files[0]["content"], expected);
        assert_eq!(files[1]["content"], "xyz");
        assert_eq!(files[1]["owner"], "root:root");
        assert_eq!(files[1]["path"], "/etc/containerd/certs.d/1.2.3.4:443/ca.crt");
    }

    #[test]
    fn empty_port_falls_back_to_443() {
        let mut cfg = config(None, false);
        cfg.port.clear();
        assert_eq!(mirror_address(&cfg), "1.2.3.4:443");
    }

    #[test]
    fn commands_append_config_then_restart_containerd() {
        assert_eq!(
            mirror_commands(),
            vec![
                "cat /etc/containerd/config_append.toml >> /etc/containerd/config.toml",
                "sudo systemctl daemon-reload",
                "sudo systemctl restart containerd",
            ]
        );
    }
}
