//! Kubernetes helpers shared by the controller and the CAPI client

use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::core::ApiResource;

/// Known kind → plural mappings for kinds the simple rules get wrong
const KIND_PLURALS: &[(&str, &str)] = &[("bundles", "bundles")];

/// Two owner references refer to the same owner when apiVersion, kind and name match
///
/// The UID is ignored so a reference written before the owner's UID was known
/// still counts as present.
pub fn same_owner(a: &OwnerReference, b: &OwnerReference) -> bool {
    a.api_version == b.api_version && a.kind == b.kind && a.name == b.name
}

/// Add `owner` to the object's owner references unless an equivalent one exists
///
/// Owner references are treated as a set keyed by (apiVersion, kind, name).
/// Unrelated references are preserved. Returns true when the list changed.
pub fn ensure_owner_reference(meta: &mut ObjectMeta, owner: OwnerReference) -> bool {
    let refs = meta.owner_references.get_or_insert_with(Vec::new);
    if refs.iter().any(|existing| same_owner(existing, &owner)) {
        return false;
    }
    refs.push(owner);
    true
}

/// Build an ApiResource for an untyped kind from its apiVersion
pub fn build_api_resource(api_version: &str, kind: &str) -> ApiResource {
    let (group, version) = parse_api_version(api_version);
    ApiResource {
        group,
        version,
        kind: kind.to_string(),
        api_version: api_version.to_string(),
        plural: pluralize_kind(kind),
    }
}

/// Split "group/version" into its parts; core kinds have an empty group
pub fn parse_api_version(api_version: &str) -> (String, String) {
    match api_version.split_once('/') {
        Some((group, version)) => (group.to_string(), version.to_string()),
        None => (String::new(), api_version.to_string()),
    }
}

/// Lower-case plural resource name for a kind
pub fn pluralize_kind(kind: &str) -> String {
    let lower = kind.to_lowercase();

    if let Some((_, plural)) = KIND_PLURALS.iter().find(|(singular, _)| *singular == lower) {
        return (*plural).to_string();
    }

    if lower.ends_with('s') || lower.ends_with("ch") || lower.ends_with("sh") {
        format!("{}es", lower)
    } else if lower.ends_with('y') && !lower.ends_with("ay") && !lower.ends_with("ey") {
        format!("{}ies", &lower[..lower.len() - 1])
    } else {
        format!("{}s", lower)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(api_version: &str, kind: &str, name: &str, uid: &str) -> OwnerReference {
        OwnerReference {
            api_version: api_version.to_string(),
            kind: kind.to_string(),
            name: name.to_string(),
            uid: uid.to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn adds_owner_to_object_without_references() {
        let mut meta = ObjectMeta::default();
        let changed = ensure_owner_reference(
            &mut meta,
            owner("anywhere.eks.amazonaws.com/v1alpha1", "Cluster", "snow-test", "u1"),
        );
        assert!(changed);
        assert_eq!(meta.owner_references.as_ref().map(Vec::len), Some(1));
    }

    #[test]
    fn existing_reference_without_uid_counts_as_present() {
        let mut meta = ObjectMeta {
            owner_references: Some(vec![owner(
                "anywhere.eks.amazonaws.com/v1alpha1",
                "Cluster",
                "snow-test",
                "",
            )]),
            ..Default::default()
        };
        let changed = ensure_owner_reference(
            &mut meta,
            owner("anywhere.eks.amazonaws.com/v1alpha1", "Cluster", "snow-test", "u1"),
        );
        assert!(!changed);
        let refs = meta.owner_references.expect("refs kept");
        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].uid, "");
    }

    #[test]
    fn unrelated_references_are_preserved() {
        let unrelated = owner("v1", "ConfigMap", "other", "u9");
        let mut meta = ObjectMeta {
            owner_references: Some(vec![unrelated.clone()]),
            ..Default::default()
        };
        assert!(ensure_owner_reference(
            &mut meta,
            owner("anywhere.eks.amazonaws.com/v1alpha1", "Cluster", "snow-test", "u1"),
        ));
        let refs = meta.owner_references.expect("refs kept");
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0], unrelated);
    }

    #[test]
    fn ensure_is_idempotent() {
        let mut meta = ObjectMeta::default();
        let cluster = owner("anywhere.eks.amazonaws.com/v1alpha1", "Cluster", "c", "u");
        assert!(ensure_owner_reference(&mut meta, cluster.clone()));
        assert!(!ensure_owner_reference(&mut meta, cluster));
        assert_eq!(meta.owner_references.map(|r| r.len()), Some(1));
    }

    #[test]
    fn build_api_resource_for_capi_kinds() {
        let ar = build_api_resource(
            "controlplane.cluster.x-k8s.io/v1beta1",
            "KubeadmControlPlane",
        );
        assert_eq!(ar.group, "controlplane.cluster.x-k8s.io");
        assert_eq!(ar.version, "v1beta1");
        assert_eq!(ar.plural, "kubeadmcontrolplanes");

        let ar = build_api_resource(
            "infrastructure.cluster.x-k8s.io/v1beta1",
            "AWSSnowMachineTemplate",
        );
        assert_eq!(ar.plural, "awssnowmachinetemplates");
    }

    #[test]
    fn parse_core_api_version() {
        assert_eq!(parse_api_version("v1"), (String::new(), "v1".to_string()));
    }

    #[test]
    fn pluralize_irregular_kinds() {
        assert_eq!(pluralize_kind("Bundles"), "bundles");
        assert_eq!(pluralize_kind("Policy"), "policies");
        assert_eq!(pluralize_kind("Gateway"), "gateways");
        assert_eq!(pluralize_kind("Ingress"), "ingresses");
    }
}
