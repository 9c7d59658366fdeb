//! CRD rendering and installation

use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1::CustomResourceDefinition;
use kube::api::{Api, Patch, PatchParams};
use kube::{Client, ResourceExt};

use eksa_common::crd::all_crds;
use eksa_common::FIELD_MANAGER;

/// Every CRD as one multi-document YAML stream
pub fn render_crds() -> anyhow::Result<String> {
    let documents = all_crds()
        .iter()
        .map(serde_yaml::to_string)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| anyhow::anyhow!("failed to serialize CRD: {}", e))?;
    Ok(documents.join("---\n"))
}

/// Install or upgrade every CRD with server-side apply
///
/// Keeps the installed schemas in step with the running operator version.
pub async fn ensure_crds_installed(client: &Client) -> anyhow::Result<()> {
    let crds: Api<CustomResourceDefinition> = Api::all(client.clone());
    let params = PatchParams::apply(FIELD_MANAGER).force();

    for crd in all_crds() {
        let name = crd.name_any();
        tracing::info!(crd = %name, "installing CRD");
        crds.patch(&name, &params, &Patch::Apply(&crd))
            .await
            .map_err(|e| anyhow::anyhow!("failed to install CRD {}: {}", name, e))?;
    }

    Ok(())
}
