//! Owner references for the managed webhook configuration

use k8s_openapi::api::rbac::v1::ClusterRole;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::Resource;
use kube::{Api, Client};
use tracing::{info, warn};

/// Resolve the owner references for the webhook configuration.
///
/// The named ClusterRole becomes the controlling owner, so the
/// configuration is garbage collected along with it. When no ClusterRole is
/// configured, or it cannot be fetched, the list is empty.
pub async fn find_cluster_role_owner_refs(
    client: &Client,
    cluster_role_name: Option<&str>,
) -> Vec<OwnerReference> {
    let Some(name) = cluster_role_name else {
        info!("No owning ClusterRole configured, webhook configuration will not be garbage collected");
        return Vec::new();
    };

    let api: Api<ClusterRole> = Api::all(client.clone());
    match api.get_opt(name).await {
        Ok(Some(cluster_role)) => controller_ref(&cluster_role).into_iter().collect(),
        Ok(None) => {
            warn!(
                cluster_role = %name,
                "Could not find ClusterRole to set ownerRef. The webhook configuration must be deleted manually."
            );
            Vec::new()
        }
        Err(e) => {
            warn!(
                cluster_role = %name,
                error = %e,
                "Could not fetch ClusterRole to set ownerRef. The webhook configuration must be deleted manually."
            );
            Vec::new()
        }
    }
}

/// Controlling owner reference to `cluster_role`, `None` if it has no
/// name or uid yet
pub fn controller_ref(cluster_role: &ClusterRole) -> Option<OwnerReference> {
    Some(OwnerReference {
        api_version: ClusterRole::API_VERSION.to_string(),
        kind: ClusterRole::KIND.to_string(),
        name: cluster_role.metadata.name.clone()?,
        uid: cluster_role.metadata.uid.clone()?,
        controller: Some(true),
        block_owner_deletion: Some(true),
    })
}
