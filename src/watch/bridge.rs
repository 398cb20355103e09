//! Translation of watch notifications into reconcile triggers

use kube::{Resource, ResourceExt};
use tracing::debug;

use super::object::WatchEvent;
use crate::reconcilers::ReconcileTrigger;

/// Passes only events for the single object this controller cares about
#[derive(Debug, Clone)]
pub struct ObjectFilter {
    kind: String,
    name: Option<String>,
}

impl ObjectFilter {
    /// Filter for objects of kind `K` named `name`. With no name, every
    /// event is discarded.
    pub fn new<K>(name: Option<&str>) -> Self
    where
        K: Resource<DynamicType = ()>,
    {
        Self {
            kind: format!("{}, Kind={}", K::api_version(&()), K::kind(&())),
            name: name.map(str::to_string),
        }
    }

    /// Group/version and kind, e.g. `apps/v1, Kind=Deployment`
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Trigger for `event`, or `None` if it concerns another object or is an
    /// update that changed nothing
    pub fn trigger_for<K>(&self, event: &WatchEvent<K>) -> Option<ReconcileTrigger>
    where
        K: Resource + PartialEq,
    {
        let obj = event.object();
        let key = object_key(obj);
        let skip = self.name.as_deref() != Some(obj.meta().name.as_deref().unwrap_or_default());

        let action = match event {
            WatchEvent::Added(_) => {
                debug!(key = %key, skip, "HandlerAdd");
                "adding"
            }
            WatchEvent::Updated { old, new } => {
                debug!(key = %key, skip, "HandlerUpdate");
                if old == new {
                    return None;
                }
                "update"
            }
            WatchEvent::Deleted { confirmed, .. } => {
                debug!(key = %key, skip, confirmed, "HandlerDelete");
                "delete"
            }
        };
        if skip {
            return None;
        }

        Some(ReconcileTrigger::new(format!(
            "{} ({}) {}",
            action, self.kind, key
        )))
    }
}

/// `namespace/name`, or `name` for cluster-scoped objects
fn object_key<K: Resource>(obj: &K) -> String {
    match obj.namespace() {
        Some(namespace) => format!("{}/{}", namespace, obj.name_any()),
        None => obj.name_any(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
    use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn deployment(name: &str, replicas: i32) -> Arc<Deployment> {
        Arc::new(Deployment {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                namespace: Some("istio-system".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                ..Default::default()
            }),
            ..Default::default()
        })
    }

    fn filter() -> ObjectFilter {
        ObjectFilter::new::<Deployment>(Some("istio-galley"))
    }

    #[test]
    fn test_matching_add_produces_trigger() {
        let trigger = filter()
            .trigger_for(&WatchEvent::Added(deployment("istio-galley", 1)))
            .unwrap();
        assert_eq!(
            trigger.to_string(),
            "adding (apps/v1, Kind=Deployment) istio-system/istio-galley"
        );
    }

    #[test]
    fn test_other_names_are_discarded() {
        let filter = filter();
        assert!(filter
            .trigger_for(&WatchEvent::Added(deployment("istiod", 1)))
            .is_none());
        assert!(filter
            .trigger_for(&WatchEvent::Updated {
                old: deployment("istiod", 1),
                new: deployment("istiod", 2),
            })
            .is_none());
        assert!(filter
            .trigger_for(&WatchEvent::Deleted {
                obj: deployment("istiod", 1),
                confirmed: false,
            })
            .is_none());
    }

    #[test]
    fn test_unchanged_update_is_discarded() {
        let event = WatchEvent::Updated {
            old: deployment("istio-galley", 1),
            new: deployment("istio-galley", 1),
        };
        assert!(filter().trigger_for(&event).is_none());

        let event = WatchEvent::Updated {
            old: deployment("istio-galley", 1),
            new: deployment("istio-galley", 0),
        };
        let trigger = filter().trigger_for(&event).unwrap();
        assert!(trigger.to_string().starts_with("update (apps/v1, Kind=Deployment)"));
    }

    #[test]
    fn test_tombstone_delete_is_filtered_by_name() {
        let trigger = filter()
            .trigger_for(&WatchEvent::Deleted {
                obj: deployment("istio-galley", 1),
                confirmed: false,
            })
            .unwrap();
        assert!(trigger.to_string().starts_with("delete "));
    }

    #[test]
    fn test_unset_name_discards_everything() {
        let filter = ObjectFilter::new::<Deployment>(None);
        assert!(filter
            .trigger_for(&WatchEvent::Added(deployment("istio-galley", 1)))
            .is_none());
    }

    #[test]
    fn test_cluster_scoped_key() {
        let config = Arc::new(ValidatingWebhookConfiguration {
            metadata: ObjectMeta {
                name: Some("istio-galley".to_string()),
                ..Default::default()
            },
            ..Default::default()
        });
        let trigger = ObjectFilter::new::<ValidatingWebhookConfiguration>(Some("istio-galley"))
            .trigger_for(&WatchEvent::Added(config))
            .unwrap();
        assert_eq!(
            trigger.to_string(),
            "adding (admissionregistration.k8s.io/v1, Kind=ValidatingWebhookConfiguration) istio-galley"
        );
    }
}
