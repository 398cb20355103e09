//! ValidatingWebhookConfiguration reconciler
//!
//! Each pass evaluates, in order:
//! 1. the readiness gate: wait until the webhook service has an address
//!    (checked until first satisfied, never again afterwards)
//! 2. the legacy gate: defer while a legacy deployment is running
//! 3. unregister mode: delete the resource
//! 4. convergence: build the desired state and apply it

use std::path::Path;
use std::sync::Arc;

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Endpoints;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use kube::runtime::reflector::{ObjectRef, Store};
use tracing::{error, info, info_span, Instrument};

use super::applier::{ApplyOutcome, WebhookConfigApplier};
use super::ReconcileTrigger;
use crate::adapters::{build_webhook_config, WebhookCodec, WebhookConfigClient};
use crate::error::{ConfigError, Result};
use crate::metrics;
use crate::options::Options;

/// How a reconcile pass ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The webhook service has no ready address yet
    EndpointNotReady,
    /// A legacy deployment owns the resource
    DeferredToLegacy,
    /// The desired state could not be built; carries the reason
    InvalidConfig(&'static str),
    /// The resource was created, updated, deleted or already converged
    Applied(ApplyOutcome),
}

/// The reconcile state machine.
///
/// Owned by the single worker task, so the sticky readiness flag needs no
/// synchronization.
pub struct WebhookReconciler<C> {
    options: Arc<Options>,
    codec: WebhookCodec,
    owner_refs: Vec<OwnerReference>,
    endpoints: Store<Endpoints>,
    deployments: Store<Deployment>,
    applier: WebhookConfigApplier<C>,
    endpoint_ready_once: bool,
}

impl<C: WebhookConfigClient> WebhookReconciler<C> {
    pub fn new(
        options: Arc<Options>,
        codec: WebhookCodec,
        owner_refs: Vec<OwnerReference>,
        endpoints: Store<Endpoints>,
        deployments: Store<Deployment>,
        applier: WebhookConfigApplier<C>,
    ) -> Self {
        Self {
            options,
            codec,
            owner_refs,
            endpoints,
            deployments,
            applier,
            endpoint_ready_once: false,
        }
    }

    /// Whether the webhook service has been seen ready
    pub fn endpoint_ready_once(&self) -> bool {
        self.endpoint_ready_once
    }

    /// Run one pass. Only failed cluster API calls are returned as errors.
    pub async fn reconcile(&mut self, trigger: &ReconcileTrigger) -> Result<ReconcileOutcome> {
        let _timer = metrics::RECONCILE_DURATION.start_timer();
        metrics::RECONCILIATIONS.inc();

        let span = info_span!("reconcile", trigger = %trigger);
        async {
            info!("Reconcile(enter): {}", trigger);
            let result = self.reconcile_inner().await;
            info!("Reconcile(exit)");
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_inner(&mut self) -> Result<ReconcileOutcome> {
        // don't publish the webhook config before anything can serve it
        if !self.endpoint_ready_once {
            if let Err(reason) = self.check_endpoint_ready() {
                info!(service = %self.options.service_name, reason, "Endpoint not ready");
                return Ok(ReconcileOutcome::EndpointNotReady);
            }
            info!(service = %self.options.service_name, "Endpoint ready");
            self.endpoint_ready_once = true;
        }

        // don't touch the webhook config while a legacy deployment manages it
        if let Some(deployment) = self.options.legacy_deployment() {
            if self.is_legacy_deployment_running(deployment) {
                info!(deployment = %deployment, "Legacy deployment detected, deferring");
                return Ok(ReconcileOutcome::DeferredToLegacy);
            }
        }

        if self.options.unregister {
            return self.applier.delete().await.map(ReconcileOutcome::Applied);
        }

        let desired = match self.build_desired().await {
            Ok(desired) => desired,
            Err(e) => {
                error!(reason = e.reason(), error = %e, "Failed to build validatingwebhookconfiguration");
                metrics::report_config_load_error(e.reason());
                // retrying cannot help until a local file changes
                return Ok(ReconcileOutcome::InvalidConfig(e.reason()));
            }
        };

        self.applier.apply(desired).await.map(ReconcileOutcome::Applied)
    }

    fn check_endpoint_ready(&self) -> std::result::Result<(), &'static str> {
        let key = ObjectRef::new(&self.options.service_name)
            .within(&self.options.watched_namespace);
        match self.endpoints.get(&key) {
            Some(endpoints) => is_endpoint_ready(&endpoints),
            None => Err("endpoint not found"),
        }
    }

    fn is_legacy_deployment_running(&self, name: &str) -> bool {
        let key = ObjectRef::new(name).within(&self.options.watched_namespace);
        self.deployments
            .get(&key)
            .is_some_and(|deployment| is_deployment_running(&deployment))
    }

    async fn build_desired(
        &self,
    ) -> std::result::Result<ValidatingWebhookConfiguration, ConfigError> {
        let template =
            read_input(&self.options.webhook_config_path, ConfigError::READ_TEMPLATE).await?;
        let ca_bundle = read_input(&self.options.ca_path, ConfigError::READ_CA_BUNDLE).await?;
        build_webhook_config(&self.codec, &template, &ca_bundle, &self.owner_refs)
    }
}

async fn read_input(
    path: &Path,
    reason: &'static str,
) -> std::result::Result<Vec<u8>, ConfigError> {
    tokio::fs::read(path)
        .await
        .map_err(|e| ConfigError::new(reason, format!("{}: {}", path.display(), e)))
}

/// Ready when at least one subset has at least one address
pub fn is_endpoint_ready(endpoints: &Endpoints) -> std::result::Result<(), &'static str> {
    let subsets = endpoints.subsets.as_deref().unwrap_or_default();
    if subsets.is_empty() {
        return Err("no subsets");
    }
    if subsets
        .iter()
        .any(|subset| subset.addresses.as_ref().is_some_and(|a| !a.is_empty()))
    {
        Ok(())
    } else {
        Err("no subset addresses ready")
    }
}

/// Running unless scaled to zero. Unset replicas count as zero.
pub fn is_deployment_running(deployment: &Deployment) -> bool {
    deployment
        .spec
        .as_ref()
        .and_then(|spec| spec.replicas)
        .unwrap_or(0)
        > 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentSpec;
    use k8s_openapi::api::core::v1::{EndpointAddress, EndpointSubset};

    fn subset(addresses: usize) -> EndpointSubset {
        EndpointSubset {
            addresses: Some(
                (0..addresses)
                    .map(|i| EndpointAddress {
                        ip: format!("10.0.0.{}", i + 1),
                        ..Default::default()
                    })
                    .collect(),
            ),
            ..Default::default()
        }
    }

    #[test]
    fn test_endpoint_readiness() {
        let mut endpoints = Endpoints::default();
        assert_eq!(is_endpoint_ready(&endpoints), Err("no subsets"));

        endpoints.subsets = Some(vec![subset(0), EndpointSubset::default()]);
        assert_eq!(is_endpoint_ready(&endpoints), Err("no subset addresses ready"));

        endpoints.subsets = Some(vec![subset(0), subset(2)]);
        assert_eq!(is_endpoint_ready(&endpoints), Ok(()));
    }

    #[test]
    fn test_deployment_running() {
        let with_replicas = |replicas| Deployment {
            spec: Some(DeploymentSpec {
                replicas,
                ..Default::default()
            }),
            ..Default::default()
        };

        assert!(!is_deployment_running(&Deployment::default()));
        assert!(!is_deployment_running(&with_replicas(None)));
        assert!(!is_deployment_running(&with_replicas(Some(0))));
        assert!(is_deployment_running(&with_replicas(Some(2))));
    }
}
