//! Remote state applier
//!
//! Compares the desired configuration with the cached live object and
//! issues the minimal create, update or delete call.

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use kube::runtime::reflector::{ObjectRef, Store};
use tracing::{error, info, warn};

use crate::adapters::WebhookConfigClient;
use crate::error::Result;
use crate::metrics;

/// What an apply or delete did to the live resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Created,
    Updated,
    /// Live resource already matched the desired state
    Unchanged,
    Deleted,
    /// Delete requested but the resource did not exist
    AlreadyAbsent,
}

/// Applies desired state to the named ValidatingWebhookConfiguration
pub struct WebhookConfigApplier<C> {
    client: C,
    cache: Store<ValidatingWebhookConfiguration>,
    name: String,
}

impl<C: WebhookConfigClient> WebhookConfigApplier<C> {
    pub fn new(
        client: C,
        cache: Store<ValidatingWebhookConfiguration>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            client,
            cache,
            name: name.into(),
        }
    }

    /// Converge the live resource towards `desired`
    pub async fn apply(
        &self,
        mut desired: ValidatingWebhookConfiguration,
    ) -> Result<ApplyOutcome> {
        let Some(current) = self.cache.get(&ObjectRef::new(&self.name)) else {
            if desired.metadata.name.as_deref() != Some(self.name.as_str()) {
                warn!(
                    template_name = ?desired.metadata.name,
                    name = %self.name,
                    "Template name does not match the configured webhook name, using the configured name"
                );
                desired.metadata.name = Some(self.name.clone());
            }

            if let Err(e) = self.client.create(&desired).await {
                error!(name = %self.name, error = %e, "Failed to create validatingwebhookconfiguration");
                metrics::report_update_error(&e.reason());
                return Err(e);
            }
            info!(name = %self.name, "Successfully created validatingwebhookconfiguration");
            metrics::report_update();
            return Ok(ApplyOutcome::Created);
        };

        let mut updated = current.as_ref().clone();
        updated.webhooks = desired.webhooks;
        updated.metadata.owner_references = desired.metadata.owner_references;

        if updated == *current {
            info!(name = %self.name, "validatingwebhookconfiguration is up to date");
            metrics::report_update();
            return Ok(ApplyOutcome::Unchanged);
        }

        if let Err(e) = self.client.update(&updated).await {
            error!(name = %self.name, error = %e, "Failed to update validatingwebhookconfiguration");
            metrics::report_update_error(&e.reason());
            return Err(e);
        }
        info!(name = %self.name, "Successfully updated validatingwebhookconfiguration");
        metrics::report_update();
        Ok(ApplyOutcome::Updated)
    }

    /// Remove the live resource. A resource that is already gone counts as
    /// deleted.
    pub async fn delete(&self) -> Result<ApplyOutcome> {
        match self.client.delete(&self.name).await {
            Ok(()) => {
                info!(name = %self.name, "Successfully deleted validatingwebhookconfiguration");
                Ok(ApplyOutcome::Deleted)
            }
            Err(e) if e.is_not_found() => {
                info!(name = %self.name, "validatingwebhookconfiguration already deleted");
                Ok(ApplyOutcome::AlreadyAbsent)
            }
            Err(e) => {
                error!(name = %self.name, error = %e, "Failed to delete validatingwebhookconfiguration");
                metrics::report_delete_error(&e.reason());
                Err(e)
            }
        }
    }
}
