//! Reconciliation of the ValidatingWebhookConfiguration
//!
//! This module contains the decision logic run for every trigger:
//! - Gating on the readiness of the webhook service
//! - Deferring to a legacy controller that still owns the resource
//! - Building the desired state and applying it to the cluster

pub mod applier;
pub mod webhook;

use std::fmt;

pub use applier::{ApplyOutcome, WebhookConfigApplier};
pub use webhook::{ReconcileOutcome, WebhookReconciler};

/// A "something changed, re-evaluate" signal.
///
/// Carries only a description of its cause; the reconciler always
/// recomputes the full desired state. Triggers with the same description
/// are the same unit of work.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReconcileTrigger {
    description: String,
}

impl ReconcileTrigger {
    pub fn new(description: impl Into<String>) -> Self {
        Self {
            description: description.into(),
        }
    }

    /// Trigger queued once the caches have synced
    pub fn initial() -> Self {
        Self::new("initial request to kickstart reconciliation")
    }
}

impl fmt::Display for ReconcileTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.description)
    }
}
