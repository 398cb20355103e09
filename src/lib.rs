//! ValidatingWebhookConfiguration controller
//!
//! Keeps a single cluster-scoped ValidatingWebhookConfiguration in sync with
//! a local template and CA bundle, gated on the readiness of the webhook
//! service and on the absence of a legacy controller.

pub mod adapters;
pub mod controllers;
pub mod error;
pub mod metrics;
pub mod options;
pub mod queue;
pub mod reconcilers;
pub mod watch;

pub use error::{Error, Result};
pub use options::Options;
