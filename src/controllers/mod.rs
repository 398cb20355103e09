//! Kubernetes controller for the ValidatingWebhookConfiguration
//!
//! This module wires the watches, the work queue and the reconciler
//! together and owns the startup sequence.

mod webhook_controller;

pub use webhook_controller::{process_next_work_item, run, run_worker};

use std::sync::Arc;

use kube::Client;

use crate::adapters::WebhookCodec;
use crate::options::Options;

/// Shared context for the controller
pub struct Context {
    /// Kubernetes client
    pub client: Client,
    /// Validated controller options
    pub options: Arc<Options>,
    /// Template decoder, built once at startup
    pub codec: WebhookCodec,
}

impl Context {
    /// Create a new context
    pub fn new(client: Client, options: Options) -> Self {
        Self {
            client,
            options: Arc::new(options),
            codec: WebhookCodec::new(),
        }
    }
}
