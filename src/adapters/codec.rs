//! Versioned decoder for ValidatingWebhookConfiguration templates
//!
//! Templates are YAML (or JSON, which YAML accepts) documents of the full
//! `admissionregistration.k8s.io/v1` schema. Decoding checks the document's
//! group/version/kind and fills the defaults the apiserver would otherwise
//! populate, so the desired state can be compared with the live object
//! without spurious diffs.

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::Resource;
use serde_json::{json, Map, Value};

use crate::error::ConfigError;

/// Failure policy injected into webhooks that omit one
pub const DEFAULT_FAILURE_POLICY: &str = "Fail";

/// Side-effect class injected into webhooks that omit one
pub const DEFAULT_SIDE_EFFECTS: &str = "Unknown";

/// Decoder for the webhook template.
///
/// Constructed once at startup and handed to the desired-state builder.
#[derive(Debug, Clone)]
pub struct WebhookCodec {
    api_version: &'static str,
    kind: &'static str,
}

impl Default for WebhookCodec {
    fn default() -> Self {
        Self::new()
    }
}

impl WebhookCodec {
    pub fn new() -> Self {
        Self {
            api_version: ValidatingWebhookConfiguration::API_VERSION,
            kind: ValidatingWebhookConfiguration::KIND,
        }
    }

    /// Decode template bytes into a defaulted configuration
    pub fn decode(&self, encoded: &[u8]) -> Result<ValidatingWebhookConfiguration, ConfigError> {
        let mut document: Value = serde_yaml::from_slice(encoded)
            .map_err(|e| decode_error(format!("invalid document: {}", e)))?;

        let object = document
            .as_object_mut()
            .ok_or_else(|| decode_error("document is not an object"))?;
        self.check_type(object)?;

        if let Some(webhooks) = object.get_mut("webhooks").and_then(Value::as_array_mut) {
            for webhook in webhooks.iter_mut().filter_map(Value::as_object_mut) {
                fill_webhook_defaults(webhook);
            }
        }

        serde_json::from_value(document).map_err(|e| decode_error(e.to_string()))
    }

    fn check_type(&self, object: &Map<String, Value>) -> Result<(), ConfigError> {
        let field = |name: &str| object.get(name).and_then(Value::as_str).unwrap_or_default();

        let kind = field("kind");
        if kind.is_empty() {
            return Err(decode_error("Object 'Kind' is missing"));
        }
        let api_version = field("apiVersion");
        if api_version != self.api_version || kind != self.kind {
            return Err(decode_error(format!(
                "no kind {:?} is registered for version {:?}; expected {}/{}",
                kind, api_version, self.api_version, self.kind
            )));
        }
        Ok(())
    }
}

fn decode_error(message: impl Into<String>) -> ConfigError {
    ConfigError::new(ConfigError::DECODE_TEMPLATE, message)
}

fn fill_webhook_defaults(webhook: &mut Map<String, Value>) {
    let mut default = |key: &str, value: Value| {
        if webhook.get(key).map_or(true, Value::is_null) {
            webhook.insert(key.to_string(), value);
        }
    };
    default("failurePolicy", json!(DEFAULT_FAILURE_POLICY));
    // empty selector matches every namespace
    default("namespaceSelector", json!({}));
    default("sideEffects", json!(DEFAULT_SIDE_EFFECTS));
}
