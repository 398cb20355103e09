//! Desired-state builder for the ValidatingWebhookConfiguration
//!
//! The desired configuration is rebuilt from scratch on every reconcile
//! pass from the raw template and CA bundle bytes.

use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;
use k8s_openapi::ByteString;
use tracing::debug;

use super::ca_bundle::verify_ca_bundle;
use super::codec::WebhookCodec;
use crate::error::ConfigError;

/// Build the desired configuration.
///
/// Decodes and defaults the template, verifies the CA bundle, then stamps
/// the owner references and the CA bundle bytes into every webhook's
/// client config.
pub fn build_webhook_config(
    codec: &WebhookCodec,
    template: &[u8],
    ca_bundle: &[u8],
    owner_refs: &[OwnerReference],
) -> Result<ValidatingWebhookConfiguration, ConfigError> {
    let mut config = codec.decode(template)?;
    let subject = verify_ca_bundle(ca_bundle)?;
    debug!(subject = %subject, "Verified CA bundle");

    config.metadata.owner_references = if owner_refs.is_empty() {
        None
    } else {
        Some(owner_refs.to_vec())
    };
    for webhook in config.webhooks.iter_mut().flatten() {
        webhook.client_config.ca_bundle = Some(ByteString(ca_bundle.to_vec()));
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;

    const TEMPLATE: &[u8] = include_bytes!("../../tests/testdata/webhook-template.yaml");
    const CA_PEM: &[u8] = include_bytes!("../../tests/testdata/ca.pem");
    const KEY_PEM: &[u8] = include_bytes!("../../tests/testdata/key.pem");

    fn owner_ref() -> OwnerReference {
        OwnerReference {
            api_version: "rbac.authorization.k8s.io/v1".to_string(),
            kind: "ClusterRole".to_string(),
            name: "istiod-istio-system".to_string(),
            uid: "6a8a4d2e-3f0b-4d7a-a3f4-1b2c3d4e5f60".to_string(),
            controller: Some(true),
            block_owner_deletion: Some(true),
        }
    }

    #[test]
    fn test_build_stamps_ca_bundle_and_owner_refs() {
        let codec = WebhookCodec::new();
        let config = build_webhook_config(&codec, TEMPLATE, CA_PEM, &[owner_ref()]).unwrap();

        assert_eq!(config.metadata.owner_references, Some(vec![owner_ref()]));
        let webhooks = config.webhooks.unwrap();
        assert_eq!(webhooks.len(), 2);
        for webhook in &webhooks {
            assert_eq!(
                webhook.client_config.ca_bundle.as_ref().map(|b| b.0.as_slice()),
                Some(CA_PEM)
            );
        }
    }

    #[test]
    fn test_build_defaults_only_missing_fields() {
        let codec = WebhookCodec::new();
        let config = build_webhook_config(&codec, TEMPLATE, CA_PEM, &[]).unwrap();
        assert_eq!(config.metadata.owner_references, None);

        let webhooks = config.webhooks.unwrap();
        let pilot = &webhooks[0];
        assert_eq!(pilot.failure_policy.as_deref(), Some("Fail"));
        assert_eq!(pilot.namespace_selector, Some(LabelSelector::default()));
        assert_eq!(pilot.side_effects, "Unknown");

        let mixer = &webhooks[1];
        assert_eq!(mixer.failure_policy.as_deref(), Some("Ignore"));
        assert_eq!(mixer.side_effects, "None");
        assert_ne!(mixer.namespace_selector, Some(LabelSelector::default()));
    }

    #[test]
    fn test_build_reports_decode_error_before_ca_error() {
        let codec = WebhookCodec::new();
        let err = build_webhook_config(&codec, b"kind: Nope", KEY_PEM, &[]).unwrap_err();
        assert_eq!(err.reason(), ConfigError::DECODE_TEMPLATE);
    }

    #[test]
    fn test_build_rejects_bad_ca_bundle() {
        let codec = WebhookCodec::new();
        let err = build_webhook_config(&codec, TEMPLATE, KEY_PEM, &[]).unwrap_err();
        assert_eq!(err.reason(), ConfigError::VERIFY_CA_BUNDLE);
    }
}
