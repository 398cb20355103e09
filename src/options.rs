//! Controller options and their validation

use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{Error, Result};

/// Static configuration of the controller.
///
/// Fixed for the lifetime of a controller instance and validated once
/// before any watch is established.
#[derive(Args, Debug, Clone, Default)]
pub struct Options {
    /// Namespace in which the webhook service (and legacy deployment) live
    #[arg(long = "namespace", env = "WATCHED_NAMESPACE", default_value = "istio-system")]
    pub watched_namespace: String,

    /// Periodic relist interval in seconds. Zero disables resync.
    #[arg(long = "resync-period-secs", env = "RESYNC_PERIOD_SECS", default_value_t = 0)]
    pub resync_period_secs: u64,

    /// File path to the x509 certificate bundle patched into the webhook config
    #[arg(long, env = "CA_PATH", default_value = "/etc/certs/root-cert.pem")]
    pub ca_path: PathBuf,

    /// Name of the ValidatingWebhookConfiguration resource. Should match
    /// the name in the template.
    #[arg(long, env = "WEBHOOK_CONFIG_NAME", default_value = "istio-galley")]
    pub webhook_config_name: String,

    /// File path to the ValidatingWebhookConfiguration template
    #[arg(
        long,
        env = "WEBHOOK_CONFIG_PATH",
        default_value = "/etc/config/validatingwebhookconfiguration.yaml"
    )]
    pub webhook_config_path: PathBuf,

    /// Name of the service running the webhook server
    #[arg(long, env = "SERVICE_NAME", default_value = "istiod")]
    pub service_name: String,

    /// Name of a legacy deployment in the watched namespace. While it runs
    /// with non-zero replicas, reconciliation is deferred to it.
    #[arg(long, env = "LEGACY_DEPLOYMENT_NAME")]
    pub legacy_deployment_name: Option<String>,

    /// ClusterRole that owns the webhook configuration. The configuration is
    /// garbage collected when this ClusterRole is deleted.
    #[arg(long, env = "CLUSTER_ROLE_NAME")]
    pub cluster_role_name: Option<String>,

    /// Actively remove the webhook configuration instead of creating it
    #[arg(long, env = "UNREGISTER_VALIDATION_WEBHOOK", default_value_t = false)]
    pub unregister: bool,
}

impl Options {
    /// Validate the user-facing options, reporting every violation at once
    pub fn validate(&self) -> Result<()> {
        let mut errs = Vec::new();

        if !is_dns1123_label(&self.webhook_config_name) {
            errs.push(format!("invalid webhook name: {:?}", self.webhook_config_name));
        }
        if !is_dns1123_label(&self.watched_namespace) {
            errs.push(format!("invalid namespace: {:?}", self.watched_namespace));
        }
        if let Some(deployment) = self.legacy_deployment() {
            if !is_dns1123_label(deployment) {
                errs.push(format!("invalid deployment name: {:?}", deployment));
            }
        }
        if !is_dns1123_label(&self.service_name) {
            errs.push(format!("invalid service name: {:?}", self.service_name));
        }
        if self.ca_path.as_os_str().is_empty() {
            errs.push("CA cert file not specified".to_string());
        }
        if self.webhook_config_path.as_os_str().is_empty() {
            errs.push("webhook config file not specified".to_string());
        }

        if errs.is_empty() {
            Ok(())
        } else {
            Err(Error::InvalidOptions(errs))
        }
    }

    /// Legacy deployment name, treating an empty string as unset
    pub fn legacy_deployment(&self) -> Option<&str> {
        self.legacy_deployment_name
            .as_deref()
            .filter(|name| !name.is_empty())
    }

    /// Owning ClusterRole name, treating an empty string as unset
    pub fn cluster_role(&self) -> Option<&str> {
        self.cluster_role_name.as_deref().filter(|name| !name.is_empty())
    }

    /// Resync period, `None` when disabled
    pub fn resync_period(&self) -> Option<Duration> {
        (self.resync_period_secs > 0).then(|| Duration::from_secs(self.resync_period_secs))
    }
}

const DNS1123_LABEL_MAX_LENGTH: usize = 63;

/// RFC 1123 label: lowercase alphanumerics and '-', starting and ending
/// with an alphanumeric, at most 63 characters.
pub fn is_dns1123_label(value: &str) -> bool {
    let bytes = value.as_bytes();
    if bytes.is_empty() || bytes.len() > DNS1123_LABEL_MAX_LENGTH {
        return false;
    }
    let alnum = |b: &u8| b.is_ascii_lowercase() || b.is_ascii_digit();
    alnum(&bytes[0])
        && alnum(&bytes[bytes.len() - 1])
        && bytes.iter().all(|b| alnum(b) || *b == b'-')
}
