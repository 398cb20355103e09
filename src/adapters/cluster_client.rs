//! Write access to the ValidatingWebhookConfiguration resource
//!
//! Reads always go through the local cache; only writes reach the
//! apiserver, through this trait so the applier can be exercised without a
//! cluster.

use async_trait::async_trait;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client, ResourceExt};

use crate::error::Result;

/// Cluster API calls issued by the applier
#[async_trait]
pub trait WebhookConfigClient: Send + Sync {
    async fn create(
        &self,
        config: &ValidatingWebhookConfiguration,
    ) -> Result<ValidatingWebhookConfiguration>;

    async fn update(
        &self,
        config: &ValidatingWebhookConfiguration,
    ) -> Result<ValidatingWebhookConfiguration>;

    async fn delete(&self, name: &str) -> Result<()>;
}

/// `WebhookConfigClient` backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeWebhookConfigClient {
    api: Api<ValidatingWebhookConfiguration>,
}

impl KubeWebhookConfigClient {
    pub fn new(client: Client) -> Self {
        Self {
            api: Api::all(client),
        }
    }
}

#[async_trait]
impl WebhookConfigClient for KubeWebhookConfigClient {
    async fn create(
        &self,
        config: &ValidatingWebhookConfiguration,
    ) -> Result<ValidatingWebhookConfiguration> {
        Ok(self.api.create(&PostParams::default(), config).await?)
    }

    async fn update(
        &self,
        config: &ValidatingWebhookConfiguration,
    ) -> Result<ValidatingWebhookConfiguration> {
        Ok(self
            .api
            .replace(&config.name_any(), &PostParams::default(), config)
            .await?)
    }

    async fn delete(&self, name: &str) -> Result<()> {
        self.api.delete(name, &DeleteParams::default()).await?;
        Ok(())
    }
}
