//! ValidatingWebhookConfiguration controller
//!
//! Starts the object and file watches, waits for the caches to sync, then
//! runs the single reconcile worker until shutdown.

use std::sync::Arc;

use futures::future::try_join3;
use k8s_openapi::api::admissionregistration::v1::ValidatingWebhookConfiguration;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::Endpoints;
use kube::runtime::{watcher, WatchStreamExt};
use kube::Api;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapters::{
    find_cluster_role_owner_refs, KubeWebhookConfigClient, WebhookConfigClient,
};
use crate::controllers::Context;
use crate::error::{Error, Result};
use crate::metrics;
use crate::queue::WorkQueue;
use crate::reconcilers::{ReconcileTrigger, WebhookConfigApplier, WebhookReconciler};
use crate::watch::{
    run_file_watch, run_object_watch, FileWatcher, ObjectCache, ObjectFilter,
    DEFAULT_POLL_INTERVAL,
};

/// Run the controller until `cancel` fires.
///
/// Returns an error if the options are invalid or a cache fails to sync;
/// in both cases the worker is never started.
pub async fn run(ctx: Arc<Context>, cancel: CancellationToken) -> Result<()> {
    ctx.options.validate()?;
    let options = &ctx.options;

    let owner_refs = find_cluster_role_owner_refs(&ctx.client, options.cluster_role()).await;

    let queue: WorkQueue<ReconcileTrigger> = WorkQueue::default();
    let namespace = options.watched_namespace.as_str();

    let webhook_configs = ObjectCache::<ValidatingWebhookConfiguration>::new();
    let endpoints = ObjectCache::<Endpoints>::new();
    let deployments = ObjectCache::<Deployment>::new();
    let (webhook_config_store, endpoints_store, deployment_store) =
        (webhook_configs.store(), endpoints.store(), deployments.store());

    info!(
        namespace = %namespace,
        webhook = %options.webhook_config_name,
        service = %options.service_name,
        "Starting validatingwebhookconfiguration controller"
    );

    tokio::spawn(run_object_watch(
        webhook_configs,
        watcher(
            Api::<ValidatingWebhookConfiguration>::all(ctx.client.clone()),
            watcher::Config::default(),
        )
        .default_backoff(),
        ObjectFilter::new::<ValidatingWebhookConfiguration>(Some(
            options.webhook_config_name.as_str(),
        )),
        queue.clone(),
        cancel.clone(),
    ));
    tokio::spawn(run_object_watch(
        endpoints,
        watcher(
            Api::<Endpoints>::namespaced(ctx.client.clone(), namespace),
            watcher::Config::default(),
        )
        .default_backoff(),
        ObjectFilter::new::<Endpoints>(Some(options.service_name.as_str())),
        queue.clone(),
        cancel.clone(),
    ));
    tokio::spawn(run_object_watch(
        deployments,
        watcher(
            Api::<Deployment>::namespaced(ctx.client.clone(), namespace),
            watcher::Config::default(),
        )
        .default_backoff(),
        ObjectFilter::new::<Deployment>(options.legacy_deployment()),
        queue.clone(),
        cancel.clone(),
    ));

    tokio::spawn(run_file_watch(
        FileWatcher::new(&options.webhook_config_path).await,
        FileWatcher::new(&options.ca_path).await,
        DEFAULT_POLL_INTERVAL,
        queue.clone(),
        cancel.clone(),
    ));

    if let Some(period) = options.resync_period() {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            let start = tokio::time::Instant::now() + period;
            let mut ticker = tokio::time::interval_at(start, period);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = ticker.tick() => queue.push(ReconcileTrigger::new("periodic resync")),
                }
            }
        });
    }

    let synced = try_join3(
        webhook_config_store.wait_until_ready(),
        endpoints_store.wait_until_ready(),
        deployment_store.wait_until_ready(),
    );
    tokio::select! {
        result = synced => {
            result.map_err(|e| Error::cache_sync(e.to_string()))?;
        }
        _ = cancel.cancelled() => {
            warn!("Shutdown requested before caches synced");
            return Ok(());
        }
    }
    metrics::CACHES_SYNCED.set(1.0);
    info!("Caches synced");

    queue.push(ReconcileTrigger::initial());

    let mut reconciler = WebhookReconciler::new(
        Arc::clone(options),
        ctx.codec.clone(),
        owner_refs,
        endpoints_store,
        deployment_store,
        WebhookConfigApplier::new(
            KubeWebhookConfigClient::new(ctx.client.clone()),
            webhook_config_store,
            options.webhook_config_name.clone(),
        ),
    );

    {
        let queue = queue.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            cancel.cancelled().await;
            queue.shut_down();
        });
    }

    run_worker(&mut reconciler, &queue).await;
    info!("Validatingwebhookconfiguration controller stopped");
    Ok(())
}

/// Process triggers until the queue is shut down
pub async fn run_worker<C: WebhookConfigClient>(
    reconciler: &mut WebhookReconciler<C>,
    queue: &WorkQueue<ReconcileTrigger>,
) {
    while process_next_work_item(reconciler, queue).await {}
}

/// Process one trigger. Returns false once the queue is shut down.
pub async fn process_next_work_item<C: WebhookConfigClient>(
    reconciler: &mut WebhookReconciler<C>,
    queue: &WorkQueue<ReconcileTrigger>,
) -> bool {
    let Some(trigger) = queue.pop().await else {
        return false;
    };

    match reconciler.reconcile(&trigger).await {
        Ok(_) => queue.done_forget(&trigger),
        Err(e) => {
            error!(
                trigger = %trigger,
                error = %e,
                retries = queue.num_requeues(&trigger),
                "Reconciliation failed, scheduling retry"
            );
            metrics::RECONCILIATION_ERRORS.inc();
            queue.done_retry(trigger);
        }
    }
    true
}
