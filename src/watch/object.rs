//! Cluster object watches backed by a local read cache
//!
//! A kube-rs watcher only reports `Apply` and `Delete`. `ObjectCache` turns
//! that stream into added/updated/deleted events by comparing each object
//! against the previous cached copy, and writes it into a reflector store
//! that the reconciler reads from.

use std::collections::HashSet;
use std::hash::Hash;
use std::sync::Arc;

use futures::{Stream, StreamExt};
use kube::runtime::reflector::{self, store::Writer, ObjectRef, Store};
use kube::runtime::watcher;
use kube::Resource;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::bridge::ObjectFilter;
use crate::queue::WorkQueue;
use crate::reconcilers::ReconcileTrigger;

/// A change to a watched object
#[derive(Debug, Clone, PartialEq)]
pub enum WatchEvent<K> {
    Added(Arc<K>),
    Updated { old: Arc<K>, new: Arc<K> },
    /// `confirmed` is false when the delete was not observed directly and
    /// the object only went missing across a relist. `obj` is then the
    /// last known state.
    Deleted { obj: Arc<K>, confirmed: bool },
}

impl<K> WatchEvent<K> {
    /// The most recent state of the object carried by the event
    pub fn object(&self) -> &K {
        match self {
            WatchEvent::Added(obj) => obj,
            WatchEvent::Updated { new, .. } => new,
            WatchEvent::Deleted { obj, .. } => obj,
        }
    }
}

/// Local cache of one object kind, fed by watcher events
pub struct ObjectCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone,
{
    store: Store<K>,
    writer: Writer<K>,
    /// Objects seen since the last `Init`, while a relist is in progress
    relisted: Option<HashSet<ObjectRef<K>>>,
}

impl<K> Default for ObjectCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K> ObjectCache<K>
where
    K: Resource + Clone + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
{
    pub fn new() -> Self {
        let (store, writer) = reflector::store();
        Self {
            store,
            writer,
            relisted: None,
        }
    }

    /// Read handle on the cache
    pub fn store(&self) -> Store<K> {
        self.store.clone()
    }

    /// Apply a watcher event to the cache, returning the resulting changes
    pub fn observe(&mut self, event: watcher::Event<K>) -> Vec<WatchEvent<K>> {
        let changes = match &event {
            watcher::Event::Apply(obj) => vec![self.changed(obj)],
            watcher::Event::Delete(obj) => vec![WatchEvent::Deleted {
                obj: Arc::new(obj.clone()),
                confirmed: true,
            }],
            watcher::Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            watcher::Event::InitApply(obj) => {
                self.relisted
                    .get_or_insert_with(HashSet::new)
                    .insert(ObjectRef::from_obj(obj));
                vec![self.changed(obj)]
            }
            watcher::Event::InitDone => {
                let relisted = self.relisted.take().unwrap_or_default();
                // the store still holds the pre-relist state until InitDone
                // is applied below
                self.store
                    .state()
                    .into_iter()
                    .filter(|obj| !relisted.contains(&ObjectRef::from_obj(&**obj)))
                    .map(|obj| WatchEvent::Deleted {
                        obj,
                        confirmed: false,
                    })
                    .collect()
            }
        };

        self.writer.apply_watcher_event(&event);
        changes
    }

    fn changed(&self, obj: &K) -> WatchEvent<K> {
        let new = Arc::new(obj.clone());
        match self.store.get(&ObjectRef::from_obj(obj)) {
            Some(old) => WatchEvent::Updated { old, new },
            None => WatchEvent::Added(new),
        }
    }
}

/// Feed a watch stream into `cache`, pushing a trigger for every change
/// that passes `filter`. Runs until the stream ends or `cancel` fires.
pub async fn run_object_watch<K, S>(
    mut cache: ObjectCache<K>,
    stream: S,
    filter: ObjectFilter,
    queue: WorkQueue<ReconcileTrigger>,
    cancel: CancellationToken,
) where
    K: Resource + Clone + PartialEq + Send + Sync + 'static,
    K::DynamicType: Eq + Hash + Clone + Default,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>>,
{
    tokio::pin!(stream);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!(kind = %filter.kind(), "Watch cancelled");
                break;
            }
            event = stream.next() => match event {
                Some(Ok(event)) => {
                    for change in cache.observe(event) {
                        if let Some(trigger) = filter.trigger_for(&change) {
                            queue.push(trigger);
                        }
                    }
                }
                Some(Err(e)) => {
                    warn!(kind = %filter.kind(), error = %e, "Error watching objects");
                }
                None => {
                    warn!(kind = %filter.kind(), "Watch stream ended");
                    break;
                }
            }
        }
    }
}
