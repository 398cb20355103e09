//! Watch/event bridge
//!
//! Every source of change (the webhook configuration, the service's
//! Endpoints, the legacy Deployment, the template and CA files) is turned
//! into an opaque `ReconcileTrigger` on the shared work queue.

mod bridge;
mod file;
mod object;

pub use bridge::ObjectFilter;
pub use file::{run_file_watch, FileEvent, FileEventKind, FileWatcher, DEFAULT_POLL_INTERVAL};
pub use object::{run_object_watch, ObjectCache, WatchEvent};
