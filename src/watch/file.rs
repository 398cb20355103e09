//! Local file watches for the webhook template and CA bundle
//!
//! Files are polled: mounted ConfigMaps and Secrets are swapped through
//! symlinks, which a content comparison catches regardless of how the
//! update was performed.

use std::fmt;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::queue::WorkQueue;
use crate::reconcilers::ReconcileTrigger;

/// Default interval between file polls
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileEventKind {
    Created,
    Modified,
    Removed,
}

/// A change to a watched file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEvent {
    pub path: PathBuf,
    pub kind: FileEventKind,
}

impl fmt::Display for FileEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            FileEventKind::Created => "CREATE",
            FileEventKind::Modified => "WRITE",
            FileEventKind::Removed => "REMOVE",
        };
        write!(f, "{:?}: {}", self.path, kind)
    }
}

/// Detects content changes of a single file
#[derive(Debug)]
pub struct FileWatcher {
    path: PathBuf,
    /// Last observed contents, `None` while the file is absent
    contents: Option<Vec<u8>>,
}

impl FileWatcher {
    /// Start watching `path` from its current contents
    pub async fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let contents = tokio::fs::read(&path).await.ok();
        Self { path, contents }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Re-read the file and report how it changed since the last poll
    pub async fn poll(&mut self) -> io::Result<Option<FileEvent>> {
        let current = match tokio::fs::read(&self.path).await {
            Ok(bytes) => Some(bytes),
            Err(e) if e.kind() == io::ErrorKind::NotFound => None,
            Err(e) => return Err(e),
        };

        let kind = match (&self.contents, &current) {
            (None, Some(_)) => FileEventKind::Created,
            (Some(_), None) => FileEventKind::Removed,
            (Some(old), Some(new)) if old != new => FileEventKind::Modified,
            _ => return Ok(None),
        };
        self.contents = current;

        Ok(Some(FileEvent {
            path: self.path.clone(),
            kind,
        }))
    }
}

/// Poll the webhook template and CA bundle, pushing a trigger whenever one
/// of them changes. Runs until `cancel` fires.
pub async fn run_file_watch(
    mut webhook_config: FileWatcher,
    mut ca_bundle: FileWatcher,
    interval: Duration,
    queue: WorkQueue<ReconcileTrigger>,
    cancel: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                debug!("File watch cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        match webhook_config.poll().await {
            Ok(Some(event)) => queue.push(ReconcileTrigger::new(format!(
                "validatingwebhookconfiguration file changed: {}",
                event
            ))),
            Ok(None) => {}
            Err(e) => warn!(
                path = %webhook_config.path().display(),
                error = %e,
                "error watching local validatingwebhookconfiguration file"
            ),
        }

        match ca_bundle.poll().await {
            Ok(Some(event)) => {
                queue.push(ReconcileTrigger::new(format!("CA file changed: {}", event)))
            }
            Ok(None) => {}
            Err(e) => warn!(
                path = %ca_bundle.path().display(),
                error = %e,
                "error watching local CA bundle"
            ),
        }
    }
}
