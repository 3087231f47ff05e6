use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, TryRecvError};
use notify::{Config, Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};

/// Watches a shader file through the platform notifier and hands back its
/// new text once edits settle.
///
/// Filesystem events arrive on the watcher's thread and are queued; all
/// reading happens in [`ShaderWatch::poll`] on the caller's thread.
pub struct ShaderWatch {
    path: PathBuf,
    debounce: Duration,
    events: Receiver<notify::Result<Event>>,
    pending: Option<Instant>,
    _watcher: RecommendedWatcher,
}

impl ShaderWatch {
    /// Starts watching `path`. `wake` runs on the watcher thread after each
    /// queued event so an idle event loop can come back and poll.
    ///
    /// The parent directory is watched rather than the file, so editors that
    /// save by renaming a temporary file over it are still seen.
    pub fn new<F>(path: impl Into<PathBuf>, debounce: Duration, wake: F) -> notify::Result<Self>
    where
        F: Fn() + Send + 'static,
    {
        let path = path.into();
        let (tx, events) = crossbeam_channel::unbounded();
        let mut watcher = RecommendedWatcher::new(
            move |res: notify::Result<Event>| {
                if tx.send(res).is_ok() {
                    wake();
                }
            },
            Config::default().with_compare_contents(true),
        )?;
        watcher.watch(watch_dir(&path), RecursiveMode::NonRecursive)?;
        tracing::debug!(path = %path.display(), "watching shader");

        Ok(Self {
            path,
            debounce,
            events,
            pending: None,
            _watcher: watcher,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// When a seen change will be read, if one is waiting out the debounce.
    pub fn next_check(&self) -> Option<Instant> {
        self.pending
    }

    /// Drains queued events and returns the file's contents once the last
    /// relevant event is `debounce` old. Read errors are logged and dropped;
    /// the next save tries again.
    pub fn poll(&mut self, now: Instant) -> Option<String> {
        loop {
            match self.events.try_recv() {
                Ok(Ok(event)) => {
                    if self.concerns(&event) {
                        self.pending = Some(now + self.debounce);
                    }
                }
                Ok(Err(err)) => {
                    tracing::warn!(path = %self.path.display(), error = %err, "watch error");
                }
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => break,
            }
        }

        match self.pending {
            Some(deadline) if deadline <= now => self.pending = None,
            _ => return None,
        }
        match fs::read_to_string(&self.path) {
            Ok(source) => {
                tracing::info!(path = %self.path.display(), "shader changed; reloading");
                Some(source)
            }
            Err(err) => {
                tracing::warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read changed shader"
                );
                None
            }
        }
    }

    fn concerns(&self, event: &Event) -> bool {
        matches!(event.kind, EventKind::Modify(_) | EventKind::Create(_))
            && event
                .paths
                .iter()
                .any(|path| path.file_name() == self.path.file_name())
    }
}

impl std::fmt::Debug for ShaderWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShaderWatch")
            .field("path", &self.path)
            .field("debounce", &self.debounce)
            .field("pending", &self.pending)
            .finish_non_exhaustive()
    }
}

fn watch_dir(path: &Path) -> &Path {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}
