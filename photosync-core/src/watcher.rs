//! Directory Watcher (C4): turns OS-native filesystem notifications rooted
//! at the storage path into [`FileEvent`]s on an unbounded channel. The
//! watcher never debounces, batches, or orders events — that is the Event
//! Pipeline's job.

use crate::error::{Result, SyncError};
use crate::types::{is_supported_extension, FileEvent, FileEventKind};
use notify::{Event as NotifyEvent, EventKind, RecommendedWatcher, RecursiveMode};
use notify_debouncer_full::{new_debouncer, DebounceEventResult, Debouncer, NoCache};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

/// How long the underlying notifier waits for related native events to
/// settle before handing a coalesced batch to our callback. This is
/// independent of (and much shorter than) the Event Pipeline's own debounce
/// window; it only smooths out a single OS notification burst for one file.
const NATIVE_DEBOUNCE_WINDOW: Duration = Duration::from_millis(200);

/// Watches a storage root recursively and forwards supported-extension file
/// events to an unbounded channel.
pub struct DirectoryWatcher {
    root: PathBuf,
    alive: Arc<AtomicBool>,
    // Kept alive for the lifetime of the watcher; dropping it stops watching.
    _debouncer: Debouncer<RecommendedWatcher, NoCache>,
}

impl std::fmt::Debug for DirectoryWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectoryWatcher")
            .field("root", &self.root)
            .field("alive", &self.is_alive())
            .finish()
    }
}

impl DirectoryWatcher {
    /// Starts watching `root` and returns the watcher handle plus the
    /// receiving end of its event channel.
    pub fn start(root: PathBuf) -> Result<(Self, mpsc::UnboundedReceiver<FileEvent>)> {
        let (tx, rx) = mpsc::unbounded_channel();
        let alive = Arc::new(AtomicBool::new(true));

        let root_for_cb = root.clone();
        let alive_for_cb = alive.clone();
        let mut debouncer = new_debouncer(
            NATIVE_DEBOUNCE_WINDOW,
            None,
            move |result: DebounceEventResult| match result {
                Ok(events) => {
                    for debounced in events {
                        match convert_event(&debounced.event, &root_for_cb) {
                            Some(file_event) => {
                                debug!(?file_event, "watcher emitted event");
                                if tx.send(file_event).is_err() {
                                    // Consumer is gone; nothing left to watch for.
                                    alive_for_cb.store(false, Ordering::SeqCst);
                                }
                            }
                            None => continue,
                        }
                    }
                }
                Err(errors) => {
                    for err in errors {
                        error!(error = %err, "watcher reported an error");
                    }
                }
            },
        )
        .map_err(|err| SyncError::Watch(err.to_string()))?;

        debouncer
            .watch(&root, RecursiveMode::Recursive)
            .map_err(|err| SyncError::Watch(err.to_string()))?;

        info!(root = %root.display(), "directory watcher started");

        Ok((
            Self {
                root,
                alive,
                _debouncer: debouncer,
            },
            rx,
        ))
    }

    /// Liveness probe consumed by the health surface (C7).
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::SeqCst)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Converts one native notify event into a [`FileEvent`], or `None` if it
/// should be ignored (directory events, unsupported extensions, events with
/// no path). Never panics, so one malformed event can never bring the
/// watcher down.
fn convert_event(event: &NotifyEvent, root: &Path) -> Option<FileEvent> {
    let kind = match event.kind {
        EventKind::Create(_) => FileEventKind::Created,
        EventKind::Modify(notify::event::ModifyKind::Name(
            notify::event::RenameMode::Both | notify::event::RenameMode::From,
        )) => FileEventKind::Moved,
        EventKind::Modify(_) => FileEventKind::Modified,
        EventKind::Remove(_) => FileEventKind::Deleted,
        _ => return None,
    };

    let path = event.paths.first()?.clone();
    if !is_supported_extension(&path) {
        return None;
    }

    let category = derive_category(&path, root);
    Some(FileEvent::new(kind, path, category))
}

/// SPEC_FULL.md 4.4: the first path segment under the root; if the path is
/// not under the root, the immediate parent directory name; `"uncategorized"`
/// if that's still empty.
fn derive_category(path: &Path, root: &Path) -> String {
    if let Ok(relative) = path.strip_prefix(root) {
        if let Some(first) = relative.components().next() {
            let segment = first.as_os_str().to_string_lossy().into_owned();
            if !segment.is_empty() {
                return segment;
            }
        }
    }

    path.parent()
        .and_then(|parent| parent.file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .unwrap_or_else(|| "uncategorized".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derives_category_from_first_segment_under_root() {
        let root = Path::new("/photos");
        let path = Path::new("/photos/cars/sunset.jpg");
        assert_eq!(derive_category(path, root), "cars");
    }

    #[test]
    fn falls_back_to_parent_directory_name_outside_root() {
        let root = Path::new("/photos");
        let path = Path::new("/elsewhere/misc/file.jpg");
        assert_eq!(derive_category(path, root), "misc");
    }

    #[test]
    fn falls_back_to_uncategorized_when_nothing_else_applies() {
        let root = Path::new("/photos");
        let path = Path::new("/file.jpg");
        assert_eq!(derive_category(path, root), "uncategorized");
    }
}
