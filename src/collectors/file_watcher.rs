use crate::collectors::FileTailer;
use crate::error::TailerError;
use log::{debug, info, warn};
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::ffi::OsString;
use std::path::Path;
use std::sync::Arc;

/// Drives a [`FileTailer`] from OS file change notifications
///
/// Watches the directory containing the log file (non-recursively) so that
/// rotation, where the file is replaced rather than appended to, is still
/// observed. Each relevant event runs the tailer's change callback on the
/// watcher's own thread and forwards the new lines to `consumer`.
pub struct FileWatcher {
    watcher: Option<RecommendedWatcher>,
    tailer: Arc<FileTailer>,
}

impl FileWatcher {
    /// Start watching the tailer's file
    ///
    /// # Errors
    ///
    /// Returns `TailerError::WatchError` if the OS watch cannot be installed.
    pub fn start<F>(tailer: Arc<FileTailer>, mut consumer: F) -> Result<Self, TailerError>
    where
        F: FnMut(&str) + Send + 'static,
    {
        let directory = tailer
            .path()
            .parent()
            .map(Path::to_path_buf)
            .ok_or_else(|| {
                TailerError::IoError(std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "log file has no parent directory",
                ))
            })?;
        let target = tailer.path().file_name().map(OsString::from);

        let handler_tailer = Arc::clone(&tailer);
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            match res {
                Ok(event) => {
                    if !Self::is_relevant(&event, target.as_deref()) {
                        return;
                    }
                    let emitted = handler_tailer.on_file_changed(&mut consumer);
                    if emitted > 0 {
                        debug!("Forwarded {} new lines", emitted);
                    }
                }
                Err(e) => warn!("File watch error: {}", e),
            }
        })?;

        watcher.watch(&directory, RecursiveMode::NonRecursive)?;
        info!(
            "Watching {} for changes to {}",
            directory.display(),
            tailer.path().display()
        );

        Ok(Self {
            watcher: Some(watcher),
            tailer,
        })
    }

    /// Whether an event concerns the monitored file and may carry new data
    fn is_relevant(event: &Event, target: Option<&std::ffi::OsStr>) -> bool {
        let kind_matches = matches!(
            event.kind,
            EventKind::Create(_) | EventKind::Modify(_) | EventKind::Any
        );
        kind_matches
            && event
                .paths
                .iter()
                .any(|path| path.file_name().is_some() && path.file_name() == target)
    }

    /// Stop receiving change notifications
    ///
    /// The tailer's offset is left untouched; it only ever moves after a
    /// complete read.
    pub fn stop(&mut self) {
        if let Some(watcher) = self.watcher.take() {
            drop(watcher);
            info!("Stopped watching {}", self.tailer.path().display());
        }
    }

    pub fn is_running(&self) -> bool {
        self.watcher.is_some()
    }

    pub fn tailer(&self) -> &Arc<FileTailer> {
        &self.tailer
    }
}

impl Drop for FileWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}
