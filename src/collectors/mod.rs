/// Incremental reader for a growing log file
pub mod file_tailer;

/// OS change notifications driving the tailer
pub mod file_watcher;

pub use file_tailer::{FileTailer, TailerState};
pub use file_watcher::FileWatcher;
