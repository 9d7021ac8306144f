use crate::error::TailerError;
use log::{debug, info, warn};
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Read position within the monitored file
///
/// `last_read_offset <= file_size_at_last_check` holds after every check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TailerState {
    /// Absolute path of the monitored file
    pub file_path: PathBuf,
    /// Byte offset up to which content has been emitted
    pub last_read_offset: u64,
    /// File size observed by the most recent check
    pub file_size_at_last_check: u64,
}

/// Incremental reader for a growing text file
///
/// Starts at the file's size at construction, so existing content is never
/// replayed. Every [`on_file_changed`](Self::on_file_changed) call reads only
/// the bytes appended since the previous call. A shrinking file is treated as
/// truncation or rotation and reading restarts from offset 0.
///
/// The offset lives behind a mutex and the whole change callback runs inside
/// one critical section, so concurrent notifications cannot compute a read
/// window from a stale offset.
#[derive(Debug)]
pub struct FileTailer {
    path: PathBuf,
    state: Mutex<TailerState>,
}

impl FileTailer {
    /// Create a tailer for `path`, creating the file and its parent
    /// directories if they do not exist
    ///
    /// # Errors
    ///
    /// Returns `TailerError::PermissionDenied` if the file cannot be opened
    /// for reading and `TailerError::Prepare` if it cannot be created.
    pub fn new(path: impl AsRef<Path>) -> Result<Self, TailerError> {
        let path = Self::absolute_path(path.as_ref())?;
        Self::ensure_exists(&path)?;

        let file = File::open(&path).map_err(|e| match e.kind() {
            ErrorKind::PermissionDenied => TailerError::PermissionDenied(path.clone()),
            _ => TailerError::IoError(e),
        })?;
        let size = file.metadata()?.len();
        let path = path.canonicalize().unwrap_or(path);

        info!(
            "Tailing {} starting at offset {} bytes",
            path.display(),
            size
        );

        Ok(Self {
            state: Mutex::new(TailerState {
                file_path: path.clone(),
                last_read_offset: size,
                file_size_at_last_check: size,
            }),
            path,
        })
    }

    fn absolute_path(path: &Path) -> Result<PathBuf, TailerError> {
        if path.is_absolute() {
            Ok(path.to_path_buf())
        } else {
            Ok(std::env::current_dir()?.join(path))
        }
    }

    fn ensure_exists(path: &Path) -> Result<(), TailerError> {
        let prepare = |source| TailerError::Prepare {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(prepare)?;
        }
        if !path.exists() {
            info!("Creating log file: {}", path.display());
            OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .map_err(prepare)?;
        }
        Ok(())
    }

    /// Path of the monitored file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the current read position
    pub fn state(&self) -> TailerState {
        self.lock_state().clone()
    }

    fn lock_state(&self) -> MutexGuard<'_, TailerState> {
        // Offsets are plain integers, always consistent even after a panic
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Handle a change notification for the monitored file
    ///
    /// Reads the bytes appended since the last call and passes every
    /// non-blank line to `emit`, in file order. Returns the number of lines
    /// emitted. I/O problems (file briefly missing, short read during a
    /// concurrent truncation) are treated as "no new data" and never
    /// propagated.
    pub fn on_file_changed<F>(&self, mut emit: F) -> usize
    where
        F: FnMut(&str),
    {
        let mut state = self.lock_state();

        let current_size = match fs::metadata(&self.path) {
            Ok(metadata) => metadata.len(),
            Err(e) => {
                debug!("Cannot stat {}: {}", self.path.display(), e);
                return 0;
            }
        };

        if current_size < state.last_read_offset {
            info!(
                "Log file shrank from {} to {} bytes, reading from the start",
                state.last_read_offset, current_size
            );
            state.last_read_offset = 0;
        }
        state.file_size_at_last_check = current_size;

        if current_size <= state.last_read_offset {
            return 0;
        }

        let start = state.last_read_offset;
        let buffer = match Self::read_window(&self.path, start, current_size - start) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Failed to read new content from {}: {}", self.path.display(), e);
                return 0;
            }
        };

        // Offset moves only after the delta has been read in full
        let end = start + buffer.len() as u64;
        if end < current_size {
            debug!(
                "Short read: expected {} bytes, got {}",
                current_size - start,
                buffer.len()
            );
            state.file_size_at_last_check = end;
        }
        state.last_read_offset = end;

        let text = String::from_utf8_lossy(&buffer);
        let mut fragments: Vec<&str> = text.split('\n').collect();
        if fragments.last().is_some_and(|last| last.is_empty()) {
            fragments.pop();
        }

        let mut emitted = 0;
        for line in fragments {
            let line = line.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }
            emit(line);
            emitted += 1;
        }

        debug!(
            "Read bytes {}..{} of {}, emitted {} lines",
            start,
            end,
            self.path.display(),
            emitted
        );
        emitted
    }

    fn read_window(path: &Path, start: u64, len: u64) -> std::io::Result<Vec<u8>> {
        let mut file = File::open(path)?;
        file.seek(SeekFrom::Start(start))?;

        let mut buffer = Vec::with_capacity(len as usize);
        file.take(len).read_to_end(&mut buffer)?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quickcheck::{Arbitrary, Gen, TestResult};
    use quickcheck_macros::quickcheck;
    use std::io::Write;
    use tempfile::TempDir;

    fn append(path: &Path, content: &str) {
        let mut file = OpenOptions::new().append(true).open(path).unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
    }

    fn collect(tailer: &FileTailer) -> Vec<String> {
        let mut lines = Vec::new();
        tailer.on_file_changed(|line| lines.push(line.to_string()));
        lines
    }

    #[test]
    fn test_creates_missing_file_and_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested/deeper/app.log");

        let tailer = FileTailer::new(&path).unwrap();

        assert!(path.exists());
        assert_eq!(tailer.state().last_read_offset, 0);
    }

    #[test]
    fn test_existing_content_is_not_replayed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, "2024-01-01 00:00:00 ERROR old problem\n").unwrap();

        let tailer = FileTailer::new(&path).unwrap();
        assert!(collect(&tailer).is_empty());

        append(&path, "2024-01-01 00:00:01 ERROR new problem\n");
        assert_eq!(collect(&tailer), vec!["2024-01-01 00:00:01 ERROR new problem"]);
    }

    #[test]
    fn test_lines_emitted_in_order_and_blank_lines_skipped() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        append(&path, "first\n\n   \nsecond\r\nthird\n");

        assert_eq!(collect(&tailer), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_final_line_without_newline_is_emitted() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        append(&path, "complete\npartial");

        assert_eq!(collect(&tailer), vec!["complete", "partial"]);
        assert_eq!(tailer.state().last_read_offset, 16);
    }

    #[test]
    fn test_truncation_resets_offset() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        append(&path, "a fairly long line before rotation\n");
        assert_eq!(collect(&tailer).len(), 1);

        fs::write(&path, "after\n").unwrap();
        assert_eq!(collect(&tailer), vec!["after"]);
        assert_eq!(tailer.state().last_read_offset, 6);
    }

    #[test]
    fn test_truncation_to_empty_is_noop() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        append(&path, "line\n");
        collect(&tailer);
        fs::write(&path, "").unwrap();

        assert!(collect(&tailer).is_empty());
        let state = tailer.state();
        assert_eq!(state.last_read_offset, 0);
        assert_eq!(state.file_size_at_last_check, 0);
    }

    #[test]
    fn test_no_growth_is_idempotent() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();
        append(&path, "one\n");
        collect(&tailer);

        let before = tailer.state();
        for _ in 0..3 {
            assert_eq!(tailer.on_file_changed(|_| {}), 0);
        }
        assert_eq!(tailer.state(), before);
    }

    #[test]
    fn test_missing_file_is_treated_as_no_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();
        append(&path, "one\n");
        collect(&tailer);

        fs::remove_file(&path).unwrap();
        assert_eq!(tailer.on_file_changed(|_| {}), 0);
        assert_eq!(tailer.state().last_read_offset, 4);

        fs::write(&path, "two\n").unwrap();
        // Same size as before the removal, so growth is not yet visible
        assert_eq!(tailer.on_file_changed(|_| {}), 0);
        append(&path, "three\n");
        assert_eq!(collect(&tailer), vec!["three"]);
    }

    #[test]
    fn test_invalid_utf8_is_replaced_not_fatal() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(b"ERROR bad byte \xff here\n").unwrap();

        let lines = collect(&tailer);
        assert_eq!(lines.len(), 1);
        assert!(lines[0].starts_with("ERROR bad byte"));
    }

    #[test]
    #[cfg(unix)]
    fn test_unreadable_file_is_permission_denied() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("secret.log");
        fs::write(&path, "").unwrap();
        fs::set_permissions(&path, fs::Permissions::from_mode(0o000)).unwrap();

        // Root ignores file modes; only assert when the open really fails
        if File::open(&path).is_err() {
            assert!(matches!(
                FileTailer::new(&path),
                Err(TailerError::PermissionDenied(_))
            ));
        }
    }

    #[test]
    fn test_concurrent_callbacks_emit_each_line_once() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = Arc::new(FileTailer::new(&path).unwrap());
        let emitted = Arc::new(Mutex::new(Vec::new()));

        let writer = {
            let path = path.clone();
            thread::spawn(move || {
                for i in 0..50 {
                    append(&path, &format!("ERROR line {}\n", i));
                }
            })
        };
        let readers: Vec<_> = (0..4)
            .map(|_| {
                let tailer = Arc::clone(&tailer);
                let emitted = Arc::clone(&emitted);
                thread::spawn(move || {
                    for _ in 0..100 {
                        tailer.on_file_changed(|line| {
                            emitted.lock().unwrap().push(line.to_string())
                        });
                    }
                })
            })
            .collect();

        writer.join().unwrap();
        for reader in readers {
            reader.join().unwrap();
        }
        tailer.on_file_changed(|line| emitted.lock().unwrap().push(line.to_string()));

        // Every append ends with a newline, so a read never splits a line
        let mut lines = emitted.lock().unwrap().clone();
        lines.sort_by_key(|line| {
            line.trim_start_matches("ERROR line ")
                .parse::<u32>()
                .unwrap()
        });
        let expected: Vec<String> = (0..50).map(|i| format!("ERROR line {}", i)).collect();
        assert_eq!(lines, expected);
    }

    /// A non-blank log line without embedded newlines
    #[derive(Debug, Clone)]
    struct Line(String);

    impl Arbitrary for Line {
        fn arbitrary(g: &mut Gen) -> Self {
            let body: String = String::arbitrary(g)
                .chars()
                .filter(|c| c.is_ascii_alphanumeric() || *c == ' ')
                .take(40)
                .collect();
            Line(format!("L{}", body.trim()))
        }
    }

    fn joined(lines: &[Line]) -> String {
        lines.iter().map(|l| format!("{}\n", l.0)).collect()
    }

    // Only lines appended after construction are ever emitted, exactly once
    #[quickcheck]
    fn prop_preexisting_content_never_emitted(existing: Vec<Line>, batches: Vec<Vec<Line>>) -> bool {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        fs::write(&path, joined(&existing)).unwrap();
        let tailer = FileTailer::new(&path).unwrap();

        let mut emitted = Vec::new();
        let mut expected = Vec::new();
        for batch in &batches {
            append(&path, &joined(batch));
            expected.extend(batch.iter().map(|l| l.0.clone()));
            tailer.on_file_changed(|line| emitted.push(line.to_string()));
            tailer.on_file_changed(|line| emitted.push(line.to_string()));
        }

        emitted == expected
    }

    // After a shrink the tailer emits exactly the post-truncation content
    #[quickcheck]
    fn prop_truncation_emits_only_new_content(before: Vec<Line>, after: Vec<Line>) -> TestResult {
        let before_text = joined(&before);
        let after_text = joined(&after);
        if after_text.len() >= before_text.len() {
            return TestResult::discard();
        }

        let dir = TempDir::new().unwrap();
        let path = dir.path().join("app.log");
        let tailer = FileTailer::new(&path).unwrap();

        append(&path, &before_text);
        let first = collect(&tailer);
        fs::write(&path, &after_text).unwrap();
        let second = collect(&tailer);

        let expected_first: Vec<String> = before.iter().map(|l| l.0.clone()).collect();
        let expected_second: Vec<String> = after.iter().map(|l| l.0.clone()).collect();

        TestResult::from_bool(
            first == expected_first
                && second == expected_second
                && tailer.state().last_read_offset == after_text.len() as u64,
        )
    }
}
