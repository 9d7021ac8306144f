//! Orchestration of the detection pipeline
//!
//! [`AlertPipeline`] handles one line at a time: classify, extract, ask the
//! rate limiter, dispatch. [`LogMonitor`] owns the moving parts around it:
//! the tailer and its watcher, a worker thread with the tokio runtime that
//! runs the pipeline, and the shutdown channel the main loop waits on.

use crate::alerts::{DispatchResult, NotificationDispatcher, RateLimiter};
use crate::collectors::{FileTailer, FileWatcher};
use crate::config::Config;
use crate::detection::{ErrorExtractor, PatternSet};
use crate::error::{ConfigError, MonitorError};
use crate::events::{ErrorRecord, TIMESTAMP_FORMAT};
use crate::monitoring::{MonitorStats, StatsSnapshot};
use chrono::Local;
use log::{debug, error, info, warn};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tokio::runtime::Runtime;

/// Keyword reported for synthetic test alerts
pub const TEST_KEYWORD: &str = "TEST";

/// What happened to a single log line
#[derive(Debug, Clone, PartialEq)]
pub enum LineOutcome {
    /// No error keyword matched
    NoMatch,
    /// An error was detected but the rate limiter withheld the alert
    Suppressed(ErrorRecord),
    /// An error was detected and handed to the sinks
    Dispatched(ErrorRecord, DispatchResult),
}

/// Per-line detection, rate limiting and dispatch
pub struct AlertPipeline {
    patterns: PatternSet,
    extractor: ErrorExtractor,
    rate_limiter: Arc<RateLimiter>,
    dispatcher: Arc<NotificationDispatcher>,
    stats: Arc<MonitorStats>,
}

impl AlertPipeline {
    pub fn new(
        patterns: PatternSet,
        rate_limiter: Arc<RateLimiter>,
        dispatcher: Arc<NotificationDispatcher>,
        stats: Arc<MonitorStats>,
    ) -> Self {
        Self {
            patterns,
            extractor: ErrorExtractor::new(),
            rate_limiter,
            dispatcher,
            stats,
        }
    }

    /// Run one line through detection and, if permitted, dispatch
    ///
    /// Rate limiting is global: while a window is open every detected error
    /// is suppressed, whatever its level or keyword.
    pub async fn process_line(&self, line: &str) -> LineOutcome {
        self.stats.record_line();

        let Some(matched) = self.patterns.classify(line) else {
            return LineOutcome::NoMatch;
        };
        self.stats.record_error_detected();

        let record = self.extractor.extract(line, matched.keyword);
        info!(
            "Error detected [{}] via keyword '{}': {}",
            record.level, record.matched_keyword, record.message
        );

        if !self.rate_limiter.permit() {
            self.stats.record_suppressed();
            info!(
                "Notification suppressed by rate limit ({}s until next alert)",
                self.rate_limiter.remaining().num_seconds()
            );
            return LineOutcome::Suppressed(record);
        }

        let result = self.deliver(&record).await;
        LineOutcome::Dispatched(record, result)
    }

    /// Dispatch a synthetic alert to every sink, ignoring the rate limiter
    pub async fn send_test_notification(&self) -> DispatchResult {
        let now = Local::now();
        let line = format!(
            "{} ERROR: Test notification from the log monitor",
            now.format(TIMESTAMP_FORMAT)
        );
        let record = self.extractor.extract_at(&line, TEST_KEYWORD, now);
        info!("Sending test notification to {:?}", self.dispatcher.sink_names());
        self.deliver(&record).await
    }

    async fn deliver(&self, record: &ErrorRecord) -> DispatchResult {
        self.stats.record_dispatched();
        let result = self.dispatcher.dispatch(record).await;
        for sink in &result.results {
            self.stats.record_sink_result(sink.success);
        }

        if result.degraded {
            warn!("Running in degraded mode: alert was not delivered anywhere");
        } else if !result.any_succeeded {
            warn!("All notification sinks failed for this alert");
        }
        result
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }
}

/// Messages consumed by the pipeline worker
#[derive(Debug)]
enum PipelineMessage {
    Line(String),
    Shutdown,
}

/// A running worker thread and the watcher feeding it
struct RunningPipeline {
    watcher: FileWatcher,
    sender: Sender<PipelineMessage>,
    worker: JoinHandle<()>,
}

/// Log file monitor: tailer, watcher, pipeline worker and shutdown signal
pub struct LogMonitor {
    config: Config,
    tailer: Arc<FileTailer>,
    pipeline: Arc<AlertPipeline>,
    stats: Arc<MonitorStats>,
    running: Option<RunningPipeline>,
    shutdown_sender: Sender<()>,
    shutdown_receiver: Receiver<()>,
}

impl LogMonitor {
    /// Create a monitor with sinks built from the configuration
    ///
    /// # Errors
    ///
    /// Returns `MonitorError::Config` for invalid settings or keywords and
    /// `MonitorError::Tailer` if the log file cannot be created or read.
    pub fn new(config: Config) -> Result<Self, MonitorError> {
        let dispatcher = NotificationDispatcher::from_config(&config);
        Self::with_dispatcher(config, dispatcher)
    }

    /// Create a monitor that delivers through the given dispatcher
    pub fn with_dispatcher(
        config: Config,
        dispatcher: NotificationDispatcher,
    ) -> Result<Self, MonitorError> {
        config.validate()?;
        let patterns = PatternSet::new(config.keywords()).map_err(ConfigError::from)?;
        let tailer = Arc::new(FileTailer::new(config.log_file_path())?);

        let stats = Arc::new(MonitorStats::new());
        let pipeline = Arc::new(AlertPipeline::new(
            patterns,
            Arc::new(RateLimiter::new(config.general.rate_limit_seconds)),
            Arc::new(dispatcher),
            Arc::clone(&stats),
        ));
        let (shutdown_sender, shutdown_receiver) = mpsc::channel();

        Ok(Self {
            config,
            tailer,
            pipeline,
            stats,
            running: None,
            shutdown_sender,
            shutdown_receiver,
        })
    }

    /// Start the pipeline worker and the file watcher
    ///
    /// Returns once both are running; lines appended afterwards are processed
    /// on the worker thread.
    pub fn start(&mut self) -> Result<(), MonitorError> {
        if self.running.is_some() {
            return Err(MonitorError::AlreadyRunning);
        }

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("logwatch-dispatch")
            .build()?;
        let grace = self.shutdown_grace();
        let (sender, receiver) = mpsc::channel::<PipelineMessage>();
        let pipeline = Arc::clone(&self.pipeline);

        let worker = thread::Builder::new()
            .name("logwatch-pipeline".to_string())
            .spawn(move || Self::run_worker(receiver, pipeline, runtime, grace))?;

        let line_sender = sender.clone();
        let watcher = match FileWatcher::start(Arc::clone(&self.tailer), move |line: &str| {
            if line_sender
                .send(PipelineMessage::Line(line.to_string()))
                .is_err()
            {
                debug!("Pipeline worker gone, dropping line");
            }
        }) {
            Ok(watcher) => watcher,
            Err(e) => {
                let _ = sender.send(PipelineMessage::Shutdown);
                drop(sender);
                let _ = worker.join();
                return Err(e.into());
            }
        };

        info!(
            "Monitoring {} for {:?} (rate limit {}s, sinks: {:?})",
            self.tailer.path().display(),
            self.pipeline.patterns().keywords(),
            self.config.general.rate_limit_seconds,
            self.sink_names()
        );

        self.running = Some(RunningPipeline {
            watcher,
            sender,
            worker,
        });
        Ok(())
    }

    /// Body of the pipeline worker thread
    ///
    /// Processes lines until told to shut down, then keeps draining lines
    /// still arriving from the watcher until all senders are gone or the
    /// grace period ends. Whatever is left after that is discarded.
    fn run_worker(
        receiver: Receiver<PipelineMessage>,
        pipeline: Arc<AlertPipeline>,
        runtime: Runtime,
        grace: Duration,
    ) {
        info!("Pipeline worker started");
        let mut drain_until: Option<Instant> = None;
        loop {
            let message = match drain_until {
                None => receiver.recv().ok(),
                Some(until) => receiver
                    .recv_timeout(until.saturating_duration_since(Instant::now()))
                    .ok(),
            };
            match message {
                Some(PipelineMessage::Line(line)) => {
                    Self::process_guarded(&runtime, &pipeline, &line);
                }
                Some(PipelineMessage::Shutdown) => {
                    drain_until.get_or_insert_with(|| Instant::now() + grace);
                }
                None => break,
            }
        }

        let discarded = receiver
            .try_iter()
            .filter(|message| matches!(message, PipelineMessage::Line(_)))
            .count();
        if discarded > 0 {
            debug!("Discarded {} lines queued after the shutdown grace period", discarded);
        }

        runtime.shutdown_timeout(grace);
        info!("Pipeline worker stopped");
    }

    /// Process one line; a panic skips the line instead of killing the worker
    fn process_guarded(runtime: &Runtime, pipeline: &AlertPipeline, line: &str) {
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            runtime.block_on(pipeline.process_line(line))
        }));
        if outcome.is_err() {
            error!("Internal failure while processing line, skipped: {}", line);
        }
    }

    /// Stop watching and let queued lines drain within the grace period
    ///
    /// Calling `stop` on a monitor that is not running does nothing.
    pub fn stop(&mut self) {
        let Some(RunningPipeline {
            mut watcher,
            sender,
            worker,
        }) = self.running.take()
        else {
            return;
        };

        info!("Stopping log monitor");
        watcher.stop();
        if sender.send(PipelineMessage::Shutdown).is_err() {
            debug!("Pipeline worker already exited");
        }
        // The worker drains until every line sender is gone
        drop(sender);

        // Queued lines and in-flight deliveries get the grace period
        let grace = self.shutdown_grace();
        let deadline = Instant::now() + grace;
        while !worker.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(50));
        }

        if worker.is_finished() {
            if worker.join().is_err() {
                error!("Pipeline worker panicked");
            }
            info!("Log monitor stopped");
        } else {
            warn!(
                "Pipeline worker still busy after {:?}, abandoning pending deliveries",
                grace
            );
        }
    }

    /// Block until a shutdown signal arrives, logging a heartbeat meanwhile
    pub fn wait_for_shutdown(&self, heartbeat: Duration) {
        info!("Waiting for shutdown signal...");
        loop {
            match self.shutdown_receiver.recv_timeout(heartbeat) {
                Ok(()) => {
                    info!("Shutdown signal received");
                    break;
                }
                Err(RecvTimeoutError::Timeout) => {
                    self.stats.log_heartbeat();
                }
                Err(RecvTimeoutError::Disconnected) => {
                    warn!("Shutdown channel disconnected");
                    break;
                }
            }
        }
    }

    /// Sender that makes [`LogMonitor::wait_for_shutdown`] return
    pub fn shutdown_handle(&self) -> Sender<()> {
        self.shutdown_sender.clone()
    }

    /// Deliver a synthetic alert to every sink right now
    ///
    /// Runs on its own short-lived runtime and must not be called from inside
    /// an async context.
    pub fn send_test_notification(&self) -> Result<DispatchResult, MonitorError> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?;
        Ok(runtime.block_on(self.pipeline.send_test_notification()))
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    pub fn is_running(&self) -> bool {
        self.running.is_some()
    }

    pub fn log_file_path(&self) -> &Path {
        self.tailer.path()
    }

    pub fn sink_names(&self) -> Vec<String> {
        self.pipeline.dispatcher.sink_names()
    }

    /// Heartbeat interval from the configuration
    pub fn heartbeat(&self) -> Duration {
        Duration::from_secs(self.config.general.heartbeat_seconds)
    }

    fn shutdown_grace(&self) -> Duration {
        Duration::from_secs(self.config.general.shutdown_grace_seconds)
    }
}

impl Drop for LogMonitor {
    fn drop(&mut self) {
        self.stop();
    }
}
