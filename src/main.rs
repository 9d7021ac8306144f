use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use logwatch_alert::config::Config;
use logwatch_alert::monitor::LogMonitor;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command-line arguments for the log monitor
#[derive(Parser)]
#[command(
    name = "logwatch-alert",
    about = "Log file monitor with rate-limited email and Slack alerts",
    long_about = "Tails a log file, detects lines matching configured error keywords \
                  and sends rate-limited alerts to email and Slack-compatible webhooks."
)]
struct Cli {
    /// Path to configuration file
    #[arg(
        short,
        long,
        value_name = "FILE",
        help = "Configuration file path (TOML format)"
    )]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(
        short,
        long,
        help = "Enable verbose logging output (sets RUST_LOG=debug)"
    )]
    verbose: bool,

    /// Send a test alert to every configured sink and exit
    #[arg(long, help = "Send a test notification through all sinks and exit")]
    test_notifications: bool,

    /// Override the monitored log file
    #[arg(long, value_name = "PATH", help = "Log file to monitor (overrides config)")]
    log_file: Option<PathBuf>,
}

impl Cli {
    /// Validate the CLI arguments
    ///
    /// # Returns
    ///
    /// `Ok(())` if all arguments are valid, `Err(String)` with error message otherwise
    fn validate(&self) -> Result<(), String> {
        if let Some(ref config_path) = self.config {
            // Missing files fall back to defaults in Config::load
            if config_path.exists() {
                if !config_path.is_file() {
                    return Err(format!(
                        "Configuration path is not a file: {}",
                        config_path.display()
                    ));
                }

                if config_path.extension().map_or(true, |ext| ext != "toml") {
                    warn!(
                        "Configuration file does not have .toml extension: {}",
                        config_path.display()
                    );
                }
            }
        }

        if let Some(ref log_file) = self.log_file {
            if log_file.is_dir() {
                return Err(format!("Log file path is a directory: {}", log_file.display()));
            }
        }

        Ok(())
    }

    /// Load configuration and apply command-line overrides
    fn load_config(&self) -> Result<Config> {
        let mut config = Config::load(self.config.as_deref()).with_context(|| {
            match &self.config {
                Some(path) => format!("Failed to load configuration from {}", path.display()),
                None => "Failed to load default configuration".to_string(),
            }
        })?;

        if let Some(ref log_file) = self.log_file {
            config.general.log_file_path = log_file.clone();
        }
        Ok(config)
    }
}

/// Deliver one synthetic alert; success if any sink accepted it
fn run_test_notifications(monitor: &LogMonitor) -> Result<bool> {
    let result = monitor
        .send_test_notification()
        .context("Failed to send test notification")?;

    if result.degraded {
        warn!("No notification sinks are configured");
    }
    for sink in &result.results {
        match &sink.error {
            None => info!("Test notification via {}: OK", sink.sink),
            Some(detail) => error!("Test notification via {}: FAILED ({})", sink.sink, detail),
        }
    }
    Ok(result.any_succeeded)
}

/// Start monitoring and block until interrupted
fn run_monitor(mut monitor: LogMonitor) -> Result<()> {
    monitor.start().context("Failed to start log monitor")?;

    let shutdown_sender = monitor.shutdown_handle();
    ctrlc::set_handler(move || {
        info!("Received interrupt signal, shutting down gracefully...");
        if let Err(e) = shutdown_sender.send(()) {
            error!("Failed to send shutdown signal: {}", e);
        }
    })
    .context("Failed to install interrupt handler")?;

    info!(
        "Log monitor is running on {}. Press Ctrl+C to stop.",
        monitor.log_file_path().display()
    );
    monitor.wait_for_shutdown(monitor.heartbeat());
    monitor.stop();

    let stats = monitor.stats();
    info!(
        "Shutdown complete: {} lines processed, {} errors detected, {} notifications sent",
        stats.lines_processed, stats.errors_detected, stats.notifications_dispatched
    );
    Ok(())
}

fn run(cli: &Cli) -> Result<ExitCode> {
    let config = cli.load_config()?;
    let monitor = LogMonitor::new(config).context("Failed to initialize log monitor")?;

    if cli.test_notifications {
        return Ok(if run_test_notifications(&monitor)? {
            ExitCode::SUCCESS
        } else {
            ExitCode::FAILURE
        });
    }

    run_monitor(monitor)?;
    Ok(ExitCode::SUCCESS)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    if cli.verbose {
        std::env::set_var("RUST_LOG", "debug");
    }
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    info!("Starting log monitor");

    if let Err(e) = cli.validate() {
        error!("Invalid arguments: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&cli) {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}
