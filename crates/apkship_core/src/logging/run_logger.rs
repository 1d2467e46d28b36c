//! Per-run logger.
//!
//! Each pipeline run gets a logger that:
//! - Emits every message as a `tracing` event (the persisted, timestamped sink)
//! - Sends formatted lines to an observer callback (if provided)
//! - Keeps a bounded tail of external tool output for error diagnosis

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, LogObserver, MessagePrefix};
use crate::orchestrator::ContextSummary;

/// Logger shared by the engine, the stages and the tool runner of one run.
pub struct RunLogger {
    /// Run name for identification (usually the target slug).
    run_name: String,
    /// Observer receiving formatted lines. Called without any lock held, so
    /// it may log through this same logger.
    observer: Option<Arc<dyn Fn(LogLevel, &str) + Send + Sync>>,
    /// Logging configuration.
    config: LogConfig,
    /// Tail buffer for recent tool output lines.
    tail_buffer: Mutex<VecDeque<String>>,
}

impl RunLogger {
    /// Create a new run logger.
    pub fn new(run_name: impl Into<String>, config: LogConfig, observer: Option<LogObserver>) -> Self {
        let config = LogConfig {
            error_tail: config.error_tail.max(1),
            ..config
        };
        Self {
            run_name: run_name.into(),
            observer: observer.map(Arc::from),
            tail_buffer: Mutex::new(VecDeque::with_capacity(config.error_tail)),
            config,
        }
    }

    /// Logger with default configuration and no observer.
    pub fn quiet(run_name: impl Into<String>) -> Arc<Self> {
        Arc::new(Self::new(run_name, LogConfig::default(), None))
    }

    /// Get the run name.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Log a message at the specified level.
    pub fn log(&self, level: LogLevel, message: &str) {
        emit(level, &self.run_name, message);

        if level < self.config.level {
            return;
        }
        self.notify(level, message);
    }

    /// Log an info message.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message.
    pub fn debug(&self, message: &str) {
        self.log(LogLevel::Debug, message);
    }

    /// Log a warning message.
    pub fn warn(&self, message: &str) {
        self.log(LogLevel::Warn, &MessagePrefix::Warning.format(message));
    }

    /// Log an error message.
    pub fn error(&self, message: &str) {
        self.log(LogLevel::Error, &MessagePrefix::Error.format(message));
    }

    /// Log a command being executed. Secrets must already be masked.
    pub fn command(&self, command: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Command.format(command));
    }

    /// Log a success message.
    pub fn success(&self, message: &str) {
        self.log(LogLevel::Info, &MessagePrefix::Success.format(message));
    }

    /// Log entry into a stage together with the context it receives.
    pub fn stage_started(&self, stage: &str, summary: &ContextSummary) {
        tracing::info!(
            run = %self.run_name,
            stage,
            version = summary.version.as_deref().unwrap_or("-"),
            artifact = summary.artifact.as_deref().unwrap_or("-"),
            changelog_entries = summary.changelog_entries,
            "entering stage"
        );
        self.notify(
            LogLevel::Info,
            &format!("{} {}", MessagePrefix::Stage.format(stage), summary),
        );
    }

    /// Log successful completion of a stage.
    pub fn stage_completed(&self, stage: &str, elapsed: Duration) {
        let elapsed_ms = elapsed.as_millis() as u64;
        tracing::info!(run = %self.run_name, stage, elapsed_ms, "stage completed");
        self.notify(
            LogLevel::Info,
            &MessagePrefix::Success.format(&format!("{} completed in {} ms", stage, elapsed_ms)),
        );
    }

    /// Log a stage failure at error severity.
    pub fn stage_failed(&self, stage: &str, cause: &dyn std::fmt::Display) {
        tracing::error!(run = %self.run_name, stage, cause = %cause, "stage failed");
        self.notify(
            LogLevel::Error,
            &MessagePrefix::Error.format(&format!("Pipeline failed at stage '{}': {}", stage, cause)),
        );
    }

    /// Log command output line (stdout/stderr from external tools).
    ///
    /// Lines always go to the tail buffer; they are echoed only when
    /// `echo_tool_output` is set.
    pub fn output_line(&self, line: &str, is_stderr: bool) {
        {
            let mut buffer = self.tail_buffer.lock();
            if buffer.len() >= self.config.error_tail {
                buffer.pop_front();
            }
            buffer.push_back(line.to_string());
        }

        tracing::trace!(run = %self.run_name, stderr = is_stderr, "{}", line);

        if !self.config.echo_tool_output {
            return;
        }

        let prefix = if is_stderr { "[stderr] " } else { "" };
        self.notify(LogLevel::Debug, &format!("{}{}", prefix, line));
    }

    /// Replay the tail buffer (typically after a tool failure).
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.log(LogLevel::Warn, &format!("[{}/tail]", header));
        for line in lines {
            self.log(LogLevel::Warn, &line);
        }
    }

    /// Clear the tail buffer.
    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    /// Get the current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    fn notify(&self, level: LogLevel, message: &str) {
        if level < self.config.level {
            return;
        }
        if let Some(observer) = &self.observer {
            observer(level, &self.format_message(message));
        }
    }

    /// Format a message with timestamp (if enabled).
    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }
}

fn emit(level: LogLevel, run: &str, message: &str) {
    match level {
        LogLevel::Trace => tracing::trace!(run = %run, "{}", message),
        LogLevel::Debug => tracing::debug!(run = %run, "{}", message),
        LogLevel::Info => tracing::info!(run = %run, "{}", message),
        LogLevel::Warn => tracing::warn!(run = %run, "{}", message),
        LogLevel::Error => tracing::error!(run = %run, "{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn collecting_logger(config: LogConfig) -> (RunLogger, Arc<Mutex<Vec<String>>>) {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let observer: LogObserver = Box::new(move |_level, msg| sink.lock().push(msg.to_string()));
        (RunLogger::new("test_run", config, Some(observer)), lines)
    }

    #[test]
    fn observer_may_log_through_same_logger() {
        use std::sync::{OnceLock, Weak};

        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&lines);
        let slot: Arc<OnceLock<Weak<RunLogger>>> = Arc::new(OnceLock::new());
        let reentry = Arc::clone(&slot);
        let observer: LogObserver = Box::new(move |_level, msg| {
            sink.lock().push(msg.to_string());
            if msg == "outer" {
                if let Some(logger) = reentry.get().and_then(Weak::upgrade) {
                    logger.info("inner");
                }
            }
        });
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let logger = Arc::new(RunLogger::new("test_run", config, Some(observer)));
        slot.set(Arc::downgrade(&logger)).unwrap();

        logger.info("outer");

        assert_eq!(*lines.lock(), vec!["outer".to_string(), "inner".to_string()]);
    }

    #[test]
    fn calls_observer() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let observer: LogObserver = Box::new(move |_level, _msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger = RunLogger::new("test_run", LogConfig::default(), Some(observer));

        logger.info("Message 1");
        logger.info("Message 2");
        logger.debug("filtered at info level");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn stage_lines_name_the_stage() {
        let config = LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        };
        let (logger, lines) = collecting_logger(config);

        let summary = ContextSummary {
            version: Some("1.0".to_string()),
            artifact: None,
            changelog_entries: 0,
            release_url: None,
        };
        logger.stage_started("decompile", &summary);
        logger.stage_failed("decompile", &"apktool exited with 1");

        let lines = lines.lock();
        assert!(lines[0].starts_with("=== decompile ==="));
        assert!(lines[0].contains("version=1.0"));
        assert_eq!(
            lines[1],
            "[ERROR] Pipeline failed at stage 'decompile': apktool exited with 1"
        );
    }

    #[test]
    fn timestamps_prefix_lines() {
        let (logger, lines) = collecting_logger(LogConfig::default());
        logger.info("hello");
        let line = lines.lock()[0].clone();
        assert!(line.starts_with('['));
        assert!(line.ends_with("] hello"));
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let mut config = LogConfig::default();
        config.error_tail = 5;

        let logger = RunLogger::new("test_run", config, None);

        for i in 0..10 {
            logger.output_line(&format!("Line {}", i), false);
        }

        let tail = logger.get_tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");

        logger.clear_tail();
        assert!(logger.get_tail().is_empty());
    }

    #[test]
    fn tool_output_not_echoed_by_default() {
        let (logger, lines) = collecting_logger(LogConfig::default());
        logger.output_line("I: Using Apktool", false);
        assert!(lines.lock().is_empty());

        logger.show_tail("apktool");
        let lines = lines.lock();
        assert_eq!(lines.len(), 2);
        assert!(lines[1].contains("I: Using Apktool"));
    }
}
