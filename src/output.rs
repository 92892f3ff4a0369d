// ABOUTME: Output formatting for CLI feedback.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use serde::Serialize;
use std::time::Instant;

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    Normal,
    /// Minimal output for CI (only final result)
    Quiet,
    /// JSON lines for scripting
    Json,
}

/// Handles CLI output based on the configured mode.
pub struct Output {
    mode: OutputMode,
    start_time: Option<Instant>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self {
            mode,
            start_time: None,
        }
    }

    /// Start timing an operation.
    pub fn start_timer(&mut self) {
        self.start_time = Some(Instant::now());
    }

    fn elapsed_secs(&self) -> Option<f64> {
        self.start_time.map(|t| t.elapsed().as_secs_f64())
    }

    /// Print a progress message (suppressed in quiet/json mode).
    pub fn progress(&self, message: &str) {
        if self.mode == OutputMode::Normal {
            println!("{message}");
        }
    }

    /// Print a success message with timing when a timer is running.
    pub fn success(&self, message: &str) {
        match (self.mode, self.elapsed_secs()) {
            (OutputMode::Normal, Some(elapsed)) => println!("{message} ({elapsed:.1}s)"),
            (OutputMode::Normal | OutputMode::Quiet, _) => println!("{message}"),
            (OutputMode::Json, _) => self.emit(false, "success", message),
        }
    }

    /// Print a non-fatal warning (suppressed in quiet mode).
    pub fn warning(&self, message: &str) {
        match self.mode {
            OutputMode::Normal => eprintln!("Warning: {message}"),
            OutputMode::Quiet => {}
            OutputMode::Json => self.emit(true, "warning", message),
        }
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        match self.mode {
            OutputMode::Normal | OutputMode::Quiet => eprintln!("Error: {message}"),
            OutputMode::Json => self.emit(true, "error", message),
        }
    }

    fn emit(&self, to_stderr: bool, event: &str, message: &str) {
        let event = JsonEvent {
            event,
            message,
            duration_secs: self.elapsed_secs(),
        };
        if let Ok(json) = serde_json::to_string(&event) {
            if to_stderr {
                eprintln!("{json}");
            } else {
                println!("{json}");
            }
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    duration_secs: Option<f64>,
}
