// ABOUTME: Output formatting for CLI feedback on pipeline events.
// ABOUTME: Supports normal, quiet (CI), and JSON-lines output modes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::io::{self, Write};
use std::time::Instant;

use crate::diagnostics::Warning;
use crate::events::{EventContext, EventLogger, Severity, TracingLogger};

/// Output mode for CLI feedback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Human-friendly output with progress messages
    #[default]
    Normal,
    /// Only failures and the final result
    Quiet,
    /// JSON lines for scripting
    Json,
}

type Sink = Box<dyn Write + Send>;

#[derive(Default)]
struct Dropped {
    count: usize,
    first: Option<String>,
}

/// Writes pipeline events to the terminal according to the configured mode.
///
/// A write that fails (closed pipe, full disk) never panics: the line goes to
/// the tracing log instead and [`fallback_warning`](Self::fallback_warning)
/// reports it afterwards.
pub struct Output {
    mode: OutputMode,
    start_time: Instant,
    host: String,
    out: Mutex<Sink>,
    err: Mutex<Sink>,
    dropped: Mutex<Dropped>,
}

impl Output {
    pub fn new(mode: OutputMode) -> Self {
        Self::with_writers(mode, Box::new(io::stdout()), Box::new(io::stderr()))
    }

    /// Output to arbitrary writers instead of stdout/stderr.
    pub fn with_writers(mode: OutputMode, out: Sink, err: Sink) -> Self {
        Self {
            mode,
            start_time: Instant::now(),
            host: gethostname::gethostname().to_string_lossy().into_owned(),
            out: Mutex::new(out),
            err: Mutex::new(err),
            dropped: Mutex::new(Dropped::default()),
        }
    }

    pub fn mode(&self) -> OutputMode {
        self.mode
    }

    /// Seconds since this output was created.
    pub fn elapsed_secs(&self) -> f64 {
        self.start_time.elapsed().as_secs_f64()
    }

    /// Write a line to the standard stream. Returns false if it was dropped.
    pub fn line(&self, text: &str) -> bool {
        self.write(&self.out, text)
    }

    /// Write a line to the error stream. Returns false if it was dropped.
    pub fn error_line(&self, text: &str) -> bool {
        self.write(&self.err, text)
    }

    fn write(&self, sink: &Mutex<Sink>, text: &str) -> bool {
        let mut sink = sink.lock();
        match writeln!(sink, "{text}").and_then(|_| sink.flush()) {
            Ok(()) => true,
            Err(e) => {
                let mut dropped = self.dropped.lock();
                dropped.count += 1;
                dropped.first.get_or_insert_with(|| e.to_string());
                false
            }
        }
    }

    /// A warning describing lines that could not be written, if any.
    pub fn fallback_warning(&self) -> Option<Warning> {
        let dropped = self.dropped.lock();
        let first = dropped.first.as_deref()?;
        Some(Warning::logger(format!(
            "{} output line(s) could not be written ({}); events were sent to the log",
            dropped.count, first
        )))
    }

    fn render_human(&self, severity: Severity, message: &str, context: &EventContext) -> String {
        let marker = match severity {
            Severity::Success => "✓",
            Severity::Failure => "✗",
            Severity::Info => "→",
        };
        let mut line = format!("{marker} {message}");
        if let Some(stage) = context.get("stage") {
            line = format!("{marker} [{stage}] {message}");
        }
        if severity == Severity::Success {
            line.push_str(&format!(" ({:.1}s)", self.elapsed_secs()));
        }
        line
    }
}

impl EventLogger for Output {
    fn event(&self, severity: Severity, message: &str, context: &EventContext) {
        let written = match (self.mode, severity) {
            (OutputMode::Json, _) => {
                let event = JsonEvent {
                    event: severity,
                    message,
                    context,
                    host: &self.host,
                    timestamp: Utc::now(),
                    elapsed_secs: self.elapsed_secs(),
                };
                // Serialization failure drops the line instead of failing the run.
                match serde_json::to_string(&event) {
                    Ok(json) => self.line(&json),
                    Err(_) => true,
                }
            }
            (_, Severity::Failure) => {
                self.error_line(&self.render_human(severity, message, context))
            }
            (OutputMode::Quiet, Severity::Info) => true,
            (_, _) => self.line(&self.render_human(severity, message, context)),
        };
        if !written {
            TracingLogger.event(severity, message, context);
        }
    }
}

#[derive(Serialize)]
struct JsonEvent<'a> {
    event: Severity,
    message: &'a str,
    #[serde(skip_serializing_if = "EventContext::is_empty")]
    context: &'a EventContext,
    host: &'a str,
    timestamp: DateTime<Utc>,
    elapsed_secs: f64,
}
