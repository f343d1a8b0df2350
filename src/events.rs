// ABOUTME: Structured event reporting for pipeline runs.
// ABOUTME: Defines the EventLogger seam plus tracing-backed and in-memory implementations.

use parking_lot::Mutex;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Severity of a pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Success,
    Failure,
    Info,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Success => "success",
            Severity::Failure => "failure",
            Severity::Info => "info",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key/value details attached to an event.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EventContext(BTreeMap<String, String>);

impl EventContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.0.insert(key.into(), value.to_string());
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl ToString) {
        self.0.insert(key.into(), value.to_string());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &String)> {
        self.0.iter()
    }
}

/// Sink for pipeline events.
///
/// Implementations must not fail the caller: a sink that cannot deliver an
/// event swallows the problem.
pub trait EventLogger: Send + Sync {
    fn event(&self, severity: Severity, message: &str, context: &EventContext);

    fn info(&self, message: &str, context: &EventContext) {
        self.event(Severity::Info, message, context);
    }

    fn success(&self, message: &str, context: &EventContext) {
        self.event(Severity::Success, message, context);
    }

    fn failure(&self, message: &str, context: &EventContext) {
        self.event(Severity::Failure, message, context);
    }
}

/// Forwards events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl EventLogger for TracingLogger {
    fn event(&self, severity: Severity, message: &str, context: &EventContext) {
        let context = format!("{:?}", context.0);
        match severity {
            Severity::Failure => tracing::error!(%context, "{message}"),
            Severity::Success | Severity::Info => tracing::info!(%severity, %context, "{message}"),
        }
    }
}

/// A recorded event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub severity: Severity,
    pub message: String,
    pub context: EventContext,
}

/// Keeps every event in memory. Used by tests and by callers that want to
/// inspect what a run reported.
#[derive(Debug, Default)]
pub struct MemoryLogger {
    events: Mutex<Vec<Event>>,
}

impl MemoryLogger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().clone()
    }

    pub fn with_severity(&self, severity: Severity) -> Vec<Event> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.severity == severity)
            .cloned()
            .collect()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.events.lock().iter().any(|e| e.message.contains(needle))
    }
}

impl EventLogger for MemoryLogger {
    fn event(&self, severity: Severity, message: &str, context: &EventContext) {
        self.events.lock().push(Event {
            severity,
            message: message.to_string(),
            context: context.clone(),
        });
    }
}

/// Fans one event out to several sinks.
pub struct Tee<'a> {
    sinks: Vec<&'a dyn EventLogger>,
}

impl<'a> Tee<'a> {
    pub fn new(sinks: Vec<&'a dyn EventLogger>) -> Self {
        Self { sinks }
    }
}

impl EventLogger for Tee<'_> {
    fn event(&self, severity: Severity, message: &str, context: &EventContext) {
        for sink in &self.sinks {
            sink.event(severity, message, context);
        }
    }
}
