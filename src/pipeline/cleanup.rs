// ABOUTME: Scoped cleanup registry bound to one pipeline run.
// ABOUTME: Steps register release actions; the runner drains them in reverse on every exit path.

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::panic::AssertUnwindSafe;

use crate::diagnostics::{Diagnostics, Warning};

type Action = Box<dyn FnOnce() -> BoxFuture<'static, Result<(), String>> + Send>;

struct Entry {
    description: String,
    only_on_failure: bool,
    warning: fn(String) -> Warning,
    action: Action,
}

/// Release actions for resources created during a run.
///
/// Actions must tolerate the resource already being gone.
#[derive(Default)]
pub struct CleanupRegistry {
    entries: Mutex<Vec<Entry>>,
}

impl CleanupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `action` when the pipeline finishes, however it finishes.
    pub fn register<F, Fut, E>(&self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        self.push(description.into(), false, |m| Warning::cleanup(m), action);
    }

    /// Close a remote session when the pipeline finishes.
    ///
    /// A failed close is reported as a disconnect warning.
    pub fn register_disconnect<F, Fut, E>(&self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        self.push(description.into(), false, |m| Warning::disconnect(m), action);
    }

    /// Run `action` only if the pipeline fails.
    pub fn register_on_failure<F, Fut, E>(&self, description: impl Into<String>, action: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        self.push(description.into(), true, |m| Warning::cleanup(m), action);
    }

    fn push<F, Fut, E>(
        &self,
        description: String,
        only_on_failure: bool,
        warning: fn(String) -> Warning,
        action: F,
    )
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display,
    {
        tracing::debug!("Registered cleanup: {}", description);
        let action: Action =
            Box::new(move || async move { action().await.map_err(|e| e.to_string()) }.boxed());
        self.entries.lock().push(Entry {
            description,
            only_on_failure,
            warning,
            action,
        });
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    /// Run every registered action, newest first.
    ///
    /// Failures and panics become warnings; draining never fails.
    pub async fn drain(&self, failed: bool, diagnostics: &mut Diagnostics) {
        let entries = std::mem::take(&mut *self.entries.lock());

        for entry in entries.into_iter().rev() {
            if entry.only_on_failure && !failed {
                continue;
            }
            tracing::debug!("Cleanup: {}", entry.description);
            match AssertUnwindSafe((entry.action)()).catch_unwind().await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    diagnostics.warn((entry.warning)(format!("{}: {}", entry.description, e)))
                }
                Err(_) => diagnostics.warn((entry.warning)(format!(
                    "{}: cleanup panicked",
                    entry.description
                ))),
            }
        }
    }
}

impl Drop for CleanupRegistry {
    fn drop(&mut self) {
        let entries = self.entries.get_mut();
        if !entries.is_empty() {
            let pending: Vec<&str> = entries.iter().map(|e| e.description.as_str()).collect();
            tracing::warn!("Cleanup actions never ran: {}", pending.join(", "));
        }
    }
}
