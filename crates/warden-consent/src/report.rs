//! Error channel for recovered failures

use parking_lot::Mutex;
use std::sync::Arc;

/// A recovered failure: where it happened and what went wrong
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    pub context: &'static str,
    pub message: String,
}

pub trait ErrorReporter: Send + Sync {
    fn report(&self, context: &'static str, error: &dyn std::error::Error);
}

/// Logs every report at error level
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingReporter;

impl ErrorReporter for TracingReporter {
    fn report(&self, context: &'static str, error: &dyn std::error::Error) {
        tracing::error!(context = context, error = %error, "Recovered consent failure");
    }
}

/// Keeps reports in memory and forwards them to tracing
#[derive(Debug, Clone, Default)]
pub struct MemoryReporter {
    reports: Arc<Mutex<Vec<Report>>>,
}

impl MemoryReporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reports(&self) -> Vec<Report> {
        self.reports.lock().clone()
    }

    pub fn contexts(&self) -> Vec<&'static str> {
        self.reports.lock().iter().map(|r| r.context).collect()
    }

    pub fn clear(&self) {
        self.reports.lock().clear();
    }
}

impl ErrorReporter for MemoryReporter {
    fn report(&self, context: &'static str, error: &dyn std::error::Error) {
        TracingReporter.report(context, error);
        self.reports.lock().push(Report {
            context,
            message: error.to_string(),
        });
    }
}
