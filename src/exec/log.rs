use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tracing::info;

/// Shared, append-only build log. Every line is forwarded to tracing for
/// live output and accumulated for the final build outcome.
#[derive(Debug, Clone, Default)]
pub struct BuildLog {
    buffer: Arc<Mutex<String>>,
}

impl BuildLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn append(&self, line: &str) {
        info!(target: "appforge::build", "{line}");
        let mut buffer = self.buffer.lock().unwrap_or_else(|e| e.into_inner());
        buffer.push_str(line);
        buffer.push('\n');
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Cooperative cancellation flag, observed at subprocess boundaries and by
/// the orchestrator's watchdog while a child is running.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag {
    cancelled: Arc<AtomicBool>,
}

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}
