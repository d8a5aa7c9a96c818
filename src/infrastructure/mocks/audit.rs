//! In-memory audit sink for tests.

use crate::application::ports::AuditSink;
use crate::domain::audit::{AuditEvent, AuditEventType};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

/// Sink that keeps every event it receives.
///
/// Clones share the same buffer. [`MemoryAuditSink::failing`] builds a sink
/// that panics on every call, for exercising the logger's isolation.
#[derive(Debug, Clone, Default)]
pub struct MemoryAuditSink {
    events: Arc<Mutex<Vec<AuditEvent>>>,
    fail: Arc<AtomicBool>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sink that panics whenever it is called.
    pub fn failing() -> Self {
        let sink = Self::default();
        sink.fail.store(true, Ordering::Relaxed);
        sink
    }

    /// Everything recorded so far.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.lock().clone()
    }

    /// Recorded events of one type.
    pub fn of_type(&self, event_type: AuditEventType) -> Vec<AuditEvent> {
        self.lock()
            .iter()
            .filter(|event| event.event_type() == event_type)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<AuditEvent>> {
        self.events
            .lock()
            .expect("MemoryAuditSink mutex poisoned - a test thread panicked while holding the lock")
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, event: &AuditEvent) {
        if self.fail.load(Ordering::Relaxed) {
            panic!("audit sink unavailable");
        }
        self.lock().push(event.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::Outcome;

    #[test]
    fn test_memory_sink_records() {
        let sink = MemoryAuditSink::new();
        let event = AuditEvent::builder(AuditEventType::AuthLogout, "logout", Outcome::Success).build();

        sink.record(&event);

        assert_eq!(sink.len(), 1);
        assert_eq!(sink.of_type(AuditEventType::AuthLogout).len(), 1);
        assert!(sink.of_type(AuditEventType::AuthSignup).is_empty());
    }
}
