//! Audit sinks backed by `tracing`.

use crate::application::ports::AuditSink;
use crate::domain::audit::{AuditEvent, Severity};

/// Target every audit record is emitted on.
pub const AUDIT_TARGET: &str = "portal_guard::audit";

/// Writes each audit record as one `tracing` event on [`AUDIT_TARGET`].
///
/// The level follows the event severity. The full record travels as the
/// `record` field in JSON form, so any JSON formatter downstream keeps it
/// machine-readable.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, event: &AuditEvent) {
        let record = event.to_json();
        let event_type = event.event_type().as_str();
        let action = event.action();
        match event.severity() {
            Severity::Info => {
                tracing::info!(target: "portal_guard::audit", event_type, action, record = %record, "audit")
            }
            Severity::Warning => {
                tracing::warn!(target: "portal_guard::audit", event_type, action, record = %record, "audit")
            }
            Severity::Critical => {
                tracing::error!(target: "portal_guard::audit", event_type, action, record = %record, "audit")
            }
        }
    }
}

/// Sink that discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopAuditSink;

impl AuditSink for NoopAuditSink {
    fn record(&self, _event: &AuditEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::audit::{AuditEventType, Outcome};
    use crate::infrastructure::mocks::MockCaptureLayer;
    use tracing::Level;
    use tracing_subscriber::layer::SubscriberExt;

    #[test]
    fn test_level_follows_severity() {
        let capture = MockCaptureLayer::new();
        let subscriber = tracing_subscriber::registry().with(capture.clone());

        tracing::subscriber::with_default(subscriber, || {
            let sink = TracingAuditSink;
            sink.record(
                &AuditEvent::builder(AuditEventType::AuthLoginSuccess, "login", Outcome::Success)
                    .build(),
            );
            sink.record(
                &AuditEvent::builder(AuditEventType::AuthLoginFailure, "login", Outcome::Failure)
                    .build(),
            );
            sink.record(
                &AuditEvent::builder(
                    AuditEventType::SecuritySuspiciousActivity,
                    "account_locked",
                    Outcome::Failure,
                )
                .build(),
            );
        });

        let events = capture.for_target(AUDIT_TARGET);
        let levels: Vec<Level> = events.iter().map(|e| e.level).collect();
        assert_eq!(levels, vec![Level::INFO, Level::WARN, Level::ERROR]);
        assert_eq!(events[0].field("event_type"), Some("AUTH_LOGIN_SUCCESS"));
        assert!(events[2]
            .field("record")
            .unwrap()
            .contains("\"event_type\":\"SECURITY_SUSPICIOUS_ACTIVITY\""));
    }
}
