//! Audit logging.
//!
//! [`AuditLogger`] always writes to its primary sink (structured `tracing`
//! output by default) and, when configured, forwards a pseudonymized copy to
//! an external sink. A failing sink never reaches the caller: panics are
//! caught, counted and logged.

use crate::application::metrics::Metrics;
use crate::application::ports::AuditSink;
use crate::domain::audit::{AuditEvent, AuditEventBuilder, AuditEventType, Outcome};
use crate::domain::error::ErrorCode;
use crate::domain::sanitize::mask_prefix;
use crate::infrastructure::audit_sink::TracingAuditSink;
use serde_json::{Map, Value};
use std::fmt;
use std::panic;
use std::sync::Arc;

/// Fire-and-forget audit logger.
#[derive(Clone)]
pub struct AuditLogger {
    primary: Arc<dyn AuditSink>,
    external: Option<Arc<dyn AuditSink>>,
    metrics: Metrics,
}

impl fmt::Debug for AuditLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuditLogger")
            .field("primary", &self.primary)
            .field("external", &self.external)
            .finish_non_exhaustive()
    }
}

impl Default for AuditLogger {
    fn default() -> Self {
        Self::new()
    }
}

impl AuditLogger {
    /// Logger that writes to `tracing` only.
    pub fn new() -> Self {
        Self {
            primary: Arc::new(TracingAuditSink),
            external: None,
            metrics: Metrics::new(),
        }
    }

    /// Replace the always-on sink.
    pub fn with_primary_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.primary = sink;
        self
    }

    /// Also forward pseudonymized events to `sink`.
    pub fn with_external_sink(mut self, sink: Arc<dyn AuditSink>) -> Self {
        self.external = Some(sink);
        self
    }

    pub fn with_metrics(mut self, metrics: Metrics) -> Self {
        self.metrics = metrics;
        self
    }

    /// Record one event. Never fails and never panics.
    pub fn log(&self, event: &AuditEvent) {
        self.metrics.record_audit_event();
        self.dispatch(self.primary.as_ref(), event);
        if let Some(external) = &self.external {
            self.dispatch(external.as_ref(), &event.pseudonymized());
        }
    }

    fn dispatch(&self, sink: &dyn AuditSink, event: &AuditEvent) {
        let result = panic::catch_unwind(panic::AssertUnwindSafe(|| sink.record(event)));
        if result.is_err() {
            self.metrics.record_sink_failure();
            tracing::warn!(
                event_type = event.event_type().as_str(),
                "Audit sink failed, event dropped"
            );
        }
    }

    /// Logger bound to one request's user, IP address and user agent.
    pub fn scoped(
        &self,
        user_id: Option<&str>,
        ip_address: Option<&str>,
        user_agent: Option<&str>,
    ) -> ScopedAuditLogger {
        ScopedAuditLogger {
            logger: self.clone(),
            user_id: user_id.map(str::to_string),
            ip_address: ip_address.map(str::to_string),
            user_agent: user_agent.map(str::to_string),
        }
    }

    pub fn login_success(&self, user_id: &str, ip_address: Option<&str>) {
        self.log(
            &AuditEvent::builder(AuditEventType::AuthLoginSuccess, "User logged in", Outcome::Success)
                .user_id(user_id)
                .ip_address(ip_address)
                .build(),
        );
    }

    /// The email is reduced to its first three characters.
    pub fn login_failure(&self, email: &str, reason: &str, ip_address: Option<&str>) {
        self.log(
            &AuditEvent::builder(
                AuditEventType::AuthLoginFailure,
                "Login attempt failed",
                Outcome::Failure,
            )
            .error_message(reason)
            .ip_address(ip_address)
            .meta("account", mask_prefix(email, 3))
            .build(),
        );
    }

    /// The identifier is reduced to its first five characters.
    pub fn rate_limited(&self, identifier: &str, endpoint: &str, ip_address: Option<&str>) {
        self.log(
            &AuditEvent::builder(
                AuditEventType::AuthRateLimited,
                format!("Rate limit exceeded on {}", endpoint),
                Outcome::Failure,
            )
            .ip_address(ip_address)
            .meta("identifier", mask_prefix(identifier, 5))
            .meta("endpoint", endpoint)
            .build(),
        );
    }

    pub fn suspicious_activity(
        &self,
        description: &str,
        user_id: Option<&str>,
        metadata: Map<String, Value>,
    ) {
        self.log(
            &AuditEvent::builder(
                AuditEventType::SecuritySuspiciousActivity,
                description,
                Outcome::Failure,
            )
            .maybe_user_id(user_id)
            .metadata(metadata)
            .build(),
        );
    }

    pub fn unauthorized_access(&self, user_id: &str, target: &str, ip_address: Option<&str>) {
        self.log(
            &AuditEvent::builder(
                AuditEventType::SecurityUnauthorizedAccess,
                format!("Unauthorized access attempt to {}", target),
                Outcome::Failure,
            )
            .user_id(user_id)
            .ip_address(ip_address)
            .build(),
        );
    }

    pub fn validation_failure(
        &self,
        action: &str,
        field: &str,
        code: ErrorCode,
        ip_address: Option<&str>,
    ) {
        self.log(
            &AuditEvent::builder(
                AuditEventType::SecurityValidationFailure,
                format!("Validation failed on {}", action),
                Outcome::Failure,
            )
            .ip_address(ip_address)
            .meta("field", field)
            .meta("code", code.as_str())
            .build(),
        );
    }
}

/// Optional parts of an audit event.
#[derive(Debug, Clone, Default)]
pub struct AuditDetails {
    pub target_id: Option<String>,
    pub metadata: Map<String, Value>,
    pub error_message: Option<String>,
}

/// Audit logger with pre-filled request context.
#[derive(Debug, Clone)]
pub struct ScopedAuditLogger {
    logger: AuditLogger,
    user_id: Option<String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

impl ScopedAuditLogger {
    /// Builder pre-filled with this logger's context.
    pub fn event(
        &self,
        event_type: AuditEventType,
        action: impl Into<String>,
        outcome: Outcome,
    ) -> AuditEventBuilder {
        AuditEvent::builder(event_type, action, outcome)
            .maybe_user_id(self.user_id.as_deref())
            .ip_address(self.ip_address.as_deref())
            .user_agent(self.user_agent.as_deref())
    }

    pub fn log(
        &self,
        event_type: AuditEventType,
        action: impl Into<String>,
        outcome: Outcome,
        details: AuditDetails,
    ) {
        let mut builder = self.event(event_type, action, outcome).metadata(details.metadata);
        if let Some(target_id) = details.target_id {
            builder = builder.target_id(target_id);
        }
        if let Some(message) = details.error_message {
            builder = builder.error_message(message);
        }
        self.logger.log(&builder.build());
    }

    pub fn success(
        &self,
        event_type: AuditEventType,
        action: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        self.log(
            event_type,
            action,
            Outcome::Success,
            AuditDetails {
                metadata,
                ..Default::default()
            },
        );
    }

    pub fn failure(
        &self,
        event_type: AuditEventType,
        action: impl Into<String>,
        error_message: impl Into<String>,
        metadata: Map<String, Value>,
    ) {
        self.log(
            event_type,
            action,
            Outcome::Failure,
            AuditDetails {
                metadata,
                error_message: Some(error_message.into()),
                ..Default::default()
            },
        );
    }
}
