//! Audit event model and PII redaction.
//!
//! An [`AuditEvent`] is redacted when it is built: sensitive metadata keys are
//! replaced, long strings are cut and error messages lose emails, UUIDs and
//! token-like runs. Sinks therefore only ever see redacted records.

use crate::domain::sanitize::mask_value;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::LazyLock;

/// Substrings that mark a metadata key as sensitive (matched case-insensitively).
pub const SENSITIVE_KEYS: [&str; 14] = [
    "password",
    "token",
    "secret",
    "apikey",
    "api_key",
    "authorization",
    "cookie",
    "session",
    "creditcard",
    "credit_card",
    "ssn",
    "email",
    "phone",
    "address",
];

/// Replacement for sensitive values.
pub const REDACTED: &str = "[REDACTED]";

const MAX_REDACTION_DEPTH: usize = 10;
const MAX_ARRAY_ITEMS: usize = 20;
const MAX_STRING_LEN: usize = 100;
const TRUNCATION_SUFFIX: &str = "...[truncated]";
const HASHED_ID_LEN: usize = 12;

static EMAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}").expect("email pattern is valid")
});
static TOKEN_LIKE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b[a-zA-Z0-9]{32,}\b").expect("token pattern is valid"));
static ANY_UUID: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}")
        .expect("uuid pattern is valid")
});

/// Kind of security-relevant action being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuditEventType {
    AuthLoginSuccess,
    AuthLoginFailure,
    AuthLogout,
    AuthSignup,
    AuthPasswordChange,
    AuthEmailChange,
    AuthAccountDelete,
    AuthRateLimited,
    AuthPasswordResetRequest,
    AuthPasswordResetComplete,
    ProfileUpdate,
    ProfileView,
    AvatarUpload,
    AvatarDelete,
    DataExport,
    DataDelete,
    SecuritySuspiciousActivity,
    SecurityValidationFailure,
    SecurityUnauthorizedAccess,
    TeaTimeSettingChange,
    TeaTimeMatchUpdate,
    RoomPhotoUpload,
    RoomPhotoDelete,
    WifiCreate,
    WifiUpdate,
    WifiDelete,
    GarbageScheduleCreate,
    GarbageScheduleUpdate,
    GarbageScheduleDelete,
    GarbageDutyAssign,
    GarbageDutyComplete,
    GarbageRotationGenerate,
}

impl AuditEventType {
    /// Stable identifier, e.g. `AUTH_LOGIN_FAILURE`.
    pub fn as_str(&self) -> &'static str {
        use AuditEventType::*;
        match self {
            AuthLoginSuccess => "AUTH_LOGIN_SUCCESS",
            AuthLoginFailure => "AUTH_LOGIN_FAILURE",
            AuthLogout => "AUTH_LOGOUT",
            AuthSignup => "AUTH_SIGNUP",
            AuthPasswordChange => "AUTH_PASSWORD_CHANGE",
            AuthEmailChange => "AUTH_EMAIL_CHANGE",
            AuthAccountDelete => "AUTH_ACCOUNT_DELETE",
            AuthRateLimited => "AUTH_RATE_LIMITED",
            AuthPasswordResetRequest => "AUTH_PASSWORD_RESET_REQUEST",
            AuthPasswordResetComplete => "AUTH_PASSWORD_RESET_COMPLETE",
            ProfileUpdate => "PROFILE_UPDATE",
            ProfileView => "PROFILE_VIEW",
            AvatarUpload => "AVATAR_UPLOAD",
            AvatarDelete => "AVATAR_DELETE",
            DataExport => "DATA_EXPORT",
            DataDelete => "DATA_DELETE",
            SecuritySuspiciousActivity => "SECURITY_SUSPICIOUS_ACTIVITY",
            SecurityValidationFailure => "SECURITY_VALIDATION_FAILURE",
            SecurityUnauthorizedAccess => "SECURITY_UNAUTHORIZED_ACCESS",
            TeaTimeSettingChange => "TEA_TIME_SETTING_CHANGE",
            TeaTimeMatchUpdate => "TEA_TIME_MATCH_UPDATE",
            RoomPhotoUpload => "ROOM_PHOTO_UPLOAD",
            RoomPhotoDelete => "ROOM_PHOTO_DELETE",
            WifiCreate => "WIFI_CREATE",
            WifiUpdate => "WIFI_UPDATE",
            WifiDelete => "WIFI_DELETE",
            GarbageScheduleCreate => "GARBAGE_SCHEDULE_CREATE",
            GarbageScheduleUpdate => "GARBAGE_SCHEDULE_UPDATE",
            GarbageScheduleDelete => "GARBAGE_SCHEDULE_DELETE",
            GarbageDutyAssign => "GARBAGE_DUTY_ASSIGN",
            GarbageDutyComplete => "GARBAGE_DUTY_COMPLETE",
            GarbageRotationGenerate => "GARBAGE_ROTATION_GENERATE",
        }
    }

    /// Fixed severity for this event type.
    pub fn severity(&self) -> Severity {
        use AuditEventType::*;
        match self {
            AuthAccountDelete | SecuritySuspiciousActivity | SecurityUnauthorizedAccess => {
                Severity::Critical
            }
            AuthLoginFailure
            | AuthPasswordChange
            | AuthEmailChange
            | AuthRateLimited
            | AuthPasswordResetComplete
            | DataExport
            | DataDelete
            | SecurityValidationFailure
            | WifiDelete
            | GarbageScheduleDelete
            | GarbageRotationGenerate => Severity::Warning,
            _ => Severity::Info,
        }
    }
}

impl fmt::Display for AuditEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How urgently an audit event needs attention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Info,
    Warning,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Warning => "WARNING",
            Severity::Critical => "CRITICAL",
        }
    }
}

/// Result of the audited action.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure,
}

/// Immutable, already-redacted audit record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEvent {
    timestamp: DateTime<Utc>,
    event_type: AuditEventType,
    severity: Severity,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    target_id: Option<String>,
    action: String,
    outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    ip_address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    user_agent: Option<String>,
    #[serde(skip_serializing_if = "Map::is_empty")]
    metadata: Map<String, Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error_message: Option<String>,
}

impl AuditEvent {
    /// Start building an event.
    pub fn builder(
        event_type: AuditEventType,
        action: impl Into<String>,
        outcome: Outcome,
    ) -> AuditEventBuilder {
        AuditEventBuilder {
            timestamp: None,
            event_type,
            user_id: None,
            target_id: None,
            action: action.into(),
            outcome,
            ip_address: None,
            user_agent: None,
            metadata: Map::new(),
            error_message: None,
        }
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn event_type(&self) -> AuditEventType {
        self.event_type
    }

    pub fn severity(&self) -> Severity {
        self.severity
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn target_id(&self) -> Option<&str> {
        self.target_id.as_deref()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn outcome(&self) -> Outcome {
        self.outcome
    }

    pub fn ip_address(&self) -> Option<&str> {
        self.ip_address.as_deref()
    }

    pub fn user_agent(&self) -> Option<&str> {
        self.user_agent.as_deref()
    }

    pub fn metadata(&self) -> &Map<String, Value> {
        &self.metadata
    }

    pub fn error_message(&self) -> Option<&str> {
        self.error_message.as_deref()
    }

    /// Copy suitable for third-party telemetry: the user id is replaced by a
    /// short SHA-256 digest and the IP address is masked.
    pub fn pseudonymized(&self) -> AuditEvent {
        AuditEvent {
            user_id: self.user_id.as_deref().map(hash_user_id),
            ip_address: self.ip_address.as_deref().map(mask_value),
            ..self.clone()
        }
    }

    /// Single-line JSON form.
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|_| {
            format!(
                "{{\"event_type\":\"{}\",\"serialization\":\"failed\"}}",
                self.event_type
            )
        })
    }
}

/// Builder for [`AuditEvent`]. Redaction runs in [`AuditEventBuilder::build`].
#[derive(Debug, Clone)]
pub struct AuditEventBuilder {
    timestamp: Option<DateTime<Utc>>,
    event_type: AuditEventType,
    user_id: Option<String>,
    target_id: Option<String>,
    action: String,
    outcome: Outcome,
    ip_address: Option<String>,
    user_agent: Option<String>,
    metadata: Map<String, Value>,
    error_message: Option<String>,
}

impl AuditEventBuilder {
    pub fn timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = Some(timestamp);
        self
    }

    pub fn user_id(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn maybe_user_id(mut self, user_id: Option<&str>) -> Self {
        self.user_id = user_id.map(str::to_string);
        self
    }

    pub fn target_id(mut self, target_id: impl Into<String>) -> Self {
        self.target_id = Some(target_id.into());
        self
    }

    pub fn ip_address(mut self, ip: Option<&str>) -> Self {
        self.ip_address = ip.map(str::to_string);
        self
    }

    pub fn user_agent(mut self, user_agent: Option<&str>) -> Self {
        self.user_agent = user_agent.map(str::to_string);
        self
    }

    /// Add one metadata entry.
    pub fn meta(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Merge a metadata map.
    pub fn metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata.extend(metadata);
        self
    }

    pub fn error_message(mut self, message: impl Into<String>) -> Self {
        self.error_message = Some(message.into());
        self
    }

    /// Redact and freeze the event.
    pub fn build(self) -> AuditEvent {
        AuditEvent {
            timestamp: self.timestamp.unwrap_or_else(Utc::now),
            event_type: self.event_type,
            severity: self.event_type.severity(),
            user_id: self.user_id,
            target_id: self.target_id,
            action: self.action,
            outcome: self.outcome,
            ip_address: self.ip_address,
            user_agent: self.user_agent.map(|ua| truncate(&ua)),
            metadata: redact_map(&self.metadata, 0),
            error_message: self.error_message.as_deref().map(redact_error_message),
        }
    }
}

/// Whether a metadata key names sensitive data.
pub fn is_sensitive_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|needle| lower.contains(needle))
}

/// Recursively redact a metadata map.
pub fn redact_metadata(metadata: &Map<String, Value>) -> Map<String, Value> {
    redact_map(metadata, 0)
}

fn redact_map(map: &Map<String, Value>, depth: usize) -> Map<String, Value> {
    if depth >= MAX_REDACTION_DEPTH {
        return depth_exceeded();
    }
    let mut out = Map::new();
    for (key, value) in map {
        let redacted = if is_sensitive_key(key) {
            Value::String(REDACTED.to_string())
        } else {
            redact_value(value, depth)
        };
        out.insert(key.clone(), redacted);
    }
    out
}

fn depth_exceeded() -> Map<String, Value> {
    let mut marker = Map::new();
    marker.insert("[max_depth_exceeded]".to_string(), Value::Bool(true));
    marker
}

fn redact_value(value: &Value, depth: usize) -> Value {
    match value {
        Value::Object(map) => Value::Object(redact_map(map, depth + 1)),
        Value::Array(_) if depth + 1 >= MAX_REDACTION_DEPTH => Value::Object(depth_exceeded()),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .take(MAX_ARRAY_ITEMS)
                .map(|item| redact_value(item, depth + 1))
                .collect(),
        ),
        Value::String(s) => Value::String(truncate(s)),
        other => other.clone(),
    }
}

fn truncate(s: &str) -> String {
    if s.chars().count() > MAX_STRING_LEN {
        let head: String = s.chars().take(MAX_STRING_LEN).collect();
        format!("{}{}", head, TRUNCATION_SUFFIX)
    } else {
        s.to_string()
    }
}

/// Replace emails, token-like runs and UUIDs in free text.
pub fn redact_error_message(message: &str) -> String {
    let step = EMAIL.replace_all(message, "[EMAIL]");
    let step = TOKEN_LIKE.replace_all(&step, REDACTED);
    ANY_UUID.replace_all(&step, "[UUID]").into_owned()
}

/// First 12 hex characters of the SHA-256 of a user id.
pub fn hash_user_id(user_id: &str) -> String {
    let digest = hex::encode(Sha256::digest(user_id.as_bytes()));
    digest[..HASHED_ID_LEN].to_string()
}
