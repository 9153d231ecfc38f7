use std::sync::{Mutex, PoisonError};

use chrono::{DateTime, Utc};
use serde::Serialize;
use shared::{ErrorBag, FieldMap, FieldValue, RequestContext};

/// Fields whose values never reach a log line.
pub const REDACTED_FIELDS: &[&str] = &[
    "password",
    "password_confirmation",
    "current_password",
    "app_key",
];

const REDACTED: &str = "[REDACTED]";

/// Structured record of a rejected request.
#[derive(Debug, Clone, Serialize)]
pub struct AuditRecord {
    pub event: &'static str,
    pub endpoint: &'static str,
    pub ip: String,
    pub user_agent: Option<String>,
    pub url: String,
    pub method: String,
    pub errors: ErrorBag,
    pub input: FieldMap,
    pub timestamp: DateTime<Utc>,
}

impl AuditRecord {
    pub fn validation_failed(
        endpoint: &'static str,
        ctx: &RequestContext,
        errors: &ErrorBag,
        input: &FieldMap,
    ) -> Self {
        Self {
            event: "validation_failed",
            endpoint,
            ip: ctx.ip.clone(),
            user_agent: ctx.user_agent.clone(),
            url: ctx.path.clone(),
            method: ctx.method.clone(),
            errors: errors.clone(),
            input: redact(input),
            timestamp: Utc::now(),
        }
    }
}

/// Copy of `input` with secret fields replaced.
pub fn redact(input: &FieldMap) -> FieldMap {
    input
        .iter()
        .map(|(key, value)| {
            let value = if REDACTED_FIELDS.contains(&key.as_str()) {
                FieldValue::string(REDACTED)
            } else {
                value.clone()
            };
            (key.clone(), value)
        })
        .collect()
}

pub trait AuditSink: Send + Sync {
    fn warn(&self, record: &AuditRecord);
}

/// Emits audit records as warn-level events on the `validation_audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn warn(&self, record: &AuditRecord) {
        let errors = serde_json::to_string(&record.errors).unwrap_or_default();
        let input = serde_json::to_string(&record.input).unwrap_or_default();
        tracing::warn!(
            target: "validation_audit",
            event = record.event,
            endpoint = record.endpoint,
            ip = %record.ip,
            user_agent = record.user_agent.as_deref().unwrap_or("-"),
            url = %record.url,
            method = %record.method,
            errors = %errors,
            input = %input,
            timestamp = %record.timestamp.to_rfc3339(),
            "validation failed"
        );
    }
}

/// Keeps records in memory for inspection.
#[derive(Debug, Default)]
pub struct RecordingAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn warn(&self, record: &AuditRecord) {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
