//! Crash ingestion.
//!
//! SDK-submitted events are fingerprinted, grouped, and aggregated onto
//! their group row. Context payloads (stack, breadcrumbs, device info) stay
//! structured in the core and are persisted as opaque JSON.

pub mod fingerprint;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ApiError;
use crate::storage::crashes::{CrashStore, NewCrashReport};

/// One stack frame as submitted by an SDK.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StackFrame {
    pub file: Option<String>,
    pub line: Option<i64>,
    pub column: Option<i64>,
    pub function: Option<String>,
    pub is_native: Option<bool>,
}

/// SDK breadcrumb. `timestamp` is kept as the SDK sent it (string or epoch
/// number) — breadcrumbs are display data, never queried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Breadcrumb {
    pub timestamp: Value,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    #[default]
    Error,
    Fatal,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Fatal => "fatal",
        }
    }
}

/// Wire shape of `POST /sdk/<slug>/crashes`.
#[derive(Debug, Clone, Deserialize)]
pub struct CrashEvent {
    pub error_type: String,
    pub error_message: String,
    #[serde(default)]
    pub stack_trace: Vec<StackFrame>,
    pub app_version: String,
    pub platform: String,
    pub os_version: Option<String>,
    pub device_info: Option<Value>,
    pub app_state: Option<Value>,
    #[serde(default)]
    pub breadcrumbs: Vec<Breadcrumb>,
    #[serde(default)]
    pub severity: Severity,
    pub user_id: Option<String>,
}

/// Outcome handed back to the SDK.
#[derive(Debug, Clone, Serialize)]
pub struct IngestOutcome {
    pub report_id: String,
    pub group_id: String,
    pub fingerprint: String,
}

#[derive(Clone)]
pub struct CrashService {
    store: CrashStore,
}

impl CrashService {
    pub fn new(store: CrashStore) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &CrashStore {
        &self.store
    }

    /// Validate, fingerprint, and persist one event under the key's app.
    pub async fn ingest(
        &self,
        app_id: &str,
        public_key_id: &str,
        event: CrashEvent,
    ) -> Result<IngestOutcome, ApiError> {
        if event.error_type.trim().is_empty() {
            return Err(ApiError::validation("error_type must not be empty"));
        }
        if event.app_version.trim().is_empty() {
            return Err(ApiError::validation("app_version must not be empty"));
        }
        if event.platform.trim().is_empty() {
            return Err(ApiError::validation("platform must not be empty"));
        }

        let fp = fingerprint::fingerprint(&event.error_type, &event.stack_trace);

        let record = NewCrashReport {
            app_id: app_id.to_string(),
            public_key_id: public_key_id.to_string(),
            error_type: event.error_type,
            error_message: event.error_message,
            stack_trace_json: to_json(&event.stack_trace)?,
            app_version: event.app_version,
            platform: event.platform,
            os_version: event.os_version,
            device_info_json: event.device_info.as_ref().map(to_json).transpose()?,
            app_state_json: event.app_state.as_ref().map(to_json).transpose()?,
            breadcrumbs_json: to_json(&event.breadcrumbs)?,
            fingerprint: fp.clone(),
            severity: event.severity.as_str().to_string(),
            user_id: event.user_id,
        };

        let (group, report_id) = self.store.ingest(&record).await?;
        Ok(IngestOutcome {
            report_id,
            group_id: group.id,
            fingerprint: fp,
        })
    }
}

fn to_json<T: Serialize>(value: &T) -> Result<String, ApiError> {
    serde_json::to_string(value)
        .map_err(|e| ApiError::Internal(anyhow::Error::new(e).context("serializing crash context")))
}

/// Statistics window accepted by the crash stats endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatsWindow {
    Day,
    Week,
    Month,
    Quarter,
}

impl StatsWindow {
    pub fn parse(s: &str) -> Result<Self, ApiError> {
        match s {
            "24h" => Ok(Self::Day),
            "7d" => Ok(Self::Week),
            "30d" => Ok(Self::Month),
            "90d" => Ok(Self::Quarter),
            other => Err(ApiError::validation(format!(
                "window '{other}' must be one of 24h, 7d, 30d, 90d"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Day => "24h",
            Self::Week => "7d",
            Self::Month => "30d",
            Self::Quarter => "90d",
        }
    }

    pub fn millis(&self) -> i64 {
        const HOUR: i64 = 60 * 60 * 1000;
        match self {
            Self::Day => 24 * HOUR,
            Self::Week => 7 * 24 * HOUR,
            Self::Month => 30 * 24 * HOUR,
            Self::Quarter => 90 * 24 * HOUR,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_defaults_to_error() {
        let event: CrashEvent = serde_json::from_str(
            r#"{"error_type":"E","error_message":"m","app_version":"1.0.0","platform":"darwin"}"#,
        )
        .unwrap();
        assert_eq!(event.severity, Severity::Error);
        assert!(event.stack_trace.is_empty());
        assert!(event.breadcrumbs.is_empty());
    }

    #[test]
    fn breadcrumb_timestamp_is_lenient() {
        let b: Breadcrumb = serde_json::from_str(
            r#"{"timestamp":1700000000123,"type":"click","message":"save pressed"}"#,
        )
        .unwrap();
        assert_eq!(b.kind, "click");

        let b: Breadcrumb = serde_json::from_str(
            r#"{"timestamp":"2024-01-01T00:00:00Z","type":"nav","message":"route","data":{"to":"/x"}}"#,
        )
        .unwrap();
        assert!(b.data.is_some());
    }

    #[test]
    fn stats_window_grammar() {
        assert_eq!(StatsWindow::parse("24h").unwrap(), StatsWindow::Day);
        assert_eq!(StatsWindow::parse("90d").unwrap(), StatsWindow::Quarter);
        assert!(StatsWindow::parse("1y").is_err());
        assert_eq!(StatsWindow::Week.millis(), 7 * 24 * 60 * 60 * 1000);
    }
}
