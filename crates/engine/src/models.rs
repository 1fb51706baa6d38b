//! Core domain models for the execution engine.
//!
//! [`Workflow`] is the engine's view of a `workflows` row; it is built from a
//! [`db::models::WorkflowRow`] for the duration of one execution and never
//! cached.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use db::models::WorkflowRow;

use crate::EngineError;

// ---------------------------------------------------------------------------
// TriggerKind
// ---------------------------------------------------------------------------

/// How a workflow is started.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerKind {
    /// Triggered by an inbound HTTP call for the workflow's id.
    Webhook,
    /// Polled by the scheduler every `interval_minutes`.
    Schedule,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Webhook => "webhook",
            Self::Schedule => "schedule",
        }
    }
}

impl std::fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for TriggerKind {
    type Err = EngineError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "webhook" => Ok(Self::Webhook),
            "schedule" => Ok(Self::Schedule),
            other => Err(EngineError::InvalidWorkflow(format!(
                "unknown trigger kind: {other}"
            ))),
        }
    }
}

// ---------------------------------------------------------------------------
// Workflow
// ---------------------------------------------------------------------------

/// A user-owned trigger → action definition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Workflow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    pub trigger_kind: TriggerKind,
    /// Key into the connector registry.
    pub action_kind: String,
    /// Raw JSON configuration; parsed by the executor at run time.
    pub config: String,
    pub is_active: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Workflow {
    /// Convenience constructor for testing.
    pub fn new(
        name: impl Into<String>,
        trigger_kind: TriggerKind,
        action_kind: impl Into<String>,
        config: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner_id: Uuid::new_v4(),
            name: name.into(),
            trigger_kind,
            action_kind: action_kind.into(),
            config: config.to_string(),
            is_active: true,
            last_executed_at: None,
            created_at: Utc::now(),
        }
    }

    /// Polling interval from `config.interval_minutes`, or `default` when
    /// the field is missing, non-positive or the config is not valid JSON.
    pub fn schedule_interval(&self, default: Duration) -> Duration {
        serde_json::from_str::<Value>(&self.config)
            .ok()
            .and_then(|cfg| cfg.get("interval_minutes").and_then(Value::as_i64))
            .filter(|minutes| *minutes > 0)
            .map(|minutes| Duration::from_secs((minutes as u64).saturating_mul(60)))
            .unwrap_or(default)
    }

    /// Whether a scheduled run may start at `now`.
    ///
    /// Requires `is_active`; a workflow that never ran is due immediately,
    /// otherwise `now - last_executed_at` must reach the interval.
    pub fn is_due(&self, now: DateTime<Utc>, default_interval: Duration) -> bool {
        if !self.is_active {
            return false;
        }
        let Some(last) = self.last_executed_at else {
            return true;
        };
        let interval = chrono::Duration::from_std(self.schedule_interval(default_interval))
            .unwrap_or(chrono::Duration::MAX);
        now.signed_duration_since(last) >= interval
    }
}

impl TryFrom<WorkflowRow> for Workflow {
    type Error = EngineError;

    fn try_from(row: WorkflowRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: row.id,
            owner_id: row.owner_id,
            name: row.name,
            trigger_kind: row.trigger_kind.parse()?,
            action_kind: row.action_kind,
            config: row.config,
            is_active: row.is_active,
            last_executed_at: row.last_executed_at,
            created_at: row.created_at,
        })
    }
}

impl From<Workflow> for WorkflowRow {
    fn from(wf: Workflow) -> Self {
        Self {
            id: wf.id,
            owner_id: wf.owner_id,
            name: wf.name,
            trigger_kind: wf.trigger_kind.as_str().to_owned(),
            action_kind: wf.action_kind,
            config: wf.config,
            is_active: wf.is_active,
            last_executed_at: wf.last_executed_at,
            created_at: wf.created_at,
        }
    }
}

// ---------------------------------------------------------------------------
// ExecutionResult
// ---------------------------------------------------------------------------

/// Terminal status of one action invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    Success,
    Failed,
    Cancelled,
}

impl ExecutionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for ExecutionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The outcome of one connector invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub message: String,
    pub data: Option<Value>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub timestamp: DateTime<Utc>,
}

impl ExecutionResult {
    pub fn success(message: impl Into<String>, data: Option<Value>, duration: Duration) -> Self {
        Self::with_status(ExecutionStatus::Success, message, data, duration)
    }

    pub fn failed(message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(ExecutionStatus::Failed, message, None, duration)
    }

    pub fn cancelled(message: impl Into<String>, duration: Duration) -> Self {
        Self::with_status(ExecutionStatus::Cancelled, message, None, duration)
    }

    fn with_status(
        status: ExecutionStatus,
        message: impl Into<String>,
        data: Option<Value>,
        duration: Duration,
    ) -> Self {
        Self {
            status,
            message: message.into(),
            data,
            duration,
            timestamp: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        (d.as_millis() as u64).serialize(s)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
