//! Row structs that map 1-to-1 onto database tables.
//!
//! These are *persistence* models: they carry no domain behaviour.
//! Domain types live in the `engine` crate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// workflows
// ---------------------------------------------------------------------------

/// A persisted workflow row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct WorkflowRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub name: String,
    /// `"webhook"` or `"schedule"`.
    pub trigger_kind: String,
    /// Key into the connector registry.
    pub action_kind: String,
    /// Raw JSON action configuration, exactly as the user saved it.
    pub config: String,
    pub is_active: bool,
    pub last_executed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// execution_logs
// ---------------------------------------------------------------------------

/// One recorded execution outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct LogRow {
    pub id: Uuid,
    pub workflow_id: Uuid,
    pub status: String,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// credentials
// ---------------------------------------------------------------------------

/// A persisted credential row.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct CredentialRow {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub service: String,
    /// AES-256-GCM nonce + ciphertext, base64-encoded.
    pub encrypted_value: String,
    pub created_at: DateTime<Utc>,
}
