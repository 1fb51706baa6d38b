//! The `Connector` trait: the contract every action implementation must fulfil.

use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::ConnectorError;

/// Shared context passed to a connector for one invocation.
///
/// Defined here (in the nodes crate) so both the engine and individual
/// connector implementations can import it without a circular dependency.
#[derive(Debug, Clone)]
pub struct ConnectorContext {
    /// ID of the workflow being executed (nil for an unsaved dry run).
    pub workflow_id: Uuid,
    /// Owner whose credentials were resolved.
    pub owner_id: Uuid,
    /// Decrypted secret for [`Connector::required_service`], if any.
    pub credential: Option<String>,
    /// Fires when the execution deadline passes or the run is abandoned.
    /// Connectors must stop outstanding I/O once it is cancelled.
    pub cancel: CancellationToken,
}

impl ConnectorContext {
    pub fn new(workflow_id: Uuid, owner_id: Uuid) -> Self {
        Self {
            workflow_id,
            owner_id,
            credential: None,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_credential(mut self, credential: impl Into<String>) -> Self {
        self.credential = Some(credential.into());
        self
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }
}

/// Normalised output of a successful connector call.
#[derive(Debug, Clone, PartialEq)]
pub struct ConnectorOutput {
    /// Human-readable summary, stored in the execution log.
    pub message: String,
    /// Connector-specific payload.
    pub data: Option<Value>,
}

impl ConnectorOutput {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// The core connector trait.
///
/// One implementation performs one kind of external side effect.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Name of the stored credential this connector needs (e.g. `"slack"`).
    /// The executor resolves it before calling [`Connector::execute`].
    fn required_service(&self) -> Option<&str> {
        None
    }

    /// Perform the action described by `config`.
    async fn execute(
        &self,
        ctx: &ConnectorContext,
        config: &Value,
    ) -> Result<ConnectorOutput, ConnectorError>;
}
