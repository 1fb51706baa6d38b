//! `MockConnector`: a test double for `Connector`.
//!
//! Useful in unit and integration tests where a real connector is either
//! unavailable or irrelevant.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::{Connector, ConnectorContext, ConnectorError, ConnectorOutput};

/// Behaviour injected into `MockConnector` at construction time.
#[derive(Debug, Clone)]
pub enum MockBehaviour {
    /// Succeed with the given message.
    Succeed(String),
    /// Fail with a dependency error (`ConnectorError::Request`).
    FailRequest(String),
    /// Fail with `ConnectorError::InvalidConfig`.
    FailConfig(String),
    /// Never finish on its own; returns `Cancelled` once the context is cancelled.
    Hang,
}

/// A mock connector that records every call it receives and returns a
/// programmer-specified result.
pub struct MockConnector {
    pub behaviour: MockBehaviour,
    /// Credential service this mock claims to need.
    pub service: Option<String>,
    /// Artificial latency before the behaviour is applied.
    pub delay: Option<Duration>,
    /// Every `(config, credential)` pair seen by this connector, in call order.
    pub calls: Arc<Mutex<Vec<(Value, Option<String>)>>>,
}

impl MockConnector {
    fn with_behaviour(behaviour: MockBehaviour) -> Self {
        Self {
            behaviour,
            service: None,
            delay: None,
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock that always succeeds with the given message.
    pub fn succeeding(message: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::Succeed(message.into()))
    }

    /// Create a mock that always fails with a dependency error.
    pub fn failing(msg: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::FailRequest(msg.into()))
    }

    /// Create a mock that always rejects its configuration.
    pub fn rejecting_config(msg: impl Into<String>) -> Self {
        Self::with_behaviour(MockBehaviour::FailConfig(msg.into()))
    }

    /// Create a mock that only returns when cancelled.
    pub fn hanging() -> Self {
        Self::with_behaviour(MockBehaviour::Hang)
    }

    pub fn requiring(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of times this connector has been executed.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Credential passed on the most recent call.
    pub fn last_credential(&self) -> Option<String> {
        self.calls.lock().unwrap().last().and_then(|(_, c)| c.clone())
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn required_service(&self) -> Option<&str> {
        self.service.as_deref()
    }

    async fn execute(
        &self,
        ctx: &ConnectorContext,
        config: &Value,
    ) -> Result<ConnectorOutput, ConnectorError> {
        self.calls
            .lock()
            .unwrap()
            .push((config.clone(), ctx.credential.clone()));

        if let Some(delay) = self.delay {
            tokio::select! {
                _ = ctx.cancel.cancelled() => return Err(ConnectorError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        match &self.behaviour {
            MockBehaviour::Succeed(msg) => {
                Ok(ConnectorOutput::message(msg.clone()).with_data(json!({ "echo": config })))
            }
            MockBehaviour::FailRequest(msg) => Err(ConnectorError::Request(msg.clone())),
            MockBehaviour::FailConfig(msg) => Err(ConnectorError::InvalidConfig(msg.clone())),
            MockBehaviour::Hang => {
                ctx.cancel.cancelled().await;
                Err(ConnectorError::Cancelled)
            }
        }
    }
}
