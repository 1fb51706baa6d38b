//! Maps `action_kind` strings to connector implementations.

use std::collections::HashMap;
use std::sync::Arc;

use crate::chat::ChatWebhookConnector;
use crate::Connector;

/// Lookup table from action kind to connector.
///
/// Built once at start-up and shared read-only afterwards.
#[derive(Clone, Default)]
pub struct ConnectorRegistry {
    connectors: HashMap<String, Arc<dyn Connector>>,
}

impl ConnectorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in chat webhook connectors.
    pub fn with_builtins(client: reqwest::Client) -> Self {
        let mut registry = Self::new();
        registry.register("slack", Arc::new(ChatWebhookConnector::slack(client.clone())));
        registry.register("discord", Arc::new(ChatWebhookConnector::discord(client)));
        registry
    }

    /// Register (or replace) the connector for `action_kind`.
    pub fn register(&mut self, action_kind: impl Into<String>, connector: Arc<dyn Connector>) {
        self.connectors.insert(action_kind.into(), connector);
    }

    pub fn get(&self, action_kind: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.get(action_kind).cloned()
    }

    /// Registered action kinds, sorted.
    pub fn kinds(&self) -> Vec<&str> {
        let mut kinds: Vec<&str> = self.connectors.keys().map(String::as_str).collect();
        kinds.sort_unstable();
        kinds
    }
}

impl std::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("kinds", &self.kinds())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockConnector;

    #[test]
    fn unregistered_kind_is_none() {
        let registry = ConnectorRegistry::new();
        assert!(registry.get("carrier_pigeon").is_none());
    }

    #[test]
    fn builtins_are_registered() {
        let registry = ConnectorRegistry::with_builtins(reqwest::Client::new());
        assert_eq!(registry.kinds(), vec!["discord", "slack"]);
        assert_eq!(
            registry.get("slack").and_then(|c| c.required_service().map(str::to_owned)),
            Some("slack".to_string())
        );
    }

    #[test]
    fn register_replaces_existing_kind() {
        let mut registry = ConnectorRegistry::new();
        registry.register("mock", Arc::new(MockConnector::succeeding("first")));
        registry.register("mock", Arc::new(MockConnector::succeeding("second")));
        assert_eq!(registry.kinds(), vec!["mock"]);
    }
}
