//! `nodes` crate: the `Connector` trait, the connector registry and the
//! built-in connector implementations.
//!
//! Every action, built-in or test double, must implement
//! [`Connector`]. The engine dispatches through the [`ConnectorRegistry`].

pub mod chat;
pub mod error;
pub mod mock;
pub mod registry;
pub mod traits;

pub use error::ConnectorError;
pub use registry::ConnectorRegistry;
pub use traits::{Connector, ConnectorContext, ConnectorOutput};
