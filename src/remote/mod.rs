//! Remote Step Invocation
//!
//! The engine only relies on the contract "a remote call returns success or
//! failure plus an optional value". Wire protocols live behind the
//! [`RemoteTransport`] trait; one transport may be configured per
//! [`Protocol`].
//!
//! - [`http`]: JSON over HTTP using a blocking `reqwest` client

pub mod http;

use std::fmt;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{Map, Value};

use crate::execution::context::ExecutionContext;

pub use http::HttpTransport;

/// Wire protocol of a remote step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Http,
    Grpc,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http => f.write_str("HTTP"),
            Self::Grpc => f.write_str("gRPC"),
        }
    }
}

/// Payload handed to a transport for one remote step invocation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteCall {
    pub workflow_id: String,
    pub step_id: String,
    pub endpoint: String,
    pub input: Map<String, Value>,
    pub shared: Map<String, Value>,
}

impl RemoteCall {
    /// Captures the request input and a snapshot of shared state.
    pub fn from_context(
        context: &ExecutionContext,
        step_id: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            workflow_id: context.workflow_id().to_string(),
            step_id: step_id.into(),
            endpoint: endpoint.into(),
            input: context.input().clone(),
            shared: context.snapshot(),
        }
    }
}

/// Performs remote step calls for one protocol.
///
/// `Ok(None)` is a success without output; `Err` carries the failure message
/// recorded for the step.
pub trait RemoteTransport: Send + Sync {
    fn call(&self, call: &RemoteCall) -> Result<Option<Value>, String>;
}

impl<F> RemoteTransport for F
where
    F: Fn(&RemoteCall) -> Result<Option<Value>, String> + Send + Sync,
{
    fn call(&self, call: &RemoteCall) -> Result<Option<Value>, String> {
        self(call)
    }
}

/// Transports available to the step registry, at most one per protocol.
#[derive(Clone, Default)]
pub struct TransportRegistry {
    http: Option<Arc<dyn RemoteTransport>>,
    grpc: Option<Arc<dyn RemoteTransport>>,
}

impl TransportRegistry {
    /// Creates a registry without any transport.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the transport for a protocol, replacing any previous one.
    pub fn set(&mut self, protocol: Protocol, transport: Arc<dyn RemoteTransport>) {
        match protocol {
            Protocol::Http => self.http = Some(transport),
            Protocol::Grpc => self.grpc = Some(transport),
        }
    }

    /// Builder form of [`TransportRegistry::set`].
    pub fn with(mut self, protocol: Protocol, transport: Arc<dyn RemoteTransport>) -> Self {
        self.set(protocol, transport);
        self
    }

    /// Returns the transport configured for a protocol.
    pub fn get(&self, protocol: Protocol) -> Option<Arc<dyn RemoteTransport>> {
        match protocol {
            Protocol::Http => self.http.clone(),
            Protocol::Grpc => self.grpc.clone(),
        }
    }
}

impl fmt::Debug for TransportRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransportRegistry")
            .field("http", &self.http.is_some())
            .field("grpc", &self.grpc.is_some())
            .finish()
    }
}
