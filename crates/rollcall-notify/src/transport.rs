//! HTTP transport seam for the attendance API.

use serde_json::Value;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connection(String),
    #[error("failed to read response body: {0}")]
    Body(String),
}

/// Any HTTP response, whatever its status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self { status, body: body.into() }
    }
}

/// POSTs a JSON body and returns the reply.
///
/// Every status code is a reply; only failing to talk to the server at all
/// is an error.
pub trait Transport {
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError>;
}

impl<T: Transport + ?Sized> Transport for &T {
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        (**self).post_json(url, body)
    }
}

/// Blocking transport backed by a `ureq` agent with default timeouts.
#[derive(Clone)]
pub struct UreqTransport {
    agent: ureq::Agent,
}

impl UreqTransport {
    pub fn new() -> Self {
        Self {
            agent: ureq::AgentBuilder::new().build(),
        }
    }
}

impl Default for UreqTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Transport for UreqTransport {
    fn post_json(&self, url: &str, body: &Value) -> Result<HttpReply, TransportError> {
        let response = match self.agent.post(url).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(_, response)) => response,
            Err(ureq::Error::Transport(e)) => return Err(TransportError::Connection(e.to_string())),
        };

        let status = response.status();
        let body = response
            .into_string()
            .map_err(|e| TransportError::Body(e.to_string()))?;
        Ok(HttpReply { status, body })
    }
}
