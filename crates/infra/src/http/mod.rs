//! HTTP transport seam
//!
//! [`Transport`] is the only thing the client needs from an HTTP stack: send
//! one request, return either a response or a [`TransportFault`]. The
//! production implementation is [`HttpTransport`] (reqwest); tests plug in
//! scripted transports.

pub mod client;

use std::fmt;

use async_trait::async_trait;
use relaygate_common::{ResponseHeaders, TransportFault};
use reqwest::Method;
use serde_json::Value;

pub use client::{HttpTransport, HttpTransportBuilder};

/// One upstream request
#[derive(Debug, Clone, PartialEq)]
pub struct TransportRequest {
    pub method: Method,
    pub url: String,
    /// JSON body; sent only when present
    pub body: Option<Value>,
}

impl TransportRequest {
    pub fn new<S: Into<String>>(method: Method, url: S) -> Self {
        Self { method, url: url.into(), body: None }
    }

    #[must_use]
    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

/// Successful (2xx) upstream response
#[derive(Debug, Clone, PartialEq)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: ResponseHeaders,
    /// Parsed JSON body; `Null` for an empty body, a string for non-JSON text
    pub body: Value,
}

/// Sends requests upstream
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Send `request`; non-2xx answers are reported as
    /// [`TransportFault::Status`]
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportFault>;
}
