use std::time::Duration;

use async_trait::async_trait;
use relaygate_common::{Redactor, ResponseHeaders, SecretRedactor, TransportFault};
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Client as ReqwestClient, Response};
use serde_json::Value;
use tracing::debug;

use super::{Transport, TransportRequest, TransportResponse};
use crate::errors::{InfraError, InfraResult, IntoTransportFault};

/// reqwest-backed [`Transport`] with bearer authentication.
///
/// Retries are not performed here; the client and the retry orchestrator own
/// that policy.
#[derive(Clone)]
pub struct HttpTransport {
    client: ReqwestClient,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpTransport").finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Start building a new transport.
    pub fn builder() -> HttpTransportBuilder {
        HttpTransportBuilder::default()
    }

    async fn into_transport_response(
        response: Response,
    ) -> Result<TransportResponse, TransportFault> {
        let status = response.status();
        let headers: ResponseHeaders = response
            .headers()
            .iter()
            .filter_map(|(name, value)| Some((name.as_str(), value.to_str().ok()?.to_string())))
            .collect();

        let bytes = response.bytes().await.map_err(IntoTransportFault::into_transport_fault)?;
        let body = parse_body(&bytes);

        if status.is_success() {
            return Ok(TransportResponse { status: status.as_u16(), headers, body });
        }

        Err(TransportFault::Status {
            status: status.as_u16(),
            status_text: status.canonical_reason().map(str::to_string),
            headers,
            body: (!body.is_null()).then_some(body),
            message: None,
        })
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(
        &self,
        request: TransportRequest,
    ) -> Result<TransportResponse, TransportFault> {
        let TransportRequest { method, url, body } = request;
        let shown_url = SecretRedactor.redact(&url);
        debug!(%method, url = %shown_url, "sending HTTP request");

        let mut builder = self.client.request(method.clone(), &url);
        if let Some(body) = &body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|err| {
            let error = SecretRedactor.redact(&err.to_string());
            debug!(%method, url = %shown_url, %error, "HTTP request failed");
            err.into_transport_fault()
        })?;
        debug!(%method, url = %shown_url, status = %response.status(), "received HTTP response");

        Self::into_transport_response(response).await
    }
}

/// JSON when possible, the raw text otherwise
fn parse_body(bytes: &[u8]) -> Value {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).into_owned()))
}

/// Builder for [`HttpTransport`].
#[derive(Debug)]
pub struct HttpTransportBuilder {
    timeout: Duration,
    user_agent: Option<String>,
    bearer_token: Option<String>,
    default_headers: Option<HeaderMap>,
}

impl Default for HttpTransportBuilder {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            bearer_token: None,
            default_headers: None,
        }
    }
}

impl HttpTransportBuilder {
    /// Socket-level timeout; the client applies its own per-call deadline too.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Send `Authorization: Bearer <token>` with every request.
    pub fn bearer_token(mut self, token: impl Into<String>) -> Self {
        self.bearer_token = Some(token.into());
        self
    }

    pub fn default_headers(mut self, headers: HeaderMap) -> Self {
        self.default_headers = Some(headers);
        self
    }

    pub fn build(self) -> InfraResult<HttpTransport> {
        let mut headers = self.default_headers.unwrap_or_default();
        headers.entry(ACCEPT).or_insert(HeaderValue::from_static("application/json"));

        if let Some(token) = self.bearer_token {
            let mut value = HeaderValue::from_str(&format!("Bearer {token}")).map_err(|_| {
                InfraError::Config("token contains invalid header characters".into())
            })?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let mut builder =
            ReqwestClient::builder().timeout(self.timeout).no_proxy().default_headers(headers);

        if let Some(agent) = self.user_agent {
            builder = builder.user_agent(agent);
        }

        let client = builder.build()?;
        Ok(HttpTransport { client })
    }
}
