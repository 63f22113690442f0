//! The transport-agnostic request executor.
//!
//! [`PodmanTransport`] implements the three public operations (JSON
//! request, raw request, and streaming request) on top of the abstract
//! [`Exchange`] primitive, and owns nothing per-call: every invocation
//! builds its own request and consumes its own response, so concurrent
//! calls against one transport never interfere.
//!
//! Status-code policy lives with the caller. `request` hands back the
//! decoded body regardless of status; only `request_stream` inspects the
//! status, because an error status means there is no stream to return.

use std::time::Duration;

use bytes::Bytes;
use http::header::{ACCEPT, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Method, StatusCode};
use serde_json::Value;

use crate::config::{Credential, TransportOptions};
use crate::error::{ApiError, PodlinkError, Result};
use crate::transport::events::EventStream;
use crate::transport::exchange::{ByteStream, Exchange, ExchangeRequest, ExchangeResponse};

/// Error message used when a streaming request fails with an empty body.
const STREAM_FAILURE_MESSAGE: &str = "Stream request failed";

/// Error message used when no better one can be extracted.
const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// How much of an unparseable response body is quoted in the error.
const INVALID_JSON_SNIPPET_LIMIT: usize = 200;

/// A decoded JSON response: the status line plus the parsed body, when
/// one was present.
#[derive(Debug, Clone, PartialEq)]
pub struct JsonResponse {
    /// The HTTP status the engine returned.
    pub status: StatusCode,
    /// The decoded body, or `None` for an empty or whitespace-only body.
    pub json: Option<Value>,
}

/// The request executor over one connection backend.
pub struct PodmanTransport {
    backend: Box<dyn Exchange>,
    timeout: Duration,
    credential: Option<Credential>,
}

impl PodmanTransport {
    /// Creates an executor over the given backend.
    #[must_use]
    pub fn new(backend: Box<dyn Exchange>, options: &TransportOptions) -> Self {
        Self {
            backend,
            timeout: options.timeout,
            credential: options.credential.clone(),
        }
    }

    /// Performs one JSON exchange and decodes the response body.
    ///
    /// The body, when present, is serialised as JSON and announced with
    /// `Content-Type: application/json`; `Accept: application/json` is
    /// always sent. An empty or whitespace-only response body decodes to
    /// `None` for any status code, and a successfully parsed body is
    /// returned regardless of status; interpreting the status is the
    /// caller's responsibility.
    ///
    /// # Errors
    ///
    /// Returns a connection-tier error when the exchange itself fails,
    /// and an [`ApiError`] carrying the original status, method, and
    /// path when a non-empty body fails to parse as JSON.
    pub async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<JsonResponse> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let method_label = method.to_string();
        let payload = match body {
            Some(value) => {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
                let encoded = serde_json::to_vec(value).map_err(|error| {
                    PodlinkError::RequestBodySerialization {
                        method: method_label.clone(),
                        path: path.to_owned(),
                        message: error.to_string(),
                    }
                })?;
                Some(Bytes::from(encoded))
            }
            None => None,
        };

        let response = self
            .backend
            .perform(ExchangeRequest {
                method,
                path: path.to_owned(),
                body: payload,
                headers,
                timeout: Some(self.timeout),
            })
            .await?;

        let status = response.status;
        let text = match response.body {
            Some(raw) => raw.text().await?,
            None => String::new(),
        };
        if text.trim().is_empty() {
            return Ok(JsonResponse { status, json: None });
        }
        match serde_json::from_str(&text) {
            Ok(value) => Ok(JsonResponse {
                status,
                json: Some(value),
            }),
            Err(_) => Err(ApiError {
                status: status.as_u16(),
                message: invalid_json_message(&text),
                method: method_label,
                path: path.to_owned(),
            }
            .into()),
        }
    }

    /// Performs one exchange with body and headers passed through
    /// unmodified and the response handed back unconsumed.
    ///
    /// No status inspection and no JSON decoding happen here; the caller
    /// reads the body as text, JSON, or a byte stream itself.
    ///
    /// # Errors
    ///
    /// Returns a connection-tier error when the exchange itself fails.
    pub async fn request_raw(
        &self,
        method: Method,
        path: &str,
        body: Option<Bytes>,
        headers: Option<HeaderMap>,
    ) -> Result<ExchangeResponse> {
        self.backend
            .perform(ExchangeRequest {
                method,
                path: path.to_owned(),
                body,
                headers: headers.unwrap_or_default(),
                timeout: Some(self.timeout),
            })
            .await
    }

    /// Opens a long-lived byte stream from the engine.
    ///
    /// Always sends `Accept: application/json` and deliberately no
    /// deadline: streams are expected to run indefinitely, bounded only
    /// by the consumer dropping them.
    ///
    /// # Errors
    ///
    /// Returns an [`ApiError`] when the response status is 400 or above:
    /// the body is drained and its best-effort message extracted, and the
    /// stream is never returned. Returns a missing-body error when the
    /// response carried no body at all, and a connection-tier error when
    /// the exchange itself fails.
    pub async fn request_stream(&self, method: Method, path: &str) -> Result<ByteStream> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        let method_label = method.to_string();

        let response = self
            .backend
            .perform(ExchangeRequest {
                method,
                path: path.to_owned(),
                body: None,
                headers,
                timeout: None,
            })
            .await?;

        let status = response.status;
        let Some(raw) = response.body else {
            return Err(PodlinkError::MissingBody {
                method: method_label,
                path: path.to_owned(),
            });
        };
        if status.as_u16() >= 400 {
            let text = raw.text().await?;
            tracing::debug!(status = status.as_u16(), path, "stream request rejected");
            return Err(ApiError {
                status: status.as_u16(),
                message: stream_error_message(&text),
                method: method_label,
                path: path.to_owned(),
            }
            .into());
        }
        Ok(raw.into_stream())
    }

    /// Opens the engine's event stream and decodes it as NDJSON records.
    ///
    /// # Errors
    ///
    /// Propagates the same errors as [`request_stream`](Self::request_stream).
    pub async fn request_events(
        &self,
        method: Method,
        path: &str,
    ) -> Result<EventStream<ByteStream>> {
        Ok(EventStream::new(self.request_stream(method, path).await?))
    }

    /// Verifies the engine responds at all.
    ///
    /// Issues `GET _ping` under the versioned base path and succeeds on
    /// any 2xx status.
    ///
    /// # Errors
    ///
    /// Returns a connection-tier error when the socket cannot be reached
    /// and an [`ApiError`] when the engine answers with a non-2xx status.
    pub async fn ping(&self) -> Result<()> {
        let response = self.request_raw(Method::GET, "/_ping", None, None).await?;
        if response.status.is_success() {
            return Ok(());
        }
        let status = response.status;
        let message = match response.body {
            Some(raw) => {
                let text = raw.text().await?;
                let trimmed = text.trim();
                if trimmed.is_empty() {
                    String::from("engine ping failed")
                } else {
                    trimmed.to_owned()
                }
            }
            None => String::from("engine ping failed"),
        };
        Err(ApiError {
            status: status.as_u16(),
            message,
            method: String::from("GET"),
            path: String::from("/_ping"),
        }
        .into())
    }

    /// The credential header value for calling code to attach, when a
    /// credential was configured.
    #[must_use]
    pub fn auth_header(&self) -> Option<String> {
        self.credential.as_ref().map(Credential::auth_header)
    }

    /// Releases the backend's connection resources.
    ///
    /// Safe to call multiple times.
    pub async fn close(&self) {
        self.backend.close().await;
    }
}

/// Extracts a human-readable message from a decoded JSON error body.
///
/// Returns the `message` field if it is a string, else the `cause` field
/// if it is a string, else the literal `"Unknown error"`. Non-object and
/// primitive input also yields `"Unknown error"`. The same precedence
/// applies on every path so error message semantics are consistent
/// everywhere.
#[must_use]
pub fn extract_error_message(body: &Value) -> String {
    for key in ["message", "cause"] {
        if let Some(text) = body.get(key).and_then(Value::as_str) {
            return text.to_owned();
        }
    }
    String::from(UNKNOWN_ERROR_MESSAGE)
}

/// Builds the error message for a body that failed to parse as JSON.
fn invalid_json_message(text: &str) -> String {
    let snippet: String = text.chars().take(INVALID_JSON_SNIPPET_LIMIT).collect();
    format!("Invalid JSON response: {snippet}")
}

/// Builds the error message for a rejected streaming request.
///
/// A body that parses as JSON goes through the error classifier; anything
/// else is used verbatim, falling back to a fixed message when empty.
fn stream_error_message(text: &str) -> String {
    serde_json::from_str::<Value>(text).map_or_else(
        |_| {
            if text.is_empty() {
                String::from(STREAM_FAILURE_MESSAGE)
            } else {
                text.to_owned()
            }
        },
        |value| extract_error_message(&value),
    )
}
