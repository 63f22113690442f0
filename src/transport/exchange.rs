//! The "perform one HTTP exchange" contract shared by all backends.
//!
//! A backend turns one [`ExchangeRequest`] into one [`ExchangeResponse`]
//! over whichever carrier it manages. Requests and responses are ephemeral,
//! one per call; no call-scoped state lives on the backend itself, so
//! concurrent calls against one transport cannot corrupt each other.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use futures_util::stream::BoxStream;
use futures_util::{Stream, StreamExt, TryStreamExt};
use http::{HeaderMap, Method, StatusCode, Uri};
use http_body_util::{BodyExt, Full};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::Connect;

use crate::error::{ConnectionError, Result};

/// A pull-based stream of response body chunks.
///
/// Bytes are delivered only as fast as the consumer reads them; dropping
/// the stream cancels the underlying request.
pub type ByteStream = BoxStream<'static, io::Result<Bytes>>;

/// One HTTP request handed to a backend. Ephemeral, one per call.
#[derive(Debug)]
pub struct ExchangeRequest {
    /// The HTTP method.
    pub method: Method,
    /// The request path relative to the versioned base path, starting
    /// with a slash.
    pub path: String,
    /// Optional request body bytes.
    pub body: Option<Bytes>,
    /// Headers sent verbatim.
    pub headers: HeaderMap,
    /// Deadline for the whole exchange. `None` means no deadline, which
    /// streaming calls use deliberately since they run indefinitely.
    pub timeout: Option<Duration>,
}

/// One HTTP response as produced by a backend. Ephemeral.
#[derive(Debug)]
pub struct ExchangeResponse {
    /// The response status code.
    pub status: StatusCode,
    /// The response headers.
    pub headers: HeaderMap,
    /// The response body, when the carrier produced one. The hyper-backed
    /// backends always populate this; `None` models carriers that can
    /// genuinely omit a body.
    pub body: Option<ResponseBody>,
}

/// A response body consumable exactly once: as collected bytes, as lossy
/// text, or as a pull-based byte stream.
pub struct ResponseBody {
    stream: ByteStream,
}

impl ResponseBody {
    /// Wraps a hyper body as a response body.
    pub(crate) fn from_incoming(body: hyper::body::Incoming) -> Self {
        Self {
            stream: Box::pin(body.into_data_stream().map_err(io::Error::other)),
        }
    }

    /// Builds a response body from a single in-memory chunk.
    #[must_use]
    pub fn from_bytes(payload: Bytes) -> Self {
        let chunks: Vec<io::Result<Bytes>> = vec![Ok(payload)];
        Self {
            stream: Box::pin(futures_util::stream::iter(chunks)),
        }
    }

    /// Builds a response body from an arbitrary chunk stream.
    #[must_use]
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = io::Result<Bytes>> + Send + 'static,
    {
        Self {
            stream: Box::pin(stream),
        }
    }

    /// Collects the whole body into one buffer.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Exchange` if the carrier fails while the
    /// body is being read.
    pub async fn bytes(self) -> Result<Bytes> {
        let mut stream = self.stream;
        let mut collected = BytesMut::new();
        while let Some(chunk) = stream.next().await {
            let piece = chunk.map_err(|error| ConnectionError::Exchange {
                message: error.to_string(),
            })?;
            collected.extend_from_slice(&piece);
        }
        Ok(collected.freeze())
    }

    /// Collects the whole body and decodes it as text, replacing invalid
    /// UTF-8 sequences.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Exchange` if the carrier fails while the
    /// body is being read.
    pub async fn text(self) -> Result<String> {
        let raw = self.bytes().await?;
        Ok(String::from_utf8_lossy(&raw).into_owned())
    }

    /// Releases the body as a raw chunk stream.
    #[must_use]
    pub fn into_stream(self) -> ByteStream {
        self.stream
    }
}

impl fmt::Debug for ResponseBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResponseBody").finish_non_exhaustive()
    }
}

/// The single low-level primitive consumed by the request executor:
/// perform one HTTP exchange over this backend's carrier.
#[async_trait]
pub trait Exchange: Send + Sync {
    /// Performs one HTTP exchange.
    ///
    /// # Errors
    ///
    /// Returns a connection-tier error when the carrier cannot complete
    /// the exchange. Status-code interpretation is never done here.
    async fn perform(&self, request: ExchangeRequest) -> Result<ExchangeResponse>;

    /// Releases any pooled connection resources.
    ///
    /// Safe to call multiple times; repeated calls are no-ops.
    async fn close(&self);
}

/// Returns the versioned libpod base path for all application requests.
pub(crate) fn versioned_base_path(api_version: &str) -> String {
    format!("/v{api_version}/libpod")
}

/// Sends one request through a pooled hyper client and adapts the
/// response, honouring the request's deadline when one is set.
pub(crate) async fn dispatch<C>(
    client: &Client<C, Full<Bytes>>,
    uri: Uri,
    request: ExchangeRequest,
) -> Result<ExchangeResponse>
where
    C: Connect + Clone + Send + Sync + 'static,
{
    let ExchangeRequest {
        method,
        headers,
        body,
        timeout: deadline,
        ..
    } = request;
    let mut outbound = http::Request::builder()
        .method(method)
        .uri(uri)
        .body(Full::new(body.unwrap_or_default()))
        .map_err(|error| ConnectionError::Exchange {
            message: error.to_string(),
        })?;
    *outbound.headers_mut() = headers;

    let pending = client.request(outbound);
    let response = match deadline {
        Some(limit) => tokio::time::timeout(limit, pending)
            .await
            .map_err(|_| ConnectionError::Exchange {
                message: format!("request timed out after {limit:?}"),
            })?,
        None => pending.await,
    }
    .map_err(|error| ConnectionError::Exchange {
        message: error.to_string(),
    })?;

    let (parts, incoming) = response.into_parts();
    Ok(ExchangeResponse {
        status: parts.status,
        headers: parts.headers,
        body: Some(ResponseBody::from_incoming(incoming)),
    })
}
