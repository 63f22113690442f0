//! Semantic error types for the podlink transport.
//!
//! This module defines the error taxonomy surfaced across the transport
//! boundary, following the principle of using semantic error enums (via
//! `thiserror`) for conditions the caller might inspect or map to a retry
//! decision. Two tiers matter to callers and are kept strictly apart:
//! [`ConnectionError`] covers failures that occurred before any HTTP status
//! line existed (these are the candidates for caller-side retry), while
//! [`ApiError`] always carries the status the engine actually returned.

use thiserror::Error;

/// Errors raised before an HTTP exchange could complete.
///
/// Every variant here means no response status was received: the carrier
/// could not be reached, TLS material could not be assembled, or the SSH
/// tunnel never produced a usable local socket. None of these are retried
/// internally; callers decide whether to try again.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The HTTP exchange failed at the I/O level (connect, write, read,
    /// or deadline expiry).
    #[error("failed to reach container engine: {message}")]
    Exchange {
        /// A description of the underlying failure.
        message: String,
    },

    /// A request URL could not be assembled from the configured endpoint.
    #[error("invalid request URL '{url}': {message}")]
    InvalidUrl {
        /// The URL that failed to parse.
        url: String,
        /// A description of the parse failure.
        message: String,
    },

    /// TLS material (CA bundle, client certificate, or key) could not be
    /// loaded or assembled into a client configuration.
    #[error("failed to load TLS material: {message}")]
    TlsSetup {
        /// A description of the failure.
        message: String,
    },

    /// The private working directory for a tunnel could not be created.
    #[error("failed to prepare tunnel workspace: {message}")]
    Workspace {
        /// A description of the failure.
        message: String,
    },

    /// The external `ssh` command could not be started at all (binary
    /// missing or not executable).
    #[error("SSH tunnel to {host} failed: ssh command unavailable: {message}")]
    CommandUnavailable {
        /// The configured destination host.
        host: String,
        /// The underlying spawn failure.
        message: String,
    },

    /// The tunnel process started but the forwarded socket never became
    /// usable: the readiness deadline elapsed or the process exited first.
    #[error("SSH tunnel to {host} failed: {message}")]
    TunnelFailed {
        /// The configured destination host.
        host: String,
        /// The trimmed stderr output of the tunnel process, or a fixed
        /// deadline message when the process produced none.
        message: String,
    },
}

/// Errors in configuration values supplied to the transport.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An endpoint string could not be parsed into a connection
    /// configuration.
    #[error("invalid engine endpoint '{endpoint}': {reason}")]
    InvalidEndpoint {
        /// The endpoint string that failed to parse.
        endpoint: String,
        /// The reason the endpoint is invalid.
        reason: String,
    },
}

/// A uniform application-level error for engine API failures.
///
/// Constructed whenever the engine returned a status line but the response
/// could not be handed to the caller as-is: the body failed to parse as
/// JSON where JSON was promised, or a streaming request came back with an
/// error status. Immutable once constructed.
#[derive(Debug, Error)]
#[error("{method} {path} returned status {status}: {message}")]
pub struct ApiError {
    /// The HTTP status code the engine returned.
    pub status: u16,
    /// The best-effort extracted error message.
    pub message: String,
    /// The HTTP method of the failed request.
    pub method: String,
    /// The request path, relative to the versioned base path.
    pub path: String,
}

/// Top-level error type for the podlink transport.
///
/// Aggregates the connection, configuration, and application tiers into a
/// single type surfaced by every public operation.
#[derive(Debug, Error)]
pub enum PodlinkError {
    /// A connection could not be established or broke mid-exchange.
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// A configuration value was invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The engine answered, but the response constitutes a failure.
    #[error(transparent)]
    Api(#[from] ApiError),

    /// A response that should have carried a body did not.
    #[error("no response body for {method} {path}")]
    MissingBody {
        /// The HTTP method of the request.
        method: String,
        /// The request path.
        path: String,
    },

    /// The request body could not be serialised to JSON.
    #[error("failed to serialise request body for {method} {path}: {message}")]
    RequestBodySerialization {
        /// The HTTP method of the request.
        method: String,
        /// The request path.
        path: String,
        /// A description of the serialisation failure.
        message: String,
    },
}

/// A specialised `Result` type for podlink operations.
pub type Result<T> = std::result::Result<T, PodlinkError>;
