//! Transport configuration.
//!
//! This module provides the configuration surface of the transport: the
//! tagged [`ConnectionConfig`] selecting one of the three connection
//! strategies, the shared [`TransportOptions`], registry credentials, and
//! endpoint resolution from environment variables with a priority-based
//! fallback chain:
//!
//! 1. Explicit configuration from the embedding application
//! 2. `CONTAINER_HOST` environment variable
//! 3. `PODMAN_HOST` environment variable
//! 4. `DOCKER_HOST` environment variable
//! 5. Platform default (`/run/podman/podman.sock`)

mod resolver;
mod types;

pub use resolver::{EndpointResolver, parse_endpoint};
pub use types::{
    ConnectionConfig, Credential, DEFAULT_API_VERSION, DEFAULT_TIMEOUT, SshConfig, TlsConfig,
    TransportOptions,
};
