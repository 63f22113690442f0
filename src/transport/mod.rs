//! Connection backends and the request executor.
//!
//! One logical contract, "perform one HTTP exchange", is implemented by
//! three materially different connection strategies:
//!
//! - [`UnixBackend`]: a local Unix-domain socket
//! - [`TcpBackend`]: a direct TCP endpoint, plain or TLS
//! - [`SshTunnel`]: an SSH-forwarded remote socket, delegating to a
//!   [`UnixBackend`] once the tunnel is live
//!
//! The backend is selected once, by the tagged [`ConnectionConfig`] value
//! handed to [`connect`], never by runtime type inspection. On top of the
//! contract sits [`PodmanTransport`], the transport-agnostic executor
//! providing the JSON, raw, and streaming request operations, and
//! [`EventStream`], the NDJSON decoder for the engine's event endpoint.

mod client;
mod events;
mod exchange;
mod tcp;
mod tunnel;
mod uds;

pub use client::{JsonResponse, PodmanTransport, extract_error_message};
pub use events::EventStream;
pub use exchange::{ByteStream, Exchange, ExchangeRequest, ExchangeResponse, ResponseBody};
pub use tcp::TcpBackend;
pub use tunnel::SshTunnel;
pub use uds::UnixBackend;

use crate::config::{ConnectionConfig, TransportOptions};
use crate::error::Result;

/// Builds a transport for the given connection configuration.
///
/// Unix-socket and TCP transports are constructed eagerly but connect
/// lazily on the first exchange; the SSH variant spawns its tunnel here
/// and only returns once the forwarded socket is live.
///
/// # Errors
///
/// Returns `ConnectionError::TlsSetup` when TCP TLS material cannot be
/// loaded, and the tunnel-tier connection errors when an SSH tunnel
/// cannot be established.
pub async fn connect(
    connection: &ConnectionConfig,
    options: &TransportOptions,
) -> Result<PodmanTransport> {
    let backend: Box<dyn Exchange> = match connection {
        ConnectionConfig::UnixSocket { path } => {
            Box::new(UnixBackend::new(path.as_std_path(), &options.api_version))
        }
        ConnectionConfig::Tcp { uri, tls } => {
            Box::new(TcpBackend::new(uri, tls.as_ref(), &options.api_version)?)
        }
        ConnectionConfig::Ssh(ssh) => {
            Box::new(SshTunnel::connect(ssh, &options.api_version).await?)
        }
    };
    Ok(PodmanTransport::new(backend, options))
}
