//! Client-side transport for the Podman libpod HTTP API.
//!
//! `podlink` unifies three heterogeneous ways of reaching a container
//! engine (a local Unix-domain socket, a direct TCP/TLS endpoint, and an
//! SSH tunnel forwarding a remote socket) behind one asynchronous
//! request/response contract, plus a streaming decoder for the engine's
//! newline-delimited JSON event log.
//!
//! Resource wrappers (containers, images, pods) live above this crate:
//! they map API calls onto the transport's three operations and interpret
//! status codes themselves. The transport carries no resource semantics
//! and performs no retries.
//!
//! # Modules
//!
//! - [`config`]: Connection configuration, credentials, and endpoint
//!   resolution from environment variables
//! - [`transport`]: The connection backends, the request executor, and
//!   the event stream decoder
//! - [`error`]: Semantic error types for the transport

pub mod config;
pub mod error;
pub mod transport;
