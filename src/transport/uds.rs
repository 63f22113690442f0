//! Unix-domain-socket connection backend.
//!
//! Routes every exchange through a fixed local socket path. The URL host
//! is a placeholder encoding of the socket path (the path itself is the
//! real addressing information), which is exactly how the engine expects
//! to be reached on a local machine.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use http::Uri;
use http_body_util::Full;
use hyper_util::client::legacy::Client;
use hyper_util::rt::TokioExecutor;
use hyperlocal::UnixConnector;

use crate::error::Result;
use crate::transport::exchange::{
    Exchange, ExchangeRequest, ExchangeResponse, dispatch, versioned_base_path,
};

/// Connection backend for a local Unix-domain socket.
pub struct UnixBackend {
    client: Client<UnixConnector, Full<Bytes>>,
    socket_path: PathBuf,
    base_path: String,
}

impl UnixBackend {
    /// Creates a backend bound to the given socket path.
    #[must_use]
    pub fn new(socket_path: impl Into<PathBuf>, api_version: &str) -> Self {
        let client = Client::builder(TokioExecutor::new()).build(UnixConnector);
        Self {
            client,
            socket_path: socket_path.into(),
            base_path: versioned_base_path(api_version),
        }
    }

    /// The socket path this backend routes exchanges through.
    #[must_use]
    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }
}

#[async_trait]
impl Exchange for UnixBackend {
    async fn perform(&self, request: ExchangeRequest) -> Result<ExchangeResponse> {
        let resource = format!("{}{}", self.base_path, request.path);
        let uri: Uri = hyperlocal::Uri::new(&self.socket_path, &resource).into();
        dispatch(&self.client, uri, request).await
    }

    async fn close(&self) {
        // Pooled connections are released when the client drops; there is
        // no separate teardown step for a Unix-socket pool.
    }
}
