//! TCP and TLS connection backend.
//!
//! The base URL is the configured URI with trailing slashes stripped,
//! concatenated with the versioned base path. When TLS material is
//! supplied, exchanges are routed through a dedicated rustls context
//! built from the caller's PEM files; otherwise the URI scheme decides
//! between plaintext HTTP and TLS against the built-in webpki roots.

use std::fs::File;
use std::io::BufReader;

use async_trait::async_trait;
use bytes::Bytes;
use camino::Utf8Path;
use http::Uri;
use http_body_util::Full;
use hyper_rustls::{HttpsConnector, HttpsConnectorBuilder};
use hyper_util::client::legacy::Client;
use hyper_util::client::legacy::connect::HttpConnector;
use hyper_util::rt::TokioExecutor;
use rustls::pki_types::{CertificateDer, PrivateKeyDer};
use rustls::{ClientConfig, RootCertStore};

use crate::config::TlsConfig;
use crate::error::{ConnectionError, Result};
use crate::transport::exchange::{
    Exchange, ExchangeRequest, ExchangeResponse, dispatch, versioned_base_path,
};

/// Connection backend for direct TCP and TLS endpoints.
pub struct TcpBackend {
    client: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    base_url: String,
}

impl TcpBackend {
    /// Creates a backend for the given base URI.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::TlsSetup` if the supplied TLS material
    /// cannot be loaded or assembled into a client configuration.
    pub fn new(uri: &str, tls: Option<&TlsConfig>, api_version: &str) -> Result<Self> {
        let tls_config = match tls {
            Some(material) => client_tls_config(material)?,
            None => default_tls_config(),
        };
        let connector = HttpsConnectorBuilder::new()
            .with_tls_config(tls_config)
            .https_or_http()
            .enable_http1()
            .build();
        let client = Client::builder(TokioExecutor::new()).build(connector);
        let base_url = format!(
            "{}{}",
            uri.trim_end_matches('/'),
            versioned_base_path(api_version)
        );
        Ok(Self { client, base_url })
    }

    /// The versioned base URL requests are issued against.
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }
}

#[async_trait]
impl Exchange for TcpBackend {
    async fn perform(&self, request: ExchangeRequest) -> Result<ExchangeResponse> {
        let url = format!("{}{}", self.base_url, request.path);
        let uri: Uri = url.parse().map_err(|error: http::uri::InvalidUri| {
            ConnectionError::InvalidUrl {
                url,
                message: error.to_string(),
            }
        })?;
        dispatch(&self.client, uri, request).await
    }

    async fn close(&self) {
        // Pooled connections are released when the client drops.
    }
}

/// Builds a rustls client configuration from caller-supplied PEM material.
fn client_tls_config(material: &TlsConfig) -> Result<ClientConfig> {
    let mut roots = RootCertStore::empty();
    match &material.ca_file {
        Some(path) => {
            for certificate in load_certificates(path)? {
                roots.add(certificate).map_err(|error| ConnectionError::TlsSetup {
                    message: format!("{path}: {error}"),
                })?;
            }
        }
        None => {
            roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        }
    }
    let builder = ClientConfig::builder().with_root_certificates(roots);
    match (&material.cert_file, &material.key_file) {
        (Some(cert_path), Some(key_path)) => builder
            .with_client_auth_cert(load_certificates(cert_path)?, load_private_key(key_path)?)
            .map_err(|error| {
                ConnectionError::TlsSetup {
                    message: format!("client certificate rejected: {error}"),
                }
                .into()
            }),
        (None, None) => Ok(builder.with_no_client_auth()),
        _ => Err(ConnectionError::TlsSetup {
            message: String::from("client certificate and key must be supplied together"),
        }
        .into()),
    }
}

/// Builds the default rustls configuration against the webpki roots.
fn default_tls_config() -> ClientConfig {
    let mut roots = RootCertStore::empty();
    roots.extend(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
    ClientConfig::builder()
        .with_root_certificates(roots)
        .with_no_client_auth()
}

/// Loads every certificate from a PEM file.
fn load_certificates(path: &Utf8Path) -> Result<Vec<CertificateDer<'static>>> {
    let file = File::open(path.as_std_path()).map_err(|error| ConnectionError::TlsSetup {
        message: format!("{path}: {error}"),
    })?;
    let mut reader = BufReader::new(file);
    rustls_pemfile::certs(&mut reader)
        .collect::<std::io::Result<Vec<_>>>()
        .map_err(|error| {
            ConnectionError::TlsSetup {
                message: format!("{path}: {error}"),
            }
            .into()
        })
}

/// Loads the first private key from a PEM file.
fn load_private_key(path: &Utf8Path) -> Result<PrivateKeyDer<'static>> {
    let file = File::open(path.as_std_path()).map_err(|error| ConnectionError::TlsSetup {
        message: format!("{path}: {error}"),
    })?;
    let mut reader = BufReader::new(file);
    let key = rustls_pemfile::private_key(&mut reader).map_err(|error| {
        ConnectionError::TlsSetup {
            message: format!("{path}: {error}"),
        }
    })?;
    key.ok_or_else(|| {
        ConnectionError::TlsSetup {
            message: format!("{path}: no private key found"),
        }
        .into()
    })
}
