//! Configuration data types for the podlink transport.

use std::fmt;
use std::time::Duration;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// The libpod API version used when the caller does not override it.
pub const DEFAULT_API_VERSION: &str = "5.0.0";

/// The request deadline applied to non-streaming calls by default.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// How a transport reaches the container engine.
///
/// The connection kind is fixed at construction; the transport never
/// inspects it again at runtime. Each variant maps to one backend:
/// a Unix-domain socket, a TCP (optionally TLS) endpoint, or an SSH
/// tunnel that forwards a remote Unix socket to a private local one.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionConfig {
    /// A local Unix-domain socket, e.g. `/run/podman/podman.sock`.
    UnixSocket {
        /// Filesystem path of the engine socket.
        path: Utf8PathBuf,
    },

    /// A direct TCP endpoint, plain or TLS depending on the URI scheme
    /// and the presence of TLS material.
    Tcp {
        /// Base URI of the engine, e.g. `http://podman-host:8080`.
        /// Trailing slashes are stripped before use.
        uri: String,
        /// Optional TLS material routing exchanges through a dedicated
        /// TLS context instead of the default one.
        #[serde(default)]
        tls: Option<TlsConfig>,
    },

    /// A remote engine reached through an SSH-forwarded Unix socket.
    Ssh(SshConfig),
}

/// TLS material for a TCP connection.
///
/// All paths refer to PEM files. The CA bundle replaces the built-in
/// trust roots when present; the client certificate and key must be
/// supplied together or not at all.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct TlsConfig {
    /// Path to a CA certificate bundle used to verify the engine.
    #[serde(default)]
    pub ca_file: Option<Utf8PathBuf>,

    /// Path to the client certificate presented to the engine.
    #[serde(default)]
    pub cert_file: Option<Utf8PathBuf>,

    /// Path to the private key matching `cert_file`.
    #[serde(default)]
    pub key_file: Option<Utf8PathBuf>,
}

/// Parameters for an SSH-tunnelled connection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct SshConfig {
    /// The SSH destination, optionally including a user part,
    /// e.g. `core@podman-host`.
    pub host: String,

    /// Path of the engine socket on the remote host. Defaults to the
    /// standard rootful Podman socket when absent.
    #[serde(default)]
    pub remote_socket: Option<Utf8PathBuf>,

    /// SSH port. Defaults to 22 when absent.
    #[serde(default)]
    pub port: Option<u16>,

    /// Identity file passed to `ssh -i`.
    #[serde(default)]
    pub identity_file: Option<Utf8PathBuf>,

    /// Extra arguments appended to the `ssh` invocation before the
    /// destination host.
    #[serde(default)]
    pub extra_options: Vec<String>,
}

impl SshConfig {
    /// Returns whether the caller already configured host-key handling.
    ///
    /// When this is false the tunnel adds `StrictHostKeyChecking=accept-new`
    /// so first contact with a host does not hang on an interactive prompt.
    #[must_use]
    pub fn has_host_key_options(&self) -> bool {
        self.extra_options.iter().any(|option| {
            option.contains("StrictHostKeyChecking") || option.contains("UserKnownHostsFile")
        })
    }
}

/// Options shared by every connection kind.
#[derive(Debug, Clone, SmartDefault)]
pub struct TransportOptions {
    /// The libpod API version segment used in request paths.
    #[default(String::from(DEFAULT_API_VERSION))]
    pub api_version: String,

    /// Deadline applied to non-streaming requests. Streaming requests
    /// deliberately carry no deadline.
    #[default(DEFAULT_TIMEOUT)]
    pub timeout: Duration,

    /// Registry credential exposed to calling code via
    /// [`auth_header`](Credential::auth_header). The transport never
    /// inspects the decoded value.
    pub credential: Option<Credential>,
}

/// A registry credential in one of the engine's two accepted shapes.
///
/// Created once at transport construction and immutable afterwards; the
/// transport only ever base64-encodes the JSON-serialised form into a
/// header value. It is attached by calling code, never automatically.
#[derive(Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(untagged)]
pub enum Credential {
    /// Username and password.
    Basic {
        /// The registry account name.
        username: String,
        /// The registry account password.
        password: String,
    },

    /// An opaque identity token issued by the registry.
    IdentityToken {
        /// The token value.
        token: String,
    },
}

impl Credential {
    /// Encodes the credential as the engine's `X-Registry-Auth` header
    /// value: base64 over the JSON document.
    #[must_use]
    pub fn auth_header(&self) -> String {
        let document = match self {
            Self::Basic { username, password } => serde_json::json!({
                "username": username,
                "password": password,
            }),
            Self::IdentityToken { token } => serde_json::json!({
                "identitytoken": token,
            }),
        };
        BASE64.encode(document.to_string())
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
            Self::IdentityToken { .. } => f
                .debug_struct("IdentityToken")
                .field("token", &"<redacted>")
                .finish(),
        }
    }
}

#[cfg(test)]
mod tests {
    #![expect(
        clippy::expect_used,
        clippy::indexing_slicing,
        reason = "expect and literal indexing are standard practice in tests"
    )]

    use base64::Engine as _;
    use base64::engine::general_purpose::STANDARD;
    use rstest::rstest;

    use super::*;

    #[rstest]
    fn transport_options_default_to_fixed_version_and_timeout() {
        let options = TransportOptions::default();
        assert_eq!(options.api_version, DEFAULT_API_VERSION);
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert!(options.credential.is_none());
    }

    #[rstest]
    fn basic_credential_encodes_username_and_password() {
        let credential = Credential::Basic {
            username: String::from("alice"),
            password: String::from("hunter2"),
        };
        let decoded = STANDARD
            .decode(credential.auth_header())
            .expect("header should be valid base64");
        let value: serde_json::Value =
            serde_json::from_slice(&decoded).expect("decoded header should be JSON");
        assert_eq!(value["username"], "alice");
        assert_eq!(value["password"], "hunter2");
    }

    #[rstest]
    fn token_credential_encodes_identity_token() {
        let credential = Credential::IdentityToken {
            token: String::from("opaque-token"),
        };
        let decoded = STANDARD
            .decode(credential.auth_header())
            .expect("header should be valid base64");
        let value: serde_json::Value =
            serde_json::from_slice(&decoded).expect("decoded header should be JSON");
        assert_eq!(value["identitytoken"], "opaque-token");
    }

    #[rstest]
    fn credential_debug_redacts_secrets() {
        let credential = Credential::Basic {
            username: String::from("alice"),
            password: String::from("hunter2"),
        };
        let rendered = format!("{credential:?}");
        assert!(rendered.contains("alice"));
        assert!(!rendered.contains("hunter2"));
    }

    #[rstest]
    #[case(vec![], false)]
    #[case(vec![String::from("-o"), String::from("StrictHostKeyChecking=yes")], true)]
    #[case(vec![String::from("-o"), String::from("UserKnownHostsFile=/dev/null")], true)]
    #[case(vec![String::from("-o"), String::from("Compression=yes")], false)]
    fn host_key_options_detected_in_extra_options(
        #[case] extra_options: Vec<String>,
        #[case] expected: bool,
    ) {
        let config = SshConfig {
            host: String::from("podman-host"),
            remote_socket: None,
            port: None,
            identity_file: None,
            extra_options,
        };
        assert_eq!(config.has_host_key_options(), expected);
    }

    #[rstest]
    fn connection_config_round_trips_through_serde() {
        let config = ConnectionConfig::Ssh(SshConfig {
            host: String::from("core@podman-host"),
            remote_socket: Some(Utf8PathBuf::from("/run/user/1000/podman/podman.sock")),
            port: Some(2222),
            identity_file: None,
            extra_options: Vec::new(),
        });
        let encoded = serde_json::to_string(&config).expect("config should serialise");
        let decoded: ConnectionConfig =
            serde_json::from_str(&encoded).expect("config should deserialise");
        assert_eq!(decoded, config);
    }
}
