//! Engine endpoint resolution.
//!
//! This module resolves the engine endpoint from multiple sources
//! (explicit configuration, environment variables, platform default) and
//! parses endpoint strings into [`ConnectionConfig`] values. Environment
//! access goes through the `mockable::Env` trait so the fallback chain is
//! testable without touching the process environment.

use camino::Utf8PathBuf;

use crate::config::{ConnectionConfig, SshConfig};
use crate::error::{ConfigError, Result};

/// Environment variable names checked in fallback order after explicit
/// configuration.
const FALLBACK_ENV_VARS: &[&str] = &["CONTAINER_HOST", "PODMAN_HOST", "DOCKER_HOST"];

/// Default engine endpoint when no other source supplies one.
const DEFAULT_ENDPOINT: &str = "unix:///run/podman/podman.sock";

/// Resolves engine endpoints from environment variables.
///
/// The resolver checks a prioritised list of environment variables to find
/// the endpoint when no explicit configuration is provided.
///
/// # Type Parameters
///
/// * `E` - An environment provider implementing the `mockable::Env` trait,
///   allowing for testable environment variable access.
pub struct EndpointResolver<'a, E: mockable::Env> {
    env: &'a E,
}

impl<'a, E: mockable::Env> EndpointResolver<'a, E> {
    /// Creates a new endpoint resolver with the given environment provider.
    #[must_use]
    pub const fn new(env: &'a E) -> Self {
        Self { env }
    }

    /// Resolves the endpoint from fallback environment variables.
    ///
    /// Checks the following environment variables in order:
    /// 1. `CONTAINER_HOST`
    /// 2. `PODMAN_HOST`
    /// 3. `DOCKER_HOST`
    ///
    /// Returns `None` if no fallback variable is set or all are empty.
    #[must_use]
    pub fn resolve_from_env(&self) -> Option<String> {
        FALLBACK_ENV_VARS
            .iter()
            .filter_map(|var_name| self.env.string(var_name))
            .find(|value| !value.is_empty())
    }

    /// Returns the platform default endpoint (the rootful Podman socket).
    #[must_use]
    pub const fn default_endpoint() -> &'static str {
        DEFAULT_ENDPOINT
    }

    /// Resolves a connection configuration from the full fallback chain.
    ///
    /// Resolution order:
    /// 1. `configured` (from the embedding application)
    /// 2. `CONTAINER_HOST`, `PODMAN_HOST`, `DOCKER_HOST`
    /// 3. Platform default socket
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidEndpoint` if the winning endpoint
    /// string cannot be parsed.
    pub fn resolve(&self, configured: Option<&str>) -> Result<ConnectionConfig> {
        let endpoint = configured
            .filter(|value| !value.is_empty())
            .map(String::from)
            .or_else(|| self.resolve_from_env())
            .unwrap_or_else(|| String::from(DEFAULT_ENDPOINT));
        parse_endpoint(&endpoint)
    }
}

/// Parses an endpoint string into a connection configuration.
///
/// Supports the following endpoint formats:
/// - Unix sockets: `unix:///path/to/socket`
/// - SSH destinations: `ssh://user@host:port/path/to/remote/socket`
/// - TCP: `tcp://host:port` (rewritten to HTTP)
/// - HTTP and HTTPS: `http://host:port`, `https://host:port`
/// - Bare paths, treated as Unix sockets: `/run/podman/podman.sock`
///
/// # Errors
///
/// Returns `ConfigError::InvalidEndpoint` if an `ssh://` endpoint names no
/// host or carries an unparseable port.
pub fn parse_endpoint(endpoint: &str) -> Result<ConnectionConfig> {
    if let Some(path) = endpoint.strip_prefix("unix://") {
        return Ok(ConnectionConfig::UnixSocket {
            path: Utf8PathBuf::from(path),
        });
    }
    if let Some(rest) = endpoint.strip_prefix("ssh://") {
        return parse_ssh_endpoint(endpoint, rest);
    }
    if endpoint.starts_with("tcp://") {
        return Ok(ConnectionConfig::Tcp {
            uri: endpoint.replacen("tcp://", "http://", 1),
            tls: None,
        });
    }
    if endpoint.starts_with("http://") || endpoint.starts_with("https://") {
        return Ok(ConnectionConfig::Tcp {
            uri: endpoint.to_owned(),
            tls: None,
        });
    }
    Ok(ConnectionConfig::UnixSocket {
        path: Utf8PathBuf::from(endpoint),
    })
}

/// Parses the remainder of an `ssh://` endpoint.
///
/// The authority keeps any user part (ssh consumes `user@host` whole); an
/// optional `:port` suffix is split off, and everything from the first
/// slash onward names the remote socket path.
fn parse_ssh_endpoint(endpoint: &str, rest: &str) -> Result<ConnectionConfig> {
    let (authority, socket_path) = rest.find('/').map_or((rest, None), |index| {
        let (left, right) = rest.split_at(index);
        (left, Some(right))
    });
    let (destination, port) = match authority.rsplit_once(':') {
        Some((left, port_text)) => {
            let parsed = port_text.parse::<u16>().map_err(|_| ConfigError::InvalidEndpoint {
                endpoint: endpoint.to_owned(),
                reason: format!("invalid port '{port_text}'"),
            })?;
            (left, Some(parsed))
        }
        None => (authority, None),
    };
    if destination.is_empty() {
        return Err(ConfigError::InvalidEndpoint {
            endpoint: endpoint.to_owned(),
            reason: String::from("missing host"),
        }
        .into());
    }
    Ok(ConnectionConfig::Ssh(SshConfig {
        host: destination.to_owned(),
        remote_socket: socket_path.map(Utf8PathBuf::from),
        port,
        identity_file: None,
        extra_options: Vec::new(),
    }))
}

#[cfg(test)]
mod tests {
    #![expect(clippy::expect_used, reason = "expect is standard practice in tests")]

    use mockable::MockEnv;
    use rstest::rstest;

    use super::*;

    /// Creates a `MockEnv` that returns `None` for all variable queries.
    fn empty_env() -> MockEnv {
        let mut env = MockEnv::new();
        env.expect_string().returning(|_| None);
        env
    }

    /// Creates a `MockEnv` with custom mappings for environment variables.
    fn env_with_vars(mappings: &'static [(&'static str, &'static str)]) -> MockEnv {
        let mut env = MockEnv::new();
        env.expect_string().returning(move |key| {
            mappings
                .iter()
                .find(|(name, _)| *name == key)
                .map(|(_, value)| String::from(*value))
        });
        env
    }

    #[rstest]
    fn resolver_returns_none_when_no_env_vars_set() {
        let env = empty_env();
        let resolver = EndpointResolver::new(&env);
        assert!(resolver.resolve_from_env().is_none());
    }

    #[rstest]
    fn resolver_prefers_container_host_over_podman_host() {
        let env = env_with_vars(&[
            ("CONTAINER_HOST", "unix:///container.sock"),
            ("PODMAN_HOST", "unix:///podman.sock"),
        ]);
        let resolver = EndpointResolver::new(&env);
        assert_eq!(
            resolver.resolve_from_env(),
            Some(String::from("unix:///container.sock"))
        );
    }

    #[rstest]
    fn resolver_prefers_podman_host_over_docker_host() {
        let env = env_with_vars(&[
            ("PODMAN_HOST", "unix:///podman.sock"),
            ("DOCKER_HOST", "unix:///docker.sock"),
        ]);
        let resolver = EndpointResolver::new(&env);
        assert_eq!(
            resolver.resolve_from_env(),
            Some(String::from("unix:///podman.sock"))
        );
    }

    #[rstest]
    fn resolver_skips_empty_values() {
        let env = env_with_vars(&[
            ("CONTAINER_HOST", ""),
            ("DOCKER_HOST", "unix:///docker.sock"),
        ]);
        let resolver = EndpointResolver::new(&env);
        assert_eq!(
            resolver.resolve_from_env(),
            Some(String::from("unix:///docker.sock"))
        );
    }

    #[rstest]
    fn resolve_uses_configured_endpoint_first() {
        let env = env_with_vars(&[("CONTAINER_HOST", "unix:///env.sock")]);
        let resolver = EndpointResolver::new(&env);
        let config = resolver
            .resolve(Some("unix:///configured.sock"))
            .expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::UnixSocket {
                path: Utf8PathBuf::from("/configured.sock"),
            }
        );
    }

    #[rstest]
    fn resolve_falls_back_to_default_socket() {
        let env = empty_env();
        let resolver = EndpointResolver::new(&env);
        let config = resolver.resolve(None).expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::UnixSocket {
                path: Utf8PathBuf::from("/run/podman/podman.sock"),
            }
        );
    }

    #[rstest]
    #[case("unix:///run/podman/podman.sock", "/run/podman/podman.sock")]
    #[case("/var/run/docker.sock", "/var/run/docker.sock")]
    fn unix_and_bare_endpoints_parse_to_socket_paths(
        #[case] endpoint: &str,
        #[case] expected: &str,
    ) {
        let config = parse_endpoint(endpoint).expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::UnixSocket {
                path: Utf8PathBuf::from(expected),
            }
        );
    }

    #[rstest]
    fn tcp_endpoint_is_rewritten_to_http() {
        let config = parse_endpoint("tcp://podman-host:8080").expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::Tcp {
                uri: String::from("http://podman-host:8080"),
                tls: None,
            }
        );
    }

    #[rstest]
    fn https_endpoint_is_kept_verbatim() {
        let config = parse_endpoint("https://podman-host:8443").expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::Tcp {
                uri: String::from("https://podman-host:8443"),
                tls: None,
            }
        );
    }

    #[rstest]
    fn ssh_endpoint_parses_destination_port_and_socket() {
        let config = parse_endpoint("ssh://core@podman-host:2222/run/user/1000/podman/podman.sock")
            .expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::Ssh(SshConfig {
                host: String::from("core@podman-host"),
                remote_socket: Some(Utf8PathBuf::from("/run/user/1000/podman/podman.sock")),
                port: Some(2222),
                identity_file: None,
                extra_options: Vec::new(),
            })
        );
    }

    #[rstest]
    fn ssh_endpoint_defaults_port_and_socket_when_absent() {
        let config = parse_endpoint("ssh://podman-host").expect("endpoint should parse");
        assert_eq!(
            config,
            ConnectionConfig::Ssh(SshConfig {
                host: String::from("podman-host"),
                remote_socket: None,
                port: None,
                identity_file: None,
                extra_options: Vec::new(),
            })
        );
    }

    #[rstest]
    fn ssh_endpoint_without_host_is_rejected() {
        let error = parse_endpoint("ssh://").expect_err("endpoint should be rejected");
        assert!(error.to_string().contains("missing host"));
    }

    #[rstest]
    fn ssh_endpoint_with_bad_port_is_rejected() {
        let error =
            parse_endpoint("ssh://podman-host:not-a-port").expect_err("endpoint should be rejected");
        assert!(error.to_string().contains("invalid port"));
    }
}
