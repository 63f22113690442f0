//! SSH tunnel connection backend.
//!
//! Spawns and supervises an external `ssh` process that forwards a local
//! Unix socket to the engine socket on a remote host, then delegates every
//! exchange to a [`UnixBackend`] bound to the local socket once the tunnel
//! is confirmed live.
//!
//! Construction is a small state machine: spawn the process, then race
//! "the local socket file exists" (polled at a fixed interval) against
//! "the process exited" under a fixed deadline. Whichever completes first
//! decides between the ready and failed terminal states. On failure the
//! process is terminated, its stderr drained under its own cap, and the
//! private workspace removed: neither the process nor the directory ever
//! survives a failed construction.

use std::ffi::OsString;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use camino::Utf8Path;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;

use crate::config::SshConfig;
use crate::error::{ConnectionError, Result};
use crate::transport::exchange::{Exchange, ExchangeRequest, ExchangeResponse};
use crate::transport::uds::UnixBackend;

/// How long the forwarded socket may take to appear before the tunnel is
/// declared failed.
const READY_DEADLINE: Duration = Duration::from_secs(10);

/// Interval between checks for the forwarded socket file.
const SOCKET_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Cap on draining the tunnel process's stderr after a failure.
const STDERR_DRAIN_CAP: Duration = Duration::from_secs(5);

/// Failure detail used when the process produced no stderr output.
const SOCKET_TIMEOUT_MESSAGE: &str = "socket not created within 10s";

/// Remote engine socket used when the configuration names none.
const DEFAULT_REMOTE_SOCKET: &str = "/run/podman/podman.sock";

/// SSH port used when the configuration names none.
const DEFAULT_SSH_PORT: u16 = 22;

/// File name of the forwarded socket inside the private workspace.
const LOCAL_SOCKET_NAME: &str = "podman.sock";

/// Outcome of racing socket appearance against process exit.
enum RaceOutcome {
    /// The forwarded socket appeared before the deadline.
    SocketReady,
    /// The tunnel process exited before the socket appeared.
    Exited,
    /// The deadline elapsed with neither event.
    Deadline,
}

/// Instance-scoped tunnel state, set up once at construction and torn
/// down exactly once by `close()`.
struct TunnelState {
    child: Child,
    workspace: tempfile::TempDir,
}

/// Connection backend for an SSH-forwarded remote engine socket.
pub struct SshTunnel {
    inner: UnixBackend,
    host: String,
    state: Mutex<Option<TunnelState>>,
}

impl SshTunnel {
    /// Spawns the tunnel process and waits for the forwarded socket.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionError::Workspace` if the private workspace
    /// cannot be created, `ConnectionError::CommandUnavailable` if the
    /// `ssh` command cannot be started at all, and
    /// `ConnectionError::TunnelFailed` if the socket does not appear
    /// within the readiness deadline or the process exits first. Every
    /// failure path removes the workspace and reaps the process.
    pub async fn connect(config: &SshConfig, api_version: &str) -> Result<Self> {
        let workspace = tempfile::tempdir().map_err(|error| ConnectionError::Workspace {
            message: error.to_string(),
        })?;
        let local_socket = workspace.path().join(LOCAL_SOCKET_NAME);

        let mut command = Command::new("ssh");
        command.args(tunnel_args(config, &local_socket));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(
            host = %config.host,
            socket = %local_socket.display(),
            "spawning ssh tunnel"
        );
        let mut child = match command.spawn() {
            Ok(spawned) => spawned,
            Err(error) => {
                // workspace is dropped here, removing the directory
                return Err(ConnectionError::CommandUnavailable {
                    host: config.host.clone(),
                    message: error.to_string(),
                }
                .into());
            }
        };

        match await_socket(&mut child, &local_socket).await {
            RaceOutcome::SocketReady => {
                tracing::debug!(host = %config.host, "ssh tunnel ready");
                Ok(Self {
                    inner: UnixBackend::new(local_socket, api_version),
                    host: config.host.clone(),
                    state: Mutex::new(Some(TunnelState { child, workspace })),
                })
            }
            RaceOutcome::Exited | RaceOutcome::Deadline => {
                let detail = collect_failure_detail(&mut child).await;
                tracing::warn!(host = %config.host, detail = %detail, "ssh tunnel failed");
                Err(ConnectionError::TunnelFailed {
                    host: config.host.clone(),
                    message: detail,
                }
                .into())
            }
        }
    }

    /// The local path the remote socket is forwarded to, while the tunnel
    /// is open.
    #[must_use]
    pub fn local_socket(&self) -> &Path {
        self.inner.socket_path()
    }
}

#[async_trait]
impl Exchange for SshTunnel {
    async fn perform(&self, request: ExchangeRequest) -> Result<ExchangeResponse> {
        self.inner.perform(request).await
    }

    async fn close(&self) {
        let mut guard = self.state.lock().await;
        let Some(mut state) = guard.take() else {
            return;
        };
        self.inner.close().await;
        state.child.start_kill().ok();
        state.child.wait().await.ok();
        // Directory removal is best-effort and must not raise.
        if let Err(error) = state.workspace.close() {
            tracing::warn!(host = %self.host, error = %error, "failed to remove tunnel workspace");
        }
        tracing::debug!(host = %self.host, "ssh tunnel closed");
    }
}

/// Builds the `ssh` argument list for the configured destination.
///
/// Order: forwarding-only mode, the socket forward specification, the
/// destination port, host-key acceptance unless the caller configured
/// host-key handling, forced exit-on-forward-failure, the identity file
/// when given, any caller-supplied extra options, and the destination
/// host last.
fn tunnel_args(config: &SshConfig, local_socket: &Path) -> Vec<OsString> {
    let remote_socket = config
        .remote_socket
        .as_deref()
        .map_or(DEFAULT_REMOTE_SOCKET, Utf8Path::as_str);
    let port = config.port.unwrap_or(DEFAULT_SSH_PORT);

    let mut args: Vec<OsString> = vec![
        OsString::from("-N"),
        OsString::from("-L"),
        OsString::from(format!("{}:{remote_socket}", local_socket.display())),
        OsString::from("-p"),
        OsString::from(port.to_string()),
    ];
    if !config.has_host_key_options() {
        args.push(OsString::from("-o"));
        args.push(OsString::from("StrictHostKeyChecking=accept-new"));
    }
    args.push(OsString::from("-o"));
    args.push(OsString::from("ExitOnForwardFailure=yes"));
    if let Some(identity) = &config.identity_file {
        args.push(OsString::from("-i"));
        args.push(OsString::from(identity.as_std_path()));
    }
    args.extend(config.extra_options.iter().map(OsString::from));
    args.push(OsString::from(&config.host));
    args
}

/// Races socket appearance against process exit under the readiness
/// deadline.
async fn await_socket(child: &mut Child, socket: &Path) -> RaceOutcome {
    let raced = tokio::time::timeout(READY_DEADLINE, async {
        tokio::select! {
            () = poll_for_socket(socket) => RaceOutcome::SocketReady,
            _ = child.wait() => RaceOutcome::Exited,
        }
    })
    .await;
    raced.unwrap_or(RaceOutcome::Deadline)
}

/// Completes once the socket file exists.
async fn poll_for_socket(socket: &Path) {
    loop {
        if tokio::fs::try_exists(socket).await.unwrap_or(false) {
            return;
        }
        tokio::time::sleep(SOCKET_POLL_INTERVAL).await;
    }
}

/// Terminates a failed tunnel process and captures its stderr.
///
/// The drain is capped separately from the readiness deadline; whichever
/// of "stream ended" or "cap elapsed" occurs first wins. The process is
/// reaped afterwards so no zombie remains.
async fn collect_failure_detail(child: &mut Child) -> String {
    child.start_kill().ok();
    let stderr_text = match child.stderr.take() {
        Some(mut stderr) => {
            let mut captured = Vec::new();
            drop(tokio::time::timeout(STDERR_DRAIN_CAP, stderr.read_to_end(&mut captured)).await);
            String::from_utf8_lossy(&captured).trim().to_owned()
        }
        None => String::new(),
    };
    child.wait().await.ok();
    if stderr_text.is_empty() {
        String::from(SOCKET_TIMEOUT_MESSAGE)
    } else {
        stderr_text
    }
}
