//! SSH transport used to bootstrap new servers.
//!
//! [`SshConnector`] and [`SshSession`] are the seams the bootstrapper and
//! the package-manager probes work against. [`Ssh2Connector`] implements
//! them with libssh2; its blocking calls run on the blocking thread pool.

use crate::error::{ProvisionError, Result};
use async_trait::async_trait;
use std::io::Read;
use std::net::{IpAddr, SocketAddr, TcpStream};
use std::sync::Arc;
use std::time::Duration;

/// Where and as whom to log in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub addr: SocketAddr,
    pub user: String,
}

impl SshTarget {
    pub fn new(ip: IpAddr, port: u16, user: impl Into<String>) -> Self {
        Self {
            addr: SocketAddr::new(ip, port),
            user: user.into(),
        }
    }
}

/// Result of a remote command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_status: i32,
    pub stdout: String,
}

impl CommandOutput {
    /// Check if the command succeeded (exit status 0).
    pub fn success(&self) -> bool {
        self.exit_status == 0
    }
}

/// An authenticated SSH session.
#[async_trait]
pub trait SshSession: Send + Sync {
    /// Run `command` and collect its stdout and exit status.
    async fn exec(&self, command: &str) -> Result<CommandOutput>;
}

/// Opens password-authenticated SSH sessions.
#[async_trait]
pub trait SshConnector: Send + Sync {
    async fn connect(&self, target: &SshTarget, password: &str) -> Result<Box<dyn SshSession>>;
}

/// Default limit for the TCP connect, handshake and authentication.
pub const DEFAULT_SSH_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Default limit for any single blocking call while a command runs.
pub const DEFAULT_SSH_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

/// libssh2-backed connector.
#[derive(Debug, Clone)]
pub struct Ssh2Connector {
    connect_timeout: Duration,
    command_timeout: Duration,
}

impl Default for Ssh2Connector {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_SSH_CONNECT_TIMEOUT,
            command_timeout: DEFAULT_SSH_COMMAND_TIMEOUT,
        }
    }
}

impl Ssh2Connector {
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            ..Self::default()
        }
    }

    /// Bound each read or write of a running command, so a wedged channel
    /// surfaces as an error instead of blocking forever.
    pub fn with_command_timeout(mut self, command_timeout: Duration) -> Self {
        self.command_timeout = command_timeout;
        self
    }
}

#[async_trait]
impl SshConnector for Ssh2Connector {
    async fn connect(&self, target: &SshTarget, password: &str) -> Result<Box<dyn SshSession>> {
        tracing::debug!(addr = %target.addr, user = %target.user, "Opening SSH session");

        let target = target.clone();
        let password = password.to_string();
        let (connect_timeout, command_timeout) = (self.connect_timeout, self.command_timeout);
        let session = tokio::task::spawn_blocking(move || {
            open_session(&target, &password, connect_timeout, command_timeout)
        })
            .await
            .map_err(|e| ProvisionError::SshBootstrap(format!("SSH connect task failed: {e}")))??;

        Ok(Box::new(Ssh2Session {
            session: Arc::new(session),
        }))
    }
}

fn open_session(
    target: &SshTarget,
    password: &str,
    timeout: Duration,
    command_timeout: Duration,
) -> Result<ssh2::Session> {
    let tcp = TcpStream::connect_timeout(&target.addr, timeout).map_err(|e| {
        ProvisionError::SshBootstrap(format!("cannot connect to {}: {e}", target.addr))
    })?;

    let mut session = ssh2::Session::new()?;
    session.set_tcp_stream(tcp);
    session.set_timeout(timeout_millis(timeout));
    session.handshake()?;
    session.userauth_password(&target.user, password)?;
    if !session.authenticated() {
        return Err(ProvisionError::SshBootstrap(format!(
            "password authentication rejected for {}@{}",
            target.user, target.addr
        )));
    }
    session.set_timeout(timeout_millis(command_timeout));
    Ok(session)
}

/// libssh2 timeout in milliseconds; 0 would mean "wait forever", so clamp to 1.
fn timeout_millis(timeout: Duration) -> u32 {
    u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX).max(1)
}

struct Ssh2Session {
    session: Arc<ssh2::Session>,
}

#[async_trait]
impl SshSession for Ssh2Session {
    async fn exec(&self, command: &str) -> Result<CommandOutput> {
        let session = Arc::clone(&self.session);
        let command = command.to_string();
        tokio::task::spawn_blocking(move || run_command(&session, &command))
            .await
            .map_err(|e| ProvisionError::SshBootstrap(format!("SSH exec task failed: {e}")))?
    }
}

fn run_command(session: &ssh2::Session, command: &str) -> Result<CommandOutput> {
    let mut channel = session.channel_session()?;
    channel.exec(command)?;

    let mut stdout = String::new();
    channel
        .read_to_string(&mut stdout)
        .map_err(|e| ProvisionError::SshBootstrap(format!("reading command output: {e}")))?;
    channel.wait_close()?;
    let exit_status = channel.exit_status()?;

    tracing::trace!(exit_status, stdout_len = stdout.len(), "Remote command finished");
    Ok(CommandOutput {
        exit_status,
        stdout,
    })
}

/// Quote `value` for a POSIX shell.
pub(crate) fn shell_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}
