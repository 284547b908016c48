//! Readiness probes: blocking, retrying checks for external conditions.
//!
//! Every wait goes through [`Prober::poll_until`], which applies one
//! [`RetryPolicy`] and one cancellation token. The default policy polls every
//! 5 seconds forever; callers that need bounded latency set a deadline or an
//! attempt limit.

use crate::error::{ProvisionError, Result};
use crate::ssh::SshSession;
use async_trait::async_trait;
use dockyard_cloud::CloudApi;
use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Default delay between two checks.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default per-attempt TCP connect timeout.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default age the apt cache must reach before the package manager counts as idle.
pub const DEFAULT_APT_QUIET_PERIOD: Duration = Duration::from_secs(30);

// ============================================================================
// Retry policy
// ============================================================================

/// How often and how long to retry a readiness check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts
    pub interval: Duration,
    /// Give up after this many attempts (None = unlimited)
    pub max_attempts: Option<u32>,
    /// Give up once this much time has passed (None = unlimited)
    pub deadline: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_attempts: None,
            deadline: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = Some(attempts);
        self
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }

    fn exhausted(&self, attempts: u32, elapsed: Duration) -> bool {
        self.max_attempts.is_some_and(|max| attempts >= max)
            || self.deadline.is_some_and(|deadline| elapsed >= deadline)
    }
}

// ============================================================================
// Pluggable checks
// ============================================================================

/// Checks whether a TCP port accepts connections.
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_open(&self, addr: SocketAddr) -> bool;
}

/// Plain TCP connect with a per-attempt timeout.
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    connect_timeout: Duration,
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self {
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

impl TcpPortProbe {
    pub fn with_connect_timeout(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_open(&self, addr: SocketAddr) -> bool {
        matches!(
            tokio::time::timeout(self.connect_timeout, TcpStream::connect(addr)).await,
            Ok(Ok(_))
        )
    }
}

/// Decides whether the remote package manager has finished first-boot work.
///
/// Two heuristics are in use in the wild and they disagree, so the choice is
/// left to the caller. [`AptCacheQuiet`] is the default.
#[async_trait]
pub trait PackageManagerProbe: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    async fn is_idle(&self, session: &dyn SshSession) -> Result<bool>;
}

/// Idle once `/var/cache/apt` has not been modified for longer than `quiet_period`.
#[derive(Debug, Clone)]
pub struct AptCacheQuiet {
    pub quiet_period: Duration,
}

impl Default for AptCacheQuiet {
    fn default() -> Self {
        Self {
            quiet_period: DEFAULT_APT_QUIET_PERIOD,
        }
    }
}

impl AptCacheQuiet {
    /// Seconds since the apt cache directory last changed, by the remote clock.
    pub const AGE_COMMAND: &'static str = "echo $(( $(date +%s) - $(stat -c %Y /var/cache/apt/) ))";
}

#[async_trait]
impl PackageManagerProbe for AptCacheQuiet {
    fn name(&self) -> &'static str {
        "apt-cache"
    }

    async fn is_idle(&self, session: &dyn SshSession) -> Result<bool> {
        let output = session.exec(Self::AGE_COMMAND).await?;
        let age: i64 = output.stdout.trim().parse().map_err(|_| {
            ProvisionError::SshBootstrap(format!(
                "unexpected apt cache age output: {:?}",
                output.stdout.trim()
            ))
        })?;
        let quiet = i64::try_from(self.quiet_period.as_secs()).unwrap_or(i64::MAX);
        tracing::debug!(age_secs = age, quiet_secs = quiet, "Checked apt cache age");
        Ok(age > quiet)
    }
}

/// Idle once no process with the given name is running.
#[derive(Debug, Clone)]
pub struct ProcessAbsent {
    pub process: String,
}

impl Default for ProcessAbsent {
    fn default() -> Self {
        Self {
            process: "aptitude".into(),
        }
    }
}

impl ProcessAbsent {
    fn command(&self) -> String {
        format!(
            "ps -C {} >/dev/null && echo 1 || echo 0",
            crate::ssh::shell_quote(&self.process)
        )
    }
}

#[async_trait]
impl PackageManagerProbe for ProcessAbsent {
    fn name(&self) -> &'static str {
        "process"
    }

    async fn is_idle(&self, session: &dyn SshSession) -> Result<bool> {
        let output = session.exec(&self.command()).await?;
        Ok(output.stdout.trim() == "0")
    }
}

// ============================================================================
// Prober
// ============================================================================

/// Resolves once `at` has passed; never resolves without a deadline.
async fn deadline_reached(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

/// Runs readiness checks under a retry policy and a cancellation token.
#[derive(Debug, Clone, Default)]
pub struct Prober {
    policy: RetryPolicy,
    cancel: CancellationToken,
}

impl Prober {
    pub fn new(policy: RetryPolicy, cancel: CancellationToken) -> Self {
        Self { policy, cancel }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Run `check` until it returns `true`.
    ///
    /// Returns the number of attempts made. An error from `check` aborts the
    /// wait; checks that should tolerate transient failures must map them to
    /// `Ok(false)` themselves.
    ///
    /// # Errors
    /// [`ProvisionError::Timeout`] when the policy is exhausted,
    /// [`ProvisionError::Cancelled`] when the token fires.
    pub async fn poll_until<F, Fut>(&self, what: &str, mut check: F) -> Result<u32>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool>>,
    {
        let start = Instant::now();
        let deadline_at = self.policy.deadline.map(|d| start + d);
        let mut attempts = 0u32;

        loop {
            if self.cancel.is_cancelled() {
                return Err(ProvisionError::Cancelled(what.to_string()));
            }

            attempts += 1;
            // A check that completes wins over a deadline expiring at the same instant.
            let ready = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled(what.to_string()));
                }
                ready = check() => ready?,
                _ = deadline_reached(deadline_at) => {
                    tracing::warn!(what, attempts, "Giving up waiting, check did not return in time");
                    return Err(ProvisionError::Timeout {
                        what: what.to_string(),
                        attempts,
                    });
                }
            };

            if ready {
                tracing::debug!(
                    what,
                    attempts,
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "Condition reached"
                );
                return Ok(attempts);
            }

            if self.policy.exhausted(attempts, start.elapsed()) {
                tracing::warn!(what, attempts, "Giving up waiting");
                return Err(ProvisionError::Timeout {
                    what: what.to_string(),
                    attempts,
                });
            }

            tracing::debug!(
                what,
                attempts,
                retry_in_secs = self.policy.interval.as_secs(),
                "Not ready yet"
            );
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    return Err(ProvisionError::Cancelled(what.to_string()));
                }
                _ = deadline_reached(deadline_at) => {
                    tracing::warn!(what, attempts, "Giving up waiting");
                    return Err(ProvisionError::Timeout {
                        what: what.to_string(),
                        attempts,
                    });
                }
                _ = tokio::time::sleep(self.policy.interval) => {}
            }
        }
    }

    /// Wait until the server reports `target` as its status.
    pub async fn wait_for_server_state(
        &self,
        api: &dyn CloudApi,
        id: &str,
        target: &str,
    ) -> Result<u32> {
        let what = format!("server {id} to reach {target}");
        self.poll_until(&what, move || async move {
            let server = api.get_server(id).await?;
            tracing::trace!(server_id = %id, state = %server.status.state, "Polled server status");
            Ok::<_, ProvisionError>(server.status.state == target)
        })
        .await
    }

    /// Wait until the firewall policy reports `target` as its state.
    pub async fn wait_for_firewall_state(
        &self,
        api: &dyn CloudApi,
        id: &str,
        target: &str,
    ) -> Result<u32> {
        let what = format!("firewall policy {id} to reach {target}");
        self.poll_until(&what, move || async move {
            let policy = api.get_firewall_policy(id).await?;
            tracing::trace!(firewall_id = %id, state = %policy.state, "Polled firewall status");
            Ok::<_, ProvisionError>(policy.state == target)
        })
        .await
    }

    /// Wait until the provider no longer knows the server.
    pub async fn wait_until_server_deleted(&self, api: &dyn CloudApi, id: &str) -> Result<u32> {
        let what = format!("server {id} to be deleted");
        self.poll_until(&what, move || async move {
            match api.get_server(id).await {
                Ok(_) => Ok(false),
                Err(e) if e.is_not_found() => Ok(true),
                Err(e) => Err(ProvisionError::from(e)),
            }
        })
        .await
    }

    /// Wait until the provider no longer knows the firewall policy.
    pub async fn wait_until_firewall_deleted(&self, api: &dyn CloudApi, id: &str) -> Result<u32> {
        let what = format!("firewall policy {id} to be deleted");
        self.poll_until(&what, move || async move {
            match api.get_firewall_policy(id).await {
                Ok(_) => Ok(false),
                Err(e) if e.is_not_found() => Ok(true),
                Err(e) => Err(ProvisionError::from(e)),
            }
        })
        .await
    }

    /// Wait until `addr` accepts TCP connections.
    pub async fn wait_for_tcp_port(&self, probe: &dyn PortProbe, addr: SocketAddr) -> Result<u32> {
        tracing::debug!(%addr, "Waiting for port to open");
        let what = format!("port {addr} to open");
        self.poll_until(&what, move || async move {
            Ok::<_, ProvisionError>(probe.is_open(addr).await)
        })
        .await
    }

    /// Wait until the remote package manager is idle.
    ///
    /// A failing remote check counts as "not idle yet".
    pub async fn wait_for_package_manager_idle(
        &self,
        probe: &dyn PackageManagerProbe,
        session: &dyn SshSession,
    ) -> Result<u32> {
        let what = format!("package manager to be idle ({} probe)", probe.name());
        self.poll_until(&what, move || async move {
            match probe.is_idle(session).await {
                Ok(idle) => Ok::<_, ProvisionError>(idle),
                Err(e) => {
                    tracing::debug!(error = %e, "Package manager check failed, retrying");
                    Ok(false)
                }
            }
        })
        .await
    }
}
