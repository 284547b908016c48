//! The machine driver: one provider account plus the probes used to talk to
//! the servers it creates.

use crate::bootstrap::Bootstrapper;
use crate::probe::{AptCacheQuiet, PackageManagerProbe, PortProbe, Prober, RetryPolicy, TcpPortProbe};
use crate::ssh::{Ssh2Connector, SshConnector};
use dockyard_cloud::CloudApi;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Drives the lifecycle of machines on one provider account.
///
/// Operations take the [`MachineRecord`](crate::MachineRecord) they act on
/// explicitly, so one driver can serve many machines. Provisioning lives in
/// `provision.rs`, the remaining lifecycle operations in `lifecycle.rs`.
///
/// # Example
///
/// ```ignore
/// use dockyard_cloud::RestClient;
/// use dockyard_core::{DriverOptions, MachineDriver, MachineRecord};
/// use std::sync::Arc;
///
/// let api = Arc::new(RestClient::new(&options.endpoint, &options.access_token)?);
/// let driver = MachineDriver::new(api);
/// let mut record = MachineRecord::new("dev", store_dir, &options)?;
///
/// driver.pre_create_check(&record).await?;
/// driver.create(&mut record).await?;
/// println!("{}", driver.state(&record).await?);
/// ```
#[derive(Clone)]
pub struct MachineDriver {
    api: Arc<dyn CloudApi>,
    connector: Arc<dyn SshConnector>,
    port_probe: Arc<dyn PortProbe>,
    idle_probe: Arc<dyn PackageManagerProbe>,
    prober: Prober,
}

impl MachineDriver {
    /// Driver with libssh2, plain TCP probing, the apt cache heuristic and
    /// the default retry policy.
    pub fn new(api: Arc<dyn CloudApi>) -> Self {
        Self {
            api,
            connector: Arc::new(Ssh2Connector::default()),
            port_probe: Arc::new(TcpPortProbe::default()),
            idle_probe: Arc::new(AptCacheQuiet::default()),
            prober: Prober::default(),
        }
    }

    pub fn with_ssh_connector(mut self, connector: Arc<dyn SshConnector>) -> Self {
        self.connector = connector;
        self
    }

    pub fn with_port_probe(mut self, probe: Arc<dyn PortProbe>) -> Self {
        self.port_probe = probe;
        self
    }

    pub fn with_package_manager_probe(mut self, probe: Arc<dyn PackageManagerProbe>) -> Self {
        self.idle_probe = probe;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.prober = Prober::new(policy, self.prober.cancellation_token().clone());
        self
    }

    /// Abort every wait once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.prober = Prober::new(*self.prober.policy(), cancel);
        self
    }

    pub fn api(&self) -> &dyn CloudApi {
        self.api.as_ref()
    }

    pub fn prober(&self) -> &Prober {
        &self.prober
    }

    pub(crate) fn bootstrapper(&self) -> Bootstrapper<'_> {
        Bootstrapper::new(
            self.connector.as_ref(),
            self.port_probe.as_ref(),
            self.idle_probe.as_ref(),
            &self.prober,
        )
    }
}

impl std::fmt::Debug for MachineDriver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MachineDriver")
            .field("package_manager_probe", &self.idle_probe.name())
            .field("prober", &self.prober)
            .finish_non_exhaustive()
    }
}
