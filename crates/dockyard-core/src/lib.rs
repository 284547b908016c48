//! # dockyard-core
//!
//! Provisioning lifecycle for dockyard cloud hosts.
//!
//! This crate turns a [`MachineRecord`] into a running, SSH-reachable server
//! on a 1&1 cloud account and manages it afterwards. Provider access goes
//! through the [`CloudApi`](dockyard_cloud::CloudApi) trait from
//! `dockyard-cloud`.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────┐
//! │                   dockyard-core (host)                   │
//! ├──────────────────────────────────────────────────────────┤
//! │                                                          │
//! │  ┌─────────────────┐     ┌──────────────────────────┐    │
//! │  │ MachineDriver   │────▶│  Arc<dyn CloudApi>       │    │
//! │  │  - create()     │     │  (RestClient)            │    │
//! │  │  - teardown()   │     └──────────────────────────┘    │
//! │  │  - state()      │                                     │
//! │  │  - start()...   │     ┌──────────────────────────┐    │
//! │  └─────────────────┘────▶│  Prober                  │    │
//! │           │              │  RetryPolicy + cancel    │    │
//! │           ▼              └──────────────────────────┘    │
//! │  ┌─────────────────┐                  │                  │
//! │  │  Bootstrapper   │──────────────────┘                  │
//! │  │  - keys         │     ┌──────────────────────────┐    │
//! │  │  - ssh          │────▶│  SshConnector (libssh2)  │    │
//! │  └─────────────────┘     └──────────────────────────┘    │
//! │                                                          │
//! └──────────────────────────────────────────────────────────┘
//!                           │
//!                           ▼
//! ┌──────────────────────────────────────────────────────────┐
//! │               1&1 Cloud Server (guest)                   │
//! │          root password login on port 22                  │
//! └──────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```ignore
//! use dockyard_cloud::RestClient;
//! use dockyard_core::{DriverOptions, MachineDriver, MachineRecord, RetryPolicy};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn example(options: DriverOptions) -> dockyard_core::Result<()> {
//! let api = Arc::new(RestClient::new(&options.endpoint, &options.access_token)?);
//! let driver = MachineDriver::new(api)
//!     .with_retry_policy(RetryPolicy::default().with_deadline(Duration::from_secs(900)));
//!
//! let mut record = MachineRecord::new("dev", "/var/lib/dockyard/machines/dev", &options)?;
//! driver.pre_create_check(&record).await?;
//! driver.create(&mut record).await?;
//!
//! println!("{} is {}", record.name, driver.state(&record).await?);
//! println!("engine at {}", record.url().unwrap_or_default());
//!
//! driver.remove(&mut record).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//!
//! - **Compensating cleanup**: a failed create never leaks the firewall policy
//!   or the server
//! - **Bounded waits**: every readiness probe honours a [`RetryPolicy`] and a
//!   cancellation token
//! - **Pluggable idle detection**: choose how "package manager is idle" is decided
//! - **Incremental records**: identifiers are stored the moment they exist

mod bootstrap;
mod config;
mod driver;
mod error;
mod keys;
mod lifecycle;
mod probe;
mod provision;
mod record;
mod ssh;
mod state;

pub use bootstrap::Bootstrapper;
pub use config::{
    DriverOptions, Hardware, MAX_CORES, MAX_RAM_GB, MAX_SSD_GB, MIN_CORES, MIN_RAM_GB, MIN_SSD_GB,
    SSD_STEP_GB,
};
pub use driver::MachineDriver;
pub use error::{ProvisionError, Result};
pub use keys::{ensure_key_pair, public_key_path};
pub use probe::{
    AptCacheQuiet, PackageManagerProbe, PortProbe, ProcessAbsent, Prober, RetryPolicy,
    TcpPortProbe, DEFAULT_APT_QUIET_PERIOD, DEFAULT_CONNECT_TIMEOUT, DEFAULT_POLL_INTERVAL,
};
pub use provision::{ResourceOutcome, TeardownReport};
pub use record::{MachineRecord, ENGINE_PORT, REMOTE_NAME_PREFIX, SSH_PORT, SSH_USER};
pub use ssh::{
    CommandOutput, Ssh2Connector, SshConnector, SshSession, SshTarget, DEFAULT_SSH_COMMAND_TIMEOUT,
    DEFAULT_SSH_CONNECT_TIMEOUT,
};
pub use state::{reconcile, MachineState};
