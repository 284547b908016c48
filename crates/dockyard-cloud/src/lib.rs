//! # dockyard-cloud
//!
//! Typed access to the 1&1 Cloud Server REST API: base-image lookup,
//! firewall policies, and servers.
//!
//! The [`CloudApi`] trait is the seam the provisioning layer depends on;
//! [`RestClient`] is the HTTP implementation.
//!
//! ```no_run
//! use dockyard_cloud::{CloudApi, RestClient, DEFAULT_ENDPOINT};
//!
//! # async fn example() -> dockyard_cloud::Result<()> {
//! let api = RestClient::new(DEFAULT_ENDPOINT, "my-token")?;
//! let server = api.get_server("8C626C1A7005D0D1F527143C413D461E").await?;
//! println!("{} is {}", server.name, server.status.state);
//! # Ok(())
//! # }
//! ```

mod api;
mod error;
mod rest;
mod types;

pub use api::CloudApi;
pub use error::{CloudError, Result};
pub use rest::{RestClient, DEFAULT_ENDPOINT};
pub use types::{
    firewall_state, newest_matching, server_state, ApplianceQuery, FirewallPolicy,
    FirewallPolicyRequest, FirewallRule, HardwareRequest, HddRequest, PowerAction, Server,
    ServerAppliance, ServerIp, ServerRequest, ServerStatus,
};
