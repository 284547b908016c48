//! The durable description of one managed machine.

use crate::config::{DriverOptions, Hardware};
use crate::error::{ProvisionError, Result};
use crate::ssh::SshTarget;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;
use std::path::PathBuf;

/// Prefix the provider-side resource names carry.
pub const REMOTE_NAME_PREFIX: &str = "[Docker Machine] ";

/// SSH user on freshly installed servers.
pub const SSH_USER: &str = "root";

/// SSH port on freshly installed servers.
pub const SSH_PORT: u16 = 22;

/// Port the container engine listens on once the host is provisioned.
pub const ENGINE_PORT: u16 = 2376;

/// File name of the private key inside the machine's store directory.
const KEY_FILE_NAME: &str = "id_ed25519";

/// State of one machine.
///
/// The remote identifiers are filled in one at a time as the provider hands
/// them out, so a record saved after a failed create still points at every
/// resource that needs cleaning up.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct MachineRecord {
    /// User-supplied machine name
    pub name: String,
    /// Directory holding this machine's local files (SSH keys)
    pub store_path: PathBuf,
    /// Provider REST API endpoint
    pub endpoint: String,
    /// Provider access token
    pub access_token: String,
    /// Requested sizing
    pub hardware: Hardware,
    /// Provider server identifier
    #[serde(default)]
    pub server_id: Option<String>,
    /// Provider firewall policy identifier
    #[serde(default)]
    pub firewall_id: Option<String>,
    /// Public address, known once the server is running
    #[serde(default)]
    pub ip_address: Option<String>,
    /// When provisioning completed
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl fmt::Debug for MachineRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineRecord")
            .field("name", &self.name)
            .field("store_path", &self.store_path)
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .field("hardware", &self.hardware)
            .field("server_id", &self.server_id)
            .field("firewall_id", &self.firewall_id)
            .field("ip_address", &self.ip_address)
            .field("created_at", &self.created_at)
            .finish()
    }
}

impl MachineRecord {
    /// Bind options to a new, not yet provisioned machine.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Validation`] for an empty name or invalid options.
    pub fn new(
        name: impl Into<String>,
        store_path: impl Into<PathBuf>,
        options: &DriverOptions,
    ) -> Result<Self> {
        let name = name.into();
        if name.trim().is_empty() {
            return Err(ProvisionError::Validation("machine name is required".into()));
        }
        options.validate()?;

        Ok(Self {
            name,
            store_path: store_path.into(),
            endpoint: options.endpoint.clone(),
            access_token: options.access_token.clone(),
            hardware: options.hardware(),
            server_id: None,
            firewall_id: None,
            ip_address: None,
            created_at: None,
        })
    }

    /// Check the record before any remote call is made on its behalf.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Validation`] for an empty name, missing
    /// credentials or out-of-range sizing.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(ProvisionError::Validation("machine name is required".into()));
        }
        if self.endpoint.trim().is_empty() || self.access_token.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "an API endpoint and access token are required".into(),
            ));
        }
        self.hardware.validate()
    }

    /// Name used for the provider-side server and firewall policy.
    pub fn remote_name(&self) -> String {
        format!("{REMOTE_NAME_PREFIX}{}", self.name)
    }

    /// True while any remote resource may still exist.
    pub fn has_remote_resources(&self) -> bool {
        self.server_id.is_some() || self.firewall_id.is_some()
    }

    pub fn ssh_key_path(&self) -> PathBuf {
        self.store_path.join(KEY_FILE_NAME)
    }

    pub fn ssh_public_key_path(&self) -> PathBuf {
        crate::keys::public_key_path(&self.ssh_key_path())
    }

    pub fn ssh_user(&self) -> &'static str {
        SSH_USER
    }

    pub fn ssh_port(&self) -> u16 {
        SSH_PORT
    }

    /// SSH endpoint of the running server.
    ///
    /// # Errors
    /// Fails if no address is known yet or it does not parse.
    pub fn ssh_target(&self) -> Result<SshTarget> {
        let ip = self.ip_address.as_deref().ok_or_else(|| {
            ProvisionError::NoAddressAssigned(self.server_id.clone().unwrap_or_default())
        })?;
        let ip: IpAddr = ip
            .parse()
            .map_err(|_| ProvisionError::SshBootstrap(format!("invalid server address '{ip}'")))?;
        Ok(SshTarget::new(ip, SSH_PORT, SSH_USER))
    }

    /// Container engine URL, e.g. `tcp://192.0.2.10:2376`.
    pub fn url(&self) -> Option<String> {
        self.ip_address
            .as_ref()
            .map(|ip| format!("tcp://{ip}:{ENGINE_PORT}"))
    }
}
