//! First login on a new server: install the machine's public key.

use crate::error::{ProvisionError, Result};
use crate::keys::ensure_key_pair;
use crate::probe::{PackageManagerProbe, PortProbe, Prober};
use crate::ssh::{shell_quote, SshConnector, SshTarget};
use std::path::Path;
use std::time::Instant;

/// Installs a machine's SSH public key using the provider's initial password.
///
/// Borrowed from the driver for the duration of one bootstrap.
pub struct Bootstrapper<'a> {
    connector: &'a dyn SshConnector,
    port_probe: &'a dyn PortProbe,
    idle_probe: &'a dyn PackageManagerProbe,
    prober: &'a Prober,
}

impl<'a> Bootstrapper<'a> {
    pub fn new(
        connector: &'a dyn SshConnector,
        port_probe: &'a dyn PortProbe,
        idle_probe: &'a dyn PackageManagerProbe,
        prober: &'a Prober,
    ) -> Self {
        Self {
            connector,
            port_probe,
            idle_probe,
            prober,
        }
    }

    /// Append the public half of `key_path` to root's `authorized_keys`.
    ///
    /// Generates the key pair if it does not exist, waits for the SSH port,
    /// logs in with `password`, waits until the package manager is idle and
    /// then runs the install command.
    ///
    /// # Errors
    /// Wait timeouts, cancellation and key errors are returned as-is;
    /// everything else becomes [`ProvisionError::SshBootstrap`].
    pub async fn install_public_key(
        &self,
        target: &SshTarget,
        password: &str,
        key_path: &Path,
    ) -> Result<()> {
        let start = Instant::now();
        let public_key = ensure_key_pair(key_path).map_err(|e| match e {
            ProvisionError::Io(io) => {
                ProvisionError::KeyGeneration(format!("{}: {io}", key_path.display()))
            }
            other => other,
        })?;

        self.prober
            .wait_for_tcp_port(self.port_probe, target.addr)
            .await?;

        let session = self
            .connector
            .connect(target, password)
            .await
            .map_err(into_bootstrap_error)?;
        tracing::debug!(addr = %target.addr, "SSH session established");

        self.prober
            .wait_for_package_manager_idle(self.idle_probe, session.as_ref())
            .await?;

        let command = install_key_command(&public_key);
        let output = session
            .exec(&command)
            .await
            .map_err(into_bootstrap_error)?;
        if !output.success() {
            return Err(ProvisionError::SshBootstrap(format!(
                "installing public key exited with status {}",
                output.exit_status
            )));
        }

        tracing::info!(
            addr = %target.addr,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Installed SSH public key"
        );
        Ok(())
    }
}

fn install_key_command(public_key: &str) -> String {
    format!(
        "mkdir -p ~/.ssh && chmod 700 ~/.ssh && echo {} >> ~/.ssh/authorized_keys && chmod 600 ~/.ssh/authorized_keys",
        shell_quote(public_key)
    )
}

fn into_bootstrap_error(err: ProvisionError) -> ProvisionError {
    match err {
        e @ (ProvisionError::SshBootstrap(_)
        | ProvisionError::Timeout { .. }
        | ProvisionError::Cancelled(_)) => e,
        other => ProvisionError::SshBootstrap(other.to_string()),
    }
}
