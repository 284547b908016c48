//! Operations on an existing machine.

use crate::driver::MachineDriver;
use crate::error::{ProvisionError, Result};
use crate::record::MachineRecord;
use crate::state::{reconcile, MachineState};
use dockyard_cloud::{PowerAction, Server};

impl MachineDriver {
    /// Refuse to create a machine whose remote name is already taken.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Validation`] for a bad record (without any
    /// remote call), [`ProvisionError::NameInUse`] on a collision.
    pub async fn pre_create_check(&self, record: &MachineRecord) -> Result<()> {
        record.validate()?;
        let remote_name = record.remote_name();

        let servers = self.api().list_servers().await?;
        if servers.iter().any(|s| s.name == remote_name) {
            return Err(ProvisionError::NameInUse(remote_name));
        }

        let policies = self.api().list_firewall_policies().await?;
        if policies.iter().any(|p| p.name == remote_name) {
            return Err(ProvisionError::NameInUse(remote_name));
        }

        Ok(())
    }

    /// Current state of the machine's server.
    ///
    /// Unmapped provider statuses yield [`MachineState::None`]; a failed fetch
    /// is returned as an error.
    pub async fn state(&self, record: &MachineRecord) -> Result<MachineState> {
        let server = self.fetch_server(record).await?;
        let state = reconcile(&server.status.state);
        tracing::debug!(
            machine = %record.name,
            status = %server.status.state,
            state = ?state,
            "Reconciled server status"
        );
        Ok(state)
    }

    pub async fn start(&self, record: &MachineRecord) -> Result<()> {
        self.power(record, PowerAction::PowerOn).await
    }

    /// Graceful shutdown.
    pub async fn stop(&self, record: &MachineRecord) -> Result<()> {
        self.power(record, PowerAction::PowerOff { force: false })
            .await
    }

    pub async fn restart(&self, record: &MachineRecord) -> Result<()> {
        self.power(record, PowerAction::Reboot { force: false })
            .await
    }

    /// Forced shutdown.
    pub async fn kill(&self, record: &MachineRecord) -> Result<()> {
        self.power(record, PowerAction::PowerOff { force: true })
            .await
    }

    /// Delete the machine's remote resources and wait for confirmation.
    ///
    /// Both resources are attempted; the first failure is returned. A record
    /// without identifiers is a no-op.
    pub async fn remove(&self, record: &mut MachineRecord) -> Result<()> {
        if !record.has_remote_resources() {
            tracing::debug!(machine = %record.name, "No remote resources to remove");
            return Ok(());
        }
        tracing::info!(machine = %record.name, "Removing machine");
        self.teardown(record).await.into_result()
    }

    async fn power(&self, record: &MachineRecord, action: PowerAction) -> Result<()> {
        let server = self.fetch_server(record).await?;
        tracing::info!(machine = %record.name, server_id = %server.id, %action, "Requesting power action");
        self.api().server_action(&server.id, action).await?;
        Ok(())
    }

    async fn fetch_server(&self, record: &MachineRecord) -> Result<Server> {
        let id = record.server_id.as_deref().ok_or_else(|| {
            ProvisionError::ResourceNotFound(format!("machine '{}' has no server", record.name))
        })?;
        match self.api().get_server(id).await {
            Ok(server) => Ok(server),
            Err(e) if e.is_not_found() => Err(ProvisionError::ResourceNotFound(format!(
                "server {id} of machine '{}'",
                record.name
            ))),
            Err(e) => Err(e.into()),
        }
    }
}
