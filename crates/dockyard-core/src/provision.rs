//! Machine creation and the teardown routine shared by cleanup and removal.

use crate::driver::MachineDriver;
use crate::error::{ProvisionError, Result};
use crate::record::MachineRecord;
use chrono::Utc;
use dockyard_cloud::{
    firewall_state, server_state, ApplianceQuery, CloudError, FirewallPolicyRequest, FirewallRule,
    HardwareRequest, HddRequest, ServerAppliance, ServerRequest,
};
use std::time::Instant;

/// What happened to one remote resource during teardown.
#[derive(Debug)]
pub enum ResourceOutcome {
    /// The record held no identifier for it
    Absent,
    /// Deletion confirmed (or the provider no longer knew it)
    Deleted,
    /// Deletion failed; the identifier stays on the record
    Failed(ProvisionError),
}

impl ResourceOutcome {
    pub fn is_failed(&self) -> bool {
        matches!(self, ResourceOutcome::Failed(_))
    }
}

/// Per-resource result of [`MachineDriver::teardown`].
#[derive(Debug)]
pub struct TeardownReport {
    pub server: ResourceOutcome,
    pub firewall: ResourceOutcome,
}

impl TeardownReport {
    /// First failure, server before firewall.
    pub fn into_result(self) -> Result<()> {
        match (self.server, self.firewall) {
            (ResourceOutcome::Failed(e), _) | (_, ResourceOutcome::Failed(e)) => Err(e),
            _ => Ok(()),
        }
    }
}

impl MachineDriver {
    /// Provision the machine described by `record`.
    ///
    /// Identifiers are written to `record` as soon as the provider returns
    /// them. If anything fails once the firewall policy exists, the partial
    /// resources are torn down and the original error is returned.
    ///
    /// # Errors
    /// - [`ProvisionError::Validation`] before any remote call, including for a
    ///   record that already owns a server or firewall policy
    /// - [`ProvisionError::ImageResolution`] when no base image matches
    /// - [`ProvisionError::RemoteApi`] for failed provider calls
    /// - [`ProvisionError::NoAddressAssigned`], [`ProvisionError::MissingPassword`],
    ///   [`ProvisionError::SshBootstrap`] for a server that cannot be bootstrapped
    /// - [`ProvisionError::Timeout`] / [`ProvisionError::Cancelled`] from the waits
    pub async fn create(&self, record: &mut MachineRecord) -> Result<()> {
        record.validate()?;
        if record.has_remote_resources() {
            return Err(ProvisionError::Validation(format!(
                "machine '{}' already owns remote resources; remove it first",
                record.name
            )));
        }
        let start = Instant::now();
        tracing::info!(machine = %record.name, hardware = ?record.hardware, "Creating machine");

        let appliance = self.resolve_appliance().await?;
        tracing::debug!(
            machine = %record.name,
            appliance = %appliance.name,
            "Selected base image"
        );

        let firewall = self
            .api()
            .create_firewall_policy(&FirewallPolicyRequest {
                name: record.remote_name(),
                description: format!("Firewall policy for docker machine {}", record.name),
                rules: vec![FirewallRule::allow_all_tcp()],
            })
            .await?;
        record.firewall_id = Some(firewall.id.clone());
        tracing::debug!(machine = %record.name, firewall_id = %firewall.id, "Created firewall policy");

        if let Err(e) = self.provision_server(record, &appliance).await {
            tracing::error!(machine = %record.name, error = %e, "Create failed, removing partial resources");
            let report = self.teardown(record).await;
            for (resource, outcome) in [("server", &report.server), ("firewall policy", &report.firewall)] {
                if let ResourceOutcome::Failed(cleanup) = outcome {
                    tracing::warn!(
                        machine = %record.name,
                        resource,
                        error = %cleanup,
                        "Cleanup failed, resource may be left behind"
                    );
                }
            }
            return Err(e);
        }

        record.created_at = Some(Utc::now());
        tracing::info!(
            machine = %record.name,
            ip = record.ip_address.as_deref().unwrap_or_default(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Machine created"
        );
        Ok(())
    }

    async fn resolve_appliance(&self) -> Result<ServerAppliance> {
        let query = ApplianceQuery::ubuntu_minimal_64();
        self.api()
            .find_newest_appliance(&query)
            .await
            .map_err(|e| match e {
                CloudError::NoMatchingAppliance(q) => ProvisionError::ImageResolution(format!(
                    "no server appliance matches {q}"
                )),
                other => ProvisionError::RemoteApi(other),
            })
    }

    /// Everything after the firewall policy exists.
    async fn provision_server(
        &self,
        record: &mut MachineRecord,
        appliance: &ServerAppliance,
    ) -> Result<()> {
        let firewall_id = record.firewall_id.clone().unwrap_or_default();
        let hardware = record.hardware;

        let created = self
            .api()
            .create_server(&ServerRequest {
                name: record.remote_name(),
                description: format!("{} created by docker machine", record.name),
                hardware: HardwareRequest {
                    vcore: hardware.cores,
                    cores_per_processor: 1,
                    ram: hardware.ram_gb,
                    hdds: vec![HddRequest {
                        size: hardware.ssd_gb,
                        is_main: true,
                    }],
                },
                appliance_id: appliance.id.clone(),
                firewall_policy_id: firewall_id.clone(),
                power_on: true,
            })
            .await?;
        record.server_id = Some(created.id.clone());
        tracing::debug!(machine = %record.name, server_id = %created.id, "Created server");

        self.prober()
            .wait_for_firewall_state(self.api(), &firewall_id, firewall_state::ACTIVE)
            .await?;
        self.prober()
            .wait_for_server_state(self.api(), &created.id, server_state::POWERED_ON)
            .await?;

        let server = self.api().get_server(&created.id).await?;
        let ip = server
            .first_ip()
            .ok_or_else(|| ProvisionError::NoAddressAssigned(created.id.clone()))?;
        record.ip_address = Some(ip.to_string());
        tracing::info!(machine = %record.name, server_id = %created.id, ip, "Server is running");

        let password = created
            .first_password
            .as_deref()
            .or(server.first_password.as_deref())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ProvisionError::MissingPassword(created.id.clone()))?;

        let target = record.ssh_target()?;
        self.bootstrapper()
            .install_public_key(&target, password, &record.ssh_key_path())
            .await
    }

    /// Delete the machine's server and firewall policy and wait until the
    /// provider confirms they are gone.
    ///
    /// The server goes first since the policy is attached to it. Each
    /// resource is attempted regardless of the other's outcome. Identifiers
    /// are cleared only for resources confirmed gone; a resource the provider
    /// no longer knows counts as gone.
    pub async fn teardown(&self, record: &mut MachineRecord) -> TeardownReport {
        let server = match record.server_id.clone() {
            None => ResourceOutcome::Absent,
            Some(id) => match self.delete_server_and_wait(&id).await {
                Ok(()) => {
                    tracing::info!(machine = %record.name, server_id = %id, "Server deleted");
                    record.server_id = None;
                    record.ip_address = None;
                    ResourceOutcome::Deleted
                }
                Err(e) => ResourceOutcome::Failed(e),
            },
        };

        let firewall = match record.firewall_id.clone() {
            None => ResourceOutcome::Absent,
            Some(id) => match self.delete_firewall_and_wait(&id).await {
                Ok(()) => {
                    tracing::info!(machine = %record.name, firewall_id = %id, "Firewall policy deleted");
                    record.firewall_id = None;
                    ResourceOutcome::Deleted
                }
                Err(e) => ResourceOutcome::Failed(e),
            },
        };

        TeardownReport { server, firewall }
    }

    async fn delete_server_and_wait(&self, id: &str) -> Result<()> {
        match self.api().delete_server(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(server_id = %id, "Server already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.prober()
            .wait_until_server_deleted(self.api(), id)
            .await
            .map(|_| ())
    }

    async fn delete_firewall_and_wait(&self, id: &str) -> Result<()> {
        match self.api().delete_firewall_policy(id).await {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {
                tracing::debug!(firewall_id = %id, "Firewall policy already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }
        self.prober()
            .wait_until_firewall_deleted(self.api(), id)
            .await
            .map(|_| ())
    }
}
