//! Provider status to machine state mapping.

use dockyard_cloud::server_state;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Provider-independent state of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum MachineState {
    /// State unknown or not mapped
    #[default]
    None,
    Starting,
    Running,
    Stopped,
    Stopping,
    Error,
}

impl fmt::Display for MachineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MachineState::None => write!(f, ""),
            MachineState::Starting => write!(f, "Starting"),
            MachineState::Running => write!(f, "Running"),
            MachineState::Stopped => write!(f, "Stopped"),
            MachineState::Stopping => write!(f, "Stopping"),
            MachineState::Error => write!(f, "Error"),
        }
    }
}

/// Map a provider server status to a [`MachineState`].
///
/// `REBOOTING`, `REMOVING` and `CONFIGURING` are known statuses without a
/// mapping and yield [`MachineState::None`], as does anything unrecognized.
pub fn reconcile(status: &str) -> MachineState {
    match status {
        server_state::POWERING_ON => MachineState::Starting,
        server_state::POWERED_ON => MachineState::Running,
        server_state::POWERED_OFF => MachineState::Stopped,
        server_state::POWERING_OFF => MachineState::Stopping,
        server_state::DEPLOYING => MachineState::Error,
        server_state::REBOOTING | server_state::REMOVING | server_state::CONFIGURING => {
            MachineState::None
        }
        _ => MachineState::None,
    }
}
