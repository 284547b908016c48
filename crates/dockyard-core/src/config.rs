//! Driver options and hardware sizing.

use crate::error::{ProvisionError, Result};
use serde::{Deserialize, Serialize};

/// Smallest allowed number of virtual cores.
pub const MIN_CORES: u32 = 1;
/// Largest allowed number of virtual cores.
pub const MAX_CORES: u32 = 16;
/// Smallest allowed RAM size in GB.
pub const MIN_RAM_GB: u32 = 1;
/// Largest allowed RAM size in GB.
pub const MAX_RAM_GB: u32 = 128;
/// Smallest allowed SSD size in GB.
pub const MIN_SSD_GB: u32 = 20;
/// Largest allowed SSD size in GB.
pub const MAX_SSD_GB: u32 = 500;
/// SSD sizes must be a multiple of this.
pub const SSD_STEP_GB: u32 = 20;

/// Hardware sizing of a machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hardware {
    /// Virtual cores (1-16)
    pub cores: u32,
    /// RAM in GB (1-128)
    pub ram_gb: u32,
    /// Main disk in GB (20-500, steps of 20)
    pub ssd_gb: u32,
}

impl Default for Hardware {
    fn default() -> Self {
        Self {
            cores: MIN_CORES,
            ram_gb: MIN_RAM_GB,
            ssd_gb: MIN_SSD_GB,
        }
    }
}

impl Hardware {
    /// Build a sizing where `0` means "not specified" and falls back to the minimum.
    ///
    /// The result is not validated; call [`Hardware::validate`].
    pub fn with_defaults(cores: u32, ram_gb: u32, ssd_gb: u32) -> Self {
        let pick = |value: u32, min: u32, what: &str| {
            if value == 0 {
                tracing::debug!(option = what, default = min, "No value specified, using minimum");
                min
            } else {
                value
            }
        };
        Self {
            cores: pick(cores, MIN_CORES, "cores"),
            ram_gb: pick(ram_gb, MIN_RAM_GB, "ram"),
            ssd_gb: pick(ssd_gb, MIN_SSD_GB, "ssd"),
        }
    }

    /// Validate against the provider's sizing constraints.
    ///
    /// # Errors
    /// Returns [`ProvisionError::Validation`] naming the first offending value.
    pub fn validate(&self) -> Result<()> {
        if !(MIN_CORES..=MAX_CORES).contains(&self.cores) {
            return Err(ProvisionError::Validation(format!(
                "cores must be an integer ({MIN_CORES}-{MAX_CORES}), got {}",
                self.cores
            )));
        }

        if !(MIN_RAM_GB..=MAX_RAM_GB).contains(&self.ram_gb) {
            return Err(ProvisionError::Validation(format!(
                "ram must be an integer in GB ({MIN_RAM_GB}-{MAX_RAM_GB}), got {}",
                self.ram_gb
            )));
        }

        if !(MIN_SSD_GB..=MAX_SSD_GB).contains(&self.ssd_gb) || self.ssd_gb % SSD_STEP_GB != 0 {
            return Err(ProvisionError::Validation(format!(
                "ssd must be an integer in GB ({MIN_SSD_GB}-{MAX_SSD_GB}, steps of {SSD_STEP_GB}), got {}",
                self.ssd_gb
            )));
        }

        Ok(())
    }
}

/// User-supplied options for a new machine.
#[derive(Clone, PartialEq, Eq)]
pub struct DriverOptions {
    /// Provider REST API endpoint.
    pub endpoint: String,
    /// Provider access token.
    pub access_token: String,
    /// Sizing; zeros are replaced by the minimums.
    pub cores: u32,
    pub ram_gb: u32,
    pub ssd_gb: u32,
}

impl std::fmt::Debug for DriverOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DriverOptions")
            .field("endpoint", &self.endpoint)
            .field("access_token", &"<redacted>")
            .field("cores", &self.cores)
            .field("ram_gb", &self.ram_gb)
            .field("ssd_gb", &self.ssd_gb)
            .finish()
    }
}

impl DriverOptions {
    /// Resolved hardware sizing.
    pub fn hardware(&self) -> Hardware {
        Hardware::with_defaults(self.cores, self.ram_gb, self.ssd_gb)
    }

    /// Validate the options.
    ///
    /// # Errors
    /// Returns an error if the endpoint or token is missing or the sizing is
    /// out of range.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "an API endpoint is required".into(),
            ));
        }
        if self.access_token.trim().is_empty() {
            return Err(ProvisionError::Validation(
                "an access token is required".into(),
            ));
        }
        self.hardware().validate()
    }
}
