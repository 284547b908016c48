//! Resource and request types of the provider API.
//!
//! Field names follow the provider's snake_case JSON so the types
//! (de)serialize directly.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Server status strings reported by the provider.
pub mod server_state {
    pub const POWERING_ON: &str = "POWERING_ON";
    pub const POWERED_ON: &str = "POWERED_ON";
    pub const POWERING_OFF: &str = "POWERING_OFF";
    pub const POWERED_OFF: &str = "POWERED_OFF";
    pub const REBOOTING: &str = "REBOOTING";
    pub const REMOVING: &str = "REMOVING";
    pub const CONFIGURING: &str = "CONFIGURING";
    pub const DEPLOYING: &str = "DEPLOYING";
}

/// Firewall policy status strings reported by the provider.
pub mod firewall_state {
    pub const ACTIVE: &str = "ACTIVE";
    pub const CONFIGURING: &str = "CONFIGURING";
    pub const REMOVING: &str = "REMOVING";
}

// ============================================================================
// Appliances (base images)
// ============================================================================

/// A base system image the provider can install on a new server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerAppliance {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub os_family: String,
    #[serde(default)]
    pub os: String,
    #[serde(default)]
    pub os_version: String,
    #[serde(default)]
    pub os_architecture: u32,
    #[serde(default)]
    pub os_image_type: String,
    #[serde(default)]
    pub automatic_installation: bool,
}

/// Filter used to pick a base image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApplianceQuery {
    pub os_family: String,
    pub os: String,
    pub os_image_type: String,
    pub architecture: u32,
    pub automatic_installation: bool,
}

impl ApplianceQuery {
    /// Minimal 64-bit Ubuntu with automatic installation.
    pub fn ubuntu_minimal_64() -> Self {
        Self {
            os_family: "Linux".into(),
            os: "Ubuntu".into(),
            os_image_type: "Minimal".into(),
            architecture: 64,
            automatic_installation: true,
        }
    }

    /// Check whether an appliance satisfies this query.
    pub fn matches(&self, appliance: &ServerAppliance) -> bool {
        appliance.os_family.eq_ignore_ascii_case(&self.os_family)
            && appliance.os.eq_ignore_ascii_case(&self.os)
            && appliance.os_image_type.eq_ignore_ascii_case(&self.os_image_type)
            && appliance.os_architecture == self.architecture
            && appliance.automatic_installation == self.automatic_installation
    }
}

impl fmt::Display for ApplianceQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{} {}-bit (automatic installation: {})",
            self.os_family, self.os, self.os_image_type, self.architecture, self.automatic_installation
        )
    }
}

/// Pick the newest appliance matching `query`.
///
/// "Newest" is the highest dotted `os_version`, compared component by
/// component as numbers. Ties fall back to the appliance name.
pub fn newest_matching<'a>(
    appliances: &'a [ServerAppliance],
    query: &ApplianceQuery,
) -> Option<&'a ServerAppliance> {
    appliances
        .iter()
        .filter(|a| query.matches(a))
        .max_by(|a, b| {
            compare_versions(&a.os_version, &b.os_version).then_with(|| a.name.cmp(&b.name))
        })
}

fn compare_versions(a: &str, b: &str) -> Ordering {
    let parse = |v: &str| -> Vec<u64> {
        v.split(|c: char| !c.is_ascii_digit())
            .filter(|s| !s.is_empty())
            .filter_map(|s| s.parse().ok())
            .collect()
    };
    parse(a).cmp(&parse(b))
}

// ============================================================================
// Firewall policies
// ============================================================================

/// A firewall policy as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallPolicy {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub state: String,
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
}

/// A single firewall rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FirewallRule {
    pub protocol: String,
    pub port_from: Option<u16>,
    pub port_to: Option<u16>,
    pub source: String,
}

impl FirewallRule {
    /// Allow every TCP port from anywhere.
    pub fn allow_all_tcp() -> Self {
        Self {
            protocol: "TCP".into(),
            port_from: Some(1),
            port_to: Some(65535),
            source: "0.0.0.0".into(),
        }
    }
}

/// Payload for creating a firewall policy.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FirewallPolicyRequest {
    pub name: String,
    pub description: String,
    pub rules: Vec<FirewallRule>,
}

// ============================================================================
// Servers
// ============================================================================

/// A cloud server as returned by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Server {
    pub id: String,
    pub name: String,
    pub status: ServerStatus,
    #[serde(default)]
    pub ips: Vec<ServerIp>,
    /// Initial root password; only present in the creation response.
    #[serde(default)]
    pub first_password: Option<String>,
}

impl Server {
    /// First address assigned to the server, if any.
    pub fn first_ip(&self) -> Option<&str> {
        self.ips.first().map(|ip| ip.ip.as_str())
    }
}

/// Power/deployment status of a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    pub state: String,
    #[serde(default)]
    pub percent: Option<u8>,
}

/// An address attached to a server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerIp {
    #[serde(default)]
    pub id: String,
    pub ip: String,
}

/// Payload for creating a server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ServerRequest {
    pub name: String,
    pub description: String,
    pub hardware: HardwareRequest,
    pub appliance_id: String,
    pub firewall_policy_id: String,
    pub power_on: bool,
}

/// Hardware sizing of a new server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HardwareRequest {
    pub vcore: u32,
    pub cores_per_processor: u32,
    pub ram: u32,
    pub hdds: Vec<HddRequest>,
}

/// A disk attached to a new server.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HddRequest {
    pub size: u32,
    pub is_main: bool,
}

/// Power state change requested for a server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PowerAction {
    PowerOn,
    /// Graceful shutdown, or a hard power cut when `force` is set
    PowerOff { force: bool },
    Reboot { force: bool },
}

/// Wire form of [`PowerAction`].
#[derive(Debug, Serialize)]
pub(crate) struct PowerActionRequest {
    action: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    method: Option<&'static str>,
}

impl PowerAction {
    pub(crate) fn to_request(self) -> PowerActionRequest {
        let method = |force: bool| Some(if force { "HARDWARE" } else { "SOFTWARE" });
        match self {
            PowerAction::PowerOn => PowerActionRequest {
                action: "POWER_ON",
                method: None,
            },
            PowerAction::PowerOff { force } => PowerActionRequest {
                action: "POWER_OFF",
                method: method(force),
            },
            PowerAction::Reboot { force } => PowerActionRequest {
                action: "REBOOT",
                method: method(force),
            },
        }
    }
}

impl fmt::Display for PowerAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PowerAction::PowerOn => write!(f, "power on"),
            PowerAction::PowerOff { force: false } => write!(f, "shutdown"),
            PowerAction::PowerOff { force: true } => write!(f, "forced shutdown"),
            PowerAction::Reboot { force: false } => write!(f, "reboot"),
            PowerAction::Reboot { force: true } => write!(f, "forced reboot"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn appliance(id: &str, os: &str, version: &str, arch: u32) -> ServerAppliance {
        ServerAppliance {
            id: id.into(),
            name: format!("{os} {version}"),
            os_family: "Linux".into(),
            os: os.into(),
            os_version: version.into(),
            os_architecture: arch,
            os_image_type: "Minimal".into(),
            automatic_installation: true,
        }
    }

    #[test]
    fn test_newest_matching_picks_highest_version() {
        let list = vec![
            appliance("a", "Ubuntu", "14.04", 64),
            appliance("b", "Ubuntu", "16.04", 64),
            appliance("c", "Ubuntu", "9.10", 64),
        ];
        let found = newest_matching(&list, &ApplianceQuery::ubuntu_minimal_64()).unwrap();
        assert_eq!(found.id, "b");
    }

    #[test]
    fn test_newest_matching_filters_architecture_and_os() {
        let list = vec![
            appliance("a", "Ubuntu", "18.04", 32),
            appliance("b", "Debian", "20", 64),
            appliance("c", "Ubuntu", "12.04", 64),
        ];
        let found = newest_matching(&list, &ApplianceQuery::ubuntu_minimal_64()).unwrap();
        assert_eq!(found.id, "c");
    }

    #[test]
    fn test_newest_matching_none() {
        let list = vec![appliance("a", "CentOS", "7", 64)];
        assert!(newest_matching(&list, &ApplianceQuery::ubuntu_minimal_64()).is_none());
    }

    #[test]
    fn test_power_action_wire_format() {
        let json = serde_json::to_value(PowerAction::PowerOff { force: true }.to_request()).unwrap();
        assert_eq!(json, serde_json::json!({"action": "POWER_OFF", "method": "HARDWARE"}));

        let json = serde_json::to_value(PowerAction::Reboot { force: false }.to_request()).unwrap();
        assert_eq!(json, serde_json::json!({"action": "REBOOT", "method": "SOFTWARE"}));

        let json = serde_json::to_value(PowerAction::PowerOn.to_request()).unwrap();
        assert_eq!(json, serde_json::json!({"action": "POWER_ON"}));
    }

    #[test]
    fn test_server_deserialize_without_password() {
        let server: Server = serde_json::from_value(serde_json::json!({
            "id": "srv-1",
            "name": "[Docker Machine] dev",
            "status": {"state": "POWERED_ON", "percent": null},
            "ips": [{"id": "ip-1", "ip": "10.0.0.7", "type": "IPV4"}]
        }))
        .unwrap();
        assert_eq!(server.first_ip(), Some("10.0.0.7"));
        assert!(server.first_password.is_none());
    }
}
