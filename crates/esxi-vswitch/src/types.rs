//! Shared types for ESXi virtual switch management.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Command output
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Result of one command executed on the host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    /// Successful output with the given stdout.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Failed output with the given exit code and stderr.
    pub fn failed(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            stdout: String::new(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Security policy
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Effective layer-2 security policy of a portgroup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityPolicy {
    pub allow_promiscuous: bool,
    pub allow_mac_change: bool,
    pub allow_forged_transmits: bool,
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Switch inventory
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Standard vSwitch as reported by `esxcfg-vswitch -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StandardSwitch {
    pub name: String,
    pub mtu: u32,
    pub uplinks: Vec<String>,
    pub portgroups: Vec<String>,
}

impl StandardSwitch {
    pub fn has_portgroup(&self, name: &str) -> bool {
        self.portgroups.iter().any(|p| p == name)
    }

    pub fn has_uplink(&self, name: &str) -> bool {
        self.uplinks.iter().any(|u| u == name)
    }
}

/// Host-local distributed switch as reported by `esxcfg-vswitch -l`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DistributedSwitch {
    pub name: String,
    pub mtu: u32,
    /// Uplink slot (`uplink0`, `uplink1`, …) → bound vmnic.
    pub uplinks: BTreeMap<String, Option<String>>,
    /// DVPort / portgroup entries listed under the switch.
    pub portgroups: Vec<String>,
}

impl DistributedSwitch {
    pub fn has_portgroup(&self, name: &str) -> bool {
        self.portgroups.iter().any(|p| p == name)
    }

    /// First uplink slot with no adapter bound.
    pub fn free_uplink(&self) -> Option<&str> {
        self.uplinks
            .iter()
            .find(|(_, bound)| bound.is_none())
            .map(|(slot, _)| slot.as_str())
    }

    /// Slot an adapter is bound to.
    pub fn uplink_of(&self, vmnic: &str) -> Option<&str> {
        self.uplinks
            .iter()
            .find(|(_, bound)| bound.as_deref() == Some(vmnic))
            .map(|(slot, _)| slot.as_str())
    }
}

/// All switches on a host.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchListing {
    pub standard: Vec<StandardSwitch>,
    pub distributed: Vec<DistributedSwitch>,
}

impl SwitchListing {
    pub fn standard_switch(&self, name: &str) -> Option<&StandardSwitch> {
        self.standard.iter().find(|s| s.name == name)
    }

    pub fn distributed_switch(&self, name: &str) -> Option<&DistributedSwitch> {
        self.distributed.iter().find(|s| s.name == name)
    }

    /// Standard switch that carries the portgroup.
    pub fn switch_with_portgroup(&self, portgroup: &str) -> Option<&StandardSwitch> {
        self.standard.iter().find(|s| s.has_portgroup(portgroup))
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Desired state
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Desired layout of a standard vSwitch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwitchSpec {
    pub name: String,
    #[serde(default)]
    pub uplinks: Vec<String>,
    #[serde(default)]
    pub portgroups: Vec<String>,
    #[serde(default = "default_mtu")]
    pub mtu: u32,
}

pub(crate) fn default_mtu() -> u32 {
    1500
}

impl SwitchSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            uplinks: Vec::new(),
            portgroups: Vec::new(),
            mtu: default_mtu(),
        }
    }
}

/// Which switches an ENS FPO change applies to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "scope", content = "vds")]
pub enum FpoTarget {
    /// Host-wide setting, no switch argument.
    Global,
    /// A single distributed switch.
    Switch(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  ENS
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One row of `esxcli network ens lcore list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnsLcore {
    pub id: u32,
    /// Switch the lcore serves; `None` when the host prints "Not set".
    pub switch: Option<String>,
}
