//! Command-line builders for the ESXi host tools.
//!
//! `esxcli`, `esxcfg-vswitch`, `net-dvs` and `nsxdp-cli` invocations are
//! built here and nowhere else, so that quoting and name rules are applied
//! in one place.

use crate::error::{EsxiError, EsxiResult};
use lazy_static::lazy_static;
use regex::Regex;

/// `nsxdp-cli` needs a UTF-8 locale or it mangles its table output.
const NSXDP: &str = "LC_ALL=en_US.UTF-8 nsxdp-cli";

lazy_static! {
    /// Names the host tools accept for newly created switches and portgroups.
    static ref OBJECT_NAME: Regex = Regex::new(r"^[A-Za-z0-9_]+$").unwrap();
    /// Arguments that survive the remote shell unquoted.
    static ref SHELL_SAFE: Regex = Regex::new(r"^[A-Za-z0-9_.:,/=-]+$").unwrap();
}

/// Which portgroup security flag to set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecurityFlag {
    ForgedTransmits,
    MacChange,
}

impl SecurityFlag {
    fn switch(self) -> &'static str {
        match self {
            Self::ForgedTransmits => "-f",
            Self::MacChange => "-m",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Self::ForgedTransmits => "forged transmits",
            Self::MacChange => "MAC address changes",
        }
    }
}

/// Builders for every host command this crate issues.
pub struct EsxCommands;

impl EsxCommands {
    // ── Quoting / validation ────────────────────────────────────────

    /// Quote an argument for the remote POSIX shell.
    pub fn quote(arg: &str) -> String {
        if SHELL_SAFE.is_match(arg) {
            arg.to_string()
        } else {
            format!("'{}'", arg.replace('\'', r"'\''"))
        }
    }

    /// Name of an existing object: anything non-blank.
    pub fn require_name(what: &str, name: &str) -> EsxiResult<()> {
        if name.trim().is_empty() {
            return Err(EsxiError::invalid_name(format!("{what} name cannot be empty")));
        }
        Ok(())
    }

    /// Name of an object about to be created: letters, digits, underscore.
    pub fn validate_new_name(what: &str, name: &str) -> EsxiResult<()> {
        if OBJECT_NAME.is_match(name) {
            Ok(())
        } else {
            Err(EsxiError::invalid_name(format!(
                "{what} name '{name}' should contain only letters, digits and underscore"
            )))
        }
    }

    fn flag(value: bool) -> &'static str {
        if value {
            "true"
        } else {
            "false"
        }
    }

    // ── Inventory ───────────────────────────────────────────────────

    pub fn list_switches() -> String {
        "esxcfg-vswitch -l".to_string()
    }

    pub fn host_version() -> String {
        "vmware -v".to_string()
    }

    // ── Portgroup security ──────────────────────────────────────────

    pub fn portgroup_security_get(portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy security get -p {}",
            Self::quote(portgroup)
        )
    }

    pub fn portgroup_security_set(portgroup: &str, flag: SecurityFlag, enable: bool) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy security set -p {} {} {}",
            Self::quote(portgroup),
            flag.switch(),
            Self::flag(enable)
        )
    }

    /// Drop portgroup overrides so the switch policy applies again.
    pub fn portgroup_security_inherit(portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy security set -u -p {}",
            Self::quote(portgroup)
        )
    }

    // ── ENS ─────────────────────────────────────────────────────────

    pub fn ens_fpo_set(enable: bool, vds: Option<&str>) -> String {
        let state = if enable { "enable" } else { "disable" };
        let mut cmd = format!("nsxdp-cli ens fpo set --{state}");
        if let Some(vds) = vds {
            cmd.push_str(&format!(" -dvs {}", Self::quote(vds)));
        }
        cmd
    }

    pub fn ens_switch_list() -> String {
        format!("{NSXDP} ens switch list")
    }

    pub fn ens_enable(dvs: &str) -> String {
        format!("esxcfg-vswitch -y {}", Self::quote(dvs))
    }

    pub fn ens_disable(dvs: &str) -> String {
        format!("esxcfg-vswitch -Y {}", Self::quote(dvs))
    }

    pub fn ens_thread_load_balancer(dvs: &str, enable: bool) -> String {
        let state = if enable { "--enable" } else { "--disable" };
        format!("{NSXDP} ens tlb status -dvs {} {state}", Self::quote(dvs))
    }

    pub fn ens_lcore_list() -> String {
        "esxcli network ens lcore list".to_string()
    }

    pub fn ens_lcore_add(lcore: u32) -> String {
        format!("esxcli network ens lcore add --lcore-id {lcore}")
    }

    pub fn ens_lcore_remove(lcore: u32) -> String {
        format!("esxcli network ens lcore remove -l {lcore}")
    }

    pub fn ens_lcore_assign(dvs: &str, lcore: u32) -> String {
        format!(
            "esxcli network ens lcore switch add --switch {} --lcore-id {lcore}",
            Self::quote(dvs)
        )
    }

    pub fn ens_port_list(sw_id: u32) -> String {
        format!("{NSXDP} ens port list --sw-id {sw_id}")
    }

    /// Move one direction (0 tx, 1 rx) of an ENS port to `lcore`.
    pub fn ens_port_migrate(sw_id: u32, port: u32, lcore: u32, dir: u8) -> String {
        format!("{NSXDP} ens port migrate --sw-id {sw_id} --port-id {port} --lcore-id {lcore} --dir {dir}")
    }

    // ── Standard vSwitch ────────────────────────────────────────────

    pub fn vswitch_add(name: &str) -> String {
        format!("esxcli network vswitch standard add -v {}", Self::quote(name))
    }

    pub fn vswitch_remove(name: &str) -> String {
        format!("esxcli network vswitch standard remove -v {}", Self::quote(name))
    }

    pub fn vswitch_mtu(name: &str, mtu: u32) -> String {
        format!(
            "esxcli network vswitch standard set -m {mtu} -v {}",
            Self::quote(name)
        )
    }

    pub fn vswitch_uplink_add(name: &str, vmnic: &str) -> String {
        format!(
            "esxcli network vswitch standard uplink add -u {} -v {}",
            Self::quote(vmnic),
            Self::quote(name)
        )
    }

    pub fn vswitch_uplink_remove(name: &str, vmnic: &str) -> String {
        format!(
            "esxcli network vswitch standard uplink remove -u {} -v {}",
            Self::quote(vmnic),
            Self::quote(name)
        )
    }

    pub fn vswitch_failover_default(name: &str, uplinks: &[String]) -> String {
        format!(
            "esxcli network vswitch standard policy failover set -v {} -a {} -b true -f link -l portid -n true -s ''",
            Self::quote(name),
            Self::quote(&uplinks.join(","))
        )
    }

    pub fn vswitch_security_set(
        name: &str,
        forged_transmits: bool,
        mac_change: bool,
        promiscuous: bool,
    ) -> String {
        format!(
            "esxcli network vswitch standard policy security set -f {} -m {} -p {} -v {}",
            Self::flag(forged_transmits),
            Self::flag(mac_change),
            Self::flag(promiscuous),
            Self::quote(name)
        )
    }

    pub fn vswitch_shaping_disable(name: &str) -> String {
        format!(
            "esxcli network vswitch standard policy shaping set -e false -v {}",
            Self::quote(name)
        )
    }

    // ── Standard portgroups ─────────────────────────────────────────

    pub fn portgroup_add(vswitch: &str, portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup add -p {} -v {}",
            Self::quote(portgroup),
            Self::quote(vswitch)
        )
    }

    pub fn portgroup_remove(vswitch: &str, portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup remove -p {} -v {}",
            Self::quote(portgroup),
            Self::quote(vswitch)
        )
    }

    pub fn portgroup_vlan(portgroup: &str, vlan: u16) -> String {
        format!(
            "esxcli network vswitch standard portgroup set -v {vlan} -p {}",
            Self::quote(portgroup)
        )
    }

    pub fn portgroup_active_uplinks(portgroup: &str, uplinks: &[String]) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy failover set -a {} -s '' -p {}",
            Self::quote(&uplinks.join(",")),
            Self::quote(portgroup)
        )
    }

    pub fn portgroup_failover_inherit(portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy failover set -u -p {}",
            Self::quote(portgroup)
        )
    }

    pub fn portgroup_shaping_inherit(portgroup: &str) -> String {
        format!(
            "esxcli network vswitch standard portgroup policy shaping set -u -p {}",
            Self::quote(portgroup)
        )
    }

    // ── Distributed switch ──────────────────────────────────────────

    pub fn dvs_add(name: &str) -> String {
        format!(
            "esxcfg-vswitch -a {} --dvswitch --impl-class=vswitch",
            Self::quote(name)
        )
    }

    pub fn dvs_remove(name: &str) -> String {
        format!("esxcfg-vswitch -d --dvswitch {}", Self::quote(name))
    }

    pub fn dvs_info(name: &str) -> String {
        format!("net-dvs -l {}", Self::quote(name))
    }

    pub fn dvs_uplink_number(name: &str, count: usize) -> String {
        format!("net-dvs -U {count} {}", Self::quote(name))
    }

    pub fn dvs_link_adapter(name: &str, vmnic: &str, uplink: &str) -> String {
        format!(
            "esxcfg-vswitch -P {} -V {} {}",
            Self::quote(vmnic),
            Self::quote(uplink),
            Self::quote(name)
        )
    }

    pub fn dvs_unlink_adapter(name: &str, vmnic: &str, uplink: &str) -> String {
        format!(
            "esxcfg-vswitch -Q {} -V {} {}",
            Self::quote(vmnic),
            Self::quote(uplink),
            Self::quote(name)
        )
    }

    pub fn dvs_portgroup_add(name: &str, portgroup: &str) -> String {
        format!("net-dvs -A -p {} {}", Self::quote(portgroup), Self::quote(name))
    }

    pub fn dvs_portgroup_remove(name: &str, portgroup: &str) -> String {
        format!("net-dvs -D -p {} {}", Self::quote(portgroup), Self::quote(name))
    }

    pub fn dvs_portgroup_vlan(name: &str, portgroup: &str, vlan: u16) -> String {
        if vlan == 4095 {
            format!(
                "{NSXDP} vswitch vlan policy set --guest-tagging -p {} -dvs {}",
                Self::quote(portgroup),
                Self::quote(name)
            )
        } else {
            format!(
                "{NSXDP} vswitch vlan policy set --no-guest-tagging --vlan {vlan} -p {} -dvs {}",
                Self::quote(portgroup),
                Self::quote(name)
            )
        }
    }

    pub fn dvs_mtu(name: &str, mtu: u32) -> String {
        format!("esxcfg-vswitch --mtu {mtu} {}", Self::quote(name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quote_leaves_plain_names_alone() {
        assert_eq!(EsxCommands::quote("PG-Test"), "PG-Test");
        assert_eq!(EsxCommands::quote("vmnic2,vmnic3"), "vmnic2,vmnic3");
    }

    #[test]
    fn quote_wraps_spaces_and_quotes() {
        assert_eq!(EsxCommands::quote("VM Network"), "'VM Network'");
        assert_eq!(EsxCommands::quote("it's"), r"'it'\''s'");
        assert_eq!(EsxCommands::quote("a;reboot"), "'a;reboot'");
        assert_eq!(EsxCommands::quote(""), "''");
    }

    #[test]
    fn new_names_follow_host_rules() {
        assert!(EsxCommands::validate_new_name("Switch", "ATvSwitch_1").is_ok());
        assert!(EsxCommands::validate_new_name("Switch", "bad-name").is_err());
        assert!(EsxCommands::validate_new_name("Portgroup", "").is_err());
    }

    #[test]
    fn require_name_rejects_blank() {
        assert!(EsxCommands::require_name("Portgroup", "   ").is_err());
        assert!(EsxCommands::require_name("Portgroup", "VM Network").is_ok());
    }

    #[test]
    fn forged_transmit_command() {
        assert_eq!(
            EsxCommands::portgroup_security_set("PG-Test", SecurityFlag::ForgedTransmits, true),
            "esxcli network vswitch standard portgroup policy security set -p PG-Test -f true"
        );
    }

    #[test]
    fn mac_change_command_quotes_portgroup() {
        assert_eq!(
            EsxCommands::portgroup_security_set("VM Network", SecurityFlag::MacChange, false),
            "esxcli network vswitch standard portgroup policy security set -p 'VM Network' -m false"
        );
    }

    #[test]
    fn ens_fpo_commands() {
        assert_eq!(EsxCommands::ens_fpo_set(true, None), "nsxdp-cli ens fpo set --enable");
        assert_eq!(
            EsxCommands::ens_fpo_set(false, Some("vSphereDistributedSwitch")),
            "nsxdp-cli ens fpo set --disable -dvs vSphereDistributedSwitch"
        );
    }

    #[test]
    fn ens_lcore_commands() {
        assert_eq!(
            EsxCommands::ens_lcore_assign("TestSwitch", 3),
            "esxcli network ens lcore switch add --switch TestSwitch --lcore-id 3"
        );
        assert_eq!(EsxCommands::ens_lcore_remove(1), "esxcli network ens lcore remove -l 1");
        assert_eq!(
            EsxCommands::ens_port_migrate(123, 1, 0, 1),
            "LC_ALL=en_US.UTF-8 nsxdp-cli ens port migrate --sw-id 123 --port-id 1 --lcore-id 0 --dir 1"
        );
    }

    #[test]
    fn dvs_vlan_4095_enables_guest_tagging() {
        assert!(EsxCommands::dvs_portgroup_vlan("dvs0", "pg", 4095).contains("--guest-tagging -p pg"));
        assert!(EsxCommands::dvs_portgroup_vlan("dvs0", "pg", 10)
            .contains("--no-guest-tagging --vlan 10 -p pg -dvs dvs0"));
    }

    #[test]
    fn failover_default_joins_uplinks() {
        let cmd = EsxCommands::vswitch_failover_default("vSwitch1", &["vmnic2".into(), "vmnic3".into()]);
        assert_eq!(
            cmd,
            "esxcli network vswitch standard policy failover set -v vSwitch1 -a vmnic2,vmnic3 -b true -f link -l portid -n true -s ''"
        );
    }
}
