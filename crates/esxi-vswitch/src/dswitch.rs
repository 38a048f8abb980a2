//! Host-local distributed switches (ENS capable).
//!
//! These are the `--dvswitch` switches created with `esxcfg-vswitch` on a
//! standalone host, not vCenter-managed vDS objects.

use crate::error::{EsxiError, EsxiResult};
use crate::esxcli::EsxCommands;
use crate::parse::{
    parse_dvs_id, parse_ens_lcores, parse_ens_switch_id, parse_ens_vnic_ports,
    parse_switch_listing, uplink_slot,
};
use crate::session::HostSession;
use crate::types::*;
use log::info;
use std::time::Duration;

/// Time the datapath needs after an ENS mode switch.
const ENS_SETTLE: Duration = Duration::from_secs(5);
const MTU_RANGE: std::ops::RangeInclusive<u32> = 1500..=9000;
const GUEST_TAGGING_VLAN: u16 = 4095;
/// Most ENS lcores a host hands out.
const MAX_LCORES: usize = 8;

pub struct DistributedSwitchManager<'a, S: HostSession + ?Sized> {
    session: &'a S,
    ens_settle: Duration,
}

impl<'a, S: HostSession + ?Sized> DistributedSwitchManager<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self {
            session,
            ens_settle: ENS_SETTLE,
        }
    }

    /// Override the pause after enabling or disabling ENS.
    pub fn with_ens_settle(mut self, settle: Duration) -> Self {
        self.ens_settle = settle;
        self
    }

    // ── List / Get ──────────────────────────────────────────────────

    pub async fn list(&self) -> EsxiResult<Vec<DistributedSwitch>> {
        let out = self.session.run_ok(&EsxCommands::list_switches()).await?;
        Ok(parse_switch_listing(&out.stdout)?.distributed)
    }

    pub async fn get(&self, name: &str) -> EsxiResult<DistributedSwitch> {
        self.list()
            .await?
            .into_iter()
            .find(|s| s.name == name)
            .ok_or_else(|| EsxiError::not_found(format!("Could not find DVS {name}")))
    }

    /// DVS that has `vmnic` bound to one of its uplinks.
    pub async fn find_by_uplink(&self, vmnic: &str) -> EsxiResult<DistributedSwitch> {
        self.list()
            .await?
            .into_iter()
            .find(|s| s.uplink_of(vmnic).is_some())
            .ok_or_else(|| EsxiError::not_found(format!("Could not find DVS with uplink {vmnic}")))
    }

    pub async fn find_by_portgroup(&self, portgroup: &str) -> EsxiResult<DistributedSwitch> {
        self.list()
            .await?
            .into_iter()
            .find(|s| s.has_portgroup(portgroup))
            .ok_or_else(|| {
                EsxiError::not_found(format!("Could not find DVS with portgroup {portgroup}"))
            })
    }

    // ── Switches ────────────────────────────────────────────────────

    pub async fn add(&self, name: &str) -> EsxiResult<DistributedSwitch> {
        EsxCommands::validate_new_name("Switch", name)?;
        info!("[{}] Adding DVS {name}", self.session.host());
        self.session.run_void(&EsxCommands::dvs_add(name)).await?;
        Ok(DistributedSwitch {
            name: name.to_string(),
            mtu: default_mtu(),
            uplinks: Default::default(),
            portgroups: Vec::new(),
        })
    }

    pub async fn remove(&self, name: &str) -> EsxiResult<()> {
        self.get(name).await?;
        info!("[{}] Removing DVS {name}", self.session.host());
        self.session.run_void(&EsxCommands::dvs_remove(name)).await
    }

    /// Switch UUID as printed by `net-dvs`.
    pub async fn switch_id(&self, name: &str) -> EsxiResult<String> {
        EsxCommands::require_name("DVS", name)?;
        let out = self.session.run_ok(&EsxCommands::dvs_info(name)).await?;
        parse_dvs_id(&out.stdout)
    }

    pub async fn set_mtu(&self, name: &str, mtu: u32) -> EsxiResult<()> {
        if !MTU_RANGE.contains(&mtu) {
            return Err(EsxiError::invalid_parameter(format!(
                "MTU should be in range {}-{}, got {mtu}",
                MTU_RANGE.start(),
                MTU_RANGE.end()
            )));
        }
        self.session.run_void(&EsxCommands::dvs_mtu(name, mtu)).await
    }

    // ── Uplinks ─────────────────────────────────────────────────────

    /// Resize the switch to `count` uplink slots.
    pub async fn set_uplink_number(&self, name: &str, count: usize) -> EsxiResult<()> {
        self.session
            .run_void(&EsxCommands::dvs_uplink_number(name, count))
            .await
    }

    /// Bind `vmnic` to the first free of `slots` uplinks and return the slot.
    ///
    /// An adapter that is already bound keeps its slot.
    pub async fn link_adapter(&self, name: &str, vmnic: &str, slots: usize) -> EsxiResult<String> {
        let dvs = self.get(name).await?;
        if let Some(slot) = dvs.uplink_of(vmnic) {
            return Ok(slot.to_string());
        }
        let slot = (0..slots)
            .map(uplink_slot)
            .find(|s| dvs.uplinks.get(s).map_or(true, Option::is_none))
            .ok_or_else(|| {
                EsxiError::invalid_parameter(format!("No free uplinks on {name} for {vmnic}"))
            })?;
        self.session
            .run_void(&EsxCommands::dvs_link_adapter(name, vmnic, &slot))
            .await?;
        Ok(slot)
    }

    pub async fn unlink_adapter(&self, name: &str, vmnic: &str) -> EsxiResult<()> {
        let dvs = self.get(name).await?;
        let slot = dvs
            .uplink_of(vmnic)
            .ok_or_else(|| EsxiError::not_found(format!("{vmnic} is not linked to {name}")))?;
        self.session
            .run_void(&EsxCommands::dvs_unlink_adapter(name, vmnic, slot))
            .await
    }

    // ── Portgroups ──────────────────────────────────────────────────

    pub async fn add_portgroup(&self, name: &str, portgroup: &str) -> EsxiResult<()> {
        EsxCommands::require_name("Portgroup", portgroup)?;
        self.session
            .run_void(&EsxCommands::dvs_portgroup_add(name, portgroup))
            .await
    }

    pub async fn remove_portgroup(&self, name: &str, portgroup: &str) -> EsxiResult<()> {
        let dvs = self.get(name).await?;
        if !dvs.has_portgroup(portgroup) {
            return Err(EsxiError::not_found(format!(
                "Portgroup {portgroup} not found in {name}"
            )));
        }
        self.session
            .run_void(&EsxCommands::dvs_portgroup_remove(name, portgroup))
            .await
    }

    /// 4095 hands tagging to the guest.
    pub async fn set_portgroup_vlan(&self, name: &str, portgroup: &str, vlan: u16) -> EsxiResult<()> {
        if vlan > GUEST_TAGGING_VLAN {
            return Err(EsxiError::invalid_parameter(format!(
                "VLAN ID should be in range 0-{GUEST_TAGGING_VLAN}, got {vlan}"
            )));
        }
        self.session
            .run_void(&EsxCommands::dvs_portgroup_vlan(name, portgroup, vlan))
            .await
    }

    // ── Desired state ───────────────────────────────────────────────

    /// Size the uplinks to `spec`, bind its adapters in order, add missing
    /// portgroups and set the MTU.
    pub async fn configure(&self, spec: &SwitchSpec) -> EsxiResult<()> {
        let name = spec.name.as_str();
        let current = self.get(name).await?;

        self.set_uplink_number(name, spec.uplinks.len()).await?;
        for (idx, vmnic) in spec.uplinks.iter().enumerate() {
            self.session
                .run_void(&EsxCommands::dvs_link_adapter(name, vmnic, &uplink_slot(idx)))
                .await?;
        }
        for portgroup in &spec.portgroups {
            if !current.has_portgroup(portgroup) {
                self.add_portgroup(name, portgroup).await?;
            }
        }
        if current.mtu != spec.mtu {
            self.set_mtu(name, spec.mtu).await?;
        }
        Ok(())
    }

    /// Unbind every adapter, drop portgroups `spec` does not list, then configure.
    pub async fn reconfigure(&self, spec: &SwitchSpec) -> EsxiResult<()> {
        let name = spec.name.as_str();
        let current = self.get(name).await?;
        info!("[{}] Reconfiguring DVS {name}", self.session.host());

        for (slot, bound) in &current.uplinks {
            if let Some(vmnic) = bound {
                self.session
                    .run_void(&EsxCommands::dvs_unlink_adapter(name, vmnic, slot))
                    .await?;
            }
        }
        for portgroup in &current.portgroups {
            if !spec.portgroups.contains(portgroup) {
                self.session
                    .run_void(&EsxCommands::dvs_portgroup_remove(name, portgroup))
                    .await?;
            }
        }
        self.configure(spec).await
    }

    // ── ENS ─────────────────────────────────────────────────────────

    /// Switch the DVS to the ENS datapath and return its ENS switch ID.
    pub async fn enable_ens(&self, name: &str) -> EsxiResult<u32> {
        EsxCommands::require_name("DVS", name)?;
        info!("[{}] Enabling ENS on {name}", self.session.host());
        self.session.run_void(&EsxCommands::ens_enable(name)).await?;
        let id = self.ens_switch_id(name).await?;
        tokio::time::sleep(self.ens_settle).await;
        Ok(id)
    }

    pub async fn disable_ens(&self, name: &str) -> EsxiResult<()> {
        EsxCommands::require_name("DVS", name)?;
        info!("[{}] Disabling ENS on {name}", self.session.host());
        self.session.run_void(&EsxCommands::ens_disable(name)).await?;
        tokio::time::sleep(self.ens_settle).await;
        self.del_ens_lcores().await?;
        Ok(())
    }

    pub async fn ens_switch_id(&self, name: &str) -> EsxiResult<u32> {
        let out = self.session.run_ok(&EsxCommands::ens_switch_list()).await?;
        parse_ens_switch_id(&out.stdout, name)
    }

    pub async fn set_thread_load_balancer(&self, name: &str, enable: bool) -> EsxiResult<()> {
        EsxCommands::require_name("DVS", name)?;
        self.session
            .run_void(&EsxCommands::ens_thread_load_balancer(name, enable))
            .await
    }

    // ── ENS lcores ──────────────────────────────────────────────────

    pub async fn ens_lcores(&self) -> EsxiResult<Vec<EnsLcore>> {
        let out = self.session.run_ok(&EsxCommands::ens_lcore_list()).await?;
        parse_ens_lcores(&out.stdout)
    }

    /// Make `count` lcores (at most 8) serve `name`.
    ///
    /// Lcores already serving the switch count towards the total, free ones
    /// are taken next and new lcores are created with the lowest unused IDs.
    /// Returns the IDs assigned by this call.
    pub async fn add_ens_lcores(&self, name: &str, count: usize) -> EsxiResult<Vec<u32>> {
        EsxCommands::require_name("DVS", name)?;
        let listed = self.ens_lcores().await?;
        let mut remaining = count.min(MAX_LCORES);
        let mut assigned = Vec::new();

        for lcore in &listed {
            if remaining == 0 {
                break;
            }
            match lcore.switch.as_deref() {
                Some(owner) if owner == name => remaining -= 1,
                Some(_) => {}
                None => {
                    self.session
                        .run_void(&EsxCommands::ens_lcore_assign(name, lcore.id))
                        .await?;
                    assigned.push(lcore.id);
                    remaining -= 1;
                }
            }
        }

        let mut id = 0;
        while remaining > 0 {
            if !listed.iter().any(|l| l.id == id) {
                self.session.run_void(&EsxCommands::ens_lcore_add(id)).await?;
                self.session
                    .run_void(&EsxCommands::ens_lcore_assign(name, id))
                    .await?;
                assigned.push(id);
                remaining -= 1;
            }
            id += 1;
        }

        if !assigned.is_empty() {
            info!(
                "[{}] Assigned ENS lcores {assigned:?} to {name}",
                self.session.host()
            );
        }
        Ok(assigned)
    }

    /// Remove every lcore that serves no switch and return their IDs.
    pub async fn del_ens_lcores(&self) -> EsxiResult<Vec<u32>> {
        let mut removed = Vec::new();
        for lcore in self.ens_lcores().await? {
            if lcore.switch.is_none() {
                self.session
                    .run_void(&EsxCommands::ens_lcore_remove(lcore.id))
                    .await?;
                removed.push(lcore.id);
            }
        }
        Ok(removed)
    }

    /// Spread the VNIC ports of `name` round-robin over the lcores, both
    /// directions, with the thread load balancer off. Returns the number of
    /// ports moved.
    pub async fn migrate_ens_lcores(&self, name: &str) -> EsxiResult<usize> {
        self.set_thread_load_balancer(name, false).await?;
        let sw_id = self.ens_switch_id(name).await?;
        let out = self
            .session
            .run_ok(&EsxCommands::ens_port_list(sw_id))
            .await?;
        let ports = parse_ens_vnic_ports(&out.stdout)?;

        for (idx, port) in ports.iter().enumerate() {
            let lcore = (idx % MAX_LCORES) as u32;
            for dir in [0, 1] {
                self.session
                    .run_void(&EsxCommands::ens_port_migrate(sw_id, *port, lcore, dir))
                    .await?;
            }
        }
        info!(
            "[{}] Migrated {} ENS ports on {name}",
            self.session.host(),
            ports.len()
        );
        Ok(ports.len())
    }
}
