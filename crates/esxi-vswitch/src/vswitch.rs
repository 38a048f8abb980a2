//! Standard vSwitch lifecycle: switches, uplinks, portgroups, MTU, VLANs.

use crate::error::{EsxiError, EsxiResult};
use crate::esxcli::EsxCommands;
use crate::parse::parse_switch_listing;
use crate::session::HostSession;
use crate::types::*;
use log::info;

const MTU_RANGE: std::ops::RangeInclusive<u32> = 1280..=9000;
const MAX_VLAN: u16 = 4095;

/// Standard vSwitch operations over a borrowed session.
pub struct StandardSwitchManager<'a, S: HostSession + ?Sized> {
    session: &'a S,
}

impl<'a, S: HostSession + ?Sized> StandardSwitchManager<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self { session }
    }

    // ── List / Get ──────────────────────────────────────────────────

    /// All standard switches on the host.
    pub async fn list(&self) -> EsxiResult<Vec<StandardSwitch>> {
        let out = self.session.run_ok(&EsxCommands::list_switches()).await?;
        Ok(parse_switch_listing(&out.stdout)?.standard)
    }

    pub async fn get(&self, name: &str) -> EsxiResult<StandardSwitch> {
        self.find(|s| s.name == name)
            .await?
            .ok_or_else(|| EsxiError::not_found(format!("Could not find vSwitch {name}")))
    }

    pub async fn find_by_portgroup(&self, portgroup: &str) -> EsxiResult<Option<StandardSwitch>> {
        self.find(|s| s.has_portgroup(portgroup)).await
    }

    pub async fn find_by_uplink(&self, vmnic: &str) -> EsxiResult<Option<StandardSwitch>> {
        self.find(|s| s.has_uplink(vmnic)).await
    }

    async fn find(
        &self,
        pred: impl Fn(&StandardSwitch) -> bool,
    ) -> EsxiResult<Option<StandardSwitch>> {
        Ok(self.list().await?.into_iter().find(|s| pred(s)))
    }

    async fn require_portgroup(&self, portgroup: &str) -> EsxiResult<StandardSwitch> {
        EsxCommands::require_name("Portgroup", portgroup)?;
        self.find_by_portgroup(portgroup)
            .await?
            .ok_or_else(|| EsxiError::not_found(format!("Portgroup {portgroup} not found")))
    }

    // ── Switches ────────────────────────────────────────────────────

    /// Create a switch. Names are letters, digits and underscore only.
    pub async fn add(&self, name: &str) -> EsxiResult<StandardSwitch> {
        EsxCommands::validate_new_name("Switch", name)?;
        info!("[{}] Adding vSwitch {name}", self.session.host());
        self.session.run_void(&EsxCommands::vswitch_add(name)).await?;
        Ok(StandardSwitch {
            name: name.to_string(),
            mtu: default_mtu(),
            uplinks: Vec::new(),
            portgroups: Vec::new(),
        })
    }

    pub async fn remove(&self, name: &str) -> EsxiResult<()> {
        self.get(name).await?;
        info!("[{}] Removing vSwitch {name}", self.session.host());
        self.session.run_void(&EsxCommands::vswitch_remove(name)).await
    }

    pub async fn set_mtu(&self, name: &str, mtu: u32) -> EsxiResult<()> {
        if !MTU_RANGE.contains(&mtu) {
            return Err(EsxiError::invalid_parameter(format!(
                "MTU {mtu} outside {}-{}",
                MTU_RANGE.start(),
                MTU_RANGE.end()
            )));
        }
        self.session.run_void(&EsxCommands::vswitch_mtu(name, mtu)).await
    }

    // ── Uplinks ─────────────────────────────────────────────────────

    /// Attach a vmnic. Returns `false` when it was already attached.
    pub async fn add_uplink(&self, name: &str, vmnic: &str) -> EsxiResult<bool> {
        let vswitch = self.get(name).await?;
        if vswitch.has_uplink(vmnic) {
            return Ok(false);
        }
        self.session
            .run_void(&EsxCommands::vswitch_uplink_add(name, vmnic))
            .await?;
        Ok(true)
    }

    pub async fn remove_uplink(&self, name: &str, vmnic: &str) -> EsxiResult<()> {
        let vswitch = self.get(name).await?;
        if !vswitch.has_uplink(vmnic) {
            return Err(EsxiError::not_found(format!("Uplink {vmnic} not on {name}")));
        }
        self.session
            .run_void(&EsxCommands::vswitch_uplink_remove(name, vmnic))
            .await
    }

    // ── Portgroups ──────────────────────────────────────────────────

    /// Create a portgroup. Returns `false` when it already existed.
    pub async fn add_portgroup(&self, name: &str, portgroup: &str) -> EsxiResult<bool> {
        let vswitch = self.get(name).await?;
        if vswitch.has_portgroup(portgroup) {
            return Ok(false);
        }
        EsxCommands::validate_new_name("Portgroup", portgroup)?;
        self.session
            .run_void(&EsxCommands::portgroup_add(name, portgroup))
            .await?;
        Ok(true)
    }

    pub async fn remove_portgroup(&self, name: &str, portgroup: &str) -> EsxiResult<()> {
        let vswitch = self.get(name).await?;
        if !vswitch.has_portgroup(portgroup) {
            return Err(EsxiError::not_found(format!(
                "Portgroup {portgroup} not on {name}"
            )));
        }
        self.session
            .run_void(&EsxCommands::portgroup_remove(name, portgroup))
            .await
    }

    /// 0 = untagged, 4095 = all VLANs (guest tagging).
    pub async fn set_portgroup_vlan(&self, portgroup: &str, vlan: u16) -> EsxiResult<()> {
        if vlan > MAX_VLAN {
            return Err(EsxiError::invalid_parameter(format!(
                "VLAN ID {vlan} outside 0-{MAX_VLAN}"
            )));
        }
        self.require_portgroup(portgroup).await?;
        self.session
            .run_void(&EsxCommands::portgroup_vlan(portgroup, vlan))
            .await
    }

    /// Pin a portgroup to the given active uplinks, no standbys.
    pub async fn set_portgroup_uplinks(&self, portgroup: &str, uplinks: &[String]) -> EsxiResult<()> {
        self.require_portgroup(portgroup).await?;
        self.session
            .run_void(&EsxCommands::portgroup_active_uplinks(portgroup, uplinks))
            .await
    }

    // ── Defaults ────────────────────────────────────────────────────

    /// Failover, security and shaping of the switch back to host defaults.
    pub async fn restore_vswitch_default(&self, name: &str) -> EsxiResult<()> {
        let vswitch = self.get(name).await?;
        self.restore_vswitch_default_with(name, &vswitch.uplinks).await
    }

    async fn restore_vswitch_default_with(&self, name: &str, uplinks: &[String]) -> EsxiResult<()> {
        self.session
            .run_void(&EsxCommands::vswitch_failover_default(name, uplinks))
            .await?;
        self.session
            .run_void(&EsxCommands::vswitch_security_set(name, false, false, false))
            .await?;
        self.session
            .run_void(&EsxCommands::vswitch_shaping_disable(name))
            .await
    }

    /// Drop every portgroup override on the switch and untag its VLANs.
    pub async fn restore_portgroups_default(&self, name: &str) -> EsxiResult<()> {
        let vswitch = self.get(name).await?;
        self.restore_portgroups_default_with(&vswitch.portgroups).await
    }

    async fn restore_portgroups_default_with(&self, portgroups: &[String]) -> EsxiResult<()> {
        for portgroup in portgroups {
            for cmd in [
                EsxCommands::portgroup_vlan(portgroup, 0),
                EsxCommands::portgroup_failover_inherit(portgroup),
                EsxCommands::portgroup_security_inherit(portgroup),
                EsxCommands::portgroup_shaping_inherit(portgroup),
            ] {
                self.session.run_void(&cmd).await?;
            }
        }
        Ok(())
    }

    // ── Desired state ───────────────────────────────────────────────

    /// Add whatever `spec` lists that the switch lacks, then fix the MTU.
    pub async fn configure(&self, spec: &SwitchSpec) -> EsxiResult<StandardSwitch> {
        let current = self.get(&spec.name).await?;
        self.configure_from(current, spec).await
    }

    async fn configure_from(
        &self,
        mut current: StandardSwitch,
        spec: &SwitchSpec,
    ) -> EsxiResult<StandardSwitch> {
        let name = spec.name.as_str();
        for vmnic in &spec.uplinks {
            if !current.has_uplink(vmnic) {
                self.session
                    .run_void(&EsxCommands::vswitch_uplink_add(name, vmnic))
                    .await?;
                current.uplinks.push(vmnic.clone());
            }
        }
        for portgroup in &spec.portgroups {
            if !current.has_portgroup(portgroup) {
                EsxCommands::validate_new_name("Portgroup", portgroup)?;
                self.session
                    .run_void(&EsxCommands::portgroup_add(name, portgroup))
                    .await?;
                current.portgroups.push(portgroup.clone());
            }
        }
        if current.mtu != spec.mtu {
            self.set_mtu(name, spec.mtu).await?;
            current.mtu = spec.mtu;
        }
        Ok(current)
    }

    /// Converge an existing switch onto `spec`: drop extra uplinks and
    /// portgroups, reset policies, then configure.
    pub async fn reconfigure(&self, spec: &SwitchSpec) -> EsxiResult<StandardSwitch> {
        let current = self.get(&spec.name).await?;
        let name = spec.name.as_str();
        info!("[{}] Reconfiguring vSwitch {name}", self.session.host());

        let mut uplinks = Vec::new();
        for vmnic in &current.uplinks {
            if spec.uplinks.contains(vmnic) {
                uplinks.push(vmnic.clone());
            } else {
                self.session
                    .run_void(&EsxCommands::vswitch_uplink_remove(name, vmnic))
                    .await?;
            }
        }
        for vmnic in &spec.uplinks {
            if !uplinks.contains(vmnic) {
                self.session
                    .run_void(&EsxCommands::vswitch_uplink_add(name, vmnic))
                    .await?;
                uplinks.push(vmnic.clone());
            }
        }

        self.restore_vswitch_default_with(name, &uplinks).await?;

        let mut portgroups = Vec::new();
        for portgroup in &current.portgroups {
            if spec.portgroups.contains(portgroup) {
                portgroups.push(portgroup.clone());
            } else {
                self.session
                    .run_void(&EsxCommands::portgroup_remove(name, portgroup))
                    .await?;
            }
        }

        self.restore_portgroups_default_with(&portgroups).await?;

        let converged = StandardSwitch {
            name: current.name,
            mtu: current.mtu,
            uplinks,
            portgroups,
        };
        self.configure_from(converged, spec).await
    }

    /// Reconfigure the switch if it exists, otherwise create and configure it.
    pub async fn ensure(&self, spec: &SwitchSpec) -> EsxiResult<StandardSwitch> {
        match self.get(&spec.name).await {
            Ok(_) => self.reconfigure(spec).await,
            Err(e) if e.is_not_found() => {
                let created = self.add(&spec.name).await?;
                self.configure_from(created, spec).await
            }
            Err(e) => Err(e),
        }
    }
}
