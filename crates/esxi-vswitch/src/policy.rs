//! Portgroup security and ENS FPO settings.
//!
//! Every call resolves its target from a fresh switch listing before it
//! issues the single mutating command, so a missing portgroup or vDS fails
//! with `NotFound` and leaves the host untouched.

use crate::error::{EsxiError, EsxiResult};
use crate::esxcli::{EsxCommands, SecurityFlag};
use crate::parse::{parse_security_policy, parse_switch_listing};
use crate::session::HostSession;
use crate::types::*;
use log::info;

/// Applies policy settings through a borrowed host session.
pub struct PolicyClient<'a, S: HostSession + ?Sized> {
    session: &'a S,
    default_vds: Option<String>,
}

impl<'a, S: HostSession + ?Sized> PolicyClient<'a, S> {
    pub fn new(session: &'a S) -> Self {
        Self {
            session,
            default_vds: None,
        }
    }

    /// Switch targeted by `change_ens_fpo_support` when the caller names none.
    pub fn with_default_vds(mut self, vds: Option<impl Into<String>>) -> Self {
        self.default_vds = vds.map(Into::into);
        self
    }

    pub fn default_vds(&self) -> Option<&str> {
        self.default_vds.as_deref()
    }

    // ── Lookups ─────────────────────────────────────────────────────

    /// Current switch inventory.
    pub async fn listing(&self) -> EsxiResult<SwitchListing> {
        let out = self.session.run_ok(&EsxCommands::list_switches()).await?;
        parse_switch_listing(&out.stdout)
    }

    /// Name of the standard switch carrying `portgroup`.
    pub async fn resolve_portgroup(&self, portgroup: &str) -> EsxiResult<String> {
        EsxCommands::require_name("Portgroup", portgroup)?;
        let listing = self.listing().await?;
        listing
            .switch_with_portgroup(portgroup)
            .map(|s| s.name.clone())
            .ok_or_else(|| {
                EsxiError::not_found(format!(
                    "Portgroup {portgroup} not found on {}",
                    self.session.host()
                ))
            })
    }

    /// Where an FPO change lands: explicit vDS, else the default, else host-wide.
    pub fn fpo_target(&self, vds: Option<&str>) -> FpoTarget {
        match vds.or(self.default_vds.as_deref()) {
            Some(name) => FpoTarget::Switch(name.to_string()),
            None => FpoTarget::Global,
        }
    }

    // ── Queries ─────────────────────────────────────────────────────

    /// Effective security policy of a portgroup.
    pub async fn security_policy(&self, portgroup: &str) -> EsxiResult<SecurityPolicy> {
        self.resolve_portgroup(portgroup).await?;
        let out = self
            .session
            .run_ok(&EsxCommands::portgroup_security_get(portgroup))
            .await?;
        parse_security_policy(&out.stdout)
    }

    // ── Mutations ───────────────────────────────────────────────────

    async fn set_security_flag(
        &self,
        portgroup: &str,
        flag: SecurityFlag,
        enable: bool,
    ) -> EsxiResult<()> {
        let vswitch = self.resolve_portgroup(portgroup).await?;
        info!(
            "[{}] {} {} on portgroup {portgroup} ({vswitch})",
            self.session.host(),
            if enable { "Allowing" } else { "Rejecting" },
            flag.label()
        );
        self.session
            .run_void(&EsxCommands::portgroup_security_set(portgroup, flag, enable))
            .await
    }

    /// Allow or reject forged transmits on a portgroup.
    pub async fn set_forged_transmit(&self, portgroup: &str, enable: bool) -> EsxiResult<()> {
        self.set_security_flag(portgroup, SecurityFlag::ForgedTransmits, enable)
            .await
    }

    /// Allow or reject guest MAC address changes on a portgroup.
    pub async fn set_mac_change_policy(&self, portgroup: &str, enable: bool) -> EsxiResult<()> {
        self.set_security_flag(portgroup, SecurityFlag::MacChange, enable)
            .await
    }

    /// Enable or disable ENS Flow Processing Offload.
    ///
    /// `vds` wins over the configured default; with neither the setting is
    /// changed host-wide. A named switch must exist on the host.
    pub async fn change_ens_fpo_support(&self, enable: bool, vds: Option<&str>) -> EsxiResult<()> {
        let target = self.fpo_target(vds);
        let switch = match &target {
            FpoTarget::Switch(name) => {
                EsxCommands::require_name("vDS", name)?;
                let listing = self.listing().await?;
                if listing.distributed_switch(name).is_none() {
                    return Err(EsxiError::not_found(format!(
                        "Distributed switch {name} not found on {}",
                        self.session.host()
                    )));
                }
                Some(name.as_str())
            }
            FpoTarget::Global => None,
        };

        info!(
            "[{}] {} ENS FPO on {}",
            self.session.host(),
            if enable { "Enabling" } else { "Disabling" },
            switch.unwrap_or("all switches")
        );
        self.session
            .run_void(&EsxCommands::ens_fpo_set(enable, switch))
            .await
    }
}
