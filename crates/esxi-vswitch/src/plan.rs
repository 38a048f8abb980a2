//! Declarative policy plans loaded from YAML.

use crate::config::HostConfig;
use crate::error::{EsxiError, EsxiResult};
use crate::policy::PolicyClient;
use crate::session::HostSession;
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Security flags wanted on one portgroup. Absent flags are left alone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortgroupPolicy {
    pub name: String,
    #[serde(default)]
    pub forged_transmit: Option<bool>,
    #[serde(default)]
    pub mac_change: Option<bool>,
}

/// One ENS FPO toggle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FpoSetting {
    pub enable: bool,
    #[serde(default)]
    pub vds: Option<String>,
}

/// A host plus the settings to push to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PolicyPlan {
    pub host: HostConfig,
    #[serde(default)]
    pub portgroups: Vec<PortgroupPolicy>,
    #[serde(default)]
    pub ens_fpo: Vec<FpoSetting>,
}

impl PolicyPlan {
    pub fn from_yaml(text: &str) -> EsxiResult<Self> {
        let mut plan: PolicyPlan = serde_yaml::from_str(text)?;
        plan.host.apply_env();
        Ok(plan)
    }

    pub fn from_file(path: impl AsRef<Path>) -> EsxiResult<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            EsxiError::invalid_parameter(format!("Cannot read plan {}: {e}", path.display()))
        })?;
        Self::from_yaml(&text)
    }

    /// Number of remote mutations the plan issues.
    pub fn change_count(&self) -> usize {
        let flags: usize = self
            .portgroups
            .iter()
            .map(|p| usize::from(p.forged_transmit.is_some()) + usize::from(p.mac_change.is_some()))
            .sum();
        flags + self.ens_fpo.len()
    }
}

/// Outcome of [`apply_plan`].
#[derive(Debug, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanReport {
    pub applied: usize,
    pub total: usize,
    /// First failure; nothing after it was attempted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<EsxiError>,
}

impl PlanReport {
    pub fn is_complete(&self) -> bool {
        self.error.is_none() && self.applied == self.total
    }
}

/// Apply every entry of `plan` in order, stopping at the first error.
///
/// Changes made before the failure stay in place.
pub async fn apply_plan<S: HostSession + ?Sized>(session: &S, plan: &PolicyPlan) -> PlanReport {
    let client = PolicyClient::new(session).with_default_vds(plan.host.default_vds.clone());
    let mut report = PlanReport {
        total: plan.change_count(),
        ..PlanReport::default()
    };

    if let Err(e) = apply_entries(&client, plan, &mut report.applied).await {
        warn!(
            "[{}] Plan stopped after {}/{} changes: {e}",
            session.host(),
            report.applied,
            report.total
        );
        report.error = Some(e);
    } else {
        info!("[{}] Plan applied: {} changes", session.host(), report.applied);
    }
    report
}

async fn apply_entries<S: HostSession + ?Sized>(
    client: &PolicyClient<'_, S>,
    plan: &PolicyPlan,
    applied: &mut usize,
) -> EsxiResult<()> {
    for pg in &plan.portgroups {
        if let Some(enable) = pg.forged_transmit {
            client.set_forged_transmit(&pg.name, enable).await?;
            *applied += 1;
        }
        if let Some(enable) = pg.mac_change {
            client.set_mac_change_policy(&pg.name, enable).await?;
            *applied += 1;
        }
    }
    for fpo in &plan.ens_fpo {
        client
            .change_ens_fpo_support(fpo.enable, fpo.vds.as_deref())
            .await?;
        *applied += 1;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::ScriptedSession;
    use crate::parse::fixtures::*;
    use crate::types::CommandOutput;

    const PLAN: &str = r#"
host:
  host: esx01.lab
  password: secret
  defaultVds: DSwitch_063LongName
portgroups:
  - name: ATmng
    forgedTransmit: true
    macChange: false
  - name: VM Network
    macChange: true
ensFpo:
  - enable: true
"#;

    #[test]
    fn plan_parses_camel_case_fields() {
        let plan = PolicyPlan::from_yaml(PLAN).unwrap();
        assert_eq!(plan.host.default_vds.as_deref(), Some("DSwitch_063LongName"));
        assert_eq!(plan.portgroups[1].forged_transmit, None);
        assert_eq!(plan.ens_fpo, vec![FpoSetting { enable: true, vds: None }]);
        assert_eq!(plan.change_count(), 4);
    }

    #[test]
    fn plan_file_is_read() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plan.yaml");
        std::fs::write(&path, PLAN).unwrap();
        assert_eq!(PolicyPlan::from_file(&path).unwrap().portgroups.len(), 2);
        assert!(PolicyPlan::from_file(dir.path().join("missing.yaml")).is_err());
    }

    #[tokio::test]
    async fn plan_applies_in_order_with_default_vds() {
        let session =
            ScriptedSession::new().on("esxcfg-vswitch -l", CommandOutput::ok(LISTING_MIXED));
        let plan = PolicyPlan::from_yaml(PLAN).unwrap();
        let report = apply_plan(&session, &plan).await;
        assert!(report.is_complete());
        assert_eq!(
            session.mutations(),
            vec![
                "esxcli network vswitch standard portgroup policy security set -p ATmng -f true",
                "esxcli network vswitch standard portgroup policy security set -p ATmng -m false",
                "esxcli network vswitch standard portgroup policy security set -p 'VM Network' -m true",
                "nsxdp-cli ens fpo set --enable -dvs DSwitch_063LongName",
            ]
        );
    }

    #[tokio::test]
    async fn plan_stops_at_first_failure() {
        let session =
            ScriptedSession::new().on("esxcfg-vswitch -l", CommandOutput::ok(LISTING_MIXED));
        let mut plan = PolicyPlan::from_yaml(PLAN).unwrap();
        plan.portgroups[1].name = "PG-Missing".into();
        let report = apply_plan(&session, &plan).await;
        assert_eq!(report.applied, 2);
        assert_eq!(report.total, 4);
        assert!(report.error.unwrap().is_not_found());
        assert_eq!(session.mutations().len(), 2);
    }
}
