mod cli;

use clap::Parser;
use cli::{Cli, Commands};
use esxi_vswitch::{
    apply_plan, EsxiError, EsxiResult, HostConfig, PolicyClient, PolicyPlan, SshSession,
    SwitchListing,
};
use serde::Serialize;
use std::process::ExitCode;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    // Library crates log through `log`; the fmt subscriber bridges those records.
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> EsxiResult<ExitCode> {
    if let Commands::Apply { plan } = &cli.command {
        let plan = PolicyPlan::from_file(plan)?;
        let session = SshSession::connect(&plan.host).await?;
        let report = apply_plan(&session, &plan).await;
        let report = after_disconnect(report, session.disconnect().await);

        print(cli.json, &report, || {
            format!("applied {}/{} changes", report.applied, report.total)
        })?;
        return Ok(match report.error {
            Some(e) => {
                error!("{e}");
                ExitCode::FAILURE
            }
            None => ExitCode::SUCCESS,
        });
    }

    let config = cli.connection.resolve()?;
    let session = SshSession::connect(&config).await?;
    let result = dispatch(&session, &config, &cli).await;
    after_disconnect(result, session.disconnect().await).map(|_| ExitCode::SUCCESS)
}

/// The command's outcome wins; a failed disconnect is only logged.
fn after_disconnect<T>(outcome: T, disconnect: EsxiResult<()>) -> T {
    if let Err(e) = disconnect {
        warn!("Closing the session failed: {e}");
    }
    outcome
}

async fn dispatch(session: &SshSession, config: &HostConfig, cli: &Cli) -> EsxiResult<()> {
    let client = PolicyClient::new(session).with_default_vds(config.default_vds.clone());

    match &cli.command {
        Commands::ForgedTransmit { portgroup, state } => {
            client.set_forged_transmit(portgroup, state.enabled()).await?;
            info!("forged transmits on {portgroup}: {state:?}");
        }
        Commands::MacChange { portgroup, state } => {
            client.set_mac_change_policy(portgroup, state.enabled()).await?;
            info!("MAC address changes on {portgroup}: {state:?}");
        }
        Commands::EnsFpo { state, vds } => {
            client
                .change_ens_fpo_support(state.enabled(), vds.as_deref())
                .await?;
            info!("ENS FPO {:?} on {:?}", state, client.fpo_target(vds.as_deref()));
        }
        Commands::Show { portgroup } => {
            let vswitch = client.resolve_portgroup(portgroup).await?;
            let policy = client.security_policy(portgroup).await?;
            print(cli.json, &policy, || {
                format!(
                    "{portgroup} ({vswitch})\n  promiscuous:     {}\n  MAC changes:     {}\n  forged transmit: {}",
                    policy.allow_promiscuous, policy.allow_mac_change, policy.allow_forged_transmits
                )
            })?;
        }
        Commands::List => {
            let listing = client.listing().await?;
            print(cli.json, &listing, || render_listing(&listing))?;
        }
        Commands::Apply { .. } => {
            return Err(EsxiError::invalid_parameter(
                "apply takes its connection from the plan file",
            ))
        }
    }
    Ok(())
}

fn print<T: Serialize>(json: bool, value: &T, text: impl FnOnce() -> String) -> EsxiResult<()> {
    if json {
        let out = serde_json::to_string_pretty(value)
            .map_err(|e| EsxiError::parse(format!("Cannot serialise output: {e}")))?;
        println!("{out}");
    } else {
        println!("{}", text());
    }
    Ok(())
}

fn render_listing(listing: &SwitchListing) -> String {
    let mut out = String::new();
    for vs in &listing.standard {
        out.push_str(&format!(
            "vSwitch {} mtu={} uplinks=[{}]\n",
            vs.name,
            vs.mtu,
            vs.uplinks.join(",")
        ));
        for pg in &vs.portgroups {
            out.push_str(&format!("  {pg}\n"));
        }
    }
    for dvs in &listing.distributed {
        let bound: Vec<String> = dvs
            .uplinks
            .iter()
            .filter_map(|(slot, nic)| nic.as_ref().map(|n| format!("{slot}={n}")))
            .collect();
        out.push_str(&format!(
            "DVS {} mtu={} uplinks=[{}]\n",
            dvs.name,
            dvs.mtu,
            bound.join(",")
        ));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use esxi_vswitch::{DistributedSwitch, PlanReport, StandardSwitch};

    #[test]
    fn disconnect_failure_keeps_command_outcome() {
        let closed = Err(EsxiError::connection("socket closed"));
        let outcome: EsxiResult<()> = Err(EsxiError::not_found("Portgroup PG-Missing not found"));
        let kept = after_disconnect(outcome, closed.clone()).unwrap_err();
        assert_eq!(kept.kind, esxi_vswitch::EsxiErrorKind::NotFound);

        let report = PlanReport {
            applied: 2,
            total: 3,
            error: None,
        };
        let kept = after_disconnect(report, closed);
        assert_eq!((kept.applied, kept.total), (2, 3));

        assert!(after_disconnect(Ok::<_, EsxiError>(7), Ok(())).is_ok());
    }

    #[test]
    fn listing_renders_switches_and_portgroups() {
        let listing = SwitchListing {
            standard: vec![StandardSwitch {
                name: "vSwitch0".into(),
                mtu: 1500,
                uplinks: vec!["vmnic0".into(), "vmnic1".into()],
                portgroups: vec!["VM Network".into()],
            }],
            distributed: vec![DistributedSwitch {
                name: "dvs0".into(),
                mtu: 9000,
                uplinks: [("uplink0".to_string(), Some("vmnic4".to_string()))].into(),
                portgroups: vec![],
            }],
        };
        assert_eq!(
            render_listing(&listing),
            "vSwitch vSwitch0 mtu=1500 uplinks=[vmnic0,vmnic1]\n  VM Network\nDVS dvs0 mtu=9000 uplinks=[uplink0=vmnic4]"
        );
    }
}
