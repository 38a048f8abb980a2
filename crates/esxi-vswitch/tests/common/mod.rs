//! In-memory ESXi host that keeps portgroup security and ENS FPO state.

#![allow(dead_code)]

use async_trait::async_trait;
use esxi_vswitch::*;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

const SECURITY_SET: &str = "esxcli network vswitch standard portgroup policy security set ";
const SECURITY_GET: &str = "esxcli network vswitch standard portgroup policy security get ";
const FPO_SET: &str = "nsxdp-cli ens fpo set ";

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HostState {
    /// vSwitch → (uplink, portgroup → policy)
    pub vswitches: BTreeMap<String, (String, BTreeMap<String, SecurityPolicy>)>,
    pub dvs: Vec<String>,
    pub fpo_global: Option<bool>,
    pub fpo: BTreeMap<String, bool>,
}

pub struct FakeHost {
    state: Mutex<HostState>,
    log: Mutex<Vec<String>>,
    expired: AtomicBool,
}

impl FakeHost {
    /// vSwitch0 with PG-Test and VM Network, vSwitch1 with PG-Other, plus
    /// distributed switches dvs0 and vds1.
    pub fn lab() -> Self {
        let mut state = HostState::default();
        let pgs = |names: &[&str]| {
            names
                .iter()
                .map(|n| (n.to_string(), SecurityPolicy::default()))
                .collect::<BTreeMap<_, _>>()
        };
        state
            .vswitches
            .insert("vSwitch0".into(), ("vmnic0".into(), pgs(&["PG-Test", "VM Network"])));
        state
            .vswitches
            .insert("vSwitch1".into(), ("vmnic1".into(), pgs(&["PG-Other"])));
        state.dvs = vec!["dvs0".into(), "vds1".into()];
        Self {
            state: Mutex::new(state),
            log: Mutex::new(Vec::new()),
            expired: AtomicBool::new(false),
        }
    }

    pub fn state(&self) -> HostState {
        self.state.lock().unwrap().clone()
    }

    pub fn policy(&self, portgroup: &str) -> Option<SecurityPolicy> {
        self.state()
            .vswitches
            .values()
            .find_map(|(_, pgs)| pgs.get(portgroup).copied())
    }

    pub fn commands(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Make every later command fail as an expired session would.
    pub fn expire(&self) {
        self.expired.store(true, Ordering::SeqCst);
    }

    fn listing(state: &HostState) -> String {
        let mut out = String::new();
        for (name, (uplink, pgs)) in &state.vswitches {
            out.push_str("Switch Name      Num Ports   Used Ports  Configured Ports  MTU     Uplinks\n");
            out.push_str(&format!("{:<17}{:<12}{:<12}{:<18}{:<8}{}\n\n", name, 2560, 4, 128, 1500, uplink));
            out.push_str(&format!("  {:<42}{:<9}{:<12}{}\n", "PortGroup Name", "VLAN ID", "Used Ports", "Uplinks"));
            for pg in pgs.keys() {
                out.push_str(&format!("  {:<42}{:<9}{:<12}{}\n", pg, 0, 0, uplink));
            }
            out.push('\n');
        }
        for name in &state.dvs {
            out.push_str("DVS Name         Num Ports   Used Ports  Configured Ports  MTU     Uplinks\n");
            out.push_str(&format!("{:<17}{:<12}{:<12}{:<18}{:<8}{}\n\n", name, 512, 1, 512, 9000, "vmnic5"));
            out.push_str(&format!("  {:<40}{:<12}{}\n", "DVPort ID", "In Use", "Client"));
            out.push_str(&format!("  {:<40}{:<12}{}\n\n", 0, 1, "vmnic5"));
        }
        out
    }

    fn handle(&self, command: &str) -> CommandOutput {
        let mut state = self.state.lock().unwrap();

        if command == "esxcfg-vswitch -l" {
            return CommandOutput::ok(Self::listing(&state));
        }

        if let Some(rest) = command.strip_prefix(SECURITY_SET) {
            let Some((pg, tail)) = rest.strip_prefix("-p ").map(split_arg) else {
                return CommandOutput::failed(1, "Error: Missing required parameter -p");
            };
            let Some(policy) = state
                .vswitches
                .values_mut()
                .find_map(|(_, pgs)| pgs.get_mut(&pg))
            else {
                return CommandOutput::failed(1, format!("Unable to find portgroup {pg}"));
            };
            let value = tail.ends_with("true");
            if tail.starts_with("-f") {
                policy.allow_forged_transmits = value;
            } else if tail.starts_with("-m") {
                policy.allow_mac_change = value;
            }
            return CommandOutput::ok("");
        }

        if let Some(rest) = command.strip_prefix(SECURITY_GET) {
            let pg = rest.strip_prefix("-p ").map(split_arg).map(|(pg, _)| pg);
            let policy = pg.as_ref().and_then(|pg| {
                state
                    .vswitches
                    .values()
                    .find_map(|(_, pgs)| pgs.get(pg).copied())
            });
            return match policy {
                Some(p) => CommandOutput::ok(format!(
                    "   Allow Promiscuous: {}\n   Allow MAC Address Change: {}\n   Allow Forged Transmits: {}\n",
                    p.allow_promiscuous, p.allow_mac_change, p.allow_forged_transmits
                )),
                None => CommandOutput::failed(1, "Unable to find portgroup"),
            };
        }

        if let Some(rest) = command.strip_prefix(FPO_SET) {
            let enable = rest.starts_with("--enable");
            match rest.split_once(" -dvs ") {
                Some((_, dvs)) => {
                    let (dvs, _) = split_arg(dvs);
                    state.fpo.insert(dvs, enable);
                }
                None => state.fpo_global = Some(enable),
            }
            return CommandOutput::ok("");
        }

        let tool = command.split_whitespace().next().unwrap_or_default();
        CommandOutput::failed(127, format!("sh: {tool}: not found"))
    }
}

/// First shell word of `s`, unquoting `'...'`, and the remainder.
fn split_arg(s: &str) -> (String, &str) {
    if let Some(quoted) = s.strip_prefix('\'') {
        let end = quoted.find('\'').unwrap_or(quoted.len());
        let rest = quoted.get(end + 1..).unwrap_or("");
        return (quoted[..end].to_string(), rest.trim_start());
    }
    match s.split_once(' ') {
        Some((word, rest)) => (word.to_string(), rest),
        None => (s.to_string(), ""),
    }
}

#[async_trait]
impl HostSession for FakeHost {
    fn host(&self) -> &str {
        "esx-fake"
    }

    async fn execute(&self, command: &str) -> EsxiResult<CommandOutput> {
        if self.expired.load(Ordering::SeqCst) {
            return Err(EsxiError::unauthorized("Session expired"));
        }
        self.log.lock().unwrap().push(command.to_string());
        Ok(self.handle(command))
    }
}
