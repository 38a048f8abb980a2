//! Parsers for host tool output.
//!
//! `esxcfg-vswitch -l` prints fixed-width tables in which long switch names
//! overflow their column, so names are recovered from both the column slice
//! and the first whitespace token.

use crate::error::{EsxiError, EsxiResult};
use crate::types::*;
use std::collections::BTreeMap;

const SWITCH_NAME_WIDTH: usize = 16;
const PORTGROUP_NAME_WIDTH: usize = 39;
const DVPORT_NAME_WIDTH: usize = 37;
const PORT_INDENT: usize = 2;

/// Slot name for the n-th DVS uplink.
pub fn uplink_slot(index: usize) -> String {
    format!("uplink{index}")
}

fn char_slice(line: &str, start: usize, end: usize) -> String {
    line.chars()
        .skip(start)
        .take(end.saturating_sub(start))
        .collect()
}

/// Switch name on a table row: the longer of the fixed column and the first token.
fn find_switch_name(line: &str, width: usize) -> String {
    let column = char_slice(line, 0, width).trim().to_string();
    let token = line.split_whitespace().next().unwrap_or_default().to_string();
    if column.chars().count() > token.chars().count() {
        column
    } else {
        token
    }
}

/// Column end for the name field, taken from the header when possible.
fn name_column_end(header: &str, next_title: &str, fallback_width: usize) -> usize {
    header
        .find(next_title)
        .map(|byte_idx| header[..byte_idx].chars().count())
        .unwrap_or(PORT_INDENT + fallback_width)
}

/// MTU and uplinks from a switch row: `... MTU [uplink,uplink]`.
fn parse_switch_row(line: &str) -> EsxiResult<(u32, Vec<String>)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    let last = fields
        .last()
        .ok_or_else(|| EsxiError::parse("Empty switch row"))?;

    if let Ok(mtu) = last.parse::<u32>() {
        return Ok((mtu, Vec::new()));
    }

    let mtu_field = fields
        .len()
        .checked_sub(2)
        .and_then(|i| fields.get(i))
        .ok_or_else(|| EsxiError::parse(format!("Switch row without MTU: '{line}'")))?;
    let mtu = mtu_field
        .parse::<u32>()
        .map_err(|e| EsxiError::parse(format!("Invalid MTU '{mtu_field}' in '{line}': {e}")))?;
    let uplinks = last
        .split(',')
        .filter(|u| !u.is_empty())
        .map(str::to_string)
        .collect();
    Ok((mtu, uplinks))
}

/// Name field of a port row.
///
/// Rows do not always line up with their header, so the value of the next
/// column can start inside the field. A name never holds two spaces in a row.
fn port_name(line: &str, end: usize) -> String {
    let field = char_slice(line, PORT_INDENT, end);
    let field = field.trim();
    field.split("  ").next().unwrap_or_default().trim_end().to_string()
}

/// Names listed in the port block that starts after `start`.
fn parse_port_block(
    lines: &[&str],
    start: usize,
    block_title: &str,
    next_title: &str,
    fallback_width: usize,
) -> Vec<String> {
    let mut names = Vec::new();
    let mut end = None;
    for line in &lines[start..] {
        if line.starts_with("Switch Name") || line.starts_with("DVS Name") {
            break;
        }
        if line.trim_start().starts_with(block_title) && line.starts_with("  ") {
            end = Some(
                name_column_end(line, next_title, fallback_width).min(PORT_INDENT + fallback_width),
            );
            continue;
        }
        if let Some(end) = end {
            let name = port_name(line, end);
            if name.is_empty() {
                break;
            }
            names.push(name);
        }
    }
    names
}

/// Parse the complete `esxcfg-vswitch -l` output.
pub fn parse_switch_listing(output: &str) -> EsxiResult<SwitchListing> {
    let lines: Vec<&str> = output.lines().collect();
    let mut listing = SwitchListing::default();

    for (idx, line) in lines.iter().enumerate() {
        let standard = line.starts_with("Switch Name");
        let distributed = line.starts_with("DVS Name");
        if !standard && !distributed {
            continue;
        }
        let Some(row) = lines.get(idx + 1) else {
            return Err(EsxiError::parse("Switch header without a switch row"));
        };
        let width = name_column_end(line, "Num Ports", SWITCH_NAME_WIDTH - PORT_INDENT)
            .min(SWITCH_NAME_WIDTH);
        let name = find_switch_name(row, width);
        let (mtu, uplinks) = parse_switch_row(row)?;

        if standard {
            let portgroups =
                parse_port_block(&lines, idx + 2, "PortGroup Name", "VLAN ID", PORTGROUP_NAME_WIDTH);
            listing.standard.push(StandardSwitch {
                name,
                mtu,
                uplinks,
                portgroups,
            });
        } else {
            let portgroups =
                parse_port_block(&lines, idx + 2, "DVPort ID", "In Use", DVPORT_NAME_WIDTH);
            let uplinks = uplinks
                .into_iter()
                .enumerate()
                .map(|(i, vmnic)| (uplink_slot(i), Some(vmnic)))
                .collect::<BTreeMap<_, _>>();
            listing.distributed.push(DistributedSwitch {
                name,
                mtu,
                uplinks,
                portgroups,
            });
        }
    }

    Ok(listing)
}

/// Parse `esxcli ... portgroup policy security get`.
pub fn parse_security_policy(output: &str) -> EsxiResult<SecurityPolicy> {
    let mut promiscuous = None;
    let mut mac_change = None;
    let mut forged = None;

    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let value = match value.trim().to_ascii_lowercase().as_str() {
            "true" => true,
            "false" => false,
            _ => continue,
        };
        match key.trim().to_ascii_lowercase().as_str() {
            "allow promiscuous" => promiscuous = Some(value),
            "allow mac address change" => mac_change = Some(value),
            "allow forged transmits" => forged = Some(value),
            _ => {}
        }
    }

    match (promiscuous, mac_change, forged) {
        (Some(allow_promiscuous), Some(allow_mac_change), Some(allow_forged_transmits)) => {
            Ok(SecurityPolicy {
                allow_promiscuous,
                allow_mac_change,
                allow_forged_transmits,
            })
        }
        _ => Err(EsxiError::with_details(
            crate::error::EsxiErrorKind::ParseError,
            "Incomplete security policy output",
            output.chars().take(500).collect::<String>(),
        )),
    }
}

/// ENS switch ID of `dvs` from `nsxdp-cli ens switch list`.
pub fn parse_ens_switch_id(output: &str, dvs: &str) -> EsxiResult<u32> {
    for line in output.lines() {
        let mut fields = line.split_whitespace();
        if fields.next() != Some(dvs) {
            continue;
        }
        let id = fields
            .next()
            .ok_or_else(|| EsxiError::parse(format!("ENS switch row without ID: '{line}'")))?;
        return id
            .parse::<u32>()
            .map_err(|e| EsxiError::parse(format!("Invalid ENS switch ID '{id}': {e}")));
    }
    Err(EsxiError::not_found(format!("ENS switch {dvs} is not listed")))
}

/// Rows of `esxcli network ens lcore list` after its two header lines.
pub fn parse_ens_lcores(output: &str) -> EsxiResult<Vec<EnsLcore>> {
    let mut lcores = Vec::new();
    for line in output.lines().skip(2) {
        let mut fields = line.split_whitespace();
        let Some(id) = fields.next() else {
            continue;
        };
        let id = id
            .parse::<u32>()
            .map_err(|e| EsxiError::parse(format!("Invalid lcore ID in '{line}': {e}")))?;
        let switch = if line.contains("Not set") {
            None
        } else {
            fields.next().map(str::to_string)
        };
        lcores.push(EnsLcore { id, switch });
    }
    Ok(lcores)
}

/// Port IDs of the VNIC rows in `nsxdp-cli ens port list`.
pub fn parse_ens_vnic_ports(output: &str) -> EsxiResult<Vec<u32>> {
    output
        .lines()
        .filter(|line| line.contains("VNIC"))
        .map(|line| {
            let field = line
                .split_whitespace()
                .nth(1)
                .ok_or_else(|| EsxiError::parse(format!("ENS port row without ID: '{line}'")))?;
            field
                .parse::<u32>()
                .map_err(|e| EsxiError::parse(format!("Invalid ENS port ID '{field}': {e}")))
        })
        .collect()
}

/// Switch UUID from the first line of `net-dvs -l <dvs>`.
pub fn parse_dvs_id(output: &str) -> EsxiResult<String> {
    let first = output
        .lines()
        .next()
        .ok_or_else(|| EsxiError::parse("Empty net-dvs output"))?;
    let rest = first
        .trim()
        .strip_prefix("switch ")
        .ok_or_else(|| EsxiError::parse(format!("Unexpected net-dvs header: '{first}'")))?;
    let id = rest.split(" (").next().unwrap_or(rest).trim();
    if id.is_empty() {
        return Err(EsxiError::parse("net-dvs header carries no switch ID"));
    }
    Ok(id.to_string())
}
