//! # ESXi virtual switch policy
//!
//! Portgroup security and ENS settings for ESXi hosts, applied by running
//! the host's own CLI tools over an externally owned session.
//!
//! ## Modules
//!
//! - **types**: Shared data structures (switches, policies, command output)
//! - **error**: Crate-specific error types
//! - **config**: Host connection settings (YAML + environment)
//! - **session**: The borrowed `HostSession` seam and failure classification
//! - **ssh**: `ssh2`-backed session implementation
//! - **esxcli**: Builders for `esxcli` / `esxcfg-vswitch` / `net-dvs` / `nsxdp-cli`
//! - **parse**: Parsers for the tools' table output
//! - **policy**: Forged transmit, MAC change and ENS FPO settings
//! - **vswitch**: Standard vSwitch lifecycle
//! - **dswitch**: Host-local distributed switch lifecycle and ENS
//! - **plan**: Declarative YAML policy plans
//! - **version**: ESXi release discovery

pub mod types;
pub mod error;
pub mod config;
pub mod session;
pub mod ssh;
pub mod esxcli;
pub mod parse;
pub mod policy;
pub mod vswitch;
pub mod dswitch;
pub mod plan;
pub mod version;

#[cfg(test)]
mod mock;

pub use config::HostConfig;
pub use dswitch::DistributedSwitchManager;
pub use error::{EsxiError, EsxiErrorKind, EsxiResult};
pub use plan::{apply_plan, PlanReport, PolicyPlan};
pub use policy::PolicyClient;
pub use session::HostSession;
pub use ssh::SshSession;
pub use types::*;
pub use version::EsxiVersion;
pub use vswitch::StandardSwitchManager;
