//! ESXi release discovery from `vmware -v`.

use crate::error::{EsxiError, EsxiResult};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

lazy_static! {
    static ref VERSION_LINE: Regex =
        Regex::new(r"\s+(?P<major>\d+)\.(?P<minor>\d+)\.(?P<patch>\d+)\s+build-(?P<build>\d+)")
            .unwrap();
}

/// Release and build number of a host, e.g. `VMware ESXi 8.0.0 build-20513097`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EsxiVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
    pub build: u64,
    /// The line the host printed.
    pub full: String,
}

impl EsxiVersion {
    pub fn release(&self) -> (u32, u32, u32) {
        (self.major, self.minor, self.patch)
    }

    /// True when the host runs `major.minor.patch` or later.
    pub fn at_least(&self, major: u32, minor: u32, patch: u32) -> bool {
        self.release() >= (major, minor, patch)
    }
}

impl FromStr for EsxiVersion {
    type Err = EsxiError;

    fn from_str(s: &str) -> EsxiResult<Self> {
        let caps = VERSION_LINE
            .captures(s)
            .ok_or_else(|| EsxiError::parse(format!("Unable to parse version: {}", s.trim())))?;
        let number = |name: &str| -> EsxiResult<u64> {
            caps[name]
                .parse::<u64>()
                .map_err(|e| EsxiError::parse(format!("Invalid {name} in '{}': {e}", s.trim())))
        };
        let part = |name: &str| -> EsxiResult<u32> {
            u32::try_from(number(name)?)
                .map_err(|e| EsxiError::parse(format!("Invalid {name} in '{}': {e}", s.trim())))
        };
        Ok(Self {
            major: part("major")?,
            minor: part("minor")?,
            patch: part("patch")?,
            build: number("build")?,
            full: s.trim().to_string(),
        })
    }
}

impl fmt::Display for EsxiVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{} build-{}", self.major, self.minor, self.patch, self.build)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EsxiErrorKind;
    use crate::mock::ScriptedSession;
    use crate::session::HostSession;
    use crate::types::CommandOutput;

    #[test]
    fn parses_release_and_build() {
        let v: EsxiVersion = "VMware ESXi 8.0.0 build-20513097".parse().unwrap();
        assert_eq!(v.release(), (8, 0, 0));
        assert_eq!(v.build, 20513097);

        let v: EsxiVersion = "VMware ESXi 7.0.3 build-19193900\n".parse().unwrap();
        assert_eq!(v.release(), (7, 0, 3));
        assert_eq!(v.build, 19193900);
        assert_eq!(v.full, "VMware ESXi 7.0.3 build-19193900");
        assert_eq!(v.to_string(), "7.0.3 build-19193900");
    }

    #[test]
    fn release_without_build_is_a_parse_error() {
        let err = "VMware ESXi 7.0 GA".parse::<EsxiVersion>().unwrap_err();
        assert_eq!(err.kind, EsxiErrorKind::ParseError);
    }

    #[test]
    fn compares_releases() {
        let v: EsxiVersion = "VMware ESXi 7.0.3 build-19193900".parse().unwrap();
        assert!(v.at_least(7, 0, 0));
        assert!(v.at_least(7, 0, 3));
        assert!(!v.at_least(8, 0, 0));
    }

    #[tokio::test]
    async fn session_reports_host_version() {
        let session = ScriptedSession::new().on(
            "vmware -v",
            CommandOutput::ok("VMware ESXi 7.0.1 build-16850804\n"),
        );
        let v = session.version().await.unwrap();
        assert_eq!(v.release(), (7, 0, 1));
        assert_eq!(v.build, 16850804);
        assert_eq!(session.calls(), vec!["vmware -v"]);
    }

    #[tokio::test]
    async fn garbled_version_output_is_a_parse_error() {
        let session = ScriptedSession::new().on("vmware -v", CommandOutput::ok("VMware ESXi 7.0 GA"));
        assert_eq!(
            session.version().await.unwrap_err().kind,
            EsxiErrorKind::ParseError
        );
    }
}
