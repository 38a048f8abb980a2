use clap::{Args, Parser, Subcommand, ValueEnum};
use esxi_vswitch::{EsxiResult, HostConfig};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "esxi-vswitch")]
#[command(about = "Portgroup security and ENS FPO settings on ESXi hosts", long_about = None)]
pub struct Cli {
    #[command(flatten)]
    pub connection: ConnectionArgs,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Where to connect. Flags override values from `--config`.
#[derive(Args, Debug, Default)]
pub struct ConnectionArgs {
    /// YAML host config (host, port, username, password, privateKeyPath, defaultVds)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// ESXi hostname or IP
    #[arg(long, global = true)]
    pub host: Option<String>,

    #[arg(long, global = true)]
    pub port: Option<u16>,

    #[arg(long, short = 'u', global = true)]
    pub username: Option<String>,

    /// Private key for SSH login; the password comes from ESXI_PASSWORD
    #[arg(long, global = true)]
    pub key: Option<String>,

    /// Distributed switch used by `ens-fpo` when --vds is not given
    #[arg(long, global = true)]
    pub default_vds: Option<String>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a YAML policy plan (its `host` section is the connection)
    Apply { plan: PathBuf },
    /// Allow or reject forged transmits on a portgroup
    ForgedTransmit { portgroup: String, state: Toggle },
    /// Allow or reject guest MAC address changes on a portgroup
    MacChange { portgroup: String, state: Toggle },
    /// Enable or disable ENS Flow Processing Offload
    EnsFpo {
        state: Toggle,
        /// Target distributed switch
        #[arg(long)]
        vds: Option<String>,
    },
    /// Show the security policy of a portgroup
    Show { portgroup: String },
    /// List standard and distributed switches
    List,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Toggle {
    On,
    Off,
}

impl Toggle {
    pub fn enabled(self) -> bool {
        self == Toggle::On
    }
}

impl ConnectionArgs {
    /// Build the host config from `--config` and the individual flags.
    pub fn resolve(&self) -> EsxiResult<HostConfig> {
        let mut config = match &self.config {
            Some(path) => HostConfig::from_file(path)?,
            None => HostConfig::default(),
        };
        if let Some(host) = &self.host {
            config.host = host.clone();
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(username) = &self.username {
            config.username = username.clone();
        }
        if let Some(key) = &self.key {
            config.private_key_path = Some(key.clone());
        }
        if self.default_vds.is_some() {
            config.default_vds = self.default_vds.clone();
        }
        config.apply_env();
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use esxi_vswitch::EsxiErrorKind;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_toggle_and_global_flags() {
        let cli = Cli::try_parse_from([
            "esxi-vswitch",
            "forged-transmit",
            "PG-Test",
            "on",
            "--host",
            "esx01",
        ])
        .unwrap();
        assert_eq!(cli.connection.host.as_deref(), Some("esx01"));
        match cli.command {
            Commands::ForgedTransmit { portgroup, state } => {
                assert_eq!(portgroup, "PG-Test");
                assert!(state.enabled());
            }
            _ => panic!("wrong subcommand"),
        }
    }

    #[test]
    fn ens_fpo_takes_optional_vds() {
        let cli =
            Cli::try_parse_from(["esxi-vswitch", "ens-fpo", "off", "--vds", "dvs0"]).unwrap();
        assert!(matches!(
            cli.command,
            Commands::EnsFpo { state: Toggle::Off, vds: Some(ref v) } if v == "dvs0"
        ));
        assert!(Cli::try_parse_from(["esxi-vswitch", "ens-fpo", "maybe"]).is_err());
    }

    #[test]
    fn flags_override_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("host.yaml");
        std::fs::write(&path, "host: esx01\npassword: pw\ndefaultVds: dvs0\n").unwrap();

        let args = ConnectionArgs {
            config: Some(path),
            host: Some("esx02".into()),
            port: Some(2222),
            ..ConnectionArgs::default()
        };
        let config = args.resolve().unwrap();
        assert_eq!(config.host, "esx02");
        assert_eq!(config.port, 2222);
        assert_eq!(config.default_vds.as_deref(), Some("dvs0"));
    }

    #[test]
    fn missing_host_is_rejected() {
        let err = ConnectionArgs::default().resolve().unwrap_err();
        assert_eq!(err.kind, EsxiErrorKind::InvalidParameter);
    }
}
