//! Builds the API reference for the workspace.
//!
//! Reads `docs/docgen.yaml`, runs `cargo doc` into a scratch target
//! directory and publishes the HTML to `build/html`. The exit code is the
//! one `cargo doc` returned.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tokio::process::Command;
use tracing::{error, info, warn};

const CONFIG_PATH: &str = "docs/docgen.yaml";
const SCRATCH_DIR: &str = "build/.doc-target";
const OUTPUT_DIR: &str = "build/html";

#[derive(Error, Debug)]
pub enum DocgenError {
    #[error("Cannot read {path}: {source}")]
    ConfigRead {
        path: String,
        source: std::io::Error,
    },

    #[error("Invalid docgen config: {0}")]
    ConfigParse(#[from] serde_yaml::Error),

    #[error("No packages listed in {0}")]
    NoPackages(String),

    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, DocgenError>;

#[derive(Debug, Deserialize, PartialEq)]
pub struct DocgenConfig {
    pub packages: Vec<String>,
}

impl DocgenConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| DocgenError::ConfigRead {
            path: path.display().to_string(),
            source,
        })?;
        let config: DocgenConfig = serde_yaml::from_str(&text)?;
        if config.packages.is_empty() {
            return Err(DocgenError::NoPackages(path.display().to_string()));
        }
        Ok(config)
    }
}

/// One documentation build rooted at the workspace directory.
pub struct DocBuild {
    root: PathBuf,
    config: DocgenConfig,
}

impl DocBuild {
    pub fn new(root: impl Into<PathBuf>, config: DocgenConfig) -> Self {
        Self {
            root: root.into(),
            config,
        }
    }

    fn scratch(&self) -> PathBuf {
        self.root.join(SCRATCH_DIR)
    }

    fn output(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    /// Arguments passed to cargo.
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["doc".to_string(), "--no-deps".to_string()];
        for package in &self.config.packages {
            args.push("-p".to_string());
            args.push(package.clone());
        }
        args.push("--target-dir".to_string());
        args.push(self.scratch().display().to_string());
        args
    }

    /// Run the generator and return its exit code.
    pub async fn generate(&self) -> Result<i32> {
        let program = std::env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
        info!("Running {program} {}", self.args().join(" "));
        let status = Command::new(&program)
            .args(self.args())
            .current_dir(&self.root)
            .status()
            .await
            .map_err(|source| DocgenError::Spawn { program, source })?;
        Ok(status.code().unwrap_or(1))
    }

    /// Move the generated HTML to the output directory.
    pub fn publish(&self) -> Result<()> {
        let output = self.output();
        if output.exists() {
            std::fs::remove_dir_all(&output)?;
        }
        if let Some(parent) = output.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::rename(self.scratch().join("doc"), &output)?;
        info!("Documentation written to {}", output.display());
        Ok(())
    }

    /// Remove the scratch target directory.
    pub fn clean(&self) -> Result<()> {
        let scratch = self.scratch();
        if scratch.exists() {
            info!("Cleaning folders from build process...");
            std::fs::remove_dir_all(scratch)?;
        }
        Ok(())
    }

    pub async fn run(&self) -> Result<i32> {
        let code = self.generate().await?;
        let published = if code == 0 {
            self.publish()
        } else {
            warn!("cargo doc exited with {code}; nothing published");
            Ok(())
        };
        self.clean()?;
        published.map(|_| code)
    }
}

async fn build_docs() -> Result<i32> {
    let config = DocgenConfig::load(Path::new(CONFIG_PATH))?;
    DocBuild::new(".", config).run().await
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    match build_docs().await {
        Ok(code) => ExitCode::from(u8::try_from(code).unwrap_or(1)),
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}
