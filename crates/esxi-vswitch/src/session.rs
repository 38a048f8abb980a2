//! The host session seam.
//!
//! Everything in this crate talks to an ESXi host through a borrowed
//! [`HostSession`]. Establishing, refreshing and closing the session is
//! the caller's business; managers only hold `&'a S` for their lifetime.

use crate::error::{EsxiError, EsxiErrorKind, EsxiResult};
use crate::esxcli::EsxCommands;
use crate::types::CommandOutput;
use crate::version::EsxiVersion;
use async_trait::async_trait;
use log::{debug, trace, warn};

/// An authenticated command channel to one ESXi host.
#[async_trait]
pub trait HostSession: Send + Sync {
    /// Host this session is bound to (for log and error messages).
    fn host(&self) -> &str;

    /// Run one command and return its raw output, whatever the exit code.
    ///
    /// Transport and authentication failures are returned as `Err`; a
    /// command that ran and failed is `Ok` with a non-zero `exit_code`.
    async fn execute(&self, command: &str) -> EsxiResult<CommandOutput>;

    /// Execute and turn a non-zero exit into a classified error.
    async fn run_ok(&self, command: &str) -> EsxiResult<CommandOutput> {
        debug!("[{}] exec: {}", self.host(), command);
        let output = self.execute(command).await?;
        trace!(
            "[{}] stdout ({} bytes): {}",
            self.host(),
            output.stdout.len(),
            output.stdout.chars().take(300).collect::<String>()
        );
        if output.success() {
            return Ok(output);
        }
        warn!(
            "[{}] '{}' exited with {}: {}",
            self.host(),
            command,
            output.exit_code,
            output.stderr.trim()
        );
        Err(classify_failure(command, &output))
    }

    /// Execute, assert success and discard the output.
    async fn run_void(&self, command: &str) -> EsxiResult<()> {
        self.run_ok(command).await?;
        Ok(())
    }

    /// Release and build the host reports through `vmware -v`.
    async fn version(&self) -> EsxiResult<EsxiVersion> {
        let out = self.run_ok(&EsxCommands::host_version()).await?;
        out.stdout.parse()
    }
}

/// Map a failed command onto the error taxonomy.
pub fn classify_failure(command: &str, output: &CommandOutput) -> EsxiError {
    let text = if output.stderr.trim().is_empty() {
        output.stdout.trim()
    } else {
        output.stderr.trim()
    };
    let lower = text.to_lowercase();
    let details: String = text.chars().take(500).collect();

    // Missing binaries also print "not found", so check them first.
    let kind = if output.exit_code == 127
        || lower.contains("command not found")
        || lower.contains("unknown command or namespace")
        || lower.contains("not supported")
        || lower.contains("unsupported")
    {
        EsxiErrorKind::Unsupported
    } else if lower.contains("permission denied")
        || lower.contains("not authorized")
        || lower.contains("access denied")
        || lower.contains("not authenticated")
    {
        EsxiErrorKind::Unauthorized
    } else if lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("unable to find")
    {
        EsxiErrorKind::NotFound
    } else {
        EsxiErrorKind::CommandFailed(output.exit_code)
    };

    EsxiError::with_details(
        kind,
        format!("Command '{command}' failed with exit code {}", output.exit_code),
        details,
    )
}
