//! SSH-backed [`HostSession`].
//!
//! `ssh2` is blocking, so connect and every command run on the blocking
//! thread pool with the session behind a mutex.

use crate::config::HostConfig;
use crate::error::{EsxiError, EsxiResult};
use crate::session::HostSession;
use crate::types::CommandOutput;

use async_trait::async_trait;
use log::{debug, info};
use ssh2::{Channel, Session};
use std::io::{ErrorKind, Read};
use std::net::{TcpStream, ToSocketAddrs};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// An authenticated SSH session to one ESXi host.
pub struct SshSession {
    host: String,
    session: Arc<Mutex<Session>>,
    closed: Arc<AtomicBool>,
}

impl SshSession {
    /// Open TCP, handshake and authenticate.
    pub async fn connect(config: &HostConfig) -> EsxiResult<Self> {
        config.validate()?;
        let cfg = config.clone();
        let session = tokio::task::spawn_blocking(move || Self::connect_blocking(&cfg))
            .await
            .map_err(|e| EsxiError::connection(format!("SSH connect task failed: {e}")))??;

        info!("SSH session established to {}", config.address());
        Ok(Self {
            host: config.host.clone(),
            session: Arc::new(Mutex::new(session)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    fn connect_blocking(config: &HostConfig) -> EsxiResult<Session> {
        let timeout = Duration::from_secs(config.timeout_secs.max(1));
        let addr = config
            .address()
            .to_socket_addrs()
            .map_err(|e| EsxiError::connection(format!("Cannot resolve {}: {e}", config.host)))?
            .next()
            .ok_or_else(|| EsxiError::connection(format!("No address for {}", config.host)))?;

        let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| {
            EsxiError::connection(format!("TCP connect to {} failed: {e}", config.address()))
        })?;

        let mut session = Session::new()?;
        session.set_tcp_stream(tcp);
        if config.timeout_secs > 0 {
            session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
        }
        session.handshake()?;

        let auth = match (&config.private_key_path, &config.password) {
            (Some(key), passphrase) => session.userauth_pubkey_file(
                &config.username,
                None,
                Path::new(key),
                passphrase.as_deref(),
            ),
            (None, Some(password)) => session.userauth_password(&config.username, password),
            (None, None) => {
                return Err(EsxiError::unauthorized(format!(
                    "No credentials for {}",
                    config.host
                )))
            }
        };
        auth.map_err(|e| {
            EsxiError::unauthorized(format!(
                "Authentication as {} on {} failed: {e}",
                config.username, config.host
            ))
        })?;

        if !session.authenticated() {
            return Err(EsxiError::unauthorized(format!(
                "Server did not accept credentials for {}",
                config.username
            )));
        }
        Ok(session)
    }

    fn run_blocking(session: &Session, command: &str) -> EsxiResult<CommandOutput> {
        let mut channel = session.channel_session()?;
        channel.exec(command)?;

        session.set_blocking(false);
        let drained = Self::drain(&mut channel);
        session.set_blocking(true);
        let (stdout, stderr) = drained?;

        channel.wait_close()?;
        let exit_code = channel.exit_status()?;

        Ok(CommandOutput {
            stdout,
            stderr,
            exit_code,
        })
    }

    /// Read stdout and stderr together until the remote side hits EOF.
    ///
    /// Reading one stream to the end first stalls once the other fills the
    /// channel window. The session must be non-blocking.
    fn drain(channel: &mut Channel) -> EsxiResult<(String, String)> {
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let mut buf = [0u8; 32768];

        loop {
            let mut progressed = Self::pump(channel.read(&mut buf), &buf, &mut stdout)?;
            progressed |= Self::pump(channel.stderr().read(&mut buf), &buf, &mut stderr)?;
            if progressed {
                continue;
            }
            if channel.eof() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }

        Ok((
            String::from_utf8_lossy(&stdout).into_owned(),
            String::from_utf8_lossy(&stderr).into_owned(),
        ))
    }

    /// Append one non-blocking read to `sink`; true when bytes arrived.
    fn pump(read: std::io::Result<usize>, buf: &[u8], sink: &mut Vec<u8>) -> EsxiResult<bool> {
        match read {
            Ok(n) => {
                sink.extend_from_slice(&buf[..n]);
                Ok(n > 0)
            }
            Err(e) if e.kind() == ErrorKind::WouldBlock => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Close the session; later commands fail with `Unauthorized`.
    pub async fn disconnect(&self) -> EsxiResult<()> {
        if self.closed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        let session = Arc::clone(&self.session);
        tokio::task::spawn_blocking(move || {
            let guard = session
                .lock()
                .map_err(|_| EsxiError::connection("SSH session lock poisoned"))?;
            guard.disconnect(None, "closing", None)?;
            Ok::<(), EsxiError>(())
        })
        .await
        .map_err(|e| EsxiError::connection(format!("SSH disconnect task failed: {e}")))??;
        info!("SSH session to {} closed", self.host);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        !self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HostSession for SshSession {
    fn host(&self) -> &str {
        &self.host
    }

    async fn execute(&self, command: &str) -> EsxiResult<CommandOutput> {
        if !self.is_open() {
            return Err(EsxiError::unauthorized(format!(
                "SSH session to {} is closed",
                self.host
            )));
        }
        debug!("[{}] ssh exec: {}", self.host, command);

        let session = Arc::clone(&self.session);
        let command = command.to_string();
        tokio::task::spawn_blocking(move || {
            let guard = session
                .lock()
                .map_err(|_| EsxiError::connection("SSH session lock poisoned"))?;
            Self::run_blocking(&guard, &command)
        })
        .await
        .map_err(|e| EsxiError::connection(format!("SSH exec task failed: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pump_collects_bytes_and_skips_would_block() {
        let buf = *b"stderr chunk";
        let mut sink = Vec::new();
        assert!(SshSession::pump(Ok(6), &buf, &mut sink).unwrap());
        assert!(!SshSession::pump(Ok(0), &buf, &mut sink).unwrap());
        let would_block = std::io::Error::from(ErrorKind::WouldBlock);
        assert!(!SshSession::pump(Err(would_block), &buf, &mut sink).unwrap());
        assert_eq!(sink, b"stderr");

        let reset = std::io::Error::from(ErrorKind::ConnectionReset);
        assert!(SshSession::pump(Err(reset), &buf, &mut sink).is_err());
    }

    #[tokio::test]
    async fn connect_without_credentials_fails_before_dialing() {
        let config = HostConfig::new("192.0.2.1");
        let err = SshSession::connect(&config).await.err().unwrap();
        assert_eq!(err.kind, crate::error::EsxiErrorKind::InvalidParameter);
    }

    #[tokio::test]
    async fn connect_to_closed_port_is_a_connection_error() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut config = HostConfig::new("127.0.0.1");
        config.port = port;
        config.password = Some("x".into());
        config.timeout_secs = 2;
        let err = SshSession::connect(&config).await.err().unwrap();
        assert_eq!(err.kind, crate::error::EsxiErrorKind::ConnectionError);
    }
}
