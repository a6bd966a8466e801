//! SSH transport seam.
//!
//! `CommandTransport` is the async boundary the tool source talks through;
//! the production impl drives libssh2 on a blocking worker thread. Tests
//! substitute a mock.

use crate::config::DeviceConfig;
use crate::error::{Result, SshToolsError};
use async_trait::async_trait;
use ssh2::Session;
use std::io::{Read as _, Write as _};
use std::net::{TcpStream, ToSocketAddrs as _};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandMode {
    /// One read-only command, executed on its own channel.
    Show,
    /// Command sequence fed to an interactive shell.
    Configure,
}

#[async_trait]
pub trait CommandTransport: Send + Sync {
    async fn run(
        &self,
        host: &str,
        config: &DeviceConfig,
        commands: &[String],
        mode: CommandMode,
    ) -> Result<String>;
}

pub struct Ssh2Transport;

#[async_trait]
impl CommandTransport for Ssh2Transport {
    async fn run(
        &self,
        host: &str,
        config: &DeviceConfig,
        commands: &[String],
        mode: CommandMode,
    ) -> Result<String> {
        let host = host.to_string();
        let config = config.clone();
        let commands = commands.to_vec();
        tokio::task::spawn_blocking(move || run_blocking(&host, &config, &commands, mode))
            .await
            .map_err(|e| SshToolsError::Connection(format!("ssh worker task failed: {e}")))?
    }
}

fn run_blocking(
    host: &str,
    config: &DeviceConfig,
    commands: &[String],
    mode: CommandMode,
) -> Result<String> {
    let timeout = Duration::from_secs(config.timeout_secs);

    let addr = (host, config.port)
        .to_socket_addrs()
        .map_err(|e| SshToolsError::Connection(format!("cannot resolve '{host}': {e}")))?
        .next()
        .ok_or_else(|| SshToolsError::Connection(format!("no address for '{host}'")))?;

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .map_err(|e| SshToolsError::Connection(format!("connect to {host}:{} failed: {e}", config.port)))?;
    let _ = tcp.set_read_timeout(Some(timeout));
    let _ = tcp.set_write_timeout(Some(timeout));

    let mut session = Session::new()
        .map_err(|e| SshToolsError::Connection(format!("ssh session init failed: {e}")))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| SshToolsError::Connection(format!("ssh handshake with {host} failed: {e}")))?;
    session
        .userauth_password(&config.username, &config.password)
        .map_err(|e| {
            SshToolsError::Authentication(format!("ssh authentication to {host} failed: {e}"))
        })?;

    match mode {
        CommandMode::Show => run_exec(&session, &commands[0]),
        CommandMode::Configure => run_shell(&session, commands),
    }
}

fn run_exec(session: &Session, command: &str) -> Result<String> {
    let mut channel = session
        .channel_session()
        .map_err(|e| SshToolsError::Command(format!("channel open failed: {e}")))?;
    channel
        .exec(command)
        .map_err(|e| SshToolsError::Command(format!("exec failed: {e}")))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| SshToolsError::Command(format!("read failed: {e}")))?;
    let mut stderr = String::new();
    let _ = channel.stderr().read_to_string(&mut stderr);
    let _ = channel.wait_close();

    if !stderr.is_empty() {
        output.push('\n');
        output.push_str(&stderr);
    }
    Ok(output)
}

/// Feed the command sequence to an interactive shell and drain whatever the
/// device echoes back. Network OS shells do not close the channel on their
/// own, so the read loop stops on the session timeout once output dries up.
fn run_shell(session: &Session, commands: &[String]) -> Result<String> {
    let mut channel = session
        .channel_session()
        .map_err(|e| SshToolsError::Command(format!("channel open failed: {e}")))?;
    channel
        .request_pty("vt100", None, None)
        .map_err(|e| SshToolsError::Command(format!("pty request failed: {e}")))?;
    channel
        .shell()
        .map_err(|e| SshToolsError::Command(format!("shell request failed: {e}")))?;

    for command in commands {
        channel
            .write_all(format!("{command}\n").as_bytes())
            .map_err(|e| SshToolsError::Command(format!("write failed: {e}")))?;
    }
    channel
        .write_all(b"exit\n")
        .map_err(|e| SshToolsError::Command(format!("write failed: {e}")))?;
    let _ = channel.flush();
    let _ = channel.send_eof();

    let mut output = Vec::new();
    let mut buf = [0u8; 4096];
    loop {
        match channel.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => output.extend_from_slice(&buf[..n]),
            // Timeout with output already collected means the device is done
            // talking; with nothing at all it is a real failure.
            Err(e) => {
                if output.is_empty() {
                    return Err(SshToolsError::Command(format!("read failed: {e}")));
                }
                break;
            }
        }
    }
    let _ = channel.wait_close();

    Ok(String::from_utf8_lossy(&output).into_owned())
}
