//! Remote shell transport for command-driven devices
//!
//! [`ShellTransport`] opens an authenticated session; [`ShellSession`] runs
//! one command at a time and is closed by its owner. The production
//! transport wraps libssh2, whose calls block, so every call runs on the
//! blocking pool under a timeout. Each session holds a single interactive
//! shell on a PTY, so modes entered by one command (`configure terminal`)
//! stay in effect for the next.

use crate::error::{ConfigError, ConfigErrorKind};
use async_trait::async_trait;
use ssh2::{Channel, Session};
use std::io::{Read, Write};
use std::net::{IpAddr, SocketAddr, TcpStream, ToSocketAddrs};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, trace, warn};

/// Result of one remote command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Always 0 from an interactive shell; refusals show up in `stdout`
    pub exit_status: i32,
    pub stdout: String,
    pub stderr: String,
}

/// Opens authenticated shell sessions
#[async_trait]
pub trait ShellTransport: Send + Sync {
    async fn open(
        &self,
        target: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn ShellSession>, ConfigError>;
}

/// An open session. Owners must call [`ShellSession::close`] on every path.
#[async_trait]
pub trait ShellSession: Send {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, ConfigError>;

    async fn close(self: Box<Self>);
}

/// libssh2-backed transport with password authentication
#[derive(Debug, Clone)]
pub struct Ssh2Transport {
    port: u16,
    timeout: Duration,
}

impl Ssh2Transport {
    pub fn new(port: u16, timeout: Duration) -> Self {
        Self { port, timeout }
    }
}

/// Resolve `target` to one address. Blocks on DNS for hostnames.
fn resolve(target: &str, port: u16) -> Result<SocketAddr, ConfigError> {
    if let Ok(ip) = target.parse::<IpAddr>() {
        return Ok(SocketAddr::new(ip, port));
    }
    if let Ok(addr) = target.parse::<SocketAddr>() {
        return Ok(addr);
    }
    (target, port)
        .to_socket_addrs()
        .map_err(|e| ConfigError::transport(target, format!("cannot resolve: {e}")))?
        .next()
        .ok_or_else(|| ConfigError::transport(target, "no addresses resolved"))
}

#[async_trait]
impl ShellTransport for Ssh2Transport {
    async fn open(
        &self,
        target: &str,
        username: &str,
        password: &str,
    ) -> Result<Box<dyn ShellSession>, ConfigError> {
        let port = self.port;
        let timeout = self.timeout;
        let owned_target = target.to_string();
        let username = username.to_string();
        let password = password.to_string();

        debug!("Opening SSH session to {} (port {}) as {}", target, port, username);
        let (session, shell) = run_blocking(target, timeout, move || {
            let addr = resolve(&owned_target, port)?;
            let session = connect(&owned_target, addr, timeout, &username, &password)?;
            let mut shell = open_shell(&owned_target, &session)?;
            let banner = read_until_prompt(&owned_target, &mut shell, timeout)?;
            trace!("{} shell ready: {}", owned_target, banner.trim());
            Ok((session, shell))
        })
        .await?;

        Ok(Box::new(Ssh2Session {
            target: target.to_string(),
            session,
            shell: Arc::new(Mutex::new(shell)),
            timeout,
            closed: false,
        }))
    }
}

fn connect(
    target: &str,
    addr: SocketAddr,
    timeout: Duration,
    username: &str,
    password: &str,
) -> Result<Session, ConfigError> {
    let tcp = TcpStream::connect_timeout(&addr, timeout).map_err(|e| io_error(target, e, timeout))?;
    tcp.set_read_timeout(Some(timeout))
        .and_then(|_| tcp.set_write_timeout(Some(timeout)))
        .map_err(|e| io_error(target, e, timeout))?;

    let mut session = Session::new().map_err(|e| ConfigError::transport(target, e))?;
    session.set_tcp_stream(tcp);
    session.set_timeout(u32::try_from(timeout.as_millis()).unwrap_or(u32::MAX));
    session
        .handshake()
        .map_err(|e| ConfigError::transport(target, format!("SSH handshake failed: {e}")))?;

    session
        .userauth_password(username, password)
        .map_err(|e| ConfigError::new(target, ConfigErrorKind::Auth(e.message().to_string())))?;
    if !session.authenticated() {
        return Err(ConfigError::new(
            target,
            ConfigErrorKind::Auth("server did not accept the password".to_string()),
        ));
    }

    Ok(session)
}

fn open_shell(target: &str, session: &Session) -> Result<Channel, ConfigError> {
    let mut channel = session
        .channel_session()
        .map_err(|e| ConfigError::transport(target, format!("cannot open channel: {e}")))?;
    // Wide terminal so IOS does not wrap long command echoes.
    channel
        .request_pty("vt100", None, Some((512, 24, 0, 0)))
        .map_err(|e| ConfigError::transport(target, format!("PTY request failed: {e}")))?;
    channel
        .shell()
        .map_err(|e| ConfigError::transport(target, format!("cannot start shell: {e}")))?;
    Ok(channel)
}

/// Open libssh2 session and its shell; disconnected on close or drop
struct Ssh2Session {
    target: String,
    session: Session,
    shell: Arc<Mutex<Channel>>,
    timeout: Duration,
    closed: bool,
}

#[async_trait]
impl ShellSession for Ssh2Session {
    async fn run(&mut self, command: &str) -> Result<CommandOutput, ConfigError> {
        let shell = Arc::clone(&self.shell);
        let target = self.target.clone();
        let command = command.to_string();
        let timeout = self.timeout;

        trace!("SSH shell on {}: {}", self.target, command);
        run_blocking(&self.target, timeout, move || {
            let mut channel = shell
                .lock()
                .map_err(|_| ConfigError::transport(&target, "shell channel poisoned"))?;
            channel
                .write_all(format!("{command}\n").as_bytes())
                .and_then(|_| channel.flush())
                .map_err(|e| io_error(&target, e, timeout))?;
            let raw = read_until_prompt(&target, &mut channel, timeout)?;
            Ok(CommandOutput {
                exit_status: 0,
                stdout: command_output(&raw, &command),
                stderr: String::new(),
            })
        })
        .await
    }

    async fn close(self: Box<Self>) {
        let mut this = self;
        this.closed = true;
        let session = this.session.clone();
        let shell = Arc::clone(&this.shell);
        let target = this.target.clone();
        let result = tokio::task::spawn_blocking(move || {
            if let Ok(mut channel) = shell.lock() {
                if let Err(e) = channel.send_eof().and_then(|_| channel.close()) {
                    debug!("Closing shell channel failed: {}", e);
                }
            }
            session.disconnect(None, "meshboard done", None)
        })
        .await;
        match result {
            Ok(Ok(())) => debug!("Closed SSH session to {}", target),
            Ok(Err(e)) => warn!("SSH disconnect from {} failed: {}", target, e),
            Err(e) => warn!("SSH disconnect task for {} failed: {}", target, e),
        }
    }
}

impl Drop for Ssh2Session {
    fn drop(&mut self) {
        if !self.closed {
            let _ = self.session.disconnect(None, "meshboard aborted", None);
        }
    }
}

/// Whether the shell output ends at a device prompt (`sw-01#`, `sw-01(config)#`, `sw-01>`)
fn at_prompt(output: &str) -> bool {
    let last = output.rsplit('\n').next().unwrap_or("").trim_end();
    last.ends_with('#') || last.ends_with('>')
}

/// Read shell output until the next prompt, bounded by `timeout` overall
fn read_until_prompt(target: &str, channel: &mut Channel, timeout: Duration) -> Result<String, ConfigError> {
    let started = Instant::now();
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = channel.read(&mut chunk).map_err(|e| io_error(target, e, timeout))?;
        if n == 0 {
            return Err(ConfigError::transport(target, "shell closed by device"));
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf).replace('\r', "");
        if at_prompt(&text) {
            return Ok(text);
        }
        if started.elapsed() > timeout {
            return Err(ConfigError::new(
                target,
                ConfigErrorKind::Timeout {
                    seconds: timeout.as_secs(),
                },
            ));
        }
    }
}

/// Strip the echoed command and the trailing prompt from raw shell output
fn command_output(raw: &str, command: &str) -> String {
    let mut lines: Vec<&str> = raw.lines().collect();
    if lines.last().is_some_and(|l| at_prompt(l)) {
        lines.pop();
    }
    if lines.first().is_some_and(|l| l.trim_end().ends_with(command.trim())) {
        lines.remove(0);
    }
    lines.join("\n")
}

fn io_error(target: &str, err: std::io::Error, timeout: Duration) -> ConfigError {
    match err.kind() {
        std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => ConfigError::new(
            target,
            ConfigErrorKind::Timeout {
                seconds: timeout.as_secs(),
            },
        ),
        _ => ConfigError::transport(target, err),
    }
}

/// Run blocking libssh2 work off the runtime, bounded by `timeout`
async fn run_blocking<T, F>(target: &str, timeout: Duration, work: F) -> Result<T, ConfigError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, ConfigError> + Send + 'static,
{
    // libssh2 enforces its own timeout; the outer one bounds name resolution and stalls.
    let deadline = timeout + Duration::from_secs(5);
    match tokio::time::timeout(deadline, tokio::task::spawn_blocking(work)).await {
        Ok(Ok(result)) => result,
        Ok(Err(join)) => Err(ConfigError::transport(target, format!("SSH worker failed: {join}"))),
        Err(_) => Err(ConfigError::new(
            target,
            ConfigErrorKind::Timeout {
                seconds: deadline.as_secs(),
            },
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_ip_uses_configured_port() {
        assert_eq!(
            resolve("10.0.0.5", 2222).unwrap(),
            "10.0.0.5:2222".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_resolve_explicit_socket_addr() {
        assert_eq!(
            resolve("10.0.0.5:830", 22).unwrap(),
            "10.0.0.5:830".parse::<SocketAddr>().unwrap()
        );
    }

    #[test]
    fn test_prompt_detection() {
        assert!(at_prompt("User Access Verification\nsw-01>"));
        assert!(at_prompt("Enter configuration commands, one per line.\nsw-01(config)#"));
        assert!(at_prompt("sw-01(config-if)# "));
        assert!(!at_prompt("Building configuration...\n"));
        assert!(!at_prompt(""));
    }

    #[test]
    fn test_command_output_strips_echo_and_prompt() {
        let raw = "sw-01(config)#interface vlan1\nsw-01(config-if)#";
        assert_eq!(command_output(raw, "interface vlan1"), "");

        let raw = "ip adress dhcp\n     ^\n% Invalid input detected at '^' marker.\n\nsw-01(config-if)#";
        assert_eq!(
            command_output(raw, "ip adress dhcp"),
            "     ^\n% Invalid input detected at '^' marker.\n"
        );
    }

    #[tokio::test]
    async fn test_unresolvable_host_is_bounded_transport_error() {
        let transport = Ssh2Transport::new(22, Duration::from_secs(1));
        let err = match transport.open("no-such-host.invalid", "admin", "secret").await {
            Ok(_) => panic!("resolved a reserved .invalid name"),
            Err(e) => e,
        };
        assert_eq!(err.target, "no-such-host.invalid");
        assert!(err.is_retryable());
    }

    #[test]
    fn test_io_timeout_is_classified() {
        let err = io_error(
            "10.0.0.5",
            std::io::Error::new(std::io::ErrorKind::TimedOut, "slow"),
            Duration::from_secs(7),
        );
        assert!(matches!(err.kind, ConfigErrorKind::Timeout { seconds: 7 }));
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_connect_refused_is_transport_error() {
        // Port 1 on loopback is closed on any sane test host.
        let transport = Ssh2Transport::new(1, Duration::from_secs(2));
        let err = match transport.open("127.0.0.1", "admin", "secret").await {
            Ok(_) => panic!("connection to a closed port succeeded"),
            Err(e) => e,
        };
        assert_eq!(err.target, "127.0.0.1");
        assert!(err.is_retryable());
    }
}
