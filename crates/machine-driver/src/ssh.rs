use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;
use tokio::process::Command;
use tracing::{debug, info};

use crate::types::DEFAULT_SSH_USER;
use crate::{Error, Result};

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Where and as whom to open an SSH session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshTarget {
    pub host: String,
    pub port: u16,
    pub user: String,
    pub key_path: PathBuf,
}

impl SshTarget {
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Local key generation and remote command execution.
#[async_trait]
pub trait SshTransport: Send + Sync + 'static {
    /// Create a key pair at `path` (private) and `path.pub` (public).
    async fn generate_key(&self, path: &Path) -> Result<()>;

    /// Whether a TCP connection to `addr` succeeds right now.
    async fn probe_tcp(&self, addr: &str) -> Result<bool>;

    /// An `ssh` invocation against `target`, running `args` when non-empty.
    fn command(&self, target: &SshTarget, args: &[String]) -> Command;

    /// Run `args` on `target` and fail on a non-zero exit.
    async fn run(&self, target: &SshTarget, args: &[String]) -> Result<()>;
}

/// Wrap a remote command in `sudo sh -c` for users other than root.
pub fn escalate(user: &str, args: &[String]) -> Vec<String> {
    if args.is_empty() || user == DEFAULT_SSH_USER {
        return args.to_vec();
    }
    let cmd = args.join(" ").replace('\'', r"'\''");
    vec!["sudo".into(), "sh".into(), "-c".into(), format!("'{cmd}'")]
}

/// Arguments passed to the `ssh` binary.
pub fn ssh_args(target: &SshTarget, args: &[String]) -> Vec<String> {
    let mut out: Vec<String> = [
        "-o",
        "IdentitiesOnly=yes",
        "-o",
        "StrictHostKeyChecking=no",
        "-o",
        "UserKnownHostsFile=/dev/null",
        "-o",
        "LogLevel=quiet",
        "-o",
        "ConnectionAttempts=3",
        "-o",
        "ConnectTimeout=10",
        "-o",
        "PasswordAuthentication=no",
    ]
    .into_iter()
    .map(String::from)
    .collect();

    out.push("-p".into());
    out.push(target.port.to_string());
    out.push("-i".into());
    out.push(target.key_path.display().to_string());
    out.push(format!("{}@{}", target.user, target.host));
    out.extend(args.iter().cloned());
    out
}

/// [`SshTransport`] using the system `ssh` and `ssh-keygen` binaries.
#[derive(Debug, Clone, Copy, Default)]
pub struct OpenSsh;

#[async_trait]
impl SshTransport for OpenSsh {
    async fn generate_key(&self, path: &Path) -> Result<()> {
        if tokio::fs::try_exists(path).await? {
            debug!(path = %path.display(), "ssh key already present");
            return Ok(());
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let output = Command::new("ssh-keygen")
            .args(["-t", "rsa", "-b", "2048", "-N", "", "-q", "-f"])
            .arg(path)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::KeyGeneration(format!("spawn ssh-keygen: {e}")))?;

        if !output.status.success() {
            return Err(Error::KeyGeneration(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }

        info!(path = %path.display(), "ssh key generated");
        Ok(())
    }

    async fn probe_tcp(&self, addr: &str) -> Result<bool> {
        match tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(addr)).await {
            Ok(Ok(_)) => Ok(true),
            Ok(Err(e)) => {
                debug!(addr, error = %e, "tcp probe failed");
                Ok(false)
            }
            Err(_) => {
                debug!(addr, "tcp probe timed out");
                Ok(false)
            }
        }
    }

    fn command(&self, target: &SshTarget, args: &[String]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(ssh_args(target, args));
        cmd
    }

    async fn run(&self, target: &SshTarget, args: &[String]) -> Result<()> {
        let output = self
            .command(target, args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Ssh(format!("spawn ssh: {e}")))?;

        if !output.status.success() {
            let code = output.status.code().unwrap_or(-1);
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Ssh(format!(
                "{} exited with {code}: {}",
                target.addr(),
                stderr.trim()
            )));
        }
        Ok(())
    }
}
