use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;

use super::transport::{CommandOutput, Transport};
use crate::constants::SSH_TRANSPORT_FAILURE_CODE;
use crate::utils::{log_debug, ConnectionError, TransportError};

/// Transport backed by the system `ssh` client.
///
/// `connect` starts a ControlMaster in the background; every command is then
/// multiplexed over its socket so authentication happens once per session.
/// Unknown host keys are accepted and remembered (`accept-new`).
#[derive(Debug)]
pub struct SshTransport {
    program: PathBuf,
    link: Option<MasterLink>,
    /// Master being started by a `connect` that has not returned yet
    pending: Option<MasterLink>,
}

#[derive(Debug)]
struct MasterLink {
    destination: String,
    control_path: PathBuf,
    log_path: PathBuf,
}

impl Default for SshTransport {
    fn default() -> Self {
        Self::with_program("ssh")
    }
}

impl SshTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use another ssh-compatible client binary
    pub fn with_program(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
            link: None,
            pending: None,
        }
    }

    pub fn is_open(&self) -> bool {
        self.link.is_some()
    }

    fn exit_master(&self, link: &MasterLink) -> std::process::Command {
        let mut cmd = std::process::Command::new(&self.program);
        cmd.arg("-S")
            .arg(&link.control_path)
            .args(["-O", "exit"])
            .arg(&link.destination)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null());
        cmd
    }
}

/// Socket path unique to this process and destination.
///
/// The destination is hashed so long host names stay under the unix socket
/// path limit.
fn control_path_for(destination: &str) -> PathBuf {
    let mut hasher = Sha256::new();
    hasher.update(destination.as_bytes());
    let digest = format!("{:x}", hasher.finalize());
    std::env::temp_dir().join(format!(
        "norns-{}-{}.sock",
        std::process::id(),
        &digest[..12]
    ))
}

fn remove_link_files(link: &MasterLink) {
    let _ = std::fs::remove_file(&link.control_path);
    let _ = std::fs::remove_file(&link.log_path);
}

/// Arguments that start a backgrounded ControlMaster
fn master_args(destination: &str, control_path: &Path, log_path: &Path, batch: bool) -> Vec<String> {
    let mut args = vec![
        "-M".to_string(),
        "-N".to_string(),
        "-f".to_string(),
        "-E".to_string(),
        log_path.display().to_string(),
        "-o".to_string(),
        format!("ControlPath={}", control_path.display()),
        "-o".to_string(),
        "ControlPersist=yes".to_string(),
        "-o".to_string(),
        "StrictHostKeyChecking=accept-new".to_string(),
    ];
    if batch {
        // No password to offer: fail instead of prompting
        args.push("-o".to_string());
        args.push("BatchMode=yes".to_string());
    }
    args.push(destination.to_string());
    args
}

fn read_log(path: &Path) -> String {
    std::fs::read_to_string(path)
        .map(|s| s.trim().to_string())
        .unwrap_or_default()
}

#[async_trait]
impl Transport for SshTransport {
    async fn connect(
        &mut self,
        host: &str,
        username: &str,
        credential: &str,
    ) -> Result<(), ConnectionError> {
        self.close().await;

        let destination = format!("{}@{}", username, host);
        let control_path = control_path_for(&destination);
        let log_path = control_path.with_extension("log");

        let use_sshpass = !credential.is_empty() && which::which("sshpass").is_ok();
        let mut cmd = if use_sshpass {
            let mut c = Command::new("sshpass");
            c.arg("-e").arg(&self.program).env("SSHPASS", credential);
            c
        } else {
            Command::new(&self.program)
        };
        cmd.args(master_args(&destination, &control_path, &log_path, !use_sshpass))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        log_debug(format!(
            "Opening ssh master to {} (sshpass: {})",
            destination, use_sshpass
        ));

        // Recorded before awaiting so a dropped connect can still be torn down
        self.pending = Some(MasterLink {
            destination,
            control_path,
            log_path,
        });

        let program = if use_sshpass {
            "sshpass".to_string()
        } else {
            self.program.display().to_string()
        };
        let status = match cmd.status().await {
            Ok(status) => status,
            Err(source) => {
                if let Some(link) = self.pending.take() {
                    remove_link_files(&link);
                }
                return Err(ConnectionError::Transport {
                    host: host.to_string(),
                    source: TransportError::Spawn { program, source },
                });
            }
        };

        let Some(link) = self.pending.take() else {
            return Err(ConnectionError::Transport {
                host: host.to_string(),
                source: TransportError::NotOpen,
            });
        };

        if !status.success() {
            let detail = read_log(&link.log_path);
            remove_link_files(&link);
            return Err(ConnectionError::Rejected {
                host: host.to_string(),
                detail: if detail.is_empty() {
                    format!("{} exited with {}", program, status)
                } else {
                    detail
                },
            });
        }

        self.link = Some(link);
        Ok(())
    }

    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, TransportError> {
        let link = self.link.as_ref().ok_or(TransportError::NotOpen)?;

        let output = Command::new(&self.program)
            .arg("-S")
            .arg(&link.control_path)
            .args(["-o", "BatchMode=yes"])
            .arg(&link.destination)
            .arg(command)
            .stdin(Stdio::null())
            .kill_on_drop(true) // a caller deadline severs the command
            .output()
            .await
            .map_err(|source| TransportError::Spawn {
                program: self.program.display().to_string(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        match output.status.code() {
            Some(code) if code != SSH_TRANSPORT_FAILURE_CODE => Ok(CommandOutput {
                stdout,
                stderr,
                exit_code: code,
            }),
            _ => Err(TransportError::Disconnected(if stderr.trim().is_empty() {
                format!("ssh exited with {}", output.status)
            } else {
                stderr.trim().to_string()
            })),
        }
    }

    async fn close(&mut self) {
        for link in [self.link.take(), self.pending.take()].into_iter().flatten() {
            let _ = Command::from(self.exit_master(&link))
                .kill_on_drop(true)
                .status()
                .await;
            remove_link_files(&link);
        }
    }
}

impl Drop for SshTransport {
    fn drop(&mut self) {
        // ControlPersist keeps the master alive past our exit unless told to stop
        for link in [self.link.take(), self.pending.take()].into_iter().flatten() {
            let _ = self.exit_master(&link).status();
            remove_link_files(&link);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_path_is_flat_file_name() {
        let path = control_path_for("we@norns.local");
        let name = path.file_name().and_then(|n| n.to_str()).unwrap();
        assert!(name.starts_with("norns-"));
        assert!(name.ends_with(".sock"));
        assert_eq!(path.parent(), Some(std::env::temp_dir().as_path()));
        assert_ne!(path, control_path_for("we@other.local"));
    }

    #[test]
    fn test_control_path_length_independent_of_host() {
        let short = control_path_for("we@n");
        let long = control_path_for(&format!("we@{}.example.org", "x".repeat(200)));
        assert_eq!(
            short.as_os_str().len(),
            long.as_os_str().len()
        );
    }

    #[test]
    fn test_master_args_trust_on_first_use() {
        let args = master_args(
            "we@norns.local",
            Path::new("/tmp/x.sock"),
            Path::new("/tmp/x.log"),
            false,
        );
        assert!(args.contains(&"StrictHostKeyChecking=accept-new".to_string()));
        assert!(args.contains(&"ControlPath=/tmp/x.sock".to_string()));
        assert!(!args.contains(&"BatchMode=yes".to_string()));
        assert_eq!(args.last().map(String::as_str), Some("we@norns.local"));
    }

    #[test]
    fn test_master_args_batch_mode_without_password() {
        let args = master_args("a@b", Path::new("/tmp/s"), Path::new("/tmp/l"), true);
        assert!(args.contains(&"BatchMode=yes".to_string()));
    }

    #[tokio::test]
    async fn test_run_command_without_link_fails() {
        let mut transport = SshTransport::new();
        let err = transport.run_command("true").await.unwrap_err();
        assert!(matches!(err, TransportError::NotOpen));
    }

    /// Fake ssh client: records `-O exit` requests, otherwise writes its pid
    /// and hangs like a master waiting on authentication
    #[cfg(target_os = "linux")]
    fn hanging_ssh(dir: &Path) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let script = dir.join("ssh");
        std::fs::write(
            &script,
            format!(
                "#!/bin/sh\ncase \"$*\" in *\"-O exit\"*) echo exit >> {log}; exit 0;; esac\necho $$ > {pid}\nexec sleep 30\n",
                log = dir.join("control.log").display(),
                pid = dir.join("master.pid").display(),
            ),
        )
        .unwrap();
        std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
        script
    }

    /// Running and not a zombie
    #[cfg(target_os = "linux")]
    fn process_alive(pid: &str) -> bool {
        std::fs::read_to_string(format!("/proc/{}/stat", pid))
            .ok()
            .and_then(|stat| {
                stat.rsplit_once(')')
                    .and_then(|(_, rest)| rest.trim_start().chars().next())
            })
            .map(|state| state != 'Z')
            .unwrap_or(false)
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn test_dropped_connect_kills_master_and_close_tears_down() {
        let dir = tempfile::TempDir::new().unwrap();
        let mut transport = SshTransport::with_program(hanging_ssh(dir.path()));

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(500),
            transport.connect("norns.test", "we", ""),
        )
        .await;
        assert!(result.is_err());
        assert!(!transport.is_open());

        let pid = std::fs::read_to_string(dir.path().join("master.pid")).unwrap();
        let pid = pid.trim();
        let mut alive = true;
        for _ in 0..50 {
            alive = process_alive(pid);
            if !alive {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        }
        assert!(!alive, "master process {} outlived the dropped connect", pid);

        transport.close().await;
        let requests = std::fs::read_to_string(dir.path().join("control.log")).unwrap();
        assert_eq!(requests.trim(), "exit");

        transport.close().await;
        let requests = std::fs::read_to_string(dir.path().join("control.log")).unwrap();
        assert_eq!(requests.lines().count(), 1);
    }

    #[tokio::test]
    async fn test_close_without_link_is_noop() {
        let mut transport = SshTransport::new();
        transport.close().await;
        transport.close().await;
        assert!(!transport.is_open());
    }
}
