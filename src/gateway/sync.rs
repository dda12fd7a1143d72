use async_trait::async_trait;
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::utils::{log_debug, SyncError};

/// One-shot mirror of a local tree onto the device
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait FileSync: Send + Sync {
    /// Mirror `local_dir` onto `remote_dest` (`user@host:path`), returning the
    /// sync tool's exit code. Only failing to start the tool is an error.
    async fn mirror(
        &self,
        local_dir: &Path,
        remote_dest: &str,
        exclude: &[String],
    ) -> Result<i32, SyncError>;
}

/// `rsync -av` over ssh, with `sshpass` supplying the password when present
#[derive(Debug, Clone)]
pub struct RsyncSync {
    program: String,
    password: Option<String>,
}

impl RsyncSync {
    pub fn new(program: impl Into<String>, password: Option<String>) -> Self {
        Self {
            program: program.into(),
            password: password.filter(|p| !p.is_empty()),
        }
    }
}

/// Arguments for the sync tool. The trailing slash copies the tree's contents.
fn rsync_args(local_dir: &Path, remote_dest: &str, exclude: &[String]) -> Vec<String> {
    let mut args = vec![
        "-av".to_string(),
        "-e".to_string(),
        "ssh -o StrictHostKeyChecking=accept-new".to_string(),
    ];
    args.extend(exclude.iter().map(|pattern| format!("--exclude={}", pattern)));

    let local = local_dir.display().to_string();
    if local.ends_with('/') {
        args.push(local);
    } else {
        args.push(format!("{}/", local));
    }
    args.push(remote_dest.to_string());
    args
}

#[async_trait]
impl FileSync for RsyncSync {
    async fn mirror(
        &self,
        local_dir: &Path,
        remote_dest: &str,
        exclude: &[String],
    ) -> Result<i32, SyncError> {
        let args = rsync_args(local_dir, remote_dest, exclude);

        let use_sshpass = self.password.is_some() && which::which("sshpass").is_ok();
        let mut cmd = if use_sshpass {
            let mut c = Command::new("sshpass");
            c.arg("-e").arg(&self.program);
            if let Some(password) = &self.password {
                c.env("SSHPASS", password);
            }
            c
        } else {
            Command::new(&self.program)
        };

        let output = cmd
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|source| SyncError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        for line in String::from_utf8_lossy(&output.stdout).lines() {
            log_debug(format!("{}: {}", self.program, line));
        }
        for line in String::from_utf8_lossy(&output.stderr).lines() {
            log_debug(format!("{} (stderr): {}", self.program, line));
        }

        Ok(output.status.code().unwrap_or(-1))
    }
}
