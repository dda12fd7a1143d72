use async_trait::async_trait;

use crate::utils::{ConnectionError, TransportError};

/// Captured result of one remote shell command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Remote shell transport the session drives.
///
/// Implementations own their link handle internally; `connect` opens it,
/// `run_command` uses it, `close` releases it. Hosts are trusted on first use.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send {
    /// Open and authenticate a link to `host`
    async fn connect(
        &mut self,
        host: &str,
        username: &str,
        credential: &str,
    ) -> Result<(), ConnectionError>;

    /// Run one shell command over the open link and wait for it to finish
    async fn run_command(&mut self, command: &str) -> Result<CommandOutput, TransportError>;

    /// Release the link. Must be safe to call when nothing is open.
    async fn close(&mut self);
}
