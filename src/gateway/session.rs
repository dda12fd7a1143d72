use super::transport::{CommandOutput, Transport};
use crate::utils::{log_error, log_info, ConnectionError, ExecutionError};

/// Where and as whom to connect. Supplied explicitly by the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

/// Single connection to one device.
///
/// Not internally synchronized: one orchestration sequence drives a session
/// at a time, and callers sharing one must serialize access themselves.
pub struct Session {
    config: SessionConfig,
    transport: Box<dyn Transport>,
    connected: bool,
}

impl Session {
    pub fn new(config: SessionConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            transport,
            connected: false,
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn host(&self) -> &str {
        &self.config.host
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    /// Open and authenticate the link. No automatic retry.
    ///
    /// Connecting an already-connected session drops the old link first.
    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        if self.connected {
            self.disconnect().await;
        }

        let result = self
            .transport
            .connect(
                &self.config.host,
                &self.config.username,
                &self.config.password,
            )
            .await;

        match result {
            Ok(()) => {
                self.connected = true;
                log_info("[CONNECT]", format!("Connected to Norns device at {}", self.config.host));
                Ok(())
            }
            Err(e) => {
                self.connected = false;
                log_error("[CONNECT]", format!("Failed to connect to Norns device: {}", e));
                Err(e)
            }
        }
    }

    /// Release the link. Idempotent and safe when never connected.
    pub async fn disconnect(&mut self) {
        self.transport.close().await;
        if self.connected {
            log_info("[DISCONNECT]", format!("Disconnected from {}", self.config.host));
        }
        self.connected = false;
    }

    /// Run a raw shell command on the device. Fails fast when disconnected.
    pub(crate) async fn run_command(
        &mut self,
        command: &str,
    ) -> Result<CommandOutput, ExecutionError> {
        if !self.connected {
            return Err(ExecutionError::NotConnected);
        }
        Ok(self.transport.run_command(command).await?)
    }
}
