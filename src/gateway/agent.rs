use std::path::Path;

use super::channel::{CodeFragment, ExecutionChannel};
use super::deploy::{DeploymentReport, Deployer};
use super::runner::{self, TestOutcome};
use super::session::Session;
use super::state::{self, DeviceState};
use crate::utils::{log_warn, ConnectionError, ExecutionError, StateError, TestError};

/// One agent driving one device session
pub struct NornsAgent {
    session: Session,
    channel: ExecutionChannel,
    deployer: Deployer,
}

impl NornsAgent {
    pub fn new(session: Session, channel: ExecutionChannel, deployer: Deployer) -> Self {
        Self {
            session,
            channel,
            deployer,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn host(&self) -> &str {
        self.session.host()
    }

    pub async fn connect(&mut self) -> Result<(), ConnectionError> {
        self.session.connect().await
    }

    pub async fn disconnect(&mut self) {
        self.session.disconnect().await
    }

    /// Execute a Lua fragment in the device REPL
    pub async fn eval(&mut self, code: &CodeFragment) -> Result<String, ExecutionError> {
        self.channel.execute(&mut self.session, code).await
    }

    pub async fn try_get_state(&mut self) -> Result<DeviceState, StateError> {
        state::query_state(&self.channel, &mut self.session).await
    }

    /// Best-effort state snapshot: any failure becomes the empty record
    pub async fn get_state(&mut self) -> DeviceState {
        self.try_get_state().await.unwrap_or_else(|e| {
            log_warn("[STATE]", format!("Could not get state: {}", e));
            DeviceState::default()
        })
    }

    pub async fn run_test(&mut self, path: &Path) -> Result<TestOutcome, TestError> {
        runner::run_test(&self.channel, &mut self.session, path).await
    }

    pub async fn deploy_and_test(&mut self, local_path: &Path, remote_path: &str) -> DeploymentReport {
        self.deployer
            .deploy_and_test(&self.channel, &mut self.session, local_path, remote_path)
            .await
    }
}
