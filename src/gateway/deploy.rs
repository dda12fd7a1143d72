use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Instant;

use super::channel::ExecutionChannel;
use super::runner::{run_test, TestOutcome};
use super::session::Session;
use super::sync::FileSync;
use crate::utils::{log_error, log_info, log_warn, DeployError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentStatus {
    Success,
    Failed,
}

/// Outcome of one deploy-and-test run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeploymentReport {
    pub status: DeploymentStatus,
    pub outcomes: Vec<TestOutcome>,
    pub all_passed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure_detail: Option<String>,
    /// Exit code of the sync tool, when it ran
    #[serde(default)]
    pub sync_exit_code: Option<i32>,
    pub duration_ms: u128,
    pub finished_at: DateTime<Utc>,
}

impl DeploymentReport {
    fn completed(outcomes: Vec<TestOutcome>, sync_exit_code: Option<i32>, duration_ms: u128) -> Self {
        let all_passed = !outcomes.is_empty() && outcomes.iter().all(|o| o.success);
        Self {
            status: DeploymentStatus::Success,
            outcomes,
            all_passed,
            failure_detail: None,
            sync_exit_code,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    fn failed(detail: String, sync_exit_code: Option<i32>, duration_ms: u128) -> Self {
        Self {
            status: DeploymentStatus::Failed,
            outcomes: Vec::new(),
            all_passed: false,
            failure_detail: Some(detail),
            sync_exit_code,
            duration_ms,
            finished_at: Utc::now(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == DeploymentStatus::Success
    }
}

/// Fixed test resources, relative to the deployed tree
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestManifest {
    /// Always run; its outcome is always recorded
    pub runtime_spec: PathBuf,
    /// Run when present; a missing file is skipped
    pub busted_spec: PathBuf,
}

#[derive(Debug, Clone)]
pub struct DeployOptions {
    pub manifest: TestManifest,
    pub exclude: Vec<String>,
    /// Stop before testing when the sync tool fails. Off by default: the
    /// sync result is otherwise only logged.
    pub abort_on_sync_failure: bool,
}

/// Sync-then-test orchestrator. Steps run strictly in order.
pub struct Deployer {
    sync: Box<dyn FileSync>,
    options: DeployOptions,
}

impl Deployer {
    pub fn new(sync: Box<dyn FileSync>, options: DeployOptions) -> Self {
        Self { sync, options }
    }

    pub fn options(&self) -> &DeployOptions {
        &self.options
    }

    /// Mirror `local_path` to `remote_path`, then run the manifest tests.
    ///
    /// Never fails: an unrecoverable step yields a `Failed` report with the
    /// error text instead of partial outcomes.
    pub async fn deploy_and_test(
        &self,
        channel: &ExecutionChannel,
        session: &mut Session,
        local_path: &Path,
        remote_path: &str,
    ) -> DeploymentReport {
        let started = Instant::now();
        let mut sync_exit_code = None;

        let result = self
            .run_sequence(channel, session, local_path, remote_path, &mut sync_exit_code)
            .await;
        let duration_ms = started.elapsed().as_millis();

        match result {
            Ok(outcomes) => DeploymentReport::completed(outcomes, sync_exit_code, duration_ms),
            Err(e) => {
                log_error("[DEPLOY]", format!("Deployment failed: {}", e));
                DeploymentReport::failed(e.to_string(), sync_exit_code, duration_ms)
            }
        }
    }

    async fn run_sequence(
        &self,
        channel: &ExecutionChannel,
        session: &mut Session,
        local_path: &Path,
        remote_path: &str,
        sync_exit_code: &mut Option<i32>,
    ) -> Result<Vec<TestOutcome>, DeployError> {
        if !session.is_connected() {
            session.connect().await?;
        }

        self.sync_tree(session, local_path, remote_path, sync_exit_code)
            .await?;

        let mut outcomes = Vec::new();

        let runtime_spec = local_path.join(&self.options.manifest.runtime_spec);
        outcomes.push(run_test(channel, session, &runtime_spec).await?);

        let busted_spec = local_path.join(&self.options.manifest.busted_spec);
        match run_test(channel, session, &busted_spec).await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) if e.is_resource_not_found() => {
                log_info("[DEPLOY]", format!("Busted tests not available: {}", e));
            }
            Err(e) => return Err(e.into()),
        }

        Ok(outcomes)
    }

    async fn sync_tree(
        &self,
        session: &Session,
        local_path: &Path,
        remote_path: &str,
        sync_exit_code: &mut Option<i32>,
    ) -> Result<(), DeployError> {
        let config = session.config();
        let remote_dest = format!("{}@{}:{}", config.username, config.host, remote_path);
        log_info("[DEPLOY]", format!("Deploying to {}...", config.host));

        match self
            .sync
            .mirror(local_path, &remote_dest, &self.options.exclude)
            .await
        {
            Ok(0) => {
                *sync_exit_code = Some(0);
                log_info("[DEPLOY]", format!("Synced {} to {}", local_path.display(), remote_dest));
            }
            Ok(code) => {
                *sync_exit_code = Some(code);
                log_warn("[DEPLOY]", format!("File sync exited with status {}", code));
                if self.options.abort_on_sync_failure {
                    return Err(DeployError::SyncFailed(code));
                }
            }
            Err(e) => {
                log_warn("[DEPLOY]", format!("File sync did not run: {}", e));
                if self.options.abort_on_sync_failure {
                    return Err(e.into());
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::safety::SafetyFilter;
    use crate::gateway::sync::MockFileSync;
    use crate::gateway::testing::{connected_session, output, test_config};
    use crate::gateway::transport::{CommandOutput, MockTransport};
    use crate::utils::{SyncError, TransportError};
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    const RUNTIME: &str = "test/norns_runtime_spec.lua";
    const BUSTED: &str = "test/norns_busted_spec.lua";

    fn options(abort_on_sync_failure: bool) -> DeployOptions {
        DeployOptions {
            manifest: TestManifest {
                runtime_spec: PathBuf::from(RUNTIME),
                busted_spec: PathBuf::from(BUSTED),
            },
            exclude: vec![".git".to_string()],
            abort_on_sync_failure,
        }
    }

    fn channel() -> ExecutionChannel {
        ExecutionChannel::new(SafetyFilter::default(), "maiden repl")
    }

    fn sync_returning(code: i32) -> Box<MockFileSync> {
        let mut sync = MockFileSync::new();
        sync.expect_mirror()
            .times(1)
            .returning(move |_, _, _| Ok(code));
        Box::new(sync)
    }

    /// Tree with the runtime spec and, optionally, the busted spec
    fn project(with_busted: bool) -> TempDir {
        let dir = TempDir::new().unwrap();
        std::fs::create_dir_all(dir.path().join("test")).unwrap();
        std::fs::write(dir.path().join(RUNTIME), "print('runtime')").unwrap();
        if with_busted {
            std::fs::write(dir.path().join(BUSTED), "print('busted')").unwrap();
        }
        dir
    }

    #[tokio::test]
    async fn test_missing_busted_spec_is_omitted() {
        let dir = project(false);
        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .times(1)
            .returning(|_| Ok(output("✅ runtime ok")));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/dust/code/Foobar")
            .await;

        assert_eq!(report.status, DeploymentStatus::Success);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].success);
        assert!(report.all_passed);
        assert_eq!(report.failure_detail, None);
        assert_eq!(report.sync_exit_code, Some(0));
    }

    #[tokio::test]
    async fn test_both_specs_run_in_order_and_aggregate() {
        let dir = project(true);
        let mut transport = MockTransport::new();
        let mut seq = mockall::Sequence::new();
        transport
            .expect_run_command()
            .withf(|cmd| cmd.contains("runtime"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(output("FAILED: tempo")));
        transport
            .expect_run_command()
            .withf(|cmd| cmd.contains("busted"))
            .times(1)
            .in_sequence(&mut seq)
            .returning(|_| Ok(output("PASSED")));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert!(report.is_success());
        assert_eq!(report.outcomes.len(), 2);
        assert!(report.outcomes[0].error);
        assert!(report.outcomes[1].success);
        assert!(!report.all_passed);
    }

    #[tokio::test]
    async fn test_failing_runtime_spec_with_nonzero_exit_is_recorded() {
        let dir = project(false);
        let mut transport = MockTransport::new();
        transport.expect_run_command().times(1).returning(|_| {
            Ok(CommandOutput {
                stdout: "1 FAILED: tempo drift\n".to_string(),
                stderr: String::new(),
                exit_code: 1,
            })
        });
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert_eq!(report.status, DeploymentStatus::Success);
        assert_eq!(report.outcomes.len(), 1);
        assert!(report.outcomes[0].error);
        assert!(!report.outcomes[0].success);
        assert_eq!(report.outcomes[0].raw_result, "1 FAILED: tempo drift");
        assert!(!report.all_passed);
    }

    #[tokio::test]
    async fn test_missing_runtime_spec_fails_report() {
        let dir = TempDir::new().unwrap();
        let mut transport = MockTransport::new();
        transport.expect_run_command().never();
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert_eq!(report.status, DeploymentStatus::Failed);
        assert!(report.outcomes.is_empty());
        assert!(!report.all_passed);
        assert!(report
            .failure_detail
            .as_deref()
            .unwrap_or_default()
            .contains("norns_runtime_spec.lua"));
    }

    #[tokio::test]
    async fn test_busted_transport_error_is_not_omitted() {
        let dir = project(true);
        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .withf(|cmd| cmd.contains("runtime"))
            .returning(|_| Ok(output("PASSED")));
        transport
            .expect_run_command()
            .withf(|cmd| cmd.contains("busted"))
            .returning(|_| Err(TransportError::Disconnected("link lost".to_string())));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert_eq!(report.status, DeploymentStatus::Failed);
        assert!(report.failure_detail.unwrap_or_default().contains("link lost"));
    }

    #[tokio::test]
    async fn test_sync_failure_is_fire_and_forget_by_default() {
        let dir = project(false);
        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .returning(|_| Ok(output("PASSED")));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(23), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert!(report.is_success());
        assert!(report.all_passed);
        assert_eq!(report.sync_exit_code, Some(23));
    }

    #[tokio::test]
    async fn test_sync_spawn_error_continues_by_default() {
        let dir = project(false);
        let mut sync = MockFileSync::new();
        sync.expect_mirror().returning(|_, _, _| {
            Err(SyncError::Spawn {
                program: "rsync".to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            })
        });
        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .returning(|_| Ok(output("PASSED")));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(Box::new(sync), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert!(report.is_success());
        assert_eq!(report.sync_exit_code, None);
    }

    #[tokio::test]
    async fn test_sync_failure_aborts_when_configured() {
        let dir = project(true);
        let mut transport = MockTransport::new();
        transport.expect_run_command().never();
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(sync_returning(12), options(true));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert_eq!(report.status, DeploymentStatus::Failed);
        assert_eq!(report.sync_exit_code, Some(12));
        assert!(report.failure_detail.unwrap_or_default().contains("12"));
    }

    #[tokio::test]
    async fn test_sync_destination_and_excludes() {
        let dir = project(false);
        let mut sync = MockFileSync::new();
        sync.expect_mirror()
            .withf(|_, dest, exclude| {
                dest.to_string() == "we@norns.test:~/dust/code/Foobar"
                    && exclude.to_vec() == vec![".git".to_string()]
            })
            .times(1)
            .returning(|_, _, _| Ok(0));
        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .returning(|_| Ok(output("PASSED")));
        let mut session = connected_session(transport).await;

        let deployer = Deployer::new(Box::new(sync), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/dust/code/Foobar")
            .await;
        assert!(report.all_passed);
    }

    #[tokio::test]
    async fn test_connects_when_disconnected() {
        let dir = project(false);
        let mut transport = MockTransport::new();
        transport.expect_connect().times(1).returning(|_, _, _| Ok(()));
        transport
            .expect_run_command()
            .returning(|_| Ok(output("PASSED")));
        let mut session = Session::new(test_config(), Box::new(transport));

        let deployer = Deployer::new(sync_returning(0), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert!(session.is_connected());
        assert!(report.all_passed);
    }

    #[tokio::test]
    async fn test_connection_failure_fails_report_without_sync() {
        let dir = project(false);
        let mut transport = MockTransport::new();
        transport.expect_connect().returning(|host, _, _| {
            Err(crate::utils::ConnectionError::Rejected {
                host: host.to_string(),
                detail: "Host key verification failed".to_string(),
            })
        });
        let mut sync = MockFileSync::new();
        sync.expect_mirror().never();
        let mut session = Session::new(test_config(), Box::new(transport));

        let deployer = Deployer::new(Box::new(sync), options(false));
        let report = deployer
            .deploy_and_test(&channel(), &mut session, dir.path(), "~/x")
            .await;

        assert_eq!(report.status, DeploymentStatus::Failed);
        assert_eq!(report.sync_exit_code, None);
    }

    #[test]
    fn test_all_passed_requires_outcomes() {
        let report = DeploymentReport::completed(Vec::new(), Some(0), 1);
        assert!(!report.all_passed);
    }

    #[test]
    fn test_report_json_shape() {
        let report = DeploymentReport::completed(
            vec![TestOutcome::classify("t", "PASSED")],
            Some(0),
            5,
        );
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["all_passed"], true);
        assert!(json.get("failure_detail").is_none());
    }
}
