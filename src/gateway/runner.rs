use serde::{Deserialize, Serialize};
use std::path::Path;

use super::channel::{CodeFragment, ExecutionChannel};
use super::session::Session;
use crate::constants::{FAILURE_MARKERS, SUCCESS_MARKERS};
use crate::utils::TestError;

/// Result of running one test file on the device.
///
/// `success` and `error` are scanned independently and may both be true.
/// Such an outcome is ambiguous but valid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestOutcome {
    pub test_identifier: String,
    pub raw_result: String,
    pub success: bool,
    pub error: bool,
}

impl TestOutcome {
    /// Classify raw REPL output by substring markers
    pub fn classify(test_identifier: impl Into<String>, raw_result: impl Into<String>) -> Self {
        let raw_result = raw_result.into();
        let success = SUCCESS_MARKERS.iter().any(|m| raw_result.contains(m));
        let error = FAILURE_MARKERS.iter().any(|m| raw_result.contains(m));
        Self {
            test_identifier: test_identifier.into(),
            raw_result,
            success,
            error,
        }
    }

    pub fn is_ambiguous(&self) -> bool {
        self.success && self.error
    }
}

/// Load `path`, execute it whole, and classify the answer
pub async fn run_test(
    channel: &ExecutionChannel,
    session: &mut Session,
    path: &Path,
) -> Result<TestOutcome, TestError> {
    let code = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| TestError::ResourceNotFound {
            path: path.to_path_buf(),
            source,
        })?;

    let raw = channel.execute(session, &CodeFragment::from(code)).await?;
    Ok(TestOutcome::classify(path.display().to_string(), raw))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::safety::SafetyFilter;
    use crate::gateway::testing::{connected_session, output};
    use crate::gateway::transport::MockTransport;
    use crate::utils::ExecutionError;
    use tempfile::TempDir;

    fn channel() -> ExecutionChannel {
        ExecutionChannel::new(SafetyFilter::default(), "maiden repl")
    }

    #[test]
    fn test_classify_markers() {
        let passed = TestOutcome::classify("t", "3 tests PASSED");
        assert!(passed.success && !passed.error);

        let ticked = TestOutcome::classify("t", "✅ all good");
        assert!(ticked.success && !ticked.error);

        let failed = TestOutcome::classify("t", "❌ clock drift");
        assert!(!failed.success && failed.error);

        let silent = TestOutcome::classify("t", "nil");
        assert!(!silent.success && !silent.error);
    }

    #[test]
    fn test_classify_both_markers_is_ambiguous() {
        let outcome = TestOutcome::classify("t", "...PASSED...FAILED...");
        assert!(outcome.success);
        assert!(outcome.error);
        assert!(outcome.is_ambiguous());

        let reversed = TestOutcome::classify("t", "FAILED then PASSED");
        assert!(reversed.success && reversed.error);
    }

    #[test]
    fn test_markers_are_case_sensitive() {
        let outcome = TestOutcome::classify("t", "passed, failed");
        assert!(!outcome.success && !outcome.error);
    }

    #[tokio::test]
    async fn test_missing_resource_is_distinct() {
        let mut transport = MockTransport::new();
        transport.expect_run_command().never();
        let mut session = connected_session(transport).await;

        let dir = TempDir::new().unwrap();
        let err = run_test(&channel(), &mut session, &dir.path().join("absent.lua"))
            .await
            .unwrap_err();
        assert!(err.is_resource_not_found());
    }

    #[tokio::test]
    async fn test_runs_file_contents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("spec.lua");
        std::fs::write(&path, "print('PASSED')\n").unwrap();

        let mut transport = MockTransport::new();
        transport
            .expect_run_command()
            .withf(|cmd| cmd.to_string().contains("print('\\''PASSED'\\'')"))
            .times(1)
            .returning(|_| Ok(output("PASSED\n")));
        let mut session = connected_session(transport).await;

        let outcome = run_test(&channel(), &mut session, &path).await.unwrap();
        assert_eq!(outcome.test_identifier, path.display().to_string());
        assert_eq!(outcome.raw_result, "PASSED");
        assert!(outcome.success);
        assert!(!outcome.error);
    }

    #[tokio::test]
    async fn test_unsafe_test_file_is_execution_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("evil.lua");
        std::fs::write(&path, "dofile('/tmp/x.lua')").unwrap();

        let mut transport = MockTransport::new();
        transport.expect_run_command().never();
        let mut session = connected_session(transport).await;

        let err = run_test(&channel(), &mut session, &path).await.unwrap_err();
        assert!(matches!(
            err,
            TestError::Execution(ExecutionError::UnsafeCodeRejected { .. })
        ));
    }
}
