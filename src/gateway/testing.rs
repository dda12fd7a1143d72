//! Shared fixtures for gateway unit tests

use super::session::{Session, SessionConfig};
use super::transport::{CommandOutput, MockTransport};

pub fn test_config() -> SessionConfig {
    SessionConfig {
        host: "norns.test".to_string(),
        username: "we".to_string(),
        password: "sleep".to_string(),
    }
}

/// Session already connected over the given mock
pub async fn connected_session(mut transport: MockTransport) -> Session {
    transport.expect_connect().returning(|_, _, _| Ok(()));
    let mut session = Session::new(test_config(), Box::new(transport));
    session
        .connect()
        .await
        .expect("mock connect should succeed");
    session
}

pub fn output(stdout: &str) -> CommandOutput {
    CommandOutput {
        stdout: stdout.to_string(),
        stderr: String::new(),
        exit_code: 0,
    }
}
