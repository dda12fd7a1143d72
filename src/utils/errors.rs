use std::path::PathBuf;
use thiserror::Error;

/// Failure of the underlying remote shell transport
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Remote shell connection dropped: {0}")]
    Disconnected(String),

    #[error("Transport has no open link")]
    NotOpen,
}

/// Failure to open a session to the device
#[derive(Error, Debug)]
pub enum ConnectionError {
    #[error("Connection to {host} failed: {source}")]
    Transport {
        host: String,
        #[source]
        source: TransportError,
    },

    #[error("Connection to {host} rejected: {detail}")]
    Rejected { host: String, detail: String },
}

/// Failure of a single execution request
#[derive(Error, Debug)]
pub enum ExecutionError {
    #[error("Not connected to Norns device")]
    NotConnected,

    #[error("Unsafe code rejected: matched forbidden pattern `{pattern}`")]
    UnsafeCodeRejected { pattern: String },

    #[error("Failed to execute Lua code: {0}")]
    Transport(#[from] TransportError),
}

/// Failure of a state snapshot query
#[derive(Error, Debug)]
pub enum StateError {
    #[error(transparent)]
    Execution(#[from] ExecutionError),

    #[error("Could not parse device state: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Failure of a test run
#[derive(Error, Debug)]
pub enum TestError {
    #[error("Test file not found: {}", .path.display())]
    ResourceNotFound {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    Execution(#[from] ExecutionError),
}

impl TestError {
    /// True when the local test resource was missing or unreadable
    pub fn is_resource_not_found(&self) -> bool {
        matches!(self, TestError::ResourceNotFound { .. })
    }
}

/// Failure to start the file sync process at all
#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },
}

/// Failure that abandons a deploy-and-test sequence
#[derive(Error, Debug)]
pub enum DeployError {
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    #[error(transparent)]
    Sync(#[from] SyncError),

    #[error("File sync exited with status {0}")]
    SyncFailed(i32),

    #[error(transparent)]
    Test(#[from] TestError),
}
