// Gateway module for remote execution - follows the Train Station Pattern
// All external access must go through this gateway

// Private submodules - not directly accessible from outside
mod agent;
mod channel;
mod deploy;
mod runner;
mod safety;
mod session;
mod ssh;
mod state;
mod sync;
mod transport;

#[cfg(test)]
mod testing;

// Public re-exports - the ONLY way to access gateway functionality
pub use agent::NornsAgent;
pub use channel::{build_repl_command, CodeFragment, ExecutionChannel};
pub use deploy::{DeployOptions, Deployer, DeploymentReport, DeploymentStatus, TestManifest};
pub use runner::{run_test, TestOutcome};
pub use safety::SafetyFilter;
pub use session::{Session, SessionConfig};
pub use ssh::SshTransport;
pub use state::{parse_state, query_state, DeviceState, STATE_QUERY};
pub use sync::{FileSync, RsyncSync};
pub use transport::{CommandOutput, Transport};
