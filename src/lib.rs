pub mod app;
pub mod cli;
pub mod constants;
pub mod gateway;
pub mod utils;

pub use app::{load_config, Config};
pub use gateway::{
    CodeFragment, DeploymentReport, DeviceState, NornsAgent, SafetyFilter, Session,
    SessionConfig, TestOutcome,
};
pub use utils::{ConnectionError, ExecutionError, TestError};
