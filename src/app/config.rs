use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::constants::{
    BUSTED_SPEC, DEFAULT_DEPLOY_PATH, DEFAULT_HOST, DEFAULT_PASSWORD, DEFAULT_REPL_COMMAND,
    DEFAULT_SYNC_EXCLUDES, DEFAULT_SYNC_PROGRAM, DEFAULT_USERNAME, ENV_HOST, ENV_PASS, ENV_USER,
    RUNTIME_SPEC,
};
use crate::gateway::{DeployOptions, SafetyFilter, SessionConfig, TestManifest};

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Device address and credentials
    #[serde(default)]
    pub device: DeviceConfig,

    /// Remote REPL and deploy target
    #[serde(default)]
    pub remote: RemoteConfig,

    /// Extra deny-list patterns
    #[serde(default)]
    pub safety: SafetyConfig,

    /// Test files run after deploy
    #[serde(default)]
    pub tests: TestsConfig,

    /// File sync tool
    #[serde(default)]
    pub sync: SyncConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceConfig {
    pub host: String,
    pub username: String,
    pub password: String,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            username: DEFAULT_USERNAME.to_string(),
            password: DEFAULT_PASSWORD.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Command the Lua source is piped into
    pub repl_command: String,
    /// Default destination for `deploy`
    pub deploy_path: String,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            repl_command: DEFAULT_REPL_COMMAND.to_string(),
            deploy_path: DEFAULT_DEPLOY_PATH.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyConfig {
    /// Added to the built-in deny-list, never replacing it
    #[serde(default)]
    pub extra_patterns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestsConfig {
    pub runtime_spec: PathBuf,
    pub busted_spec: PathBuf,
}

impl Default for TestsConfig {
    fn default() -> Self {
        Self {
            runtime_spec: PathBuf::from(RUNTIME_SPEC),
            busted_spec: PathBuf::from(BUSTED_SPEC),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncConfig {
    pub program: String,
    pub exclude: Vec<String>,
    /// Abort deploy before testing when the sync tool exits non-zero
    pub abort_on_failure: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            program: DEFAULT_SYNC_PROGRAM.to_string(),
            exclude: DEFAULT_SYNC_EXCLUDES.iter().map(|s| s.to_string()).collect(),
            abort_on_failure: false,
        }
    }
}

impl Config {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            host: self.device.host.clone(),
            username: self.device.username.clone(),
            password: self.device.password.clone(),
        }
    }

    pub fn safety_filter(&self) -> SafetyFilter {
        SafetyFilter::with_extra(&self.safety.extra_patterns)
    }

    pub fn deploy_options(&self) -> DeployOptions {
        DeployOptions {
            manifest: TestManifest {
                runtime_spec: self.tests.runtime_spec.clone(),
                busted_spec: self.tests.busted_spec.clone(),
            },
            exclude: self.sync.exclude.clone(),
            abort_on_sync_failure: self.sync.abort_on_failure,
        }
    }
}

/// NORNS_HOST / NORNS_USER / NORNS_PASS onto the device table
fn device_env() -> Env {
    Env::raw().filter_map(|key| {
        if key == ENV_HOST {
            Some("device.host".into())
        } else if key == ENV_USER {
            Some("device.username".into())
        } else if key == ENV_PASS {
            Some("device.password".into())
        } else {
            None
        }
    })
}

/// Load configuration from multiple sources
pub fn load_config() -> Result<Config> {
    let config_dir = get_config_dir()?;
    let global_config = config_dir.join("config.toml");
    let local_config = PathBuf::from(".norns/config.toml");

    let mut figment = Figment::from(Serialized::defaults(Config::default()));

    if global_config.exists() {
        figment = figment.merge(Toml::file(&global_config));
    }

    if local_config.exists() {
        figment = figment.merge(Toml::file(&local_config));
    }

    figment
        .merge(device_env())
        .extract()
        .context("Failed to load configuration")
}

/// Load a single explicit config file, still honouring the device env vars
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        anyhow::bail!("Config file not found: {}", path.display());
    }

    Figment::from(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(device_env())
        .extract()
        .with_context(|| format!("Failed to load configuration from {}", path.display()))
}

/// Get the configuration directory
pub fn get_config_dir() -> Result<PathBuf> {
    if let Some(proj_dirs) = ProjectDirs::from("", "", "norns-agent") {
        Ok(proj_dirs.config_dir().to_path_buf())
    } else {
        let home = std::env::var("HOME")
            .or_else(|_| std::env::var("USERPROFILE"))
            .context("Could not determine home directory")?;
        Ok(PathBuf::from(home).join(".config").join("norns-agent"))
    }
}

/// Save configuration to file
pub fn save_config(config: &Config, path: Option<PathBuf>) -> Result<()> {
    let path = if let Some(p) = path {
        p
    } else {
        get_config_dir()?.join("config.toml")
    };

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let toml_string = toml::to_string_pretty(config)?;
    std::fs::write(&path, toml_string)
        .with_context(|| format!("Failed to write config to {}", path.display()))?;

    Ok(())
}

/// Create a default configuration file if it doesn't exist
pub fn init_config() -> Result<PathBuf> {
    let config_file = get_config_dir()?.join("config.toml");

    if !config_file.exists() {
        save_config(&Config::default(), Some(config_file.clone()))?;
    }

    Ok(config_file)
}
