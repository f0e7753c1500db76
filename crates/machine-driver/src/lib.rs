pub mod cloud;
pub mod flags;
pub mod floating_ip;
pub mod openstack;
pub mod resolve;
pub mod ssh;
pub mod types;
pub mod validate;
pub mod wait;

#[cfg(test)]
mod testing;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use flags::{DriverOptions, Flag};
use types::{InstanceState, ResourceKind};
use validate::ConfigError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Unable to find {kind} named {name}")]
    NotFound { kind: ResourceKind, name: String },

    #[error("openstack api error: {0}")]
    Api(#[from] openstack_api::Error),

    #[error("timed out waiting for {condition} after {}s", .bound.as_secs())]
    Timeout { condition: String, bound: Duration },

    #[error("No IP found for the machine")]
    NoIpFound,

    #[error("{0}")]
    Unsupported(String),

    #[error("{0} client used before initialization")]
    NotInitialized(&'static str),

    #[error("no instance id recorded for this machine")]
    MissingInstanceId,

    #[error("no network port found for instance {0}")]
    MissingPort(String),

    #[error("ssh key generation failed: {0}")]
    KeyGeneration(String),

    #[error("ssh command failed: {0}")]
    Ssh(String),

    #[error("invalid value for --{flag}: {value}")]
    InvalidFlag { flag: String, value: String },

    #[error("unknown driver: {0}")]
    UnknownDriver(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// True for convergence timeouts, which callers may retry as a whole.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::NoIpFound)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle interface a machine driver exposes to its host.
///
/// One driver value owns one machine. Operations are sequential; callers must
/// not run two of them on the same driver concurrently.
#[async_trait]
pub trait Driver: Send + Sync + 'static {
    /// Registry name of this driver.
    fn driver_name(&self) -> &'static str;

    /// Load the machine spec from host-provided options and validate it.
    fn set_config_from_flags(&mut self, flags: &DriverOptions) -> Result<()>;

    /// Daemon URL for this machine, or `None` while it has no address.
    async fn url(&mut self) -> Result<Option<String>>;

    async fn ip(&mut self) -> Result<String>;

    async fn state(&self) -> Result<InstanceState>;

    /// Provision the machine end to end.
    async fn create(&mut self) -> Result<()>;

    async fn start(&mut self) -> Result<()>;

    async fn stop(&mut self) -> Result<()>;

    async fn restart(&mut self) -> Result<()>;

    async fn kill(&mut self) -> Result<()>;

    /// Delete the instance and its key pair.
    ///
    /// With no instance recorded this only drops a leftover key pair, best effort.
    async fn remove(&mut self) -> Result<()>;

    async fn upgrade(&mut self) -> Result<()>;

    /// Build an `ssh` invocation against the machine, optionally running `args`.
    async fn ssh_command(&mut self, args: &[String]) -> Result<tokio::process::Command>;

    /// Serialize spec and provisioning state so the host can persist them.
    fn snapshot(&self) -> Result<serde_json::Value>;

    /// Restore what [`Driver::snapshot`] produced.
    fn restore(&mut self, value: serde_json::Value) -> Result<()>;
}

/// Constructor and flag schema the host uses to instantiate a driver.
#[derive(Clone, Copy)]
pub struct RegisteredDriver {
    pub new: fn(store_path: PathBuf) -> Result<Box<dyn Driver>>,
    pub create_flags: fn() -> Vec<Flag>,
}

/// Drivers known to this process, keyed by name.
///
/// Populated once at startup; there is no dynamic loading.
#[derive(Clone, Default)]
pub struct DriverRegistry {
    drivers: BTreeMap<&'static str, RegisteredDriver>,
}

impl DriverRegistry {
    /// Registry with every driver compiled into this crate.
    pub fn builtin() -> Self {
        let mut registry = Self::default();
        registry.register(
            openstack::DRIVER_NAME,
            RegisteredDriver {
                new: openstack::new_driver,
                create_flags: flags::openstack_create_flags,
            },
        );
        tracing::debug!(drivers = ?registry.available(), "driver registry ready");
        registry
    }

    pub fn register(&mut self, name: &'static str, driver: RegisteredDriver) {
        self.drivers.insert(name, driver);
    }

    /// Look up a driver by name.
    pub fn get(&self, name: &str) -> Result<&RegisteredDriver> {
        self.drivers
            .get(name)
            .ok_or_else(|| Error::UnknownDriver(name.to_string()))
    }

    /// List the names of all registered drivers.
    pub fn available(&self) -> Vec<&'static str> {
        self.drivers.keys().copied().collect()
    }
}
