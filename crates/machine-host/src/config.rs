use std::path::PathBuf;

const DEFAULT_DRIVER: &str = "openstack";

#[derive(Debug, Clone)]
pub struct HostConfig {
    /// Root directory holding one sub-directory per machine.
    pub storage_path: PathBuf,
    pub default_driver: String,
}

impl HostConfig {
    /// Defaults used when neither the command line nor its env vars say otherwise.
    pub fn from_env() -> Self {
        Self {
            storage_path: default_storage_path(dirs::home_dir()),
            default_driver: DEFAULT_DRIVER.into(),
        }
    }
}

fn default_storage_path(home: Option<PathBuf>) -> PathBuf {
    home.unwrap_or_else(|| PathBuf::from("."))
        .join(".docker/machine/machines")
}
