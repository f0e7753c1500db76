//! On-disk machine records and option assembly.

use std::path::PathBuf;

use machine_driver::flags::{DriverOptions, Flag, FlagValue, MACHINE_NAME_OPTION};
use machine_driver::{Driver, DriverRegistry};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{HostError, Result};

const CONFIG_FILE: &str = "config.json";

/// What gets written to `<storage>/<name>/config.json`.
#[derive(Debug, Serialize, Deserialize)]
pub struct MachineRecord {
    pub name: String,
    pub driver_name: String,
    pub driver: serde_json::Value,
}

pub struct MachineStore {
    root: PathBuf,
}

impl MachineStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory owned by one machine's driver.
    pub fn machine_dir(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn config_path(&self, name: &str) -> PathBuf {
        self.machine_dir(name).join(CONFIG_FILE)
    }

    pub async fn exists(&self, name: &str) -> Result<bool> {
        Ok(tokio::fs::try_exists(self.config_path(name)).await?)
    }

    pub async fn save(&self, name: &str, driver: &dyn Driver) -> Result<()> {
        let record = MachineRecord {
            name: name.to_string(),
            driver_name: driver.driver_name().to_string(),
            driver: driver.snapshot()?,
        };
        tokio::fs::create_dir_all(self.machine_dir(name)).await?;
        tokio::fs::write(self.config_path(name), serde_json::to_vec_pretty(&record)?).await?;
        debug!(machine = name, "machine record saved");
        Ok(())
    }

    /// Instantiate the recorded driver and restore its state.
    pub async fn load(&self, name: &str, registry: &DriverRegistry) -> Result<Box<dyn Driver>> {
        let raw = match tokio::fs::read(self.config_path(name)).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(HostError::NotFound(name.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let record: MachineRecord = serde_json::from_slice(&raw)?;

        let entry = registry.get(&record.driver_name)?;
        let mut driver = (entry.new)(self.machine_dir(name))?;
        driver.restore(record.driver)?;
        Ok(driver)
    }

    pub async fn remove(&self, name: &str) -> Result<()> {
        let dir = self.machine_dir(name);
        if tokio::fs::try_exists(&dir).await? {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        Ok(())
    }
}

/// Split `key=value` command line options.
pub fn parse_overrides(raw: &[String]) -> Result<Vec<(String, String)>> {
    raw.iter()
        .map(|opt| {
            opt.split_once('=')
                .filter(|(k, _)| !k.is_empty())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| HostError::InvalidOption(opt.clone()))
        })
        .collect()
}

/// Option values for a driver's create flags.
///
/// Precedence: explicit override, then the flag's environment variable, then
/// the flag default.
pub fn resolve_options(
    machine_name: &str,
    flags: &[Flag],
    overrides: &[(String, String)],
    env: impl Fn(&str) -> Option<String>,
) -> DriverOptions {
    let mut opts = DriverOptions::new();
    for flag in flags {
        let explicit = overrides
            .iter()
            .rev()
            .find(|(k, _)| k == flag.name)
            .map(|(_, v)| v.clone());
        let from_env = || flag.env_var.and_then(&env).filter(|v| !v.is_empty());

        let value = explicit.or_else(from_env).unwrap_or_else(|| match flag.default {
            FlagValue::String(s) => s.to_string(),
            FlagValue::Int(i) => i.to_string(),
        });
        opts.set(flag.name, value);
    }
    opts.set(MACHINE_NAME_OPTION, machine_name);
    opts
}

/// Usage lines for `--help`-style listings of a driver's flags.
pub fn describe_flags(flags: &[Flag]) -> Vec<String> {
    flags
        .iter()
        .map(|f| {
            let env = f.env_var.map(|e| format!(" [${e}]")).unwrap_or_default();
            let default = match f.default {
                FlagValue::String("") => String::new(),
                FlagValue::String(s) => format!(" (default {s:?})"),
                FlagValue::Int(i) => format!(" (default {i})"),
            };
            format!("--{}{env}{default}\n      {}", f.name, f.usage)
        })
        .collect()
}

pub fn is_valid_machine_name(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.')
        && !name.starts_with(['-', '.'])
}
