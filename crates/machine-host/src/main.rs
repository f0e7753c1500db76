mod config;
mod error;
mod store;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use machine_driver::{Driver, DriverRegistry};
use tracing_subscriber::EnvFilter;

use crate::config::HostConfig;
use crate::error::{HostError, Result};
use crate::store::{
    MachineStore, describe_flags, is_valid_machine_name, parse_overrides, resolve_options,
};

/// Provision and manage Docker hosts on OpenStack.
#[derive(Parser)]
#[command(name = "machine-host")]
struct Cli {
    /// Directory holding machine records.
    #[arg(long, global = true, env = "MACHINE_STORAGE_PATH")]
    storage_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create and provision a machine.
    Create {
        name: String,

        /// Driver to use.
        #[arg(long, short, env = "MACHINE_DRIVER")]
        driver: Option<String>,

        /// Driver option as key=value, e.g. openstack-flavor-name=m1.small.
        #[arg(long = "opt", short = 'o')]
        opts: Vec<String>,
    },

    /// List the create options a driver accepts.
    Flags {
        #[arg(default_value = "openstack")]
        driver: String,
    },

    Start { name: String },
    Stop { name: String },
    Restart { name: String },
    Kill { name: String },

    /// Delete the instance and forget the machine.
    Rm { name: String },

    Ip { name: String },
    Url { name: String },
    Status { name: String },
    Upgrade { name: String },

    /// Open a shell or run a command on the machine.
    Ssh {
        name: String,
        #[arg(trailing_var_arg = true)]
        args: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = HostConfig::from_env();
    if let Some(path) = cli.storage_path {
        config.storage_path = path;
    }

    match run(cli.command, config).await {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands, config: HostConfig) -> Result<ExitCode> {
    let registry = DriverRegistry::builtin();
    let store = MachineStore::new(&config.storage_path);

    match command {
        Commands::Create { name, driver, opts } => {
            if !is_valid_machine_name(&name) {
                return Err(HostError::InvalidName(name));
            }
            if store.exists(&name).await? {
                return Err(HostError::AlreadyExists(name));
            }

            let driver_name = driver.unwrap_or(config.default_driver);
            let entry = registry.get(&driver_name)?;
            let overrides = parse_overrides(&opts)?;
            let options = resolve_options(&name, &(entry.create_flags)(), &overrides, |key| {
                std::env::var(key).ok()
            });

            let mut machine = (entry.new)(store.machine_dir(&name))?;
            machine.set_config_from_flags(&options)?;
            tracing::info!(machine = %name, driver = %driver_name, "creating machine");

            let outcome = machine.create().await;
            // Persist whatever was provisioned so a failed create can still be removed.
            store.save(&name, machine.as_ref()).await?;
            outcome?;

            tracing::info!(machine = %name, "machine is ready");
        }
        Commands::Flags { driver } => {
            let entry = registry.get(&driver)?;
            for line in describe_flags(&(entry.create_flags)()) {
                println!("{line}");
            }
        }
        Commands::Start { name } => {
            with_machine(&store, &registry, &name, |m| m.start()).await?;
        }
        Commands::Stop { name } => {
            with_machine(&store, &registry, &name, |m| m.stop()).await?;
        }
        Commands::Restart { name } => {
            with_machine(&store, &registry, &name, |m| m.restart()).await?;
        }
        Commands::Kill { name } => {
            with_machine(&store, &registry, &name, |m| m.kill()).await?;
        }
        Commands::Upgrade { name } => {
            with_machine(&store, &registry, &name, |m| m.upgrade()).await?;
        }
        Commands::Rm { name } => {
            let mut machine = store.load(&name, &registry).await?;
            match machine.remove().await {
                Ok(()) => {}
                Err(machine_driver::Error::MissingInstanceId) => {
                    tracing::warn!(machine = %name, "no instance recorded, forgetting the machine");
                }
                Err(e) => return Err(e.into()),
            }
            store.remove(&name).await?;
            tracing::info!(machine = %name, "machine removed");
        }
        Commands::Ip { name } => {
            let mut machine = store.load(&name, &registry).await?;
            let ip = machine.ip().await?;
            store.save(&name, machine.as_ref()).await?;
            println!("{ip}");
        }
        Commands::Url { name } => {
            let mut machine = store.load(&name, &registry).await?;
            let url = machine.url().await?;
            store.save(&name, machine.as_ref()).await?;
            println!("{}", url.unwrap_or_default());
        }
        Commands::Status { name } => {
            let machine = store.load(&name, &registry).await?;
            println!("{}", machine.state().await?);
        }
        Commands::Ssh { name, args } => {
            let mut machine = store.load(&name, &registry).await?;
            let mut cmd = machine.ssh_command(&args).await?;
            store.save(&name, machine.as_ref()).await?;

            let status = cmd.status().await?;
            let code = status.code().unwrap_or(1).clamp(0, 255) as u8;
            return Ok(ExitCode::from(code));
        }
    }

    Ok(ExitCode::SUCCESS)
}

type DriverFuture<'a> =
    std::pin::Pin<Box<dyn std::future::Future<Output = machine_driver::Result<()>> + Send + 'a>>;

/// Load a machine, run one lifecycle operation, and save it back.
async fn with_machine<F>(
    store: &MachineStore,
    registry: &DriverRegistry,
    name: &str,
    op: F,
) -> Result<()>
where
    F: for<'a> FnOnce(&'a mut dyn Driver) -> DriverFuture<'a>,
{
    let mut machine = store.load(name, registry).await?;
    let outcome = op(machine.as_mut()).await;
    store.save(name, machine.as_ref()).await?;
    outcome?;
    Ok(())
}
