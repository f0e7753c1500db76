//! OpenStack machine driver: provisioning and lifecycle of one instance.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::cloud::{Cloud, OpenStackCloud};
use crate::flags::{DriverOptions, spec_from_flags};
use crate::floating_ip::assign_floating_ip;
use crate::resolve::resolve_ids;
use crate::ssh::{OpenSsh, SshTarget, SshTransport, escalate};
use crate::types::{InstanceRequest, InstanceState, MachineSpec, ProvisioningState};
use crate::validate::validate;
use crate::wait::{RetryPolicy, Sleeper, TokioSleeper, converge};
use crate::{Driver, Error, Result};

pub const DRIVER_NAME: &str = "openstack";

/// Port the Docker daemon listens on once installed.
pub const DAEMON_PORT: u16 = 2376;

const MACHINE_NAME_PREFIX: &str = "docker-host-";
const AUTHORIZED_KEYS_DIR: &str = "/.docker/authorized-keys.d";
const DOCKER_INSTALL_COMMAND: &str = "curl -sSL https://get.docker.com | /bin/sh";

/// Milestones of a create cycle, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Validated,
    Resolved,
    KeyPairReady,
    InstanceRequested,
    InstanceActive,
    FloatingIpAssigned,
    IpKnown,
    SshReady,
    Ready,
}

/// Registry constructor: production cloud and SSH transport.
pub fn new_driver(store_path: PathBuf) -> Result<Box<dyn Driver>> {
    debug!(store_path = %store_path.display(), "instantiating OpenStack driver");
    Ok(Box::new(OpenStackDriver::new(
        store_path,
        Arc::new(OpenStackCloud::new()),
        Arc::new(OpenSsh),
    )))
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    spec: MachineSpec,
    state: ProvisioningState,
}

pub struct OpenStackDriver {
    spec: MachineSpec,
    state: ProvisioningState,
    phase: Option<Phase>,
    store_path: PathBuf,
    cloud: Arc<dyn Cloud>,
    ssh: Arc<dyn SshTransport>,
    sleeper: Arc<dyn Sleeper>,
    policy: RetryPolicy,
}

impl OpenStackDriver {
    pub fn new(store_path: PathBuf, cloud: Arc<dyn Cloud>, ssh: Arc<dyn SshTransport>) -> Self {
        Self {
            spec: MachineSpec::default(),
            state: ProvisioningState::default(),
            phase: None,
            store_path,
            cloud,
            ssh,
            sleeper: Arc::new(TokioSleeper),
            policy: RetryPolicy::DEFAULT,
        }
    }

    pub fn with_spec(mut self, spec: MachineSpec) -> Self {
        self.state = ProvisioningState::from_spec(&spec);
        self.spec = spec;
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = sleeper;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn spec(&self) -> &MachineSpec {
        &self.spec
    }

    pub fn provisioning_state(&self) -> &ProvisioningState {
        &self.state
    }

    /// Last create milestone reached, if a create ran on this value.
    pub fn phase(&self) -> Option<Phase> {
        self.phase
    }

    fn advance(&mut self, phase: Phase) {
        debug!(?phase, machine = ?self.state.machine_name, "create phase reached");
        self.phase = Some(phase);
    }

    fn ssh_key_path(&self) -> PathBuf {
        self.store_path.join("id_rsa")
    }

    fn public_ssh_key_path(&self) -> PathBuf {
        self.store_path.join("id_rsa.pub")
    }

    fn instance_id(&self) -> Result<String> {
        self.state.instance_id.clone().ok_or(Error::MissingInstanceId)
    }

    async fn init_compute(&self) -> Result<()> {
        self.cloud.authenticate(&self.spec).await?;
        self.cloud.init_compute_client(&self.spec).await
    }

    async fn init_network(&self) -> Result<()> {
        self.cloud.authenticate(&self.spec).await?;
        self.cloud.init_network_client(&self.spec).await
    }

    fn set_machine_name_if_not_set(&mut self) -> String {
        let name = self
            .state
            .machine_name
            .get_or_insert_with(|| format!("{MACHINE_NAME_PREFIX}{:032x}", rand::random::<u128>()))
            .clone();
        self.state.key_pair_name = Some(name.clone());
        name
    }

    async fn create_ssh_key(&mut self, key_pair_name: &str) -> Result<()> {
        debug!(name = key_pair_name, "creating key pair");
        self.ssh.generate_key(&self.ssh_key_path()).await?;
        let public_key = tokio::fs::read_to_string(self.public_ssh_key_path()).await?;

        self.init_compute().await?;
        self.cloud
            .create_key_pair(key_pair_name, public_key.trim())
            .await
    }

    async fn create_machine(&mut self, name: &str) -> Result<()> {
        let req = InstanceRequest {
            name: name.to_string(),
            flavor_id: self.state.flavor_id.clone().unwrap_or_default(),
            image_id: self.state.image_id.clone().unwrap_or_default(),
            key_pair_name: self.state.key_pair_name.clone().unwrap_or_default(),
            network_id: self.state.network_id.clone(),
            security_groups: self.spec.security_groups.clone(),
        };
        debug!(flavor_id = %req.flavor_id, image_id = %req.image_id, "creating OpenStack instance");

        self.init_compute().await?;
        let instance_id = self.cloud.create_instance(&req).await?;
        self.state.instance_id = Some(instance_id);
        Ok(())
    }

    async fn wait_for_instance_state(&self, target: InstanceState) -> Result<()> {
        let instance_id = self.instance_id()?;
        let cloud = &self.cloud;
        debug!(instance_id = %instance_id, %target, "waiting for instance state");

        converge(
            &format!("instance {instance_id} to be {target}"),
            self.policy,
            self.sleeper.as_ref(),
            || cloud.instance_status(&instance_id),
            |raw| InstanceState::from_status(raw) == target,
        )
        .await?;
        Ok(())
    }

    async fn assign_floating_ip(&mut self) -> Result<()> {
        let instance_id = self.instance_id()?;
        let pool_id = self
            .state
            .floating_ip_pool_id
            .clone()
            .ok_or_else(|| Error::NotFound {
                kind: crate::types::ResourceKind::FloatingIpPool,
                name: self.spec.floating_ip_pool.clone().unwrap_or_default(),
            })?;

        self.init_network().await?;
        let port_id = self.cloud.instance_port_id(&instance_id).await?;
        debug!(instance_id = %instance_id, pool = ?self.spec.floating_ip_pool, "assigning floating IP");

        let ip = assign_floating_ip(self.cloud.as_ref(), &pool_id, &port_id).await?;
        self.state.ip = Some(ip.address);
        Ok(())
    }

    /// Cached address, or poll the instance until one of the wanted type shows up.
    async fn look_for_ip_address(&mut self) -> Result<String> {
        if let Some(ip) = &self.state.ip {
            return Ok(ip.clone());
        }

        let instance_id = self.instance_id()?;
        debug!(instance_id = %instance_id, "looking for the IP address");
        self.init_compute().await?;

        let wanted = self.spec.wanted_address_type();
        let cloud = &self.cloud;
        let addresses = converge(
            &format!("a {} address on instance {instance_id}", wanted.as_str()),
            self.policy,
            self.sleeper.as_ref(),
            || cloud.instance_addresses(&instance_id),
            |addrs| addrs.iter().any(|a| a.address_type == wanted),
        )
        .await
        .map_err(|e| if e.is_timeout() { Error::NoIpFound } else { e })?;

        let ip = addresses
            .into_iter()
            .find(|a| a.address_type == wanted)
            .map(|a| a.address)
            .ok_or(Error::NoIpFound)?;

        debug!(instance_id = %instance_id, ip = %ip, "IP address found");
        self.state.ip = Some(ip.clone());
        Ok(ip)
    }

    async fn ssh_target(&mut self) -> Result<SshTarget> {
        Ok(SshTarget {
            host: self.look_for_ip_address().await?,
            port: self.spec.ssh_port,
            user: self.spec.ssh_user.clone(),
            key_path: self.ssh_key_path(),
        })
    }

    async fn wait_for_ssh_server(&mut self) -> Result<()> {
        let addr = self.ssh_target().await?.addr();
        let ssh = &self.ssh;
        debug!(addr = %addr, "waiting for the SSH server to be started");

        converge(
            &format!("ssh server on {addr}"),
            self.policy,
            self.sleeper.as_ref(),
            || ssh.probe_tcp(&addr),
            |reachable| *reachable,
        )
        .await?;
        Ok(())
    }

    async fn wait_for_instance_to_start(&mut self) -> Result<()> {
        self.wait_for_instance_state(InstanceState::Running).await?;
        self.wait_for_ssh_server().await
    }

    /// Best-effort key pair cleanup for a create that never got an instance.
    async fn remove_orphaned_key_pair(&self) {
        let Some(name) = self.state.key_pair_name.as_deref() else {
            debug!("nothing provisioned, nothing to remove");
            return;
        };
        info!(name, "no instance recorded, deleting key pair only");

        let deleted = match self.init_compute().await {
            Ok(()) => self.cloud.delete_key_pair(name).await,
            Err(e) => Err(e),
        };
        if let Err(e) = deleted {
            warn!(name, error = %e, "could not delete key pair");
        }
    }

    async fn install_docker(&mut self) -> Result<()> {
        let target = self.ssh_target().await?;
        let public_key = tokio::fs::read_to_string(self.public_ssh_key_path()).await?;
        let key_name = self.state.key_pair_name.clone().unwrap_or_default();

        debug!(host = %target.host, "adding key to authorized-keys.d");
        let add_key = format!(
            "mkdir -p {AUTHORIZED_KEYS_DIR} && printf \"%s\\n\" \"{}\" > {AUTHORIZED_KEYS_DIR}/{key_name}.pub",
            public_key.trim()
        );
        self.ssh
            .run(&target, &escalate(&target.user, &[add_key]))
            .await?;

        debug!(host = %target.host, "installing docker daemon on the machine");
        self.ssh
            .run(
                &target,
                &escalate(&target.user, &[DOCKER_INSTALL_COMMAND.to_string()]),
            )
            .await
    }
}

#[async_trait]
impl Driver for OpenStackDriver {
    fn driver_name(&self) -> &'static str {
        DRIVER_NAME
    }

    fn set_config_from_flags(&mut self, flags: &DriverOptions) -> Result<()> {
        let spec = spec_from_flags(flags)?;
        validate(&spec)?;
        self.state = ProvisioningState::from_spec(&spec);
        self.spec = spec;
        Ok(())
    }

    async fn url(&mut self) -> Result<Option<String>> {
        if self.state.ip.is_none() && self.state.instance_id.is_none() {
            return Ok(None);
        }
        let ip = self.look_for_ip_address().await?;
        Ok(Some(format!("tcp://{ip}:{DAEMON_PORT}")))
    }

    async fn ip(&mut self) -> Result<String> {
        self.look_for_ip_address().await
    }

    async fn state(&self) -> Result<InstanceState> {
        let Some(instance_id) = &self.state.instance_id else {
            return Ok(InstanceState::Unknown);
        };
        debug!(instance_id = %instance_id, "get status for OpenStack instance");

        self.init_compute().await?;
        let raw = self.cloud.instance_status(instance_id).await?;
        let state = InstanceState::from_status(&raw);
        debug!(instance_id = %instance_id, raw = %raw, %state, "state for OpenStack instance");
        Ok(state)
    }

    async fn create(&mut self) -> Result<()> {
        validate(&self.spec)?;
        self.advance(Phase::Validated);

        let name = self.set_machine_name_if_not_set();
        resolve_ids(self.cloud.as_ref(), &self.spec, &mut self.state).await?;
        self.advance(Phase::Resolved);

        self.create_ssh_key(&name).await?;
        self.advance(Phase::KeyPairReady);

        self.create_machine(&name).await?;
        self.advance(Phase::InstanceRequested);
        info!(machine = %name, instance_id = ?self.state.instance_id, "OpenStack instance requested");

        self.wait_for_instance_state(InstanceState::Running).await?;
        self.advance(Phase::InstanceActive);

        if self.spec.floating_ip_pool.is_some() {
            self.assign_floating_ip().await?;
            self.advance(Phase::FloatingIpAssigned);
        }

        self.look_for_ip_address().await?;
        self.advance(Phase::IpKnown);

        self.wait_for_ssh_server().await?;
        self.advance(Phase::SshReady);

        if self.spec.install_docker {
            if let Err(e) = self.install_docker().await {
                warn!(machine = %name, error = %e, "docker installation failed");
                warn!(machine = %name, "the machine is not ready to run docker containers");
            }
        }
        self.advance(Phase::Ready);

        info!(machine = %name, ip = ?self.state.ip, "OpenStack machine created");
        Ok(())
    }

    async fn start(&mut self) -> Result<()> {
        let instance_id = self.instance_id()?;
        info!(instance_id = %instance_id, "starting OpenStack instance");
        self.init_compute().await?;
        self.cloud.start_instance(&instance_id).await?;
        self.wait_for_instance_to_start().await
    }

    async fn stop(&mut self) -> Result<()> {
        let instance_id = self.instance_id()?;
        info!(instance_id = %instance_id, "stopping OpenStack instance");
        self.init_compute().await?;
        self.cloud.stop_instance(&instance_id).await?;

        info!(instance_id = %instance_id, "waiting for the OpenStack instance to stop");
        self.wait_for_instance_state(InstanceState::Stopped).await
    }

    async fn restart(&mut self) -> Result<()> {
        let instance_id = self.instance_id()?;
        info!(instance_id = %instance_id, "restarting OpenStack instance");
        self.init_compute().await?;
        self.cloud.restart_instance(&instance_id).await?;
        self.wait_for_instance_to_start().await
    }

    async fn kill(&mut self) -> Result<()> {
        self.stop().await
    }

    async fn remove(&mut self) -> Result<()> {
        let Some(instance_id) = self.state.instance_id.clone() else {
            self.remove_orphaned_key_pair().await;
            return Ok(());
        };
        info!(instance_id = %instance_id, "deleting OpenStack instance");
        self.init_compute().await?;
        self.cloud.delete_instance(&instance_id).await?;

        match self.state.key_pair_name.clone() {
            Some(name) => {
                info!(name = %name, "deleting key pair");
                self.cloud.delete_key_pair(&name).await?;
            }
            None => warn!(instance_id = %instance_id, "no key pair recorded, skipping deletion"),
        }
        Ok(())
    }

    async fn upgrade(&mut self) -> Result<()> {
        Err(Error::Unsupported(
            "Upgrade is currently not available for the OpenStack driver".into(),
        ))
    }

    async fn ssh_command(&mut self, args: &[String]) -> Result<tokio::process::Command> {
        let target = self.ssh_target().await?;
        let args = escalate(&target.user, args);
        debug!(instance_id = ?self.state.instance_id, command = ?args, "ssh command");
        Ok(self.ssh.command(&target, &args))
    }

    fn snapshot(&self) -> Result<serde_json::Value> {
        Ok(serde_json::to_value(Snapshot {
            spec: self.spec.clone(),
            state: self.state.clone(),
        })?)
    }

    fn restore(&mut self, value: serde_json::Value) -> Result<()> {
        let snapshot: Snapshot = serde_json::from_value(value)?;
        self.spec = snapshot.spec;
        self.state = snapshot.state;
        Ok(())
    }
}
