//! Scripted collaborators for driver tests.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use openstack_api::StatusCode;
use tokio::process::Command;

use crate::cloud::Cloud;
use crate::ssh::{SshTarget, SshTransport, ssh_args};
use crate::types::{FloatingIp, InstanceRequest, IpAddress, MachineSpec, NamedResource};
use crate::wait::Sleeper;
use crate::{Error, Result};

/// Records sleeps instead of sleeping.
#[derive(Default)]
pub struct CountingSleeper {
    count: AtomicU32,
    total: Mutex<Duration>,
}

impl CountingSleeper {
    pub fn count(&self) -> u32 {
        self.count.load(Ordering::SeqCst)
    }

    pub fn total(&self) -> Duration {
        *self.total.lock().unwrap()
    }
}

#[async_trait]
impl Sleeper for CountingSleeper {
    async fn sleep(&self, duration: Duration) {
        self.count.fetch_add(1, Ordering::SeqCst);
        *self.total.lock().unwrap() += duration;
    }
}

fn api_error(endpoint: &'static str) -> Error {
    Error::Api(openstack_api::Error::Api {
        endpoint,
        status: StatusCode::INTERNAL_SERVER_ERROR,
        body: "scripted failure".into(),
    })
}

#[derive(Default)]
struct Script {
    flavors: Vec<NamedResource>,
    images: Vec<NamedResource>,
    networks: Vec<NamedResource>,
    pools: Vec<NamedResource>,
    statuses: VecDeque<String>,
    last_status: String,
    addresses: VecDeque<Vec<IpAddress>>,
    last_addresses: Vec<IpAddress>,
    floating_ips: Vec<FloatingIp>,
    allocated_address: String,
    port_id: String,
    instance_id: String,
    failing: Vec<&'static str>,
    calls: Vec<String>,
    created: Vec<InstanceRequest>,
    key_pairs: Vec<(String, String)>,
}

/// [`Cloud`] double answering from a script and logging every call.
///
/// Calls are logged by operation name; `fail_on` makes an operation return
/// an API error instead.
pub struct ScriptedCloud {
    script: Mutex<Script>,
}

impl Default for ScriptedCloud {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedCloud {
    pub fn new() -> Self {
        Self {
            script: Mutex::new(Script {
                last_status: "ACTIVE".into(),
                port_id: "port-1".into(),
                instance_id: "inst-1".into(),
                allocated_address: "198.51.100.99".into(),
                ..Script::default()
            }),
        }
    }

    pub fn with_flavors(self, flavors: Vec<NamedResource>) -> Self {
        self.script.lock().unwrap().flavors = flavors;
        self
    }

    pub fn with_images(self, images: Vec<NamedResource>) -> Self {
        self.script.lock().unwrap().images = images;
        self
    }

    pub fn with_networks(self, networks: Vec<NamedResource>) -> Self {
        self.script.lock().unwrap().networks = networks;
        self
    }

    pub fn with_pools(self, pools: Vec<NamedResource>) -> Self {
        self.script.lock().unwrap().pools = pools;
        self
    }

    /// Statuses returned in order; the last one repeats once exhausted.
    pub fn with_statuses(self, statuses: &[&str]) -> Self {
        {
            let mut s = self.script.lock().unwrap();
            s.statuses = statuses.iter().map(|s| s.to_string()).collect();
            if let Some(last) = statuses.last() {
                s.last_status = last.to_string();
            }
        }
        self
    }

    /// Address listings returned in order; the last one repeats once exhausted.
    pub fn with_addresses(self, listings: Vec<Vec<IpAddress>>) -> Self {
        {
            let mut s = self.script.lock().unwrap();
            if let Some(last) = listings.last() {
                s.last_addresses = last.clone();
            }
            s.addresses = listings.into();
        }
        self
    }

    pub fn with_floating_ips(self, ips: Vec<FloatingIp>) -> Self {
        self.script.lock().unwrap().floating_ips = ips;
        self
    }

    pub fn fail_on(self, op: &'static str) -> Self {
        self.script.lock().unwrap().failing.push(op);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.script.lock().unwrap().calls.clone()
    }

    pub fn count(&self, op: &str) -> usize {
        self.script
            .lock()
            .unwrap()
            .calls
            .iter()
            .filter(|c| c.as_str() == op || c.starts_with(&format!("{op}:")))
            .count()
    }

    pub fn created(&self) -> Vec<InstanceRequest> {
        self.script.lock().unwrap().created.clone()
    }

    pub fn key_pairs(&self) -> Vec<(String, String)> {
        self.script.lock().unwrap().key_pairs.clone()
    }

    fn record(&self, call: impl Into<String>, op: &'static str) -> Result<()> {
        let mut s = self.script.lock().unwrap();
        s.calls.push(call.into());
        if s.failing.contains(&op) {
            return Err(api_error(op));
        }
        Ok(())
    }
}

#[async_trait]
impl Cloud for ScriptedCloud {
    async fn authenticate(&self, _spec: &MachineSpec) -> Result<()> {
        self.record("authenticate", "authenticate")
    }

    async fn init_compute_client(&self, _spec: &MachineSpec) -> Result<()> {
        self.record("init_compute_client", "init_compute_client")
    }

    async fn init_network_client(&self, _spec: &MachineSpec) -> Result<()> {
        self.record("init_network_client", "init_network_client")
    }

    async fn list_flavors(&self) -> Result<Vec<NamedResource>> {
        self.record("list_flavors", "list_flavors")?;
        Ok(self.script.lock().unwrap().flavors.clone())
    }

    async fn list_images(&self) -> Result<Vec<NamedResource>> {
        self.record("list_images", "list_images")?;
        Ok(self.script.lock().unwrap().images.clone())
    }

    async fn list_networks(&self) -> Result<Vec<NamedResource>> {
        self.record("list_networks", "list_networks")?;
        Ok(self.script.lock().unwrap().networks.clone())
    }

    async fn list_floating_ip_pools(&self) -> Result<Vec<NamedResource>> {
        self.record("list_floating_ip_pools", "list_floating_ip_pools")?;
        Ok(self.script.lock().unwrap().pools.clone())
    }

    async fn create_instance(&self, req: &InstanceRequest) -> Result<String> {
        self.record("create_instance", "create_instance")?;
        let mut s = self.script.lock().unwrap();
        s.created.push(req.clone());
        Ok(s.instance_id.clone())
    }

    async fn instance_status(&self, instance_id: &str) -> Result<String> {
        self.record(format!("instance_status:{instance_id}"), "instance_status")?;
        let mut s = self.script.lock().unwrap();
        let status = s.statuses.pop_front();
        Ok(status.unwrap_or_else(|| s.last_status.clone()))
    }

    async fn instance_addresses(&self, instance_id: &str) -> Result<Vec<IpAddress>> {
        self.record(
            format!("instance_addresses:{instance_id}"),
            "instance_addresses",
        )?;
        let mut s = self.script.lock().unwrap();
        let listing = s.addresses.pop_front();
        Ok(listing.unwrap_or_else(|| s.last_addresses.clone()))
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.record(format!("start_instance:{instance_id}"), "start_instance")
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.record(format!("stop_instance:{instance_id}"), "stop_instance")
    }

    async fn restart_instance(&self, instance_id: &str) -> Result<()> {
        self.record(format!("restart_instance:{instance_id}"), "restart_instance")
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.record(format!("delete_instance:{instance_id}"), "delete_instance")
    }

    async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        self.record(format!("create_key_pair:{name}"), "create_key_pair")?;
        self.script
            .lock()
            .unwrap()
            .key_pairs
            .push((name.to_string(), public_key.to_string()));
        Ok(())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.record(format!("delete_key_pair:{name}"), "delete_key_pair")
    }

    async fn instance_port_id(&self, instance_id: &str) -> Result<String> {
        self.record(format!("instance_port_id:{instance_id}"), "instance_port_id")?;
        Ok(self.script.lock().unwrap().port_id.clone())
    }

    async fn floating_ips(&self, pool_id: &str) -> Result<Vec<FloatingIp>> {
        self.record(format!("floating_ips:{pool_id}"), "floating_ips")?;
        Ok(self.script.lock().unwrap().floating_ips.clone())
    }

    async fn assign_floating_ip(
        &self,
        pool_id: &str,
        ip: &mut FloatingIp,
        port_id: &str,
    ) -> Result<()> {
        let selected = if ip.address.is_empty() {
            "new".to_string()
        } else {
            ip.address.clone()
        };
        self.record(
            format!("assign_floating_ip:{pool_id}:{selected}:{port_id}"),
            "assign_floating_ip",
        )?;
        if ip.address.is_empty() {
            ip.address = self.script.lock().unwrap().allocated_address.clone();
        }
        ip.port_id = Some(port_id.to_string());
        Ok(())
    }
}

/// [`SshTransport`] double: writes a fake key, answers probes from a script,
/// and records remote commands.
#[derive(Default)]
pub struct RecordingSsh {
    probes: Mutex<VecDeque<bool>>,
    probed: Mutex<Vec<String>>,
    generated: Mutex<Vec<PathBuf>>,
    ran: Mutex<Vec<Vec<String>>>,
    fail_run: bool,
}

pub const FAKE_PUBLIC_KEY: &str = "ssh-rsa AAAAB3NzaC1yc2E test@machine";

impl RecordingSsh {
    /// Probe results returned in order; once exhausted every probe succeeds.
    pub fn with_probes(self, probes: &[bool]) -> Self {
        *self.probes.lock().unwrap() = probes.iter().copied().collect();
        self
    }

    pub fn failing_commands(mut self) -> Self {
        self.fail_run = true;
        self
    }

    pub fn probed(&self) -> Vec<String> {
        self.probed.lock().unwrap().clone()
    }

    pub fn generated(&self) -> Vec<PathBuf> {
        self.generated.lock().unwrap().clone()
    }

    pub fn ran(&self) -> Vec<Vec<String>> {
        self.ran.lock().unwrap().clone()
    }
}

#[async_trait]
impl SshTransport for RecordingSsh {
    async fn generate_key(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, "PRIVATE").await?;
        tokio::fs::write(path.with_extension("pub"), FAKE_PUBLIC_KEY).await?;
        self.generated.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    async fn probe_tcp(&self, addr: &str) -> Result<bool> {
        self.probed.lock().unwrap().push(addr.to_string());
        Ok(self.probes.lock().unwrap().pop_front().unwrap_or(true))
    }

    fn command(&self, target: &SshTarget, args: &[String]) -> Command {
        let mut cmd = Command::new("ssh");
        cmd.args(ssh_args(target, args));
        cmd
    }

    async fn run(&self, _target: &SshTarget, args: &[String]) -> Result<()> {
        self.ran.lock().unwrap().push(args.to_vec());
        if self.fail_run {
            return Err(Error::Ssh("exit status 1".into()));
        }
        Ok(())
    }
}
