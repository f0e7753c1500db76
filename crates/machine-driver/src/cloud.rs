use async_trait::async_trait;
use openstack_api::{
    ComputeClient, CreateServerRequest, Credentials, IdentityClient, Interface, NetworkClient,
    SecurityGroupRef, ServerAction, ServerNetwork, Session,
};
use tokio::sync::OnceCell;
use tracing::{debug, info};

use crate::types::{
    AddressType, FloatingIp, InstanceRequest, IpAddress, MachineSpec, NamedResource,
};
use crate::validate::ConfigError;
use crate::{Error, Result};

/// Everything the driver needs from the cloud.
///
/// `authenticate` and the `init_*` calls are idempotent: calling them again
/// after success is a no-op. Compute calls require `init_compute_client`,
/// network calls `init_network_client`.
#[async_trait]
pub trait Cloud: Send + Sync + 'static {
    async fn authenticate(&self, spec: &MachineSpec) -> Result<()>;

    async fn init_compute_client(&self, spec: &MachineSpec) -> Result<()>;

    async fn init_network_client(&self, spec: &MachineSpec) -> Result<()>;

    async fn list_flavors(&self) -> Result<Vec<NamedResource>>;

    async fn list_images(&self) -> Result<Vec<NamedResource>>;

    async fn list_networks(&self) -> Result<Vec<NamedResource>>;

    /// External networks floating IPs can be allocated from.
    async fn list_floating_ip_pools(&self) -> Result<Vec<NamedResource>>;

    /// Boot an instance and return its id.
    async fn create_instance(&self, req: &InstanceRequest) -> Result<String>;

    /// Raw provider status string, e.g. `ACTIVE` or `SHUTOFF`.
    async fn instance_status(&self, instance_id: &str) -> Result<String>;

    async fn instance_addresses(&self, instance_id: &str) -> Result<Vec<IpAddress>>;

    async fn start_instance(&self, instance_id: &str) -> Result<()>;

    async fn stop_instance(&self, instance_id: &str) -> Result<()>;

    async fn restart_instance(&self, instance_id: &str) -> Result<()>;

    async fn delete_instance(&self, instance_id: &str) -> Result<()>;

    async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()>;

    async fn delete_key_pair(&self, name: &str) -> Result<()>;

    /// Network port the instance is attached through.
    async fn instance_port_id(&self, instance_id: &str) -> Result<String>;

    async fn floating_ips(&self, pool_id: &str) -> Result<Vec<FloatingIp>>;

    /// Bind `ip` to `port_id`, allocating it first when it has no id.
    ///
    /// On return `ip` carries the bound address.
    async fn assign_floating_ip(
        &self,
        pool_id: &str,
        ip: &mut FloatingIp,
        port_id: &str,
    ) -> Result<()>;
}

/// [`Cloud`] backed by the OpenStack REST APIs.
///
/// The token and the per-plane clients are created on first use and reused
/// for the lifetime of the value.
#[derive(Default)]
pub struct OpenStackCloud {
    session: OnceCell<Session>,
    compute: OnceCell<ComputeClient>,
    network: OnceCell<NetworkClient>,
}

impl OpenStackCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn session(&self) -> Result<&Session> {
        self.session.get().ok_or(Error::NotInitialized("identity"))
    }

    fn compute(&self) -> Result<&ComputeClient> {
        self.compute.get().ok_or(Error::NotInitialized("compute"))
    }

    fn network(&self) -> Result<&NetworkClient> {
        self.network.get().ok_or(Error::NotInitialized("network"))
    }

    fn credentials(spec: &MachineSpec) -> Credentials {
        Credentials {
            username: spec.username.clone().unwrap_or_default(),
            password: spec.password.clone().unwrap_or_default(),
            tenant_name: spec.tenant_name.clone(),
            tenant_id: spec.tenant_id.clone(),
        }
    }

    fn address_type(raw: Option<&str>) -> AddressType {
        match raw {
            Some("floating") => AddressType::Floating,
            _ => AddressType::Fixed,
        }
    }
}

#[async_trait]
impl Cloud for OpenStackCloud {
    async fn authenticate(&self, spec: &MachineSpec) -> Result<()> {
        let auth_url = spec.auth_url.as_deref().ok_or(ConfigError::MissingAuthUrl)?;

        self.session
            .get_or_try_init(|| async {
                debug!(auth_url, "authenticating against identity service");
                let session = IdentityClient::new(auth_url)
                    .authenticate(&Self::credentials(spec))
                    .await?;
                info!(auth_url, "openstack: authenticated");
                Ok::<_, Error>(session)
            })
            .await?;
        Ok(())
    }

    async fn init_compute_client(&self, spec: &MachineSpec) -> Result<()> {
        let session = self.session()?;
        let interface: Interface = spec.interface()?.into();

        self.compute
            .get_or_try_init(|| async {
                Ok::<_, Error>(session.compute(spec.region.as_deref(), interface)?)
            })
            .await?;
        Ok(())
    }

    async fn init_network_client(&self, spec: &MachineSpec) -> Result<()> {
        let session = self.session()?;
        let interface: Interface = spec.interface()?.into();

        self.network
            .get_or_try_init(|| async {
                Ok::<_, Error>(session.network(spec.region.as_deref(), interface)?)
            })
            .await?;
        Ok(())
    }

    async fn list_flavors(&self) -> Result<Vec<NamedResource>> {
        let flavors = self.compute()?.list_flavors().await?;
        Ok(flavors
            .into_iter()
            .map(|f| NamedResource::new(f.id, f.name))
            .collect())
    }

    async fn list_images(&self) -> Result<Vec<NamedResource>> {
        let images = self.compute()?.list_images().await?;
        Ok(images
            .into_iter()
            .map(|i| NamedResource::new(i.id, i.name))
            .collect())
    }

    async fn list_networks(&self) -> Result<Vec<NamedResource>> {
        let networks = self.network()?.list_networks(false).await?;
        Ok(networks
            .into_iter()
            .map(|n| NamedResource::new(n.id, n.name))
            .collect())
    }

    async fn list_floating_ip_pools(&self) -> Result<Vec<NamedResource>> {
        let networks = self.network()?.list_networks(true).await?;
        Ok(networks
            .into_iter()
            .filter(|n| n.external)
            .map(|n| NamedResource::new(n.id, n.name))
            .collect())
    }

    async fn create_instance(&self, req: &InstanceRequest) -> Result<String> {
        let server = self
            .compute()?
            .create_server(&CreateServerRequest {
                name: req.name.clone(),
                flavor_ref: req.flavor_id.clone(),
                image_ref: req.image_id.clone(),
                key_name: Some(req.key_pair_name.clone()),
                networks: req
                    .network_id
                    .iter()
                    .map(|id| ServerNetwork { uuid: id.clone() })
                    .collect(),
                security_groups: req
                    .security_groups
                    .iter()
                    .map(|name| SecurityGroupRef { name: name.clone() })
                    .collect(),
            })
            .await?;

        info!(instance_id = %server.id, name = %req.name, "openstack: instance requested");
        Ok(server.id)
    }

    async fn instance_status(&self, instance_id: &str) -> Result<String> {
        let server = self.compute()?.get_server(instance_id).await?;
        Ok(server.status.unwrap_or_default())
    }

    async fn instance_addresses(&self, instance_id: &str) -> Result<Vec<IpAddress>> {
        let server = self.compute()?.get_server(instance_id).await?;
        Ok(server
            .addresses
            .into_values()
            .flatten()
            .map(|a| IpAddress {
                address_type: Self::address_type(a.ip_type.as_deref()),
                address: a.addr,
            })
            .collect())
    }

    async fn start_instance(&self, instance_id: &str) -> Result<()> {
        self.compute()?
            .server_action(instance_id, ServerAction::Start)
            .await?;
        info!(instance_id, "openstack: start requested");
        Ok(())
    }

    async fn stop_instance(&self, instance_id: &str) -> Result<()> {
        self.compute()?
            .server_action(instance_id, ServerAction::Stop)
            .await?;
        info!(instance_id, "openstack: stop requested");
        Ok(())
    }

    async fn restart_instance(&self, instance_id: &str) -> Result<()> {
        self.compute()?
            .server_action(instance_id, ServerAction::SoftReboot)
            .await?;
        info!(instance_id, "openstack: reboot requested");
        Ok(())
    }

    async fn delete_instance(&self, instance_id: &str) -> Result<()> {
        self.compute()?.delete_server(instance_id).await?;
        info!(instance_id, "openstack: instance deleted");
        Ok(())
    }

    async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        self.compute()?.create_key_pair(name, public_key).await?;
        info!(name, "openstack: key pair registered");
        Ok(())
    }

    async fn delete_key_pair(&self, name: &str) -> Result<()> {
        self.compute()?.delete_key_pair(name).await?;
        info!(name, "openstack: key pair deleted");
        Ok(())
    }

    async fn instance_port_id(&self, instance_id: &str) -> Result<String> {
        let ports = self.network()?.list_ports(instance_id).await?;
        ports
            .into_iter()
            .next()
            .map(|p| p.id)
            .ok_or_else(|| Error::MissingPort(instance_id.to_string()))
    }

    async fn floating_ips(&self, pool_id: &str) -> Result<Vec<FloatingIp>> {
        let ips = self.network()?.list_floating_ips(pool_id).await?;
        Ok(ips
            .into_iter()
            .map(|ip| FloatingIp {
                id: Some(ip.id),
                address: ip.floating_ip_address,
                port_id: ip.port_id,
            })
            .collect())
    }

    async fn assign_floating_ip(
        &self,
        pool_id: &str,
        ip: &mut FloatingIp,
        port_id: &str,
    ) -> Result<()> {
        let network = self.network()?;
        let bound = match ip.id.as_deref() {
            Some(id) => network.associate_floating_ip(id, port_id).await?,
            None => network.create_floating_ip(pool_id, port_id).await?,
        };

        info!(address = %bound.floating_ip_address, port_id, "openstack: floating ip bound");
        ip.id = Some(bound.id);
        ip.address = bound.floating_ip_address;
        ip.port_id = Some(port_id.to_string());
        Ok(())
    }
}
