use tracing::debug;

use crate::cloud::Cloud;
use crate::types::{MachineSpec, NamedResource, ProvisioningState, ResourceKind};
use crate::{Error, Result};

/// Id of the first resource named exactly `name`.
pub fn find_id(kind: ResourceKind, name: &str, resources: &[NamedResource]) -> Result<String> {
    resources
        .iter()
        .find(|r| r.name == name)
        .map(|r| r.id.clone())
        .ok_or_else(|| Error::NotFound {
            kind,
            name: name.to_string(),
        })
}

async fn init_compute(cloud: &dyn Cloud, spec: &MachineSpec) -> Result<()> {
    cloud.authenticate(spec).await?;
    cloud.init_compute_client(spec).await
}

async fn init_network(cloud: &dyn Cloud, spec: &MachineSpec) -> Result<()> {
    cloud.authenticate(spec).await?;
    cloud.init_network_client(spec).await
}

/// Turn every selector given by name into an id on `state`.
///
/// Runs network, flavor, image, then floating IP pool. Selectors without a
/// name are left alone, so ids the user passed directly survive.
pub async fn resolve_ids(
    cloud: &dyn Cloud,
    spec: &MachineSpec,
    state: &mut ProvisioningState,
) -> Result<()> {
    if let Some(name) = &spec.network_name {
        init_network(cloud, spec).await?;
        let id = find_id(ResourceKind::Network, name, &cloud.list_networks().await?)?;
        debug!(name = %name, id = %id, "found network id using its name");
        state.network_id = Some(id);
    }

    if let Some(name) = &spec.flavor_name {
        init_compute(cloud, spec).await?;
        let id = find_id(ResourceKind::Flavor, name, &cloud.list_flavors().await?)?;
        debug!(name = %name, id = %id, "found flavor id using its name");
        state.flavor_id = Some(id);
    }

    if let Some(name) = &spec.image_name {
        init_compute(cloud, spec).await?;
        let id = find_id(ResourceKind::Image, name, &cloud.list_images().await?)?;
        debug!(name = %name, id = %id, "found image id using its name");
        state.image_id = Some(id);
    }

    if let Some(name) = &spec.floating_ip_pool {
        init_network(cloud, spec).await?;
        let id = find_id(
            ResourceKind::FloatingIpPool,
            name,
            &cloud.list_floating_ip_pools().await?,
        )?;
        debug!(name = %name, id = %id, "found floating IP pool id using its name");
        state.floating_ip_pool_id = Some(id);
    }

    Ok(())
}
