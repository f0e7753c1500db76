use crate::types::{EndpointType, MachineSpec};

/// A machine spec that cannot be provisioned as written.
///
/// Messages name the field along with the environment variable and CLI option
/// that set it.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error(
        "Authentication URL must be specified either using the environment variable OS_AUTH_URL or the CLI option --openstack-auth-url"
    )]
    MissingAuthUrl,

    #[error(
        "Username must be specified either using the environment variable OS_USERNAME or the CLI option --openstack-username"
    )]
    MissingUsername,

    #[error(
        "Password must be specified either using the environment variable OS_PASSWORD or the CLI option --openstack-password"
    )]
    MissingPassword,

    #[error(
        "Tenant id or name must be provided either using one of the environment variables OS_TENANT_ID and OS_TENANT_NAME or one of the CLI options --openstack-tenant-id and --openstack-tenant-name"
    )]
    MissingTenant,

    #[error(
        "Flavor name or Flavor id must be specified using the CLI option --openstack-flavor-name or --openstack-flavor-id"
    )]
    MissingFlavor,

    #[error("Either Flavor name or Flavor id must be specified, not both")]
    ExclusiveFlavor,

    #[error(
        "Image name or Image id must be specified using the CLI option --openstack-image-name or --openstack-image-id"
    )]
    MissingImage,

    #[error("Either Image name or Image id must be specified, not both")]
    ExclusiveImage,

    #[error("Either Network name or Network id must be specified, not both")]
    ExclusiveNetwork,

    #[error("Endpoint type must be 'publicURL', 'adminURL' or 'internalURL'")]
    WrongEndpointType,
}

/// Check a spec before anything is sent to the cloud.
///
/// Stops at the first problem so exactly one field is reported.
pub fn validate(spec: &MachineSpec) -> Result<(), ConfigError> {
    if spec.auth_url.is_none() {
        return Err(ConfigError::MissingAuthUrl);
    }
    if spec.username.is_none() {
        return Err(ConfigError::MissingUsername);
    }
    if spec.password.is_none() {
        return Err(ConfigError::MissingPassword);
    }
    if spec.tenant_name.is_none() && spec.tenant_id.is_none() {
        return Err(ConfigError::MissingTenant);
    }

    match (&spec.flavor_name, &spec.flavor_id) {
        (None, None) => return Err(ConfigError::MissingFlavor),
        (Some(_), Some(_)) => return Err(ConfigError::ExclusiveFlavor),
        _ => {}
    }

    match (&spec.image_name, &spec.image_id) {
        (None, None) => return Err(ConfigError::MissingImage),
        (Some(_), Some(_)) => return Err(ConfigError::ExclusiveImage),
        _ => {}
    }

    if spec.network_name.is_some() && spec.network_id.is_some() {
        return Err(ConfigError::ExclusiveNetwork);
    }

    if let Some(raw) = &spec.endpoint_type {
        raw.parse::<EndpointType>()?;
    }

    Ok(())
}
