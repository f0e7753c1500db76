use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::validate::ConfigError;

pub const DEFAULT_SSH_USER: &str = "root";
pub const DEFAULT_SSH_PORT: u16 = 22;

/// User-declared description of the machine to create.
///
/// Never mutated by provisioning; everything discovered along the way lands
/// in [`ProvisioningState`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineSpec {
    pub auth_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub tenant_name: Option<String>,
    pub tenant_id: Option<String>,
    pub region: Option<String>,
    pub endpoint_type: Option<String>,

    pub flavor_name: Option<String>,
    pub flavor_id: Option<String>,
    pub image_name: Option<String>,
    pub image_id: Option<String>,
    pub network_name: Option<String>,
    pub network_id: Option<String>,
    pub security_groups: Vec<String>,
    pub floating_ip_pool: Option<String>,

    pub machine_name: Option<String>,
    pub ssh_user: String,
    pub ssh_port: u16,
    pub install_docker: bool,
}

impl Default for MachineSpec {
    fn default() -> Self {
        Self {
            auth_url: None,
            username: None,
            password: None,
            tenant_name: None,
            tenant_id: None,
            region: None,
            endpoint_type: None,
            flavor_name: None,
            flavor_id: None,
            image_name: None,
            image_id: None,
            network_name: None,
            network_id: None,
            security_groups: Vec::new(),
            floating_ip_pool: None,
            machine_name: None,
            ssh_user: DEFAULT_SSH_USER.into(),
            ssh_port: DEFAULT_SSH_PORT,
            install_docker: true,
        }
    }
}

impl MachineSpec {
    /// Address type the instance is reached on: floating when a pool is configured.
    pub fn wanted_address_type(&self) -> AddressType {
        if self.floating_ip_pool.is_some() {
            AddressType::Floating
        } else {
            AddressType::Fixed
        }
    }

    /// Parsed endpoint type. Unset means the public interface.
    pub fn interface(&self) -> Result<EndpointType, ConfigError> {
        match self.endpoint_type.as_deref() {
            None => Ok(EndpointType::Public),
            Some(raw) => raw.parse(),
        }
    }
}

/// Scratch state filled in while provisioning and persisted between operations.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisioningState {
    pub flavor_id: Option<String>,
    pub image_id: Option<String>,
    pub network_id: Option<String>,
    pub floating_ip_pool_id: Option<String>,

    pub machine_name: Option<String>,
    pub key_pair_name: Option<String>,
    pub instance_id: Option<String>,
    pub ip: Option<String>,
}

impl ProvisioningState {
    /// Seed the resolved ids with the ones the user gave directly.
    pub fn from_spec(spec: &MachineSpec) -> Self {
        Self {
            flavor_id: spec.flavor_id.clone(),
            image_id: spec.image_id.clone(),
            network_id: spec.network_id.clone(),
            machine_name: spec.machine_name.clone(),
            ..Self::default()
        }
    }
}

/// Keystone catalog interface selected by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EndpointType {
    #[default]
    Public,
    Admin,
    Internal,
}

impl EndpointType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Public => "publicURL",
            Self::Admin => "adminURL",
            Self::Internal => "internalURL",
        }
    }
}

impl FromStr for EndpointType {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, ConfigError> {
        match s {
            "publicURL" | "public" => Ok(Self::Public),
            "adminURL" | "admin" => Ok(Self::Admin),
            "internalURL" | "internal" => Ok(Self::Internal),
            _ => Err(ConfigError::WrongEndpointType),
        }
    }
}

impl From<EndpointType> for openstack_api::Interface {
    fn from(value: EndpointType) -> Self {
        match value {
            EndpointType::Public => Self::Public,
            EndpointType::Admin => Self::Admin,
            EndpointType::Internal => Self::Internal,
        }
    }
}

/// Normalized instance state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InstanceState {
    Starting,
    Running,
    Paused,
    Saved,
    Stopped,
    Error,
    Unknown,
}

impl InstanceState {
    /// Map a raw compute status onto the normalized set.
    ///
    /// Unrecognized statuses (including an empty one) are `Unknown`.
    pub fn from_status(status: &str) -> Self {
        match status {
            "BUILD" | "BUILDING" => Self::Starting,
            "ACTIVE" => Self::Running,
            "PAUSED" => Self::Paused,
            "SUSPENDED" => Self::Saved,
            "SHUTOFF" => Self::Stopped,
            "ERROR" => Self::Error,
            _ => Self::Unknown,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Saved => "saved",
            Self::Stopped => "stopped",
            Self::Error => "error",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for InstanceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    Fixed,
    Floating,
}

impl AddressType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fixed => "fixed",
            Self::Floating => "floating",
        }
    }
}

/// One address attached to an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IpAddress {
    pub address: String,
    pub address_type: AddressType,
}

/// A floating IP as seen in a pool listing.
///
/// An empty `address` means "allocate a new one" when handed to
/// [`Cloud::assign_floating_ip`](crate::cloud::Cloud::assign_floating_ip).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FloatingIp {
    pub id: Option<String>,
    pub address: String,
    pub port_id: Option<String>,
}

impl FloatingIp {
    pub fn is_available(&self) -> bool {
        self.port_id.as_deref().is_none_or(str::is_empty)
    }
}

/// `{name, id}` pair returned by the listing calls.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamedResource {
    pub id: String,
    pub name: String,
}

impl NamedResource {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Resource kinds that can be looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceKind {
    Network,
    Flavor,
    Image,
    FloatingIpPool,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Flavor => "flavor",
            Self::Image => "image",
            Self::FloatingIpPool => "floating IP pool",
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything the compute API needs to boot the instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceRequest {
    pub name: String,
    pub flavor_id: String,
    pub image_id: String,
    pub key_pair_name: String,
    pub network_id: Option<String>,
    pub security_groups: Vec<String>,
}
