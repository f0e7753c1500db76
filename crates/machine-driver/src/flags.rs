use std::collections::HashMap;

use crate::types::{DEFAULT_SSH_PORT, DEFAULT_SSH_USER, MachineSpec};
use crate::{Error, Result};

/// Option the host sets to the machine's own name; not a user-facing flag.
pub const MACHINE_NAME_OPTION: &str = "machine-name";

/// Default value of a create flag.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlagValue {
    String(&'static str),
    Int(i64),
}

/// One create option a driver accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flag {
    pub name: &'static str,
    pub env_var: Option<&'static str>,
    pub usage: &'static str,
    pub default: FlagValue,
}

impl Flag {
    const fn string(name: &'static str, env_var: Option<&'static str>, usage: &'static str) -> Self {
        Self {
            name,
            env_var,
            usage,
            default: FlagValue::String(""),
        }
    }
}

/// Option values handed over by the host, keyed by flag name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DriverOptions {
    values: HashMap<String, String>,
}

impl DriverOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.values.insert(name.into(), value.into());
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.set(name, value);
        self
    }

    /// Raw value, empty when unset.
    pub fn string(&self, name: &str) -> &str {
        self.values.get(name).map(String::as_str).unwrap_or_default()
    }

    /// Value as an option, passed through verbatim. Blank strings count as unset.
    pub fn optional(&self, name: &str) -> Option<String> {
        let value = self.string(name);
        (!value.trim().is_empty()).then(|| value.to_string())
    }

    pub fn int<T: std::str::FromStr>(&self, name: &str, default: T) -> Result<T> {
        match self.optional(name) {
            None => Ok(default),
            Some(raw) => raw.trim().parse().map_err(|_| Error::InvalidFlag {
                flag: name.to_string(),
                value: raw,
            }),
        }
    }

    /// Accepts the spellings Go's `strconv.ParseBool` does.
    pub fn bool(&self, name: &str, default: bool) -> Result<bool> {
        match self.optional(name).as_deref().map(str::trim) {
            None => Ok(default),
            Some("1" | "t" | "T" | "true" | "TRUE" | "True") => Ok(true),
            Some("0" | "f" | "F" | "false" | "FALSE" | "False") => Ok(false),
            Some(other) => Err(Error::InvalidFlag {
                flag: name.to_string(),
                value: other.to_string(),
            }),
        }
    }

    /// Comma separated list, blanks dropped.
    pub fn list(&self, name: &str) -> Vec<String> {
        self.string(name)
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect()
    }
}

/// Create flags of the OpenStack driver.
pub fn openstack_create_flags() -> Vec<Flag> {
    vec![
        Flag::string("openstack-auth-url", Some("OS_AUTH_URL"), "OpenStack authentication URL"),
        Flag::string("openstack-username", Some("OS_USERNAME"), "OpenStack username"),
        Flag::string("openstack-password", Some("OS_PASSWORD"), "OpenStack password"),
        Flag::string("openstack-tenant-name", Some("OS_TENANT_NAME"), "OpenStack tenant name"),
        Flag::string("openstack-tenant-id", Some("OS_TENANT_ID"), "OpenStack tenant id"),
        Flag::string("openstack-region", Some("OS_REGION_NAME"), "OpenStack region name"),
        Flag::string(
            "openstack-endpoint-type",
            Some("OS_ENDPOINT_TYPE"),
            "OpenStack endpoint type (adminURL, internalURL or publicURL)",
        ),
        Flag::string("openstack-flavor-id", None, "OpenStack flavor id to use for the instance"),
        Flag::string(
            "openstack-flavor-name",
            None,
            "OpenStack flavor name to use for the instance",
        ),
        Flag::string("openstack-image-id", None, "OpenStack image id to use for the instance"),
        Flag::string("openstack-image-name", None, "OpenStack image name to use for the instance"),
        Flag::string("openstack-net-id", None, "OpenStack network id the machine will be connected on"),
        Flag::string(
            "openstack-net-name",
            None,
            "OpenStack network name the machine will be connected on",
        ),
        Flag::string(
            "openstack-sec-groups",
            None,
            "OpenStack comma separated security groups for the machine",
        ),
        Flag::string(
            "openstack-floatingip-pool",
            None,
            "OpenStack floating IP pool to get an IP from to assign to the instance",
        ),
        Flag {
            name: "openstack-ssh-user",
            env_var: None,
            usage: "OpenStack SSH user",
            default: FlagValue::String(DEFAULT_SSH_USER),
        },
        Flag {
            name: "openstack-ssh-port",
            env_var: None,
            usage: "OpenStack SSH port",
            default: FlagValue::Int(DEFAULT_SSH_PORT as i64),
        },
        // A string rather than a bool so the default can be true.
        Flag {
            name: "openstack-docker-install",
            env_var: None,
            usage: "Set if docker have to be installed on the machine",
            default: FlagValue::String("true"),
        },
    ]
}

/// Build a machine spec from the OpenStack create flags.
///
/// Does not validate; see [`crate::validate::validate`].
pub fn spec_from_flags(flags: &DriverOptions) -> Result<MachineSpec> {
    Ok(MachineSpec {
        auth_url: flags.optional("openstack-auth-url"),
        username: flags.optional("openstack-username"),
        password: flags.optional("openstack-password"),
        tenant_name: flags.optional("openstack-tenant-name"),
        tenant_id: flags.optional("openstack-tenant-id"),
        region: flags.optional("openstack-region"),
        endpoint_type: flags.optional("openstack-endpoint-type"),
        flavor_name: flags.optional("openstack-flavor-name"),
        flavor_id: flags.optional("openstack-flavor-id"),
        image_name: flags.optional("openstack-image-name"),
        image_id: flags.optional("openstack-image-id"),
        network_name: flags.optional("openstack-net-name"),
        network_id: flags.optional("openstack-net-id"),
        security_groups: flags.list("openstack-sec-groups"),
        floating_ip_pool: flags.optional("openstack-floatingip-pool"),
        machine_name: flags.optional(MACHINE_NAME_OPTION),
        ssh_user: flags
            .optional("openstack-ssh-user")
            .unwrap_or_else(|| DEFAULT_SSH_USER.into()),
        ssh_port: flags.int("openstack-ssh-port", DEFAULT_SSH_PORT)?,
        install_docker: flags.bool("openstack-docker-install", true)?,
    })
}
