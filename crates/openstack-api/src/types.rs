use serde::{Deserialize, Serialize};
use std::collections::HashMap;

// ── Identity types ───────────────────────────────────────────────────

/// Password credentials scoped to a tenant, for Keystone v2 token requests.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
    pub tenant_name: Option<String>,
    pub tenant_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenRequest<'a> {
    pub auth: TokenAuth<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct TokenAuth<'a> {
    #[serde(rename = "passwordCredentials")]
    pub password_credentials: PasswordCredentials<'a>,
    #[serde(rename = "tenantName", skip_serializing_if = "Option::is_none")]
    pub tenant_name: Option<&'a str>,
    #[serde(rename = "tenantId", skip_serializing_if = "Option::is_none")]
    pub tenant_id: Option<&'a str>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct PasswordCredentials<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct TokenResponse {
    pub access: Access,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct Access {
    pub token: Token,
    #[serde(rename = "serviceCatalog", default)]
    pub service_catalog: Vec<CatalogEntry>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Token {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEntry {
    #[serde(rename = "type")]
    pub service_type: String,
    #[serde(default)]
    pub endpoints: Vec<CatalogEndpoint>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CatalogEndpoint {
    #[serde(default)]
    pub region: Option<String>,
    #[serde(rename = "publicURL", default)]
    pub public_url: Option<String>,
    #[serde(rename = "adminURL", default)]
    pub admin_url: Option<String>,
    #[serde(rename = "internalURL", default)]
    pub internal_url: Option<String>,
}

/// Which catalog URL of a service endpoint to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Interface {
    #[default]
    Public,
    Admin,
    Internal,
}

// ── Compute types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FlavorList {
    pub flavors: Vec<Flavor>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Flavor {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ImageList {
    pub images: Vec<Image>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Image {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateServerEnvelope<'a> {
    pub server: &'a CreateServerRequest,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreateServerRequest {
    pub name: String,
    #[serde(rename = "flavorRef")]
    pub flavor_ref: String,
    #[serde(rename = "imageRef")]
    pub image_ref: String,
    #[serde(rename = "key_name", skip_serializing_if = "Option::is_none")]
    pub key_name: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub networks: Vec<ServerNetwork>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub security_groups: Vec<SecurityGroupRef>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServerNetwork {
    pub uuid: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SecurityGroupRef {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct ServerEnvelope {
    pub server: Server,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Server {
    pub id: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub addresses: HashMap<String, Vec<ServerAddress>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerAddress {
    pub addr: String,
    #[serde(rename = "OS-EXT-IPS:type", default)]
    pub ip_type: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateKeyPairEnvelope<'a> {
    pub keypair: CreateKeyPairRequest<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct CreateKeyPairRequest<'a> {
    pub name: &'a str,
    pub public_key: &'a str,
}

/// Server power actions, serialized as the Nova action body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerAction {
    Start,
    Stop,
    SoftReboot,
}

impl ServerAction {
    pub(crate) fn body(self) -> serde_json::Value {
        match self {
            Self::Start => serde_json::json!({ "os-start": null }),
            Self::Stop => serde_json::json!({ "os-stop": null }),
            Self::SoftReboot => serde_json::json!({ "reboot": { "type": "SOFT" } }),
        }
    }

    pub(crate) fn endpoint(self) -> &'static str {
        match self {
            Self::Start => "start server",
            Self::Stop => "stop server",
            Self::SoftReboot => "reboot server",
        }
    }
}

// ── Network types ────────────────────────────────────────────────────

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct NetworkList {
    pub networks: Vec<Network>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Network {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "router:external", default)]
    pub external: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct PortList {
    pub ports: Vec<Port>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Port {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FloatingIpList {
    pub floatingips: Vec<FloatingIp>,
}

#[derive(Debug, Clone, Deserialize)]
pub(crate) struct FloatingIpEnvelope {
    pub floatingip: FloatingIp,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FloatingIp {
    pub id: String,
    pub floating_ip_address: String,
    #[serde(default)]
    pub port_id: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FloatingIpWrite<'a> {
    pub floatingip: FloatingIpFields<'a>,
}

#[derive(Debug, Clone, Serialize)]
pub(crate) struct FloatingIpFields<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub floating_network_id: Option<&'a str>,
    pub port_id: &'a str,
}
