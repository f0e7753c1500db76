//! Typed Rust client for the OpenStack REST APIs.
//!
//! Covers the subset needed to run a single machine:
//! identity v2 tokens and the service catalog, compute (flavors, images,
//! servers, server actions, key pairs) and network (networks, ports,
//! floating IPs).

mod types;

pub use reqwest::StatusCode;
pub use types::*;

const AUTH_HEADER: &str = "X-Auth-Token";

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("openstack request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("openstack {endpoint} returned {status}: {body}")]
    Api {
        endpoint: &'static str,
        status: StatusCode,
        body: String,
    },

    #[error("no {service} endpoint in the service catalog")]
    MissingEndpoint { service: &'static str },
}

pub type Result<T> = std::result::Result<T, Error>;

async fn check(resp: reqwest::Response, endpoint: &'static str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            endpoint,
            status,
            body,
        });
    }
    Ok(resp)
}

/// Like `check` but also treats 404 as success (for delete idempotency).
async fn check_allow_404(
    resp: reqwest::Response,
    endpoint: &'static str,
) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() && status.as_u16() != 404 {
        let body = resp.text().await.unwrap_or_default();
        return Err(Error::Api {
            endpoint,
            status,
            body,
        });
    }
    Ok(resp)
}

// ── Identity ─────────────────────────────────────────────────────────

/// Client for the Keystone v2 identity API.
#[derive(Clone)]
pub struct IdentityClient {
    auth_url: String,
    http: reqwest::Client,
}

impl IdentityClient {
    pub fn new(auth_url: impl Into<String>) -> Self {
        Self {
            auth_url: auth_url.into().trim_end_matches('/').to_string(),
            http: reqwest::Client::new(),
        }
    }

    /// Exchange password credentials for a scoped token and service catalog.
    pub async fn authenticate(&self, credentials: &Credentials) -> Result<Session> {
        let body = TokenRequest {
            auth: TokenAuth {
                password_credentials: PasswordCredentials {
                    username: &credentials.username,
                    password: &credentials.password,
                },
                tenant_name: credentials.tenant_name.as_deref(),
                tenant_id: credentials.tenant_id.as_deref(),
            },
        };

        let resp = self
            .http
            .post(format!("{}/tokens", self.auth_url))
            .json(&body)
            .send()
            .await?;

        let access: TokenResponse = check(resp, "create token").await?.json().await?;

        Ok(Session {
            token: access.access.token,
            catalog: access.access.service_catalog,
            http: self.http.clone(),
        })
    }
}

/// An authenticated token plus the service catalog it was issued with.
#[derive(Clone)]
pub struct Session {
    token: Token,
    catalog: Vec<CatalogEntry>,
    http: reqwest::Client,
}

impl Session {
    /// Find the URL of a service in the catalog.
    ///
    /// When `region` is set only endpoints in that region match.
    pub fn endpoint(
        &self,
        service_type: &str,
        region: Option<&str>,
        interface: Interface,
    ) -> Option<String> {
        self.catalog
            .iter()
            .filter(|entry| entry.service_type == service_type)
            .flat_map(|entry| entry.endpoints.iter())
            .filter(|ep| match region {
                Some(r) => ep.region.as_deref() == Some(r),
                None => true,
            })
            .find_map(|ep| match interface {
                Interface::Public => ep.public_url.clone(),
                Interface::Admin => ep.admin_url.clone(),
                Interface::Internal => ep.internal_url.clone(),
            })
    }

    pub fn compute(&self, region: Option<&str>, interface: Interface) -> Result<ComputeClient> {
        let base = self
            .endpoint("compute", region, interface)
            .ok_or(Error::MissingEndpoint { service: "compute" })?;

        Ok(ComputeClient {
            base: base.trim_end_matches('/').to_string(),
            token: self.token.id.clone(),
            http: self.http.clone(),
        })
    }

    pub fn network(&self, region: Option<&str>, interface: Interface) -> Result<NetworkClient> {
        let base = self
            .endpoint("network", region, interface)
            .ok_or(Error::MissingEndpoint { service: "network" })?;

        let base = base.trim_end_matches('/');
        let base = if base.ends_with("/v2.0") {
            base.to_string()
        } else {
            format!("{base}/v2.0")
        };

        Ok(NetworkClient {
            base,
            token: self.token.id.clone(),
            http: self.http.clone(),
        })
    }
}

// ── Compute ──────────────────────────────────────────────────────────

/// Client for the Nova compute API, bound to one endpoint and token.
#[derive(Clone)]
pub struct ComputeClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl ComputeClient {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    pub async fn list_flavors(&self) -> Result<Vec<Flavor>> {
        let resp = self
            .http
            .get(self.url("/flavors"))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let list: FlavorList = check(resp, "list flavors").await?.json().await?;
        Ok(list.flavors)
    }

    pub async fn list_images(&self) -> Result<Vec<Image>> {
        let resp = self
            .http
            .get(self.url("/images"))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let list: ImageList = check(resp, "list images").await?.json().await?;
        Ok(list.images)
    }

    pub async fn create_server(&self, req: &CreateServerRequest) -> Result<Server> {
        let resp = self
            .http
            .post(self.url("/servers"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateServerEnvelope { server: req })
            .send()
            .await?;

        let envelope: ServerEnvelope = check(resp, "create server").await?.json().await?;
        Ok(envelope.server)
    }

    pub async fn get_server(&self, server_id: &str) -> Result<Server> {
        let resp = self
            .http
            .get(self.url(&format!("/servers/{server_id}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        let envelope: ServerEnvelope = check(resp, "get server").await?.json().await?;
        Ok(envelope.server)
    }

    pub async fn delete_server(&self, server_id: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/servers/{server_id}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        check_allow_404(resp, "delete server").await?;
        Ok(())
    }

    pub async fn server_action(&self, server_id: &str, action: ServerAction) -> Result<()> {
        let resp = self
            .http
            .post(self.url(&format!("/servers/{server_id}/action")))
            .header(AUTH_HEADER, &self.token)
            .json(&action.body())
            .send()
            .await?;

        check(resp, action.endpoint()).await?;
        Ok(())
    }

    pub async fn create_key_pair(&self, name: &str, public_key: &str) -> Result<()> {
        let resp = self
            .http
            .post(self.url("/os-keypairs"))
            .header(AUTH_HEADER, &self.token)
            .json(&CreateKeyPairEnvelope {
                keypair: CreateKeyPairRequest { name, public_key },
            })
            .send()
            .await?;

        check(resp, "create keypair").await?;
        Ok(())
    }

    pub async fn delete_key_pair(&self, name: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.url(&format!("/os-keypairs/{name}")))
            .header(AUTH_HEADER, &self.token)
            .send()
            .await?;

        check_allow_404(resp, "delete keypair").await?;
        Ok(())
    }
}

// ── Network ──────────────────────────────────────────────────────────

/// Client for the Neutron v2.0 network API, bound to one endpoint and token.
#[derive(Clone)]
pub struct NetworkClient {
    base: String,
    token: String,
    http: reqwest::Client,
}

impl NetworkClient {
    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base)
    }

    /// List networks, optionally only the external ones (floating IP pools).
    pub async fn list_networks(&self, external_only: bool) -> Result<Vec<Network>> {
        let mut query: Vec<(&str, &str)> = Vec::new();
        if external_only {
            query.push(("router:external", "true"));
        }

        let resp = self
            .http
            .get(self.url("/networks"))
            .header(AUTH_HEADER, &self.token)
            .query(&query)
            .send()
            .await?;

        let list: NetworkList = check(resp, "list networks").await?.json().await?;
        Ok(list.networks)
    }

    pub async fn list_ports(&self, device_id: &str) -> Result<Vec<Port>> {
        let resp = self
            .http
            .get(self.url("/ports"))
            .header(AUTH_HEADER, &self.token)
            .query(&[("device_id", device_id)])
            .send()
            .await?;

        let list: PortList = check(resp, "list ports").await?.json().await?;
        Ok(list.ports)
    }

    pub async fn list_floating_ips(&self, floating_network_id: &str) -> Result<Vec<FloatingIp>> {
        let resp = self
            .http
            .get(self.url("/floatingips"))
            .header(AUTH_HEADER, &self.token)
            .query(&[("floating_network_id", floating_network_id)])
            .send()
            .await?;

        let list: FloatingIpList = check(resp, "list floating ips").await?.json().await?;
        Ok(list.floatingips)
    }

    /// Allocate a new floating IP from a pool and bind it to a port.
    pub async fn create_floating_ip(
        &self,
        floating_network_id: &str,
        port_id: &str,
    ) -> Result<FloatingIp> {
        let resp = self
            .http
            .post(self.url("/floatingips"))
            .header(AUTH_HEADER, &self.token)
            .json(&FloatingIpWrite {
                floatingip: FloatingIpFields {
                    floating_network_id: Some(floating_network_id),
                    port_id,
                },
            })
            .send()
            .await?;

        let envelope: FloatingIpEnvelope =
            check(resp, "create floating ip").await?.json().await?;
        Ok(envelope.floatingip)
    }

    /// Bind an existing floating IP to a port.
    pub async fn associate_floating_ip(
        &self,
        floating_ip_id: &str,
        port_id: &str,
    ) -> Result<FloatingIp> {
        let resp = self
            .http
            .put(self.url(&format!("/floatingips/{floating_ip_id}")))
            .header(AUTH_HEADER, &self.token)
            .json(&FloatingIpWrite {
                floatingip: FloatingIpFields {
                    floating_network_id: None,
                    port_id,
                },
            })
            .send()
            .await?;

        let envelope: FloatingIpEnvelope =
            check(resp, "associate floating ip").await?.json().await?;
        Ok(envelope.floatingip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(catalog: serde_json::Value) -> Session {
        let access: TokenResponse = serde_json::from_value(serde_json::json!({
            "access": {
                "token": { "id": "tok-1", "expires": "2030-01-01T00:00:00Z" },
                "serviceCatalog": catalog,
            }
        }))
        .unwrap();

        Session {
            token: access.access.token,
            catalog: access.access.service_catalog,
            http: reqwest::Client::new(),
        }
    }

    fn catalog() -> serde_json::Value {
        serde_json::json!([
            {
                "type": "compute",
                "name": "nova",
                "endpoints": [
                    {
                        "region": "RegionOne",
                        "publicURL": "https://nova.one/v2/t1",
                        "adminURL": "https://nova-admin.one/v2/t1",
                        "internalURL": "http://nova.internal/v2/t1"
                    },
                    {
                        "region": "RegionTwo",
                        "publicURL": "https://nova.two/v2/t1"
                    }
                ]
            },
            {
                "type": "network",
                "name": "neutron",
                "endpoints": [
                    { "region": "RegionOne", "publicURL": "https://neutron.one:9696/" }
                ]
            }
        ])
    }

    #[test]
    fn endpoint_selects_interface() {
        let s = session(catalog());
        assert_eq!(
            s.endpoint("compute", None, Interface::Public).as_deref(),
            Some("https://nova.one/v2/t1")
        );
        assert_eq!(
            s.endpoint("compute", None, Interface::Admin).as_deref(),
            Some("https://nova-admin.one/v2/t1")
        );
        assert_eq!(
            s.endpoint("compute", None, Interface::Internal).as_deref(),
            Some("http://nova.internal/v2/t1")
        );
    }

    #[test]
    fn endpoint_filters_by_region() {
        let s = session(catalog());
        assert_eq!(
            s.endpoint("compute", Some("RegionTwo"), Interface::Public)
                .as_deref(),
            Some("https://nova.two/v2/t1")
        );
        assert!(s.endpoint("compute", Some("RegionThree"), Interface::Public).is_none());
        assert!(s.endpoint("volume", None, Interface::Public).is_none());
    }

    #[test]
    fn network_client_appends_api_version() {
        let s = session(catalog());
        let client = s.network(None, Interface::Public).unwrap();
        assert_eq!(client.base, "https://neutron.one:9696/v2.0");
        assert_eq!(client.url("/ports"), "https://neutron.one:9696/v2.0/ports");
    }

    #[test]
    fn missing_service_is_reported() {
        let s = session(serde_json::json!([]));
        let err = s.compute(None, Interface::Public).err().unwrap();
        assert!(matches!(err, Error::MissingEndpoint { service: "compute" }));
    }

    #[test]
    fn token_request_uses_tenant_name_only_when_set() {
        let body = TokenRequest {
            auth: TokenAuth {
                password_credentials: PasswordCredentials {
                    username: "demo",
                    password: "secret",
                },
                tenant_name: None,
                tenant_id: Some("t-42"),
            },
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["auth"]["tenantId"], "t-42");
        assert!(json["auth"].get("tenantName").is_none());
        assert_eq!(json["auth"]["passwordCredentials"]["username"], "demo");
    }

    #[test]
    fn server_addresses_carry_ip_type() {
        let server: ServerEnvelope = serde_json::from_value(serde_json::json!({
            "server": {
                "id": "srv-1",
                "status": "ACTIVE",
                "addresses": {
                    "private": [
                        { "addr": "10.0.0.5", "version": 4, "OS-EXT-IPS:type": "fixed" },
                        { "addr": "172.24.4.9", "version": 4, "OS-EXT-IPS:type": "floating" }
                    ]
                }
            }
        }))
        .unwrap();

        let addrs = &server.server.addresses["private"];
        assert_eq!(addrs[0].ip_type.as_deref(), Some("fixed"));
        assert_eq!(addrs[1].addr, "172.24.4.9");
    }

    #[test]
    fn create_server_omits_empty_lists() {
        let req = CreateServerRequest {
            name: "m1".into(),
            flavor_ref: "f1".into(),
            image_ref: "i1".into(),
            key_name: Some("m1".into()),
            networks: vec![],
            security_groups: vec![],
        };
        let json = serde_json::to_value(CreateServerEnvelope { server: &req }).unwrap();
        assert_eq!(json["server"]["flavorRef"], "f1");
        assert!(json["server"].get("networks").is_none());
        assert!(json["server"].get("security_groups").is_none());
    }

    #[test]
    fn action_bodies() {
        assert_eq!(
            ServerAction::SoftReboot.body(),
            serde_json::json!({ "reboot": { "type": "SOFT" } })
        );
        assert!(ServerAction::Stop.body().get("os-stop").is_some());
    }
}
