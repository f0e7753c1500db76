use tracing::debug;

use crate::Result;
use crate::cloud::Cloud;
use crate::types::FloatingIp;

/// Bind a floating IP from `pool_id` to `port_id` and return it.
///
/// Reuses the first unbound address in the pool listing, otherwise asks the
/// cloud to allocate a new one. Selection is not locked: two callers sharing
/// a tenant may pick the same unbound address, and the second bind wins.
pub async fn assign_floating_ip(
    cloud: &dyn Cloud,
    pool_id: &str,
    port_id: &str,
) -> Result<FloatingIp> {
    let ips = cloud.floating_ips(pool_id).await?;
    debug!(pool_id, candidates = ips.len(), "looking for an available floating IP");

    let mut ip = match ips.into_iter().find(FloatingIp::is_available) {
        Some(ip) => {
            debug!(address = %ip.address, "available floating IP found");
            ip
        }
        None => {
            debug!(pool_id, "no available floating IP, allocating a new one");
            FloatingIp::default()
        }
    };

    cloud.assign_floating_ip(pool_id, &mut ip, port_id).await?;
    debug!(address = %ip.address, port_id, "floating IP assigned");
    Ok(ip)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedCloud;

    fn ip(address: &str, port: Option<&str>) -> FloatingIp {
        FloatingIp {
            id: Some(format!("fip-{address}")),
            address: address.into(),
            port_id: port.map(String::from),
        }
    }

    #[tokio::test]
    async fn reuses_first_unbound_address() {
        let cloud = ScriptedCloud::new().with_floating_ips(vec![
            ip("1.2.3.4", None),
            ip("5.6.7.8", Some("p1")),
        ]);

        let assigned = assign_floating_ip(&cloud, "ext-1", "port-9").await.unwrap();

        assert_eq!(assigned.address, "1.2.3.4");
        assert_eq!(assigned.id.as_deref(), Some("fip-1.2.3.4"));
        assert_eq!(cloud.count("assign_floating_ip"), 1);
        assert!(
            cloud
                .calls()
                .contains(&"assign_floating_ip:ext-1:1.2.3.4:port-9".to_string())
        );
    }

    #[tokio::test]
    async fn skips_bound_addresses() {
        let cloud = ScriptedCloud::new().with_floating_ips(vec![
            ip("5.6.7.8", Some("p1")),
            ip("9.9.9.9", Some("")),
        ]);

        let assigned = assign_floating_ip(&cloud, "ext-1", "port-9").await.unwrap();
        assert_eq!(assigned.address, "9.9.9.9");
    }

    #[tokio::test]
    async fn allocates_when_everything_is_bound() {
        let cloud = ScriptedCloud::new().with_floating_ips(vec![
            ip("5.6.7.8", Some("p1")),
            ip("5.6.7.9", Some("p2")),
        ]);

        let assigned = assign_floating_ip(&cloud, "ext-1", "port-9").await.unwrap();

        assert_eq!(assigned.address, "198.51.100.99");
        assert_eq!(cloud.count("assign_floating_ip"), 1);
        assert!(
            cloud
                .calls()
                .contains(&"assign_floating_ip:ext-1:new:port-9".to_string())
        );
    }

    #[tokio::test]
    async fn assign_errors_propagate() {
        let cloud = ScriptedCloud::new()
            .with_floating_ips(vec![ip("1.2.3.4", None)])
            .fail_on("assign_floating_ip");

        assert!(assign_floating_ip(&cloud, "ext-1", "port-9").await.is_err());
    }
}
