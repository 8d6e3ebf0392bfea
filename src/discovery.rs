//! Control-plane endpoint discovery.
//!
//! Enumerates usable host addresses across one or more CIDR ranges and
//! probes each for an open control port with a bounded worker pool. No
//! state survives a discovery call: the pool fully joins before returning.

use std::collections::HashSet;
use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use ipnet::IpNet;
use tokio::net::TcpStream;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::debug;

use crate::error::DiscoveryError;

/// Talos API port probed by default.
pub const DEFAULT_PROBE_PORT: u16 = 50000;
pub const DEFAULT_MAX_HOSTS: usize = 256;
pub const DEFAULT_MAX_WORKERS: usize = 64;
pub const DEFAULT_PROBE_TIMEOUT: Duration = Duration::from_millis(200);

/// Enumerate usable host addresses across `cidrs`.
///
/// Deterministic: ascending within a range, ranges in input order.
/// Addresses seen in more than one range are emitted once; enumeration
/// stops the instant the combined count reaches `max_hosts` (a global cap,
/// not per-range).
pub fn enumerate_hosts(
    cidrs: &[String],
    max_hosts: usize,
) -> Result<Vec<IpAddr>, DiscoveryError> {
    let mut hosts = Vec::new();
    let mut seen: HashSet<IpAddr> = HashSet::new();

    for cidr in cidrs {
        let network = parse_network(cidr)?;
        for host in network.hosts() {
            if !seen.insert(host) {
                continue;
            }
            hosts.push(host);
            if hosts.len() >= max_hosts {
                return Ok(hosts);
            }
        }
    }

    Ok(hosts)
}

/// A bare address is accepted as a single-host network.
fn parse_network(cidr: &str) -> Result<IpNet, DiscoveryError> {
    if let Ok(network) = cidr.parse::<IpNet>() {
        return Ok(network);
    }
    if let Ok(addr) = cidr.parse::<IpAddr>() {
        let prefix = match addr {
            IpAddr::V4(_) => 32,
            IpAddr::V6(_) => 128,
        };
        return IpNet::new(addr, prefix).map_err(|e| DiscoveryError::InvalidCidr {
            cidr: cidr.to_string(),
            message: e.to_string(),
        });
    }
    Err(DiscoveryError::InvalidCidr {
        cidr: cidr.to_string(),
        message: "not a valid network".to_string(),
    })
}

/// Probe every enumerated host for an open TCP port.
///
/// Returns the responsive hosts in no particular order. A successful
/// connection counts as responsive even if immediately closed; refused,
/// timed out, and unreachable are all just "not responsive".
pub async fn discover_endpoints(
    cidrs: &[String],
    port: u16,
    timeout: Duration,
    max_hosts: usize,
    max_workers: usize,
) -> Result<Vec<IpAddr>, DiscoveryError> {
    if port == 0 {
        return Err(DiscoveryError::InvalidPort { port });
    }
    if max_hosts == 0 {
        return Err(DiscoveryError::InvalidHostCap);
    }
    if cidrs.is_empty() {
        return Ok(Vec::new());
    }

    let hosts = enumerate_hosts(cidrs, max_hosts)?;
    if hosts.is_empty() {
        return Ok(Vec::new());
    }

    let workers = max_workers.clamp(1, hosts.len());
    debug!(
        hosts = hosts.len(),
        workers, port, "probing for responsive endpoints"
    );

    let semaphore = Arc::new(Semaphore::new(workers));
    let mut tasks: JoinSet<Option<IpAddr>> = JoinSet::new();
    for host in hosts {
        let semaphore = Arc::clone(&semaphore);
        tasks.spawn(async move {
            let _permit = semaphore.acquire_owned().await.ok()?;
            match tokio::time::timeout(timeout, TcpStream::connect((host, port))).await {
                Ok(Ok(_stream)) => Some(host),
                _ => None,
            }
        });
    }

    let mut responsive = Vec::new();
    while let Some(joined) = tasks.join_next().await {
        if let Ok(Some(host)) = joined {
            responsive.push(host);
        }
    }

    Ok(responsive)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn cidrs(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_enumerate_slash_30_has_two_usable_hosts() {
        let hosts = enumerate_hosts(&cidrs(&["10.0.0.0/30"]), 256).unwrap();
        let rendered: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
        assert_eq!(rendered, vec!["10.0.0.1", "10.0.0.2"]);
    }

    #[test]
    fn test_enumerate_dedups_across_ranges() {
        let hosts = enumerate_hosts(&cidrs(&["10.0.0.0/30", "10.0.0.0/29"]), 256).unwrap();
        let rendered: Vec<String> = hosts.iter().map(|h| h.to_string()).collect();
        // first range contributes .1 and .2; the wider range adds the rest once
        assert_eq!(
            rendered,
            vec!["10.0.0.1", "10.0.0.2", "10.0.0.3", "10.0.0.4", "10.0.0.5", "10.0.0.6"]
        );
    }

    #[test]
    fn test_enumerate_stops_at_global_cap() {
        let hosts = enumerate_hosts(&cidrs(&["10.0.0.0/24", "10.1.0.0/24"]), 10).unwrap();
        assert_eq!(hosts.len(), 10);
        assert_eq!(hosts[0].to_string(), "10.0.0.1");
        assert_eq!(hosts[9].to_string(), "10.0.0.10");
    }

    #[test]
    fn test_enumerate_accepts_bare_address() {
        let hosts = enumerate_hosts(&cidrs(&["192.168.1.7"]), 256).unwrap();
        assert_eq!(hosts.len(), 1);
        assert_eq!(hosts[0].to_string(), "192.168.1.7");
    }

    #[test]
    fn test_enumerate_rejects_garbage() {
        let result = enumerate_hosts(&cidrs(&["not-a-network"]), 256);
        assert!(matches!(result, Err(DiscoveryError::InvalidCidr { .. })));
    }

    #[tokio::test]
    async fn test_discover_rejects_port_zero() {
        let result =
            discover_endpoints(&cidrs(&["10.0.0.0/30"]), 0, Duration::from_millis(50), 256, 64)
                .await;
        assert!(matches!(result, Err(DiscoveryError::InvalidPort { .. })));
    }

    #[tokio::test]
    async fn test_discover_rejects_zero_host_cap() {
        let result =
            discover_endpoints(&cidrs(&["10.0.0.0/30"]), 80, Duration::from_millis(50), 0, 64)
                .await;
        assert!(matches!(result, Err(DiscoveryError::InvalidHostCap)));
    }

    #[tokio::test]
    async fn test_discover_empty_ranges_yield_nothing() {
        let found = discover_endpoints(&[], 80, Duration::from_millis(50), 256, 64)
            .await
            .unwrap();
        assert!(found.is_empty());
    }

    #[tokio::test]
    async fn test_discover_finds_listening_host() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();

        let found = discover_endpoints(
            &cidrs(&["127.0.0.1/32"]),
            port,
            Duration::from_millis(500),
            256,
            64,
        )
        .await
        .unwrap();

        assert_eq!(found.len(), 1);
        assert_eq!(found[0].to_string(), "127.0.0.1");
    }

    #[tokio::test]
    async fn test_discover_treats_refused_as_unresponsive() {
        // Bind then drop to get a port that is very likely closed.
        let port = {
            let listener = TcpListener::bind("127.0.0.1:0").unwrap();
            listener.local_addr().unwrap().port()
        };

        let found = discover_endpoints(
            &cidrs(&["127.0.0.1/32"]),
            port,
            Duration::from_millis(200),
            256,
            64,
        )
        .await
        .unwrap();

        assert!(found.is_empty());
    }
}
