use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::time::Duration;

/// Network policy applied to every outbound request.
#[derive(Debug, Clone)]
pub struct HttpPolicy {
  /// Allow requests to loopback, private and other non-public addresses.
  pub allow_unrestricted: bool,
  /// Timeout used when a request does not specify its own.
  pub default_timeout: Duration,
}

impl Default for HttpPolicy {
  fn default() -> Self {
    Self {
      allow_unrestricted: false,
      default_timeout: Duration::from_secs(15),
    }
  }
}

/// Whether an address is reachable on the public internet.
pub fn is_public_ip(ip: IpAddr) -> bool {
  match ip {
    IpAddr::V4(v4) => is_public_v4(v4),
    IpAddr::V6(v6) => match v6.to_ipv4_mapped() {
      Some(v4) => is_public_v4(v4),
      None => is_public_v6(v6),
    },
  }
}

fn is_public_v4(ip: Ipv4Addr) -> bool {
  let octets = ip.octets();
  // 100.64.0.0/10, carrier-grade NAT
  let cgnat = octets[0] == 100 && (octets[1] & 0xc0) == 64;
  // 0.0.0.0/8, "this network"
  let this_network = octets[0] == 0;

  !(ip.is_loopback()
    || ip.is_private()
    || ip.is_link_local()
    || ip.is_unspecified()
    || ip.is_broadcast()
    || ip.is_multicast()
    || cgnat
    || this_network)
}

fn is_public_v6(ip: Ipv6Addr) -> bool {
  let first = ip.segments()[0];
  // fc00::/7
  let unique_local = (first & 0xfe00) == 0xfc00;
  // fe80::/10
  let link_local = (first & 0xffc0) == 0xfe80;

  !(ip.is_loopback() || ip.is_unspecified() || ip.is_multicast() || unique_local || link_local)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn public(addr: &str) -> bool {
    is_public_ip(addr.parse().unwrap())
  }

  #[test]
  fn test_non_public_v4() {
    for addr in [
      "127.0.0.1",
      "10.1.2.3",
      "172.16.0.1",
      "192.168.1.1",
      "169.254.169.254",
      "0.0.0.0",
      "255.255.255.255",
      "224.0.0.1",
      "100.64.0.1",
      "100.127.255.254",
    ] {
      assert!(!public(addr), "{} should not be public", addr);
    }
  }

  #[test]
  fn test_public_v4() {
    for addr in ["8.8.8.8", "1.1.1.1", "100.128.0.1", "172.32.0.1"] {
      assert!(public(addr), "{} should be public", addr);
    }
  }

  #[test]
  fn test_v6() {
    assert!(!public("::1"));
    assert!(!public("::"));
    assert!(!public("fd00::1"));
    assert!(!public("fe80::1"));
    assert!(!public("ff02::1"));
    assert!(!public("::ffff:127.0.0.1"));
    assert!(public("2606:4700:4700::1111"));
  }
}
