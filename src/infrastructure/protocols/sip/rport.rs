/// RPORT support for NAT traversal (RFC 3581)
///
/// A server receiving a request stamps the topmost Via with the address the
/// datagram actually came from. The event model later reads `received` and
/// `rport` back to find the public address of a client behind NAT.

use crate::domain::event::ViaHeader;
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

fn set_param(via: &mut ViaHeader, name: &str, value: String) {
    match via
        .params
        .iter_mut()
        .find(|(key, _)| key.eq_ignore_ascii_case(name))
    {
        Some((_, slot)) => *slot = Some(value),
        None => via.params.push((name.to_string(), Some(value))),
    }
}

/// Check if a Via asked for its source port (`rport` with or without value)
pub fn has_rport_parameter(via: &ViaHeader) -> bool {
    via.param("rport").is_some()
}

/// Stamp the topmost Via of a received request
///
/// `received` is added when the sent-by host differs from the source IP;
/// `rport` is filled in only when the client asked for it. Returns true if
/// the hop was modified.
pub fn stamp_received(vias: &mut [ViaHeader], source: SocketAddr) -> bool {
    let Some(via) = vias.first_mut() else {
        return false;
    };

    let sent_by = via
        .host
        .as_deref()
        .and_then(|h| h.parse::<IpAddr>().ok());
    let mut stamped = false;

    if sent_by != Some(source.ip()) {
        set_param(via, "received", source.ip().to_string());
        stamped = true;
    }

    if has_rport_parameter(via) {
        set_param(via, "rport", source.port().to_string());
        // RFC 3581 requires received whenever rport is filled in
        if !stamped {
            set_param(via, "received", source.ip().to_string());
        }
        stamped = true;
    }

    if stamped {
        debug!("Stamped Via with received={} rport={}", source.ip(), source.port());
    }
    stamped
}

#[cfg(test)]
mod tests {
    use super::*;

    fn via(host: &str) -> ViaHeader {
        ViaHeader::new(host, Some(5060)).with_param("branch", Some("z9hG4bK776asdhds"))
    }

    #[test]
    fn test_stamp_rport_behind_nat() {
        let mut vias = vec![via("192.168.1.100").with_param("rport", None), via("10.0.0.1")];
        let source: SocketAddr = "203.0.113.1:51234".parse().unwrap();

        assert!(stamp_received(&mut vias, source));
        assert_eq!(vias[0].param("rport"), Some(Some("51234")));
        assert_eq!(vias[0].param("received"), Some(Some("203.0.113.1")));
        // only the topmost hop is stamped
        assert_eq!(vias[1].param("received"), None);
    }

    #[test]
    fn test_stamp_without_rport_request() {
        let mut vias = vec![via("192.168.1.100")];
        let source: SocketAddr = "203.0.113.1:5060".parse().unwrap();

        assert!(stamp_received(&mut vias, source));
        assert_eq!(vias[0].param("received"), Some(Some("203.0.113.1")));
        assert!(!has_rport_parameter(&vias[0]));
    }

    #[test]
    fn test_direct_client_is_left_alone() {
        let mut vias = vec![via("203.0.113.1")];
        let source: SocketAddr = "203.0.113.1:5060".parse().unwrap();

        assert!(!stamp_received(&mut vias, source));
        assert!(vias[0].params.iter().all(|(k, _)| k == "branch"));
        assert!(!stamp_received(&mut [], source));
    }

    #[test]
    fn test_rport_from_same_host_still_sets_received() {
        let mut vias = vec![via("203.0.113.1").with_param("rport", None)];
        let source: SocketAddr = "203.0.113.1:40000".parse().unwrap();

        assert!(stamp_received(&mut vias, source));
        assert_eq!(vias[0].param("rport"), Some(Some("40000")));
        assert_eq!(vias[0].param("received"), Some(Some("203.0.113.1")));
    }
}
