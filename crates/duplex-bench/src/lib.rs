//! Benchmark profiles for the duplex slot framework.
//!
//! - [`reference_profile`]: 64 services across 16 hosts, the shape of a
//!   mid-sized edge deployment
//! - [`stress_profile`]: 1024 services across 256 hosts
//! - [`profile_blob`]: any profile framed as a ready blob

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use duplex_config::{encode_blob, DecodeLimits, HostDoc, RoutingDocument};

/// Build a routing document with `services` services spread over `hosts`
/// hosts. Every host gets four path rules, two tag rules and a default.
pub fn routing_profile(services: usize, hosts: usize) -> RoutingDocument {
    let mut doc = RoutingDocument::new();
    for s in 0..services {
        let targets: Vec<String> = (0..4)
            .map(|u| format!("10.{}.{}.{u}:8080", s / 256, s % 256))
            .collect();
        let upstreams: Vec<(&str, u32)> = targets
            .iter()
            .enumerate()
            .map(|(u, t)| (t.as_str(), 1 + u as u32))
            .collect();
        doc = doc.with_service(&format!("svc-{s}"), &upstreams);
    }
    if services == 0 {
        return doc;
    }
    for h in 0..hosts {
        let svc = |k: usize| format!("svc-{}", (h * 7 + k) % services);
        let mut host = HostDoc::new(&format!("host-{h}.example.com")).default_service(&svc(0));
        for k in 0..4 {
            host = host.path(&format!("/v{k}/api/{h}"), &svc(k + 1));
        }
        host = host.tag("beta", &svc(5)).tag("internal", &svc(6));
        doc = doc.with_host(host);
    }
    doc
}

/// 64 services, 16 hosts.
pub fn reference_profile() -> RoutingDocument {
    routing_profile(64, 16)
}

/// 1024 services, 256 hosts.
pub fn stress_profile() -> RoutingDocument {
    routing_profile(1024, 256)
}

/// Limits large enough for [`stress_profile`].
pub fn stress_limits() -> DecodeLimits {
    DecodeLimits::new(1024, 256)
}

/// `doc` framed as a ready blob at `version`.
pub fn profile_blob(version: u64, doc: &RoutingDocument) -> Vec<u8> {
    // Profiles only hold short strings, which always encode.
    let payload = doc.encode_payload().unwrap_or_default();
    encode_blob(version, &payload).unwrap_or_default()
}
