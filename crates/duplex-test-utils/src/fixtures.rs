//! Reusable routing documents, blobs and app configurations.

use std::time::Duration;

use duplex_config::{encode_blob, HostDoc, RoutingDocument};
use duplex_slot::AppConfig;

/// Three services and two hosts exercising every rule kind.
pub fn sample_document() -> RoutingDocument {
    let mut doc = RoutingDocument::new()
        .with_service("api", &[("10.0.0.1:8080", 1), ("10.0.0.2:8080", 3)])
        .with_service("static", &[("cdn.internal:443", 1)])
        .with_service("canary", &[("10.0.9.1:8080", 1)])
        .with_host(
            HostDoc::new("example.com")
                .default_service("static")
                .path("/api", "api")
                .path("/api/v2", "canary")
                .tag("beta", "canary"),
        )
        .with_host(HostDoc::new("api.example.com").default_service("api"));
    if let Some(api) = doc.services.first_mut() {
        api.metadata.insert("owner".to_string(), "edge-team".to_string());
    }
    doc
}

/// `n` services named `svc-0 .. svc-{n-1}`, each with two upstreams, and
/// one host defaulting to `svc-0` when `n > 0`.
pub fn n_services(n: usize) -> RoutingDocument {
    let mut doc = RoutingDocument::new();
    for i in 0..n {
        let a = format!("10.1.{i}.1:80");
        let b = format!("10.1.{i}.2:80");
        doc = doc.with_service(&format!("svc-{i}"), &[(a.as_str(), 1), (b.as_str(), 2)]);
    }
    if n > 0 {
        doc = doc.with_host(HostDoc::new("fleet.local").default_service("svc-0"));
    }
    doc
}

/// `doc` framed as a ready blob at `version`.
pub fn blob(version: u64, doc: &RoutingDocument) -> Vec<u8> {
    // Encoding into a Vec only fails for strings longer than u32::MAX.
    let payload = doc.encode_payload().expect("fixture payload encodes");
    encode_blob(version, &payload).expect("fixture payload fits a blob")
}

/// A 64 KiB app with a 1 ms tick, for tests that drive ticks by hand.
pub fn small_config(name: &str) -> AppConfig {
    AppConfig::new(name, 64 * 1024).with_tick_interval(Duration::from_millis(1))
}
