//! Subcommand implementations. Each writes its report to `out`.

use std::error::Error;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

use duplex_arena::{Arena, Region};
use duplex_config::{
    blob, decode_routing_table, encode_blob, DecodeLimits, FileBlobSource, RoutingApp,
    RoutingDocument, RoutingView,
};
use duplex_slot::{Registry, TickOutcome};
use tracing::{debug, info, warn};

use crate::settings::WatchSettings;

pub type CliResult<T = ()> = Result<T, Box<dyn Error>>;

/// Read a TOML routing description.
pub fn read_document(path: &Path) -> CliResult<RoutingDocument> {
    let text = fs::read_to_string(path)?;
    Ok(toml::from_str(&text)?)
}

/// Validate `doc` by decoding it, then publish it to `output` at `version`.
pub fn pack(
    doc: &RoutingDocument,
    output: &Path,
    version: u64,
    limits: &DecodeLimits,
    arena_bytes: usize,
    out: &mut dyn Write,
) -> CliResult {
    let payload = doc.encode_payload()?;
    let mut arena = Arena::new(Region::zeroed(arena_bytes))?;
    let table = decode_routing_table(&mut arena, version, &payload, limits)?;
    let view = RoutingView::new(&arena, table);
    let bytes = encode_blob(version, &payload)?;

    if !FileBlobSource::publish(output, &bytes)? {
        return Err(format!("{} is locked by another writer", output.display()).into());
    }
    info!(path = %output.display(), version, bytes = bytes.len(), "blob published");
    writeln!(
        out,
        "wrote {} (version {version}, {} services, {} hosts, {} bytes, {}% of a {arena_bytes}-byte arena)",
        output.display(),
        view.service_count(),
        view.host_count(),
        bytes.len(),
        arena.used_percent(),
    )?;
    Ok(())
}

/// Decode the blob at `path` into a scratch arena and hand its view to `f`.
fn with_view<T>(
    path: &Path,
    limits: &DecodeLimits,
    arena_bytes: usize,
    f: impl FnOnce(RoutingView<'_>) -> CliResult<T>,
) -> CliResult<T> {
    let bytes = fs::read(path)?;
    let (header, payload) = blob::parse(&bytes)?;
    let mut arena = Arena::new(Region::zeroed(arena_bytes))?;
    let table = decode_routing_table(&mut arena, header.version, payload, limits)?;
    f(RoutingView::new(&arena, table))
}

/// Print every service and host in the blob at `path`.
pub fn inspect(
    path: &Path,
    limits: &DecodeLimits,
    arena_bytes: usize,
    out: &mut dyn Write,
) -> CliResult {
    with_view(path, limits, arena_bytes, |view| {
        writeln!(out, "version {}", view.version())?;
        writeln!(out, "services ({}):", view.service_count())?;
        for svc in view.services() {
            writeln!(out, "  {} (total weight {})", svc.name(), svc.total_weight())?;
            for (target, weight) in svc.upstreams() {
                writeln!(out, "    -> {target} x{weight}")?;
            }
            for (key, value) in svc.metadata_entries() {
                writeln!(out, "    {key} = {value}")?;
            }
        }
        writeln!(out, "hosts ({}):", view.host_count())?;
        for host in view.hosts() {
            let default = host.default_service().map(|s| s.name()).unwrap_or("-");
            writeln!(out, "  {} (default {default})", host.host())?;
            for (prefix, svc) in host.path_routes() {
                writeln!(out, "    path {prefix} -> {}", svc.name())?;
            }
            for (tag, svc) in host.tag_rules() {
                writeln!(out, "    tag {tag} -> {}", svc.name())?;
            }
        }
        Ok(())
    })
}

/// A single routing query.
pub struct RouteQuery<'q> {
    pub host: &'q str,
    pub path: &'q str,
    pub tags: &'q [String],
    pub point: u64,
}

/// Resolve one request against the blob at `path` and print the service and
/// the upstream `point` selects.
pub fn route(
    path: &Path,
    query: &RouteQuery<'_>,
    limits: &DecodeLimits,
    arena_bytes: usize,
    out: &mut dyn Write,
) -> CliResult {
    let tags: Vec<&str> = query.tags.iter().map(String::as_str).collect();
    with_view(path, limits, arena_bytes, |view| {
        let Some(svc) = view.route(query.host, query.path, &tags) else {
            return Err(format!("no route for {}{}", query.host, query.path).into());
        };
        let upstream = svc.pick(query.point).unwrap_or("-");
        writeln!(out, "{} -> {upstream}", svc.name())?;
        Ok(())
    })
}

/// Register the blob at `path` in a registry and poll it until `run_for`
/// elapses (forever when `None`), reporting every published version.
pub fn watch(
    path: &Path,
    settings: &WatchSettings,
    run_for: Option<Duration>,
    out: &mut dyn Write,
) -> CliResult {
    let config = settings.app_config();
    let app = RoutingApp::new(FileBlobSource::new(path), settings.limits());
    let mut registry = Registry::new();
    let handle = registry.register(config, app)?;

    let report = |out: &mut dyn Write| -> CliResult {
        if let Some(pinned) = handle.get_current() {
            let view = RoutingView::of(&pinned);
            writeln!(
                out,
                "generation {}: version {} ({} services, {} hosts)",
                pinned.generation(),
                view.version(),
                view.service_count(),
                view.host_count(),
            )?;
        }
        Ok(())
    };
    report(out)?;

    let stop_at = run_for.map(|d| Instant::now() + d);
    loop {
        let now = Instant::now();
        if stop_at.is_some_and(|t| now >= t) {
            break;
        }
        for (_, outcome) in registry.poll(now) {
            match outcome {
                TickOutcome::Published { .. } => report(out)?,
                TickOutcome::RebuildFailed(err) => warn!(%err, "rebuild failed"),
                TickOutcome::StaleCheckFailed { consecutive } => {
                    warn!(consecutive, "staleness check failed")
                }
                other => debug!(?other, "tick"),
            }
        }
        let next = registry.next_deadline().unwrap_or(now);
        let wake = stop_at.map_or(next, |t| next.min(t));
        thread::sleep(wake.saturating_duration_since(Instant::now()));
    }

    if let Some(metrics) = registry.metrics(handle.id()) {
        info!(?metrics, "watch finished");
    }
    Ok(())
}
