//! Decode a validated payload into a [`RoutingTable`] inside an arena.
//!
//! The decoder is the only place that enforces the routing schema: names
//! are unique and non-empty, every service has at least one upstream with
//! a non-zero weight, and every host rule names a service that exists.
//! Any violation aborts the whole decode; the caller resets the arena.

use duplex_arena::{Arena, Array, HashTable};

use crate::codec::ByteReader;
use crate::error::{BlobError, LoadError};
use crate::routing::{
    HostByName, HostRoute, KeyValue, PathRoute, RoutingTable, Service, ServiceByName, ServiceRef,
    TagRule, Upstream,
};

// Smallest encodings, used to reject absurd counts before allocating.
const MIN_SERVICE_BYTES: usize = 12;
const MIN_UPSTREAM_BYTES: usize = 8;
const MIN_PAIR_BYTES: usize = 8;
const MIN_HOST_BYTES: usize = 16;

const MAX_INDEX_BUCKETS: u32 = 1 << 16;

/// Fixed container capacities for one decoded table.
///
/// The service and host arrays are allocated at these capacities before
/// decoding starts; a blob with more entries fails with
/// [`ArenaError::ContainerFull`](duplex_arena::ArenaError::ContainerFull).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DecodeLimits {
    /// Maximum number of services.
    pub max_services: u32,
    /// Maximum number of hosts.
    pub max_hosts: u32,
}

impl Default for DecodeLimits {
    fn default() -> Self {
        Self {
            max_services: 256,
            max_hosts: 256,
        }
    }
}

impl DecodeLimits {
    /// Limits with the given capacities.
    pub fn new(max_services: u32, max_hosts: u32) -> Self {
        Self {
            max_services,
            max_hosts,
        }
    }
}

fn bucket_count(capacity: u32) -> u32 {
    capacity.clamp(1, MAX_INDEX_BUCKETS).next_power_of_two()
}

fn malformed(detail: String) -> LoadError {
    LoadError::Corrupt(BlobError::malformed(detail))
}

/// Decode `payload` into `arena`, tagging the result with `version`.
pub fn decode_routing_table(
    arena: &mut Arena,
    version: u64,
    payload: &[u8],
    limits: &DecodeLimits,
) -> Result<RoutingTable, LoadError> {
    let mut r = ByteReader::new(payload);

    let services = Array::<Service>::try_new(arena, limits.max_services)?;
    let service_index = HashTable::<Service>::try_new(arena, bucket_count(limits.max_services))?;
    let service_count = r.count("service count", MIN_SERVICE_BYTES)?;
    for _ in 0..service_count {
        let service = decode_service(arena, &mut r, service_index)?;
        let ptr = services.push_value(arena, &service)?;
        service_index.add(arena, &ServiceByName, ptr)?;
    }

    let hosts = Array::<HostRoute>::try_new(arena, limits.max_hosts)?;
    let host_index = HashTable::<HostRoute>::try_new(arena, bucket_count(limits.max_hosts))?;
    let host_count = r.count("host count", MIN_HOST_BYTES)?;
    for _ in 0..host_count {
        let route = decode_host(arena, &mut r, service_index, host_index)?;
        let ptr = hosts.push_value(arena, &route)?;
        host_index.add(arena, &HostByName, ptr)?;
    }

    if r.remaining() != 0 {
        return Err(malformed(format!(
            "{} trailing bytes after the host section",
            r.remaining()
        )));
    }

    Ok(RoutingTable {
        version,
        services,
        service_index,
        hosts,
        host_index,
    })
}

fn decode_service(
    arena: &mut Arena,
    r: &mut ByteReader<'_>,
    index: HashTable<Service>,
) -> Result<Service, LoadError> {
    let name = r.str("service name")?;
    if name.is_empty() {
        return Err(malformed("service with an empty name".to_string()));
    }
    if index.get(arena, &ServiceByName, name).is_some() {
        return Err(malformed(format!("duplicate service '{name}'")));
    }

    let upstream_count = r.count("upstream count", MIN_UPSTREAM_BYTES)?;
    if upstream_count == 0 {
        return Err(malformed(format!("service '{name}' has no upstreams")));
    }
    let upstreams = Array::<Upstream>::try_new(arena, upstream_count)?;
    let mut total: u32 = 0;
    for _ in 0..upstream_count {
        let target = r.str("upstream target")?;
        let weight = r.u32("upstream weight")?;
        if target.is_empty() {
            return Err(malformed(format!("service '{name}' has an empty upstream target")));
        }
        if weight == 0 {
            return Err(malformed(format!(
                "upstream '{target}' of service '{name}' has zero weight"
            )));
        }
        let end = total
            .checked_add(weight)
            .ok_or_else(|| malformed(format!("weights of service '{name}' overflow u32")))?;
        let target = arena.alloc_str(target)?;
        upstreams.push_value(
            arena,
            &Upstream {
                weight_range_start: total,
                weight_range_end: end,
                target,
            },
        )?;
        total = end;
    }

    let metadata_count = r.count("metadata count", MIN_PAIR_BYTES)?;
    let metadata = Array::<KeyValue>::try_new(arena, metadata_count)?;
    for _ in 0..metadata_count {
        let key = r.str("metadata key")?;
        let value = r.str("metadata value")?;
        if key.is_empty() {
            return Err(malformed(format!("service '{name}' has an empty metadata key")));
        }
        let key = arena.alloc_str(key)?;
        let value = arena.alloc_str(value)?;
        metadata.push_value(arena, &KeyValue { key, value })?;
    }

    Ok(Service {
        name: arena.alloc_str(name)?,
        upstreams,
        metadata,
        total_weight: total,
    })
}

fn resolve(
    arena: &Arena,
    index: HashTable<Service>,
    host: &str,
    service: &str,
) -> Result<ServiceRef, LoadError> {
    index
        .get(arena, &ServiceByName, service)
        .ok_or_else(|| malformed(format!("host '{host}' references unknown service '{service}'")))
}

fn decode_host(
    arena: &mut Arena,
    r: &mut ByteReader<'_>,
    services: HashTable<Service>,
    index: HashTable<HostRoute>,
) -> Result<HostRoute, LoadError> {
    let host = r.str("host name")?;
    if host.is_empty() {
        return Err(malformed("host with an empty name".to_string()));
    }
    if index.get(arena, &HostByName, host).is_some() {
        return Err(malformed(format!("duplicate host '{host}'")));
    }

    let default_name = r.str("default service")?;
    let default_service = if default_name.is_empty() {
        None
    } else {
        Some(resolve(arena, services, host, default_name)?)
    };

    let path_count = r.count("path count", MIN_PAIR_BYTES)?;
    let path_routes = Array::<PathRoute>::try_new(arena, path_count)?;
    for _ in 0..path_count {
        let prefix = r.str("path prefix")?;
        let service = r.str("path service")?;
        if prefix.is_empty() {
            return Err(malformed(format!("host '{host}' has an empty path prefix")));
        }
        let service = resolve(arena, services, host, service)?;
        let prefix = arena.alloc_str(prefix)?;
        path_routes.push_value(arena, &PathRoute { prefix, service })?;
    }
    path_routes.sort_by(arena, |a, x, y| {
        let (x, y) = (a.str(x.prefix), a.str(y.prefix));
        y.len().cmp(&x.len()).then_with(|| x.cmp(y))
    });

    let tag_count = r.count("tag count", MIN_PAIR_BYTES)?;
    let tag_rules = Array::<TagRule>::try_new(arena, tag_count)?;
    for _ in 0..tag_count {
        let tag = r.str("tag")?;
        let service = r.str("tag service")?;
        if tag.is_empty() {
            return Err(malformed(format!("host '{host}' has an empty tag")));
        }
        let service = resolve(arena, services, host, service)?;
        let tag = arena.alloc_str(tag)?;
        tag_rules.push_value(arena, &TagRule { tag, service })?;
    }

    Ok(HostRoute {
        host: arena.alloc_str(host)?,
        path_routes,
        tag_rules,
        default_service,
    })
}
