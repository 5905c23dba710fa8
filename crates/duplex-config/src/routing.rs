//! The routing table as it lives inside a slot's arena.
//!
//! Every entity is a fixed-size [`Record`] whose strings and child
//! collections are arena handles. A [`RoutingTable`] is the root: a
//! handful of handles, cheap to copy, meaningless without the arena it
//! was built in. Read it through a [`RoutingView`].
//!
//! # Resolution order
//!
//! For a request `(host, path, tags)` on a known host:
//!
//! 1. the longest path prefix that matches `path`;
//! 2. the first tag rule whose tag the request carries;
//! 3. the host's default service.

use std::cmp::Ordering;

use duplex_arena::record::{get_u32, put_u32};
use duplex_arena::{fnv1a, Arena, ArenaPtr, ArenaStr, Array, HashTable, Record, TableOps};
use duplex_slot::Pinned;

/// Handle to a [`Service`] record.
pub type ServiceRef = ArenaPtr<Service>;

// ── Records ─────────────────────────────────────────────────────

/// One weighted upstream target.
///
/// Upstreams of a service cover `[0, total_weight)` with consecutive
/// half-open ranges, in declaration order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Upstream {
    /// First point (inclusive) owned by this upstream.
    pub weight_range_start: u32,
    /// End of the owned range (exclusive).
    pub weight_range_end: u32,
    /// Target address.
    pub target: ArenaStr,
}

impl Upstream {
    /// Weight as declared by the producer.
    pub fn weight(&self) -> u32 {
        self.weight_range_end - self.weight_range_start
    }
}

impl Record for Upstream {
    const SIZE: usize = 12;

    fn encode(&self, out: &mut [u8]) {
        put_u32(out, 0, self.weight_range_start);
        put_u32(out, 4, self.weight_range_end);
        self.target.encode(&mut out[8..12]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            weight_range_start: get_u32(bytes, 0),
            weight_range_end: get_u32(bytes, 4),
            target: ArenaStr::decode(&bytes[8..12]),
        }
    }
}

/// A metadata entry.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyValue {
    /// Non-empty key.
    pub key: ArenaStr,
    /// Value, possibly empty.
    pub value: ArenaStr,
}

impl Record for KeyValue {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        self.key.encode(&mut out[0..4]);
        self.value.encode(&mut out[4..8]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            key: ArenaStr::decode(&bytes[0..4]),
            value: ArenaStr::decode(&bytes[4..8]),
        }
    }
}

/// A named service.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Service {
    /// Unique name.
    pub name: ArenaStr,
    /// Non-empty, in declaration order.
    pub upstreams: Array<Upstream>,
    /// Key/value metadata.
    pub metadata: Array<KeyValue>,
    /// Sum of upstream weights.
    pub total_weight: u32,
}

impl Record for Service {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        self.name.encode(&mut out[0..4]);
        self.upstreams.encode(&mut out[4..8]);
        self.metadata.encode(&mut out[8..12]);
        put_u32(out, 12, self.total_weight);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            name: ArenaStr::decode(&bytes[0..4]),
            upstreams: Array::decode(&bytes[4..8]),
            metadata: Array::decode(&bytes[8..12]),
            total_weight: get_u32(bytes, 12),
        }
    }
}

/// Requests whose path starts with `prefix` go to `service`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PathRoute {
    /// Non-empty path prefix.
    pub prefix: ArenaStr,
    /// Target service.
    pub service: ServiceRef,
}

impl Record for PathRoute {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        self.prefix.encode(&mut out[0..4]);
        self.service.encode(&mut out[4..8]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            prefix: ArenaStr::decode(&bytes[0..4]),
            service: ServiceRef::decode(&bytes[4..8]),
        }
    }
}

/// Requests carrying `tag` go to `service`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TagRule {
    /// Non-empty request tag.
    pub tag: ArenaStr,
    /// Target service.
    pub service: ServiceRef,
}

impl Record for TagRule {
    const SIZE: usize = 8;

    fn encode(&self, out: &mut [u8]) {
        self.tag.encode(&mut out[0..4]);
        self.service.encode(&mut out[4..8]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            tag: ArenaStr::decode(&bytes[0..4]),
            service: ServiceRef::decode(&bytes[4..8]),
        }
    }
}

/// Routing rules for one host.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HostRoute {
    /// Unique host name.
    pub host: ArenaStr,
    /// Sorted longest prefix first, ties by prefix bytes.
    pub path_routes: Array<PathRoute>,
    /// In declaration order.
    pub tag_rules: Array<TagRule>,
    /// Fallback when nothing else matches.
    pub default_service: Option<ServiceRef>,
}

impl Record for HostRoute {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        self.host.encode(&mut out[0..4]);
        self.path_routes.encode(&mut out[4..8]);
        self.tag_rules.encode(&mut out[8..12]);
        self.default_service.encode(&mut out[12..16]);
    }

    fn decode(bytes: &[u8]) -> Self {
        Self {
            host: ArenaStr::decode(&bytes[0..4]),
            path_routes: Array::decode(&bytes[4..8]),
            tag_rules: Array::decode(&bytes[8..12]),
            default_service: Option::<ServiceRef>::decode(&bytes[12..16]),
        }
    }
}

// ── Root ────────────────────────────────────────────────────────

/// Root of a decoded routing table.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RoutingTable {
    /// Blob version this table was decoded from.
    pub version: u64,
    /// Services in blob order.
    pub services: Array<Service>,
    /// Services by name.
    pub service_index: HashTable<Service>,
    /// Hosts in blob order.
    pub hosts: Array<HostRoute>,
    /// Hosts by name.
    pub host_index: HashTable<HostRoute>,
}

// ── Index operations ────────────────────────────────────────────

/// Keys [`Service`] records by name.
#[derive(Clone, Copy, Debug, Default)]
pub struct ServiceByName;

impl TableOps<Service> for ServiceByName {
    type Key = str;

    fn hash_element(&self, arena: &Arena, element: &Service) -> u64 {
        fnv1a(arena.str(element.name).as_bytes())
    }

    fn hash_key(&self, key: &str) -> u64 {
        fnv1a(key.as_bytes())
    }

    fn compare(&self, arena: &Arena, element: &Service, key: &str) -> Ordering {
        arena.str(element.name).cmp(key)
    }
}

/// Keys [`HostRoute`] records by host name.
#[derive(Clone, Copy, Debug, Default)]
pub struct HostByName;

impl TableOps<HostRoute> for HostByName {
    type Key = str;

    fn hash_element(&self, arena: &Arena, element: &HostRoute) -> u64 {
        fnv1a(arena.str(element.host).as_bytes())
    }

    fn hash_key(&self, key: &str) -> u64 {
        fnv1a(key.as_bytes())
    }

    fn compare(&self, arena: &Arena, element: &HostRoute, key: &str) -> Ordering {
        arena.str(element.host).cmp(key)
    }
}

// ── Views ───────────────────────────────────────────────────────

/// Read access to a [`RoutingTable`] through the arena that holds it.
#[derive(Clone, Copy, Debug)]
pub struct RoutingView<'a> {
    arena: &'a Arena,
    table: RoutingTable,
}

impl<'a> RoutingView<'a> {
    /// View `table`, which must have been built in `arena`.
    pub fn new(arena: &'a Arena, table: RoutingTable) -> Self {
        Self { arena, table }
    }

    /// View the table a reader has pinned.
    pub fn of(pinned: &'a Pinned<RoutingTable>) -> Self {
        Self::new(pinned.arena(), *pinned.root())
    }

    /// The underlying root.
    pub fn table(&self) -> RoutingTable {
        self.table
    }

    /// Blob version the table was decoded from.
    pub fn version(&self) -> u64 {
        self.table.version
    }

    /// Number of services.
    pub fn service_count(&self) -> u32 {
        self.table.services.len(self.arena)
    }

    /// Number of hosts.
    pub fn host_count(&self) -> u32 {
        self.table.hosts.len(self.arena)
    }

    /// Look a service up by name.
    pub fn service(&self, name: &str) -> Option<ServiceView<'a>> {
        self.table
            .service_index
            .get(self.arena, &ServiceByName, name)
            .map(|ptr| ServiceView::at(self.arena, ptr))
    }

    /// Services in blob order.
    pub fn services(&self) -> impl Iterator<Item = ServiceView<'a>> + 'a {
        let arena = self.arena;
        self.table
            .services
            .iter(arena)
            .map(move |service| ServiceView { arena, service })
    }

    /// Look a host up by name.
    pub fn host(&self, host: &str) -> Option<HostView<'a>> {
        self.table
            .host_index
            .get_value(self.arena, &HostByName, host)
            .map(|route| HostView {
                arena: self.arena,
                route,
            })
    }

    /// Hosts in blob order.
    pub fn hosts(&self) -> impl Iterator<Item = HostView<'a>> + 'a {
        let arena = self.arena;
        self.table
            .hosts
            .iter(arena)
            .map(move |route| HostView { arena, route })
    }

    /// Resolve a request to a service. `None` for an unknown host or when
    /// no rule matches and the host has no default.
    pub fn route(&self, host: &str, path: &str, tags: &[&str]) -> Option<ServiceView<'a>> {
        self.host(host)?.route(path, tags)
    }
}

/// One service.
#[derive(Clone, Copy, Debug)]
pub struct ServiceView<'a> {
    arena: &'a Arena,
    service: Service,
}

impl<'a> ServiceView<'a> {
    fn at(arena: &'a Arena, ptr: ServiceRef) -> Self {
        Self {
            arena,
            service: arena.read(ptr),
        }
    }

    /// The raw record.
    pub fn record(&self) -> Service {
        self.service
    }

    /// Service name.
    pub fn name(&self) -> &'a str {
        self.arena.str(self.service.name)
    }

    /// Sum of upstream weights.
    pub fn total_weight(&self) -> u32 {
        self.service.total_weight
    }

    /// Number of upstreams.
    pub fn upstream_count(&self) -> u32 {
        self.service.upstreams.len(self.arena)
    }

    /// `(target, weight)` pairs in declaration order.
    pub fn upstreams(&self) -> impl Iterator<Item = (&'a str, u32)> + 'a {
        let arena = self.arena;
        self.service
            .upstreams
            .iter(arena)
            .map(move |up| (arena.str(up.target), up.weight()))
    }

    /// Pick the upstream owning `point` modulo the total weight.
    ///
    /// With a uniformly distributed `point`, each upstream is chosen in
    /// proportion to its weight.
    pub fn pick(&self, point: u64) -> Option<&'a str> {
        if self.service.total_weight == 0 {
            return None;
        }
        let point = (point % u64::from(self.service.total_weight)) as u32;
        let ptr = self
            .service
            .upstreams
            .search(self.arena, &point, |_, &p, up| {
                if p < up.weight_range_start {
                    Ordering::Less
                } else if p >= up.weight_range_end {
                    Ordering::Greater
                } else {
                    Ordering::Equal
                }
            })?;
        Some(self.arena.str(self.arena.read(ptr).target))
    }

    /// Metadata value for `key`.
    pub fn metadata(&self, key: &str) -> Option<&'a str> {
        let arena = self.arena;
        self.service
            .metadata
            .iter(arena)
            .find(|kv| arena.str(kv.key) == key)
            .map(|kv| arena.str(kv.value))
    }

    /// All metadata entries in blob order.
    pub fn metadata_entries(&self) -> impl Iterator<Item = (&'a str, &'a str)> + 'a {
        let arena = self.arena;
        self.service
            .metadata
            .iter(arena)
            .map(move |kv| (arena.str(kv.key), arena.str(kv.value)))
    }
}

/// One host's rules.
#[derive(Clone, Copy, Debug)]
pub struct HostView<'a> {
    arena: &'a Arena,
    route: HostRoute,
}

impl<'a> HostView<'a> {
    /// Host name.
    pub fn host(&self) -> &'a str {
        self.arena.str(self.route.host)
    }

    /// Fallback service.
    pub fn default_service(&self) -> Option<ServiceView<'a>> {
        self.route
            .default_service
            .map(|ptr| ServiceView::at(self.arena, ptr))
    }

    /// `(prefix, service)` in match order.
    pub fn path_routes(&self) -> impl Iterator<Item = (&'a str, ServiceView<'a>)> + 'a {
        let arena = self.arena;
        self.route
            .path_routes
            .iter(arena)
            .map(move |r| (arena.str(r.prefix), ServiceView::at(arena, r.service)))
    }

    /// `(tag, service)` in match order.
    pub fn tag_rules(&self) -> impl Iterator<Item = (&'a str, ServiceView<'a>)> + 'a {
        let arena = self.arena;
        self.route
            .tag_rules
            .iter(arena)
            .map(move |r| (arena.str(r.tag), ServiceView::at(arena, r.service)))
    }

    /// Resolve a request on this host.
    pub fn route(&self, path: &str, tags: &[&str]) -> Option<ServiceView<'a>> {
        let arena = self.arena;
        let by_path = self
            .route
            .path_routes
            .iter(arena)
            .find(|r| path.starts_with(arena.str(r.prefix)))
            .map(|r| r.service);
        let by_tag = || {
            self.route
                .tag_rules
                .iter(arena)
                .find(|r| tags.iter().any(|t| *t == arena.str(r.tag)))
                .map(|r| r.service)
        };
        by_path
            .or_else(by_tag)
            .or(self.route.default_service)
            .map(|ptr| ServiceView::at(arena, ptr))
    }
}
