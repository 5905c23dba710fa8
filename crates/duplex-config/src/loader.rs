//! Turning blobs into routing tables, and the slot application that does
//! it on every refresh tick.

use duplex_arena::Arena;
use duplex_slot::{RebuildError, SlotApp, Staleness};
use tracing::{debug, warn};

use crate::blob;
use crate::decode::{decode_routing_table, DecodeLimits};
use crate::error::LoadError;
use crate::routing::RoutingTable;
use crate::source::{BlobRead, BlobSource};

/// How much of the blob a read looks at.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadMode {
    /// Only `{status, version}`; used for staleness checks.
    VersionOnly,
    /// The whole blob, validated and decoded.
    Full,
}

/// Outcome of a version-only read, relative to a known version.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VersionCheck {
    /// The producer has not marked the blob ready.
    NotReady,
    /// The blob holds the known version.
    Current,
    /// The blob is newer than the known version, or nothing is known.
    Newer {
        /// Version in the blob.
        found: u64,
    },
    /// The blob is older than what was already loaded.
    OutOfOrder {
        /// Version in the blob.
        found: u64,
        /// Highest version already seen.
        current: u64,
    },
}

/// What a [`ConfigLoader::read`] produced.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReadOutcome {
    /// Result of a [`ReadMode::VersionOnly`] read.
    Version(VersionCheck),
    /// Result of a [`ReadMode::Full`] read.
    Loaded(RoutingTable),
}

/// Reads blobs from a [`BlobSource`] and decodes them into arenas.
///
/// Remembers the last version it loaded and refuses to go backwards.
#[derive(Debug)]
pub struct ConfigLoader<S> {
    source: S,
    limits: DecodeLimits,
    last_loaded_version: Option<u64>,
}

impl<S: BlobSource> ConfigLoader<S> {
    /// A loader over `source` with the given container limits.
    pub fn new(source: S, limits: DecodeLimits) -> Self {
        Self {
            source,
            limits,
            last_loaded_version: None,
        }
    }

    /// The blob source.
    pub fn source(&self) -> &S {
        &self.source
    }

    /// Container limits applied to every decode.
    pub fn limits(&self) -> DecodeLimits {
        self.limits
    }

    /// Version of the last successful [`load`](Self::load).
    pub fn last_loaded_version(&self) -> Option<u64> {
        self.last_loaded_version
    }

    /// Read in `mode`. `arena` is only written by a full read; `known` is
    /// only consulted by a version-only read.
    pub fn read(
        &mut self,
        mode: ReadMode,
        arena: &mut Arena,
        known: Option<u64>,
    ) -> Result<ReadOutcome, LoadError> {
        match mode {
            ReadMode::VersionOnly => self.check_version(known).map(ReadOutcome::Version),
            ReadMode::Full => self.load(arena).map(ReadOutcome::Loaded),
        }
    }

    /// Compare the blob's version with `known` (typically the reserved
    /// slot's version) and with the last loaded version.
    pub fn check_version(&mut self, known: Option<u64>) -> Result<VersionCheck, LoadError> {
        let version = match self.source.try_read()? {
            BlobRead::WouldBlock => return Err(LoadError::Contention),
            BlobRead::Ready(guard) => blob::read_version(&guard).map_err(LoadError::Corrupt)?,
        };
        if !version.is_ready() {
            return Ok(VersionCheck::NotReady);
        }
        let found = version.version;
        let floor = known.max(self.last_loaded_version);
        Ok(match (known, floor) {
            (_, Some(current)) if found < current => VersionCheck::OutOfOrder { found, current },
            (Some(known), _) if found == known => VersionCheck::Current,
            _ => VersionCheck::Newer { found },
        })
    }

    /// Validate the blob and decode it into `arena`.
    ///
    /// On error `arena` may hold a partial structure; reset it before
    /// reuse.
    pub fn load(&mut self, arena: &mut Arena) -> Result<RoutingTable, LoadError> {
        let guard = match self.source.try_read()? {
            BlobRead::WouldBlock => return Err(LoadError::Contention),
            BlobRead::Ready(guard) => guard,
        };
        let (header, payload) = blob::parse(&guard)?;
        if let Some(last_loaded) = self.last_loaded_version {
            if header.version < last_loaded {
                return Err(LoadError::Stale {
                    found: header.version,
                    last_loaded,
                });
            }
        }
        let table = decode_routing_table(arena, header.version, payload, &self.limits)?;
        drop(guard);
        self.last_loaded_version = Some(table.version);
        Ok(table)
    }
}

/// Slot application that keeps a [`RoutingTable`] in sync with a blob.
#[derive(Debug)]
pub struct RoutingApp<S> {
    loader: ConfigLoader<S>,
    version_check: bool,
}

impl<S: BlobSource> RoutingApp<S> {
    /// Load from `source`, checking the blob version before every rebuild.
    pub fn new(source: S, limits: DecodeLimits) -> Self {
        Self {
            loader: ConfigLoader::new(source, limits),
            version_check: true,
        }
    }

    /// Skip the version check and rebuild on every tick.
    pub fn without_version_check(mut self) -> Self {
        self.version_check = false;
        self
    }

    /// The underlying loader.
    pub fn loader(&self) -> &ConfigLoader<S> {
        &self.loader
    }
}

impl<S: BlobSource + 'static> SlotApp for RoutingApp<S> {
    type Root = RoutingTable;

    fn rebuild(
        &mut self,
        arena: &mut Arena,
        _previous: Option<RoutingTable>,
    ) -> Result<RoutingTable, RebuildError> {
        self.loader.load(arena).map_err(RebuildError::from)
    }

    fn check_stale(&mut self, _arena: &Arena, reserved: Option<&RoutingTable>) -> Option<Staleness> {
        if !self.version_check {
            return None;
        }
        let known = reserved.map(|t| t.version);
        Some(match self.loader.check_version(known) {
            Ok(VersionCheck::Newer { .. }) => Staleness::NeedsUpdate,
            Ok(VersionCheck::Current) | Ok(VersionCheck::NotReady) => Staleness::NoUpdate,
            Ok(VersionCheck::OutOfOrder { found, current }) => {
                warn!(found, current, "blob version went backwards; ignoring");
                Staleness::NoUpdate
            }
            Err(LoadError::Contention) => {
                debug!("blob locked during version check");
                Staleness::NoUpdate
            }
            Err(error) => {
                warn!(%error, "version check failed");
                Staleness::Failed
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blob::encode_blob;
    use crate::document::{HostDoc, RoutingDocument};
    use crate::source::MemoryBlobSource;
    use duplex_arena::Region;

    fn blob(version: u64, doc: &RoutingDocument) -> Vec<u8> {
        encode_blob(version, &doc.encode_payload().unwrap()).unwrap()
    }

    fn doc() -> RoutingDocument {
        RoutingDocument::new()
            .with_service("api", &[("a:80", 1)])
            .with_host(HostDoc::new("h").default_service("api"))
    }

    fn arena() -> Arena {
        Arena::new(Region::zeroed(64 * 1024)).unwrap()
    }

    #[test]
    fn load_tracks_last_version_and_refuses_older() {
        let source = MemoryBlobSource::new(blob(5, &doc()));
        let mut loader = ConfigLoader::new(source.clone(), DecodeLimits::default());
        let mut a = arena();
        assert_eq!(loader.load(&mut a).unwrap().version, 5);
        assert_eq!(loader.last_loaded_version(), Some(5));

        // Reloading the same version is allowed.
        a.reset();
        assert_eq!(loader.load(&mut a).unwrap().version, 5);

        source.publish(blob(4, &doc()));
        a.reset();
        assert!(matches!(
            loader.load(&mut a),
            Err(LoadError::Stale {
                found: 4,
                last_loaded: 5
            })
        ));
    }

    #[test]
    fn version_check_classification() {
        let source = MemoryBlobSource::new(blob(5, &doc()));
        let mut loader = ConfigLoader::new(source.clone(), DecodeLimits::default());
        assert_eq!(
            loader.check_version(None).unwrap(),
            VersionCheck::Newer { found: 5 }
        );
        assert_eq!(loader.check_version(Some(5)).unwrap(), VersionCheck::Current);
        assert_eq!(
            loader.check_version(Some(4)).unwrap(),
            VersionCheck::Newer { found: 5 }
        );
        assert_eq!(
            loader.check_version(Some(6)).unwrap(),
            VersionCheck::OutOfOrder {
                found: 5,
                current: 6
            }
        );

        let mut unready = blob(7, &doc());
        unready[0..4].copy_from_slice(&0u32.to_le_bytes());
        source.publish(unready);
        assert_eq!(loader.check_version(Some(5)).unwrap(), VersionCheck::NotReady);
    }

    #[test]
    fn version_check_respects_last_loaded() {
        let source = MemoryBlobSource::new(blob(5, &doc()));
        let mut loader = ConfigLoader::new(source.clone(), DecodeLimits::default());
        loader.load(&mut arena()).unwrap();
        source.publish(blob(3, &doc()));
        // Nothing reserved, but version 5 was already loaded.
        assert_eq!(
            loader.check_version(None).unwrap(),
            VersionCheck::OutOfOrder {
                found: 3,
                current: 5
            }
        );
    }

    #[test]
    fn contention_and_truncation() {
        let source = MemoryBlobSource::new(blob(1, &doc()));
        let mut loader = ConfigLoader::new(source.clone(), DecodeLimits::default());
        {
            let _held = source.lock_exclusive();
            assert!(matches!(loader.check_version(None), Err(LoadError::Contention)));
            assert!(matches!(loader.load(&mut arena()), Err(LoadError::Contention)));
        }
        source.publish(vec![1, 0, 0]);
        assert!(matches!(
            loader.check_version(None),
            Err(LoadError::Corrupt(_))
        ));
    }

    #[test]
    fn read_dispatches_on_mode() {
        let source = MemoryBlobSource::new(blob(2, &doc()));
        let mut loader = ConfigLoader::new(source, DecodeLimits::default());
        let mut a = arena();
        assert_eq!(
            loader.read(ReadMode::VersionOnly, &mut a, Some(2)).unwrap(),
            ReadOutcome::Version(VersionCheck::Current)
        );
        assert_eq!(a.used(), 0);
        let ReadOutcome::Loaded(table) = loader.read(ReadMode::Full, &mut a, None).unwrap() else {
            panic!("full read returned a version");
        };
        assert_eq!(table.version, 2);
    }

    #[test]
    fn app_maps_version_checks_to_staleness() {
        let source = MemoryBlobSource::new(blob(1, &doc()));
        let mut app = RoutingApp::new(source.clone(), DecodeLimits::default());
        let mut a = arena();
        let table = app.rebuild(&mut a, None).unwrap();
        assert_eq!(app.check_stale(&a, Some(&table)), Some(Staleness::NoUpdate));
        // A reserved slot without a root always needs a rebuild.
        assert_eq!(app.check_stale(&a, None), Some(Staleness::NeedsUpdate));

        source.publish(blob(2, &doc()));
        assert_eq!(app.check_stale(&a, Some(&table)), Some(Staleness::NeedsUpdate));

        source.publish(vec![0; 4]);
        assert_eq!(app.check_stale(&a, Some(&table)), Some(Staleness::Failed));

        let mut unchecked = RoutingApp::new(source, DecodeLimits::default()).without_version_check();
        assert_eq!(unchecked.check_stale(&a, None), None);
    }
}
