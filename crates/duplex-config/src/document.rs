//! Owned description of a routing table, and its payload encoding.
//!
//! Producers build a [`RoutingDocument`] (by hand or from TOML through
//! serde), encode it with [`RoutingDocument::encode_payload`], and frame it
//! with [`encode_blob`](crate::blob::encode_blob).
//!
//! # Payload format
//!
//! Strings are u32-length-prefixed UTF-8; counts are u32.
//!
//! ```text
//! service_count
//!   name  upstream_count (target weight)*  metadata_count (key value)*
//! host_count
//!   host  default_service ("" = none)  path_count (prefix service)*  tag_count (tag service)*
//! ```

use std::collections::BTreeMap;
use std::io::{self, Write};

use serde::{Deserialize, Serialize};

use crate::codec::{write_count, write_length_prefixed_str, write_u32_le};

/// A whole routing table.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDocument {
    /// Services, referenced by name from host routes.
    #[serde(default)]
    pub services: Vec<ServiceDoc>,
    /// Virtual hosts.
    #[serde(default)]
    pub hosts: Vec<HostDoc>,
}

/// A named service and its weighted upstreams.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDoc {
    /// Unique service name.
    pub name: String,
    /// Upstream targets; must not be empty.
    pub upstreams: Vec<UpstreamDoc>,
    /// Free-form key/value metadata.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One upstream target.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpstreamDoc {
    /// Address or name of the target.
    pub target: String,
    /// Relative weight; must be non-zero.
    pub weight: u32,
}

/// Routing rules for one host name.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct HostDoc {
    /// Host name the rules apply to.
    pub host: String,
    /// Service used when no path or tag rule matches.
    #[serde(default)]
    pub default_service: Option<String>,
    /// Path-prefix rules.
    #[serde(default)]
    pub paths: Vec<PathDoc>,
    /// Tag rules.
    #[serde(default)]
    pub tags: Vec<TagDoc>,
}

/// Route requests whose path starts with `prefix` to `service`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathDoc {
    /// Path prefix.
    pub prefix: String,
    /// Target service name.
    pub service: String,
}

/// Route requests carrying `tag` to `service`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDoc {
    /// Request tag.
    pub tag: String,
    /// Target service name.
    pub service: String,
}

impl RoutingDocument {
    /// An empty document.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a service with the given `(target, weight)` upstreams.
    pub fn with_service(mut self, name: &str, upstreams: &[(&str, u32)]) -> Self {
        self.services.push(ServiceDoc {
            name: name.to_string(),
            upstreams: upstreams
                .iter()
                .map(|&(target, weight)| UpstreamDoc {
                    target: target.to_string(),
                    weight,
                })
                .collect(),
            metadata: BTreeMap::new(),
        });
        self
    }

    /// Add a host.
    pub fn with_host(mut self, host: HostDoc) -> Self {
        self.hosts.push(host);
        self
    }

    /// Encode the payload section of a blob.
    pub fn encode_payload(&self) -> io::Result<Vec<u8>> {
        let mut out = Vec::new();
        self.write_payload(&mut out)?;
        Ok(out)
    }

    /// Write the payload section to `w`.
    pub fn write_payload(&self, w: &mut dyn Write) -> io::Result<()> {
        write_count(w, self.services.len())?;
        for svc in &self.services {
            write_length_prefixed_str(w, &svc.name)?;
            write_count(w, svc.upstreams.len())?;
            for up in &svc.upstreams {
                write_length_prefixed_str(w, &up.target)?;
                write_u32_le(w, up.weight)?;
            }
            write_count(w, svc.metadata.len())?;
            for (key, value) in &svc.metadata {
                write_length_prefixed_str(w, key)?;
                write_length_prefixed_str(w, value)?;
            }
        }

        write_count(w, self.hosts.len())?;
        for host in &self.hosts {
            write_length_prefixed_str(w, &host.host)?;
            write_length_prefixed_str(w, host.default_service.as_deref().unwrap_or(""))?;
            write_count(w, host.paths.len())?;
            for path in &host.paths {
                write_length_prefixed_str(w, &path.prefix)?;
                write_length_prefixed_str(w, &path.service)?;
            }
            write_count(w, host.tags.len())?;
            for tag in &host.tags {
                write_length_prefixed_str(w, &tag.tag)?;
                write_length_prefixed_str(w, &tag.service)?;
            }
        }
        Ok(())
    }
}

impl HostDoc {
    /// A host with no rules.
    pub fn new(host: &str) -> Self {
        Self {
            host: host.to_string(),
            ..Self::default()
        }
    }

    /// Set the fallback service.
    pub fn default_service(mut self, service: &str) -> Self {
        self.default_service = Some(service.to_string());
        self
    }

    /// Add a path-prefix rule.
    pub fn path(mut self, prefix: &str, service: &str) -> Self {
        self.paths.push(PathDoc {
            prefix: prefix.to_string(),
            service: service.to_string(),
        });
        self
    }

    /// Add a tag rule.
    pub fn tag(mut self, tag: &str, service: &str) -> Self {
        self.tags.push(TagDoc {
            tag: tag.to_string(),
            service: service.to_string(),
        });
        self
    }
}
