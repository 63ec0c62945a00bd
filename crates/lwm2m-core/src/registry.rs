//! Path parsing, method-to-operation resolution, and the ACL table shared
//! across the object model.
//!
//! This module owns no domain knowledge about what a resource *means* —
//! every object (Security, Server, Device, ...) is a [`ObjectHandler`]
//! capability bundle the caller matches against the [`Operation`]
//! [`resolve_operation`] returns, rather than a bespoke per-object trait
//! hierarchy.

use bitflags::bitflags;
use lwm2m_proto::{Code, option_as_str, option_as_uint};

use crate::{acl::Acl, error::CoreError};

/// The short server id reserved for the bootstrap server, which bypasses
/// ordinary ACL checks.
pub const BOOTSTRAP_SHORT_SERVER_ID: u16 = 0;

bitflags! {
    /// Operations an [`ObjectHandler`] supports.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Capabilities: u8 {
        /// Supports `READ`.
        const READ = 0b0000_0001;
        /// Supports `WRITE`.
        const WRITE = 0b0000_0010;
        /// Supports `EXECUTE`.
        const EXECUTE = 0b0000_0100;
        /// Supports `CREATE` (object-level only).
        const CREATE = 0b0000_1000;
        /// Supports `DELETE` (instance-level).
        const DELETE = 0b0001_0000;
        /// Supports `DISCOVER`.
        const DISCOVER = 0b0010_0000;
        /// Supports `OBSERVE`.
        const OBSERVE = 0b0100_0000;
    }
}

/// The abstract operation a decoded request resolves to, per the method
/// and option table the dispatcher applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// `GET` without Observe, or with `Observe=0` against a path that was
    /// not already being observed — a plain value read.
    Read,
    /// `GET` with `Accept: application/link-format`.
    Discover,
    /// `GET` with an `Observe` option; `register` is true for value 0
    /// (subscribe), false for value 1 (unsubscribe).
    Observe {
        /// `true` to subscribe, `false` to cancel.
        register: bool,
    },
    /// `PUT`, or `POST` against an instance/resource that already exists.
    Write,
    /// `POST` against an object or a non-existent instance.
    Create,
    /// `POST` against a resource whose handler advertises
    /// [`Capabilities::EXECUTE`].
    Execute,
    /// `DELETE`.
    Delete,
}

/// A parsed `/oid[/iid[/rid]]` request path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Path {
    /// The object id (first path segment).
    pub object_id: u16,
    /// The instance id, if the path has a second segment.
    pub instance_id: Option<u16>,
    /// The resource id, if the path has a third segment.
    pub resource_id: Option<u16>,
}

impl Path {
    /// Parse `Uri-Path` option strings (already split on `/`) into a
    /// structured path. A non-numeric first segment is resolved against
    /// `aliases` (object name → id); the first match wins.
    pub fn parse(segments: &[&str], aliases: &[(&str, u16)]) -> Result<Self, CoreError> {
        if segments.is_empty() || segments.len() > 3 {
            return Err(CoreError::InvalidEncoding("path must have 1 to 3 segments".to_string()));
        }

        let object_id = match segments[0].parse::<u16>() {
            Ok(id) => id,
            Err(_) => aliases
                .iter()
                .find(|(name, _)| *name == segments[0])
                .map(|(_, id)| *id)
                .ok_or_else(|| CoreError::NotFound(segments[0].to_string()))?,
        };

        let instance_id = segments.get(1).map(|s| s.parse::<u16>()).transpose().map_err(|_| {
            CoreError::InvalidEncoding("instance id must be numeric".to_string())
        })?;
        let resource_id = segments.get(2).map(|s| s.parse::<u16>()).transpose().map_err(|_| {
            CoreError::InvalidEncoding("resource id must be numeric".to_string())
        })?;

        Ok(Self { object_id, instance_id, resource_id })
    }
}

/// Resolve the abstract [`Operation`] a request maps to, per the method ×
/// option table: GET+Accept=link-format → Discover, GET+Observe →
/// Observe, GET otherwise → Read, PUT → Write, POST → Write/Create
/// depending on whether the target instance exists, DELETE → Delete.
pub fn resolve_operation(
    code: Code,
    has_link_format_accept: bool,
    observe_option: Option<u32>,
    instance_exists: bool,
) -> Result<Operation, CoreError> {
    match code {
        Code::GET if has_link_format_accept => Ok(Operation::Discover),
        Code::GET => match observe_option {
            Some(0) => Ok(Operation::Observe { register: true }),
            Some(1) => Ok(Operation::Observe { register: false }),
            Some(_) => Err(CoreError::InvalidEncoding("Observe option must be 0 or 1".to_string())),
            None => Ok(Operation::Read),
        },
        Code::PUT => Ok(Operation::Write),
        Code::POST => Ok(if instance_exists { Operation::Write } else { Operation::Create }),
        Code::DELETE => Ok(Operation::Delete),
        _ => Err(CoreError::MethodNotAllowed { operation: "dispatch", path: String::new() }),
    }
}

/// Extract the `Observe` option value and whether `Accept` requests
/// link-format, from a decoded request's options.
pub fn request_hints(options: &[lwm2m_proto::CoapOption]) -> (bool, Option<u32>) {
    let mut link_format = false;
    let mut observe = None;
    for option in options {
        match option.number {
            lwm2m_proto::number::ACCEPT => {
                if option_as_uint(option).ok() == Some(u32::from(lwm2m_proto::content_format::LINK_FORMAT)) {
                    link_format = true;
                }
            },
            lwm2m_proto::number::OBSERVE => {
                observe = option_as_uint(option).ok();
            },
            _ => {},
        }
    }
    (link_format, observe)
}

/// Split a `Uri-Path`-bearing option list into its path segments, in
/// order.
pub fn path_segments(options: &[lwm2m_proto::CoapOption]) -> Result<Vec<&str>, CoreError> {
    options
        .iter()
        .filter(|o| o.number == lwm2m_proto::number::URI_PATH)
        .map(|o| option_as_str(o).map_err(|_| CoreError::InvalidEncoding("Uri-Path is not valid UTF-8".to_string())))
        .collect()
}

/// The capability set and instance bookkeeping a caller dispatches a
/// resolved [`Operation`] against. The object's actual read/write/execute/
/// create/delete behavior lives behind this trait; `Registry` only tracks
/// the ACL state the dispatcher checks it against.
pub trait ObjectHandler: Send + Sync {
    /// Which operations this object's resources support, in general (a
    /// concrete resource may further restrict via [`ObjectHandler::permitted`]).
    fn capabilities(&self) -> Capabilities;

    /// Operations permitted on a specific resource (defaults to the
    /// object-wide capability set; override for resources like `Device`'s
    /// mix of read-only telemetry and executable actions).
    fn permitted(&self, _resource_id: u16) -> Capabilities {
        self.capabilities()
    }

    /// Instance ids currently present under this object.
    fn instance_ids(&self) -> Vec<u16>;

    /// Whether `instance_id` currently exists.
    fn instance_exists(&self, instance_id: u16) -> bool {
        self.instance_ids().contains(&instance_id)
    }
}

/// Owns the per-instance ACLs gating requests to the object model. The
/// object table itself lives in `lwm2m-client`'s `Lwm2mClient`, which owns
/// the concrete object handlers and their dispatch; this only tracks the
/// authorization state shared across them.
pub struct Registry {
    instance_acls: Vec<((u16, u16), Acl)>,
}

impl Registry {
    /// An empty registry.
    pub fn new() -> Self {
        Self { instance_acls: Vec::new() }
    }

    /// Look up (or lazily initialize to a bootstrap-owned default) the ACL
    /// for `(object_id, instance_id)`.
    pub fn acl_for(&mut self, object_id: u16, instance_id: u16) -> &mut Acl {
        let key = (object_id, instance_id);
        if let Some(pos) = self.instance_acls.iter().position(|(k, _)| *k == key) {
            return &mut self.instance_acls[pos].1;
        }
        self.instance_acls.push((key, Acl::new(BOOTSTRAP_SHORT_SERVER_ID)));
        let last = self.instance_acls.len() - 1;
        &mut self.instance_acls[last].1
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
