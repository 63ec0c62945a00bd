//! Access control lists gating every request the resource registry
//! dispatches.

use std::collections::BTreeMap;

use bitflags::bitflags;

use crate::error::CoreError;

/// The short server id reserved for the "applies to every server without
/// its own entry" default ACL row.
pub const DEFAULT_SHORT_SERVER_ID: u16 = 1;

bitflags! {
    /// Operations an ACL entry may grant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Permission: u8 {
        /// Read the resource's value.
        const READ = 0b0000_0001;
        /// Write a new value.
        const WRITE = 0b0000_0010;
        /// Invoke the resource as an action.
        const EXECUTE = 0b0000_0100;
        /// Delete the instance.
        const DELETE = 0b0000_1000;
        /// Create a new instance under the object.
        const CREATE = 0b0001_0000;
        /// List the resource in a discovery response, observe it, or set
        /// write-attributes on it — implied by [`Permission::READ`].
        const DISCOVER = 0b0010_0000;
    }
}

/// The per-instance ACL record described by object `/2`.
#[derive(Debug, Clone)]
pub struct Acl {
    /// The short server id that owns this instance (implicitly granted
    /// every permission, and the only non-bootstrap server allowed to
    /// rebind ownership).
    pub owner_ssid: u16,
    /// Per-server permission masks.
    pub entries: BTreeMap<u16, Permission>,
}

impl Acl {
    /// A fresh ACL owned by `owner_ssid` with no per-server entries (only
    /// the owner and whatever default entry is added later have access).
    pub fn new(owner_ssid: u16) -> Self {
        Self { owner_ssid, entries: BTreeMap::new() }
    }

    /// Resolve the effective permission mask for `requester_ssid`, per the
    /// owner → explicit-entry → default-entry → none precedence chain. A
    /// granted `READ` implicitly also grants `DISCOVER`.
    pub fn resolve(&self, requester_ssid: u16) -> Permission {
        let mut mask = if requester_ssid == self.owner_ssid {
            Permission::all()
        } else if let Some(&entry) = self.entries.get(&requester_ssid) {
            entry
        } else if let Some(&default) = self.entries.get(&DEFAULT_SHORT_SERVER_ID) {
            default
        } else {
            Permission::empty()
        };

        if mask.contains(Permission::READ) {
            mask |= Permission::DISCOVER;
        }
        mask
    }

    /// Check `requester_ssid` for `required`; fails with
    /// [`CoreError::Unauthorized`] naming `operation`/`path` if any bit of
    /// `required` is missing.
    pub fn check(
        &self,
        requester_ssid: u16,
        required: Permission,
        operation: &'static str,
        path: &str,
    ) -> Result<(), CoreError> {
        let granted = self.resolve(requester_ssid);
        if granted.contains(required) {
            Ok(())
        } else {
            Err(CoreError::Unauthorized { server_id: requester_ssid, operation, path: path.to_string() })
        }
    }

    /// Set or replace the permission mask `requester_ssid` holds.
    pub fn set_entry(&mut self, ssid: u16, mask: Permission) {
        self.entries.insert(ssid, mask);
    }

    /// Remove `ssid`'s explicit entry, falling back to the default row (if
    /// any) or no access.
    pub fn remove_entry(&mut self, ssid: u16) {
        self.entries.remove(&ssid);
    }

    /// Transfer ownership to `new_owner_ssid`. Only callable by the ACL
    /// engine after it has confirmed the requester is the current owner or
    /// the bootstrap server — this method itself performs no check.
    pub fn set_owner(&mut self, new_owner_ssid: u16) {
        self.owner_ssid = new_owner_ssid;
    }
}

/// Authorizes an ownership or ACL-entry change against the requester's
/// identity: only the current owner or the bootstrap server may mutate an
/// instance's ACL.
pub fn authorize_acl_write(acl: &Acl, requester_ssid: u16, requester_is_bootstrap: bool) -> Result<(), CoreError> {
    if requester_is_bootstrap || requester_ssid == acl.owner_ssid {
        Ok(())
    } else {
        Err(CoreError::Unauthorized {
            server_id: requester_ssid,
            operation: "acl-write",
            path: "/2".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn owner_has_full_permission() {
        let acl = Acl::new(100);
        assert_eq!(acl.resolve(100), Permission::all());
    }

    #[test]
    fn explicit_entry_overrides_default() {
        let mut acl = Acl::new(100);
        acl.set_entry(DEFAULT_SHORT_SERVER_ID, Permission::READ);
        acl.set_entry(200, Permission::WRITE);
        assert_eq!(acl.resolve(200), Permission::WRITE);
        // WRITE alone does not imply DISCOVER.
        assert!(!acl.resolve(200).contains(Permission::DISCOVER));
    }

    #[test]
    fn default_applies_when_no_explicit_entry() {
        let mut acl = Acl::new(100);
        acl.set_entry(DEFAULT_SHORT_SERVER_ID, Permission::READ);
        assert!(acl.resolve(999).contains(Permission::READ));
        assert!(acl.resolve(999).contains(Permission::DISCOVER));
    }

    #[test]
    fn no_entry_and_no_default_denies_non_owner() {
        let acl = Acl::new(100);
        assert_eq!(acl.resolve(999), Permission::empty());
        assert!(acl.check(999, Permission::READ, "read", "/3/0/1").is_err());
    }

    #[test]
    fn read_implies_discover() {
        let mut acl = Acl::new(100);
        acl.set_entry(200, Permission::READ);
        assert!(acl.resolve(200).contains(Permission::DISCOVER));
    }

    #[test]
    fn acl_write_requires_owner_or_bootstrap() {
        let acl = Acl::new(100);
        assert!(authorize_acl_write(&acl, 100, false).is_ok());
        assert!(authorize_acl_write(&acl, 1, true).is_ok());
        assert!(authorize_acl_write(&acl, 999, false).is_err());
    }

    proptest::proptest! {
        #[test]
        fn prop_no_entry_denies_non_owner(owner in 0u16..1000, requester in 0u16..1000) {
            proptest::prop_assume!(owner != requester);
            let acl = Acl::new(owner);
            prop_assert_eq!(acl.resolve(requester), Permission::empty());
        }
    }
}
