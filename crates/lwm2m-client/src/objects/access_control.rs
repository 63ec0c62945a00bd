//! Access Control object (`/2`): the object model's view onto the
//! registry's own ACL engine. Each instance of `/2` names a target
//! `(object id, instance id)` pair; its ACL resource and owner resource
//! are a thin read/write wrapper around `lwm2m_core::acl::Acl`, which the
//! registry already enforces requests against.

use lwm2m_core::{
    acl::{self as acl_mod, Permission},
    registry::{Capabilities, ObjectHandler, Registry},
};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/2/x`.
pub mod resource {
    /// Object ID the ACL instance targets.
    pub const OBJECT_ID: u16 = 0;
    /// Object Instance ID the ACL instance targets.
    pub const OBJECT_INSTANCE_ID: u16 = 1;
    /// ACL: a multi-instance resource keyed by short server id.
    pub const ACL: u16 = 2;
    /// Access Control Owner: the short server id that owns the target.
    pub const ACCESS_CONTROL_OWNER: u16 = 3;
}

/// One `/2/x` instance: which `(object id, instance id)` it targets.
#[derive(Debug, Clone, Copy)]
pub struct AccessControlInstance {
    /// Instance id of this `/2/x` entry.
    pub instance_id: u16,
    /// Target object id.
    pub target_object_id: u16,
    /// Target instance id.
    pub target_instance_id: u16,
}

/// The Access Control object (`/2`).
#[derive(Debug, Clone, Default)]
pub struct AccessControlObject {
    instances: Vec<AccessControlInstance>,
}

impl AccessControlObject {
    /// An object with no instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a `/2/x` instance targeting `(target_object_id,
    /// target_instance_id)`.
    pub fn put_instance(&mut self, instance: AccessControlInstance) {
        if let Some(existing) = self.instances.iter_mut().find(|i| i.instance_id == instance.instance_id) {
            *existing = instance;
        } else {
            self.instances.push(instance);
        }
    }

    /// Remove a `/2/x` instance (bootstrap delete).
    pub fn remove_instance(&mut self, instance_id: u16) {
        self.instances.retain(|i| i.instance_id != instance_id);
    }

    fn instance(&self, instance_id: u16) -> Result<AccessControlInstance, ClientError> {
        self.instances
            .iter()
            .copied()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/2/{instance_id}"))))
    }

    /// Read a resource, consulting `registry` for the live ACL state of
    /// the targeted instance.
    pub fn read(
        &self,
        registry: &mut Registry,
        instance_id: u16,
        resource_id: u16,
        entry_ssid: Option<u16>,
    ) -> Result<ResourceValue, ClientError> {
        let target = self.instance(instance_id)?;
        Ok(match resource_id {
            resource::OBJECT_ID => ResourceValue::Integer(i64::from(target.target_object_id)),
            resource::OBJECT_INSTANCE_ID => ResourceValue::Integer(i64::from(target.target_instance_id)),
            resource::ACCESS_CONTROL_OWNER => {
                let acl = registry.acl_for(target.target_object_id, target.target_instance_id);
                ResourceValue::Integer(i64::from(acl.owner_ssid))
            },
            resource::ACL => {
                let ssid = entry_ssid.ok_or(ClientError::Core(lwm2m_core::CoreError::InvalidArgument(
                    "ACL resource reads require a server-id instance index",
                )))?;
                let acl = registry.acl_for(target.target_object_id, target.target_instance_id);
                let mask = acl.entries.get(&ssid).copied().unwrap_or(Permission::empty());
                ResourceValue::Integer(i64::from(mask.bits()))
            },
            _ => return Err(not_found(instance_id, resource_id)),
        })
    }

    /// Set one server's permission mask on the targeted instance's ACL.
    /// Caller (the registry dispatch path) is responsible for confirming
    /// the write itself was authorized via
    /// [`acl_mod::authorize_acl_write`].
    pub fn set_acl_entry(
        &self,
        registry: &mut Registry,
        instance_id: u16,
        ssid: u16,
        mask: Permission,
    ) -> Result<(), ClientError> {
        let target = self.instance(instance_id)?;
        let acl = registry.acl_for(target.target_object_id, target.target_instance_id);
        acl.set_entry(ssid, mask);
        Ok(())
    }

    /// Transfer ownership of the targeted instance's ACL to
    /// `new_owner_ssid`, after confirming `requester_ssid` is allowed to.
    pub fn transfer_owner(
        &self,
        registry: &mut Registry,
        instance_id: u16,
        requester_ssid: u16,
        requester_is_bootstrap: bool,
        new_owner_ssid: u16,
    ) -> Result<(), ClientError> {
        let target = self.instance(instance_id)?;
        let acl = registry.acl_for(target.target_object_id, target.target_instance_id);
        acl_mod::authorize_acl_write(acl, requester_ssid, requester_is_bootstrap)?;
        acl.set_owner(new_owner_ssid);
        Ok(())
    }

    /// Apply a whole-instance payload (bootstrap `PUT /2/x` with no
    /// resource in the path): registers the `(object id, instance id)`
    /// target and seeds the owner and ACL entries `resources` carries.
    /// `resources` is trusted as already authorized by the caller, same as
    /// [`Self::set_acl_entry`].
    pub fn write_instance(
        &mut self,
        registry: &mut Registry,
        instance_id: u16,
        resources: &[(u16, ResourceValue)],
    ) -> Result<(), ClientError> {
        let mut target_object_id = None;
        let mut target_instance_id = 0;
        let mut owner = None;
        let mut acl_entries = Vec::new();
        for (resource_id, value) in resources {
            match (*resource_id, value) {
                (resource::OBJECT_ID, ResourceValue::Integer(v)) => target_object_id = Some(*v as u16),
                (resource::OBJECT_INSTANCE_ID, ResourceValue::Integer(v)) => target_instance_id = *v as u16,
                (resource::ACCESS_CONTROL_OWNER, ResourceValue::Integer(v)) => owner = Some(*v as u16),
                (resource::ACL, ResourceValue::Instance(entries)) => {
                    for (ssid, mask) in entries {
                        if let ResourceValue::Integer(bits) = mask {
                            acl_entries.push((*ssid, Permission::from_bits_truncate(*bits as u8)));
                        }
                    }
                },
                (rid, _) => return Err(not_found(instance_id, rid)),
            }
        }
        let target_object_id = target_object_id.ok_or(ClientError::Core(lwm2m_core::CoreError::InvalidArgument(
            "access control instance requires an Object ID",
        )))?;

        self.put_instance(AccessControlInstance { instance_id, target_object_id, target_instance_id });
        let acl = registry.acl_for(target_object_id, target_instance_id);
        if let Some(owner_ssid) = owner {
            acl.set_owner(owner_ssid);
        }
        for (ssid, mask) in acl_entries {
            acl.set_entry(ssid, mask);
        }
        Ok(())
    }
}

fn not_found(instance_id: u16, resource_id: u16) -> ClientError {
    ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/2/{instance_id}/{resource_id}")))
}

impl ObjectHandler for AccessControlObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::CREATE | Capabilities::DELETE | Capabilities::DISCOVER
    }

    fn instance_ids(&self) -> Vec<u16> {
        self.instances.iter().map(|i| i.instance_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acl_resource_reflects_registry_state() {
        let mut registry = Registry::new();
        registry.acl_for(3, 0).set_entry(5, Permission::READ);

        let mut obj = AccessControlObject::new();
        obj.put_instance(AccessControlInstance { instance_id: 0, target_object_id: 3, target_instance_id: 0 });

        let value = obj.read(&mut registry, 0, resource::ACL, Some(5)).unwrap();
        assert_eq!(value, ResourceValue::Integer(Permission::READ.bits().into()));
    }

    #[test]
    fn owner_transfer_requires_authorization() {
        let mut registry = Registry::new();
        registry.acl_for(3, 0).set_owner(100);

        let mut obj = AccessControlObject::new();
        obj.put_instance(AccessControlInstance { instance_id: 0, target_object_id: 3, target_instance_id: 0 });

        assert!(obj.transfer_owner(&mut registry, 0, 999, false, 200).is_err());
        obj.transfer_owner(&mut registry, 0, 100, false, 200).unwrap();
        assert_eq!(
            obj.read(&mut registry, 0, resource::ACCESS_CONTROL_OWNER, None).unwrap(),
            ResourceValue::Integer(200)
        );
    }

    #[test]
    fn remove_instance_drops_it() {
        let mut obj = AccessControlObject::new();
        obj.put_instance(AccessControlInstance { instance_id: 0, target_object_id: 3, target_instance_id: 0 });
        obj.remove_instance(0);
        assert!(obj.instance_ids().is_empty());
    }

    #[test]
    fn write_instance_seeds_owner_and_acl_entries() {
        let mut registry = Registry::new();
        let mut obj = AccessControlObject::new();
        obj.write_instance(
            &mut registry,
            0,
            &[
                (resource::OBJECT_ID, ResourceValue::Integer(3)),
                (resource::OBJECT_INSTANCE_ID, ResourceValue::Integer(0)),
                (resource::ACCESS_CONTROL_OWNER, ResourceValue::Integer(100)),
                (
                    resource::ACL,
                    ResourceValue::Instance(vec![(123, ResourceValue::Integer(Permission::READ.bits().into()))]),
                ),
            ],
        )
        .unwrap();
        assert_eq!(
            obj.read(&mut registry, 0, resource::ACCESS_CONTROL_OWNER, None).unwrap(),
            ResourceValue::Integer(100)
        );
        assert_eq!(
            obj.read(&mut registry, 0, resource::ACL, Some(123)).unwrap(),
            ResourceValue::Integer(Permission::READ.bits().into())
        );
    }
}
