//! Server object (`/1`): per-server registration parameters, plus the two
//! executable resources that feed the lifecycle state machine.

use lwm2m_core::registry::{Capabilities, ObjectHandler};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/1/x`.
pub mod resource {
    /// Short Server ID.
    pub const SHORT_SERVER_ID: u16 = 0;
    /// Lifetime, seconds.
    pub const LIFETIME: u16 = 1;
    /// Default Minimum Period.
    pub const DEFAULT_MIN_PERIOD: u16 = 2;
    /// Default Maximum Period.
    pub const DEFAULT_MAX_PERIOD: u16 = 3;
    /// Disable (execute): deregister and stay disabled for `DISABLE_TIMEOUT`.
    pub const DISABLE: u16 = 4;
    /// Disable Timeout, seconds.
    pub const DISABLE_TIMEOUT: u16 = 5;
    /// Notification Storing When Disabled or Offline.
    pub const NOTIFICATION_STORING: u16 = 6;
    /// Binding (e.g. "U" for UDP, "UQ" for UDP queue mode).
    pub const BINDING: u16 = 7;
    /// Registration Update Trigger (execute).
    pub const REGISTRATION_UPDATE_TRIGGER: u16 = 8;
}

/// What invoking an executable Server resource should cause the caller
/// to do. The object itself only validates and reports; driving the
/// lifecycle state machine is the caller's job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerExecuteEffect {
    /// `/1/x/4` was invoked: deregister and hold off re-registering.
    Disable,
    /// `/1/x/8` was invoked: force an immediate Update.
    UpdateTrigger,
}

/// One configured server's registration parameters.
#[derive(Debug, Clone)]
pub struct ServerInstance {
    /// Instance id.
    pub instance_id: u16,
    /// Short server id, binding this instance to a `/0` Security instance.
    pub short_server_id: u16,
    /// Registration lifetime, seconds.
    pub lifetime: u32,
    /// Default minimum notification period, seconds.
    pub default_min_period: u32,
    /// Default maximum notification period, seconds.
    pub default_max_period: Option<u32>,
    /// How long `Disabled` lasts after `/1/x/4` is invoked, seconds.
    pub disable_timeout: u32,
    /// Whether notifications should be buffered while offline.
    pub notification_storing: bool,
    /// Transport binding mode string.
    pub binding: String,
}

impl Default for ServerInstance {
    fn default() -> Self {
        Self {
            instance_id: 0,
            short_server_id: 1,
            lifetime: 86400,
            default_min_period: 1,
            default_max_period: None,
            disable_timeout: 86400,
            notification_storing: true,
            binding: "U".to_string(),
        }
    }
}

/// The Server object (`/1`).
#[derive(Debug, Clone, Default)]
pub struct ServerObject {
    instances: Vec<ServerInstance>,
}

impl ServerObject {
    /// An object with no instances.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an instance.
    pub fn put_instance(&mut self, instance: ServerInstance) {
        if let Some(existing) = self.instances.iter_mut().find(|i| i.instance_id == instance.instance_id) {
            *existing = instance;
        } else {
            self.instances.push(instance);
        }
    }

    /// The instance bound to `short_server_id`.
    pub fn instance_for_server(&self, short_server_id: u16) -> Option<&ServerInstance> {
        self.instances.iter().find(|i| i.short_server_id == short_server_id)
    }

    fn instance(&self, instance_id: u16) -> Result<&ServerInstance, ClientError> {
        self.instances
            .iter()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/1/{instance_id}"))))
    }

    /// Read `resource_id` of `instance_id`.
    pub fn read(&self, instance_id: u16, resource_id: u16) -> Result<ResourceValue, ClientError> {
        let inst = self.instance(instance_id)?;
        Ok(match resource_id {
            resource::SHORT_SERVER_ID => ResourceValue::Integer(i64::from(inst.short_server_id)),
            resource::LIFETIME => ResourceValue::Integer(i64::from(inst.lifetime)),
            resource::DEFAULT_MIN_PERIOD => ResourceValue::Integer(i64::from(inst.default_min_period)),
            resource::DEFAULT_MAX_PERIOD => {
                ResourceValue::Integer(i64::from(inst.default_max_period.unwrap_or(0)))
            },
            resource::DISABLE_TIMEOUT => ResourceValue::Integer(i64::from(inst.disable_timeout)),
            resource::NOTIFICATION_STORING => ResourceValue::Boolean(inst.notification_storing),
            resource::BINDING => ResourceValue::String(inst.binding.clone()),
            _ => return Err(not_found(instance_id, resource_id)),
        })
    }

    /// Write `resource_id` of `instance_id`. Only the resources a server
    /// may legitimately update post-bootstrap are writable.
    pub fn write(&mut self, instance_id: u16, resource_id: u16, value: ResourceValue) -> Result<(), ClientError> {
        let exists = self.instance(instance_id).is_ok();
        if !exists {
            return Err(ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/1/{instance_id}"))));
        }
        let inst = self.instances.iter_mut().find(|i| i.instance_id == instance_id).expect("checked above");
        match (resource_id, value) {
            (resource::LIFETIME, ResourceValue::Integer(v)) => inst.lifetime = v.max(1) as u32,
            (resource::DEFAULT_MIN_PERIOD, ResourceValue::Integer(v)) => inst.default_min_period = v.max(0) as u32,
            (resource::DEFAULT_MAX_PERIOD, ResourceValue::Integer(v)) => inst.default_max_period = Some(v.max(0) as u32),
            (resource::DISABLE_TIMEOUT, ResourceValue::Integer(v)) => inst.disable_timeout = v.max(0) as u32,
            (resource::NOTIFICATION_STORING, ResourceValue::Boolean(v)) => inst.notification_storing = v,
            (resource::BINDING, ResourceValue::String(v)) => inst.binding = v,
            (rid, _) => return Err(not_found(instance_id, rid)),
        }
        Ok(())
    }

    /// Apply a whole-instance payload (bootstrap `PUT /1/x` with no
    /// resource in the path): starts from the existing instance if one is
    /// present, else the field defaults, and overwrites whichever
    /// resources `resources` names.
    pub fn write_instance(&mut self, instance_id: u16, resources: &[(u16, ResourceValue)]) -> Result<(), ClientError> {
        let mut inst = match self.instance(instance_id) {
            Ok(existing) => existing.clone(),
            Err(_) => ServerInstance { instance_id, ..Default::default() },
        };
        for (resource_id, value) in resources {
            let value = value.clone();
            match (*resource_id, value) {
                (resource::LIFETIME, ResourceValue::Integer(v)) => inst.lifetime = v.max(1) as u32,
                (resource::DEFAULT_MIN_PERIOD, ResourceValue::Integer(v)) => inst.default_min_period = v.max(0) as u32,
                (resource::DEFAULT_MAX_PERIOD, ResourceValue::Integer(v)) => {
                    inst.default_max_period = Some(v.max(0) as u32);
                },
                (resource::DISABLE_TIMEOUT, ResourceValue::Integer(v)) => inst.disable_timeout = v.max(0) as u32,
                (resource::NOTIFICATION_STORING, ResourceValue::Boolean(v)) => inst.notification_storing = v,
                (resource::BINDING, ResourceValue::String(v)) => inst.binding = v,
                (resource::SHORT_SERVER_ID, ResourceValue::Integer(v)) => inst.short_server_id = v.max(0) as u16,
                (rid, _) => return Err(not_found(instance_id, rid)),
            }
        }
        self.put_instance(inst);
        Ok(())
    }

    /// Invoke an executable resource.
    pub fn execute(&self, instance_id: u16, resource_id: u16) -> Result<ServerExecuteEffect, ClientError> {
        self.instance(instance_id)?;
        match resource_id {
            resource::DISABLE => Ok(ServerExecuteEffect::Disable),
            resource::REGISTRATION_UPDATE_TRIGGER => Ok(ServerExecuteEffect::UpdateTrigger),
            _ => Err(not_found(instance_id, resource_id)),
        }
    }
}

fn not_found(instance_id: u16, resource_id: u16) -> ClientError {
    ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/1/{instance_id}/{resource_id}")))
}

impl ObjectHandler for ServerObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::DISCOVER | Capabilities::OBSERVE
    }

    fn permitted(&self, resource_id: u16) -> Capabilities {
        match resource_id {
            resource::DISABLE | resource::REGISTRATION_UPDATE_TRIGGER => Capabilities::EXECUTE,
            _ => self.capabilities(),
        }
    }

    fn instance_ids(&self) -> Vec<u16> {
        self.instances.iter().map(|i| i.instance_id).collect()
    }
}
