//! Security object (`/0`): bootstrap and operational server credentials.
//!
//! Never exposed to operational servers in practice — every instance's
//! ACL is owned by the bootstrap short server id, and no default entry is
//! ever added, so the registry's ordinary ACL resolution denies anyone
//! else without needing a special case here.

use lwm2m_core::registry::{Capabilities, ObjectHandler};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/0/x`.
pub mod resource {
    /// LWM2M Server URI.
    pub const SERVER_URI: u16 = 0;
    /// Bootstrap-Server (true if this instance is the bootstrap server).
    pub const BOOTSTRAP_SERVER: u16 = 1;
    /// Security Mode.
    pub const SECURITY_MODE: u16 = 2;
    /// Public Key or Identity.
    pub const PUBLIC_KEY_OR_IDENTITY: u16 = 3;
    /// Server Public Key.
    pub const SERVER_PUBLIC_KEY: u16 = 4;
    /// Secret Key.
    pub const SECRET_KEY: u16 = 5;
    /// Short Server ID.
    pub const SHORT_SERVER_ID: u16 = 10;
    /// Client Hold Off Time, seconds.
    pub const CLIENT_HOLD_OFF_TIME: u16 = 11;
}

/// One Security instance, either the bootstrap server or an operational
/// server's credentials.
#[derive(Debug, Clone)]
pub struct SecurityInstance {
    /// Instance id.
    pub instance_id: u16,
    /// `coaps://host:port` or `coap://host:port`.
    pub server_uri: String,
    /// Whether this instance describes the bootstrap server.
    pub is_bootstrap_server: bool,
    /// Security mode (0 = PSK, 1 = RPK, 2 = certificate, 3 = none).
    pub security_mode: u8,
    /// PSK identity or RPK/certificate public key material.
    pub public_key_or_identity: Vec<u8>,
    /// Server's RPK or certificate.
    pub server_public_key: Vec<u8>,
    /// PSK secret, RPK, or certificate private key.
    pub secret_key: Vec<u8>,
    /// Short server id this instance's credentials authenticate to.
    /// Absent for the bootstrap server instance.
    pub short_server_id: Option<u16>,
    /// Hold-off before the first bootstrap attempt, seconds.
    pub client_hold_off_time: Option<u32>,
}

/// The Security object (`/0`): the device's bootstrap and operational
/// server credential store.
#[derive(Debug, Clone, Default)]
pub struct SecurityObject {
    instances: Vec<SecurityInstance>,
}

impl SecurityObject {
    /// An object with no instances (pre-bootstrap).
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an instance (bootstrap write).
    pub fn put_instance(&mut self, instance: SecurityInstance) {
        if let Some(existing) = self.instances.iter_mut().find(|i| i.instance_id == instance.instance_id) {
            *existing = instance;
        } else {
            self.instances.push(instance);
        }
    }

    /// Remove an instance (bootstrap delete / factory reset).
    pub fn remove_instance(&mut self, instance_id: u16) {
        self.instances.retain(|i| i.instance_id != instance_id);
    }

    /// Write a single resource of an existing instance.
    pub fn write(&mut self, instance_id: u16, resource_id: u16, value: ResourceValue) -> Result<(), ClientError> {
        let mut inst = self.instance(instance_id)?.clone();
        apply_resource(&mut inst, resource_id, &value)?;
        self.put_instance(inst);
        Ok(())
    }

    /// Apply a whole-instance payload (bootstrap `PUT /0/x` with no
    /// resource in the path): starts from the existing instance if one is
    /// present, else a blank one, and overwrites whichever resources
    /// `resources` names.
    pub fn write_instance(&mut self, instance_id: u16, resources: &[(u16, ResourceValue)]) -> Result<(), ClientError> {
        let mut inst = match self.instance(instance_id) {
            Ok(existing) => existing.clone(),
            Err(_) => blank_instance(instance_id),
        };
        for (resource_id, value) in resources {
            apply_resource(&mut inst, *resource_id, value)?;
        }
        self.put_instance(inst);
        Ok(())
    }

    /// The bootstrap server's instance, if one is configured.
    pub fn bootstrap_instance(&self) -> Option<&SecurityInstance> {
        self.instances.iter().find(|i| i.is_bootstrap_server)
    }

    /// The operational server instance bound to `short_server_id`.
    pub fn instance_for_server(&self, short_server_id: u16) -> Option<&SecurityInstance> {
        self.instances.iter().find(|i| i.short_server_id == Some(short_server_id))
    }

    /// The first configured operational (non-bootstrap) server instance, if
    /// any. Consulted right after a bootstrap finishes, when the device
    /// knows the bootstrap server provisioned at least one operational
    /// server but has not yet picked which one to register with.
    pub fn first_operational_instance(&self) -> Option<&SecurityInstance> {
        self.instances.iter().find(|i| !i.is_bootstrap_server)
    }

    fn instance(&self, instance_id: u16) -> Result<&SecurityInstance, ClientError> {
        self.instances
            .iter()
            .find(|i| i.instance_id == instance_id)
            .ok_or_else(|| ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/0/{instance_id}"))))
    }

    /// Read `resource_id` of `instance_id`.
    pub fn read(&self, instance_id: u16, resource_id: u16) -> Result<ResourceValue, ClientError> {
        let inst = self.instance(instance_id)?;
        Ok(match resource_id {
            resource::SERVER_URI => ResourceValue::String(inst.server_uri.clone()),
            resource::BOOTSTRAP_SERVER => ResourceValue::Boolean(inst.is_bootstrap_server),
            resource::SECURITY_MODE => ResourceValue::Integer(i64::from(inst.security_mode)),
            resource::PUBLIC_KEY_OR_IDENTITY => ResourceValue::Opaque(inst.public_key_or_identity.clone()),
            resource::SERVER_PUBLIC_KEY => ResourceValue::Opaque(inst.server_public_key.clone()),
            resource::SECRET_KEY => ResourceValue::Opaque(inst.secret_key.clone()),
            resource::SHORT_SERVER_ID => ResourceValue::Integer(i64::from(inst.short_server_id.unwrap_or(0))),
            resource::CLIENT_HOLD_OFF_TIME => {
                ResourceValue::Integer(i64::from(inst.client_hold_off_time.unwrap_or(0)))
            },
            _ => return Err(not_found(instance_id, resource_id)),
        })
    }
}

fn not_found(instance_id: u16, resource_id: u16) -> ClientError {
    ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/0/{instance_id}/{resource_id}")))
}

fn blank_instance(instance_id: u16) -> SecurityInstance {
    SecurityInstance {
        instance_id,
        server_uri: String::new(),
        is_bootstrap_server: false,
        security_mode: 0,
        public_key_or_identity: Vec::new(),
        server_public_key: Vec::new(),
        secret_key: Vec::new(),
        short_server_id: None,
        client_hold_off_time: None,
    }
}

fn apply_resource(inst: &mut SecurityInstance, resource_id: u16, value: &ResourceValue) -> Result<(), ClientError> {
    match (resource_id, value) {
        (resource::SERVER_URI, ResourceValue::String(v)) => inst.server_uri = v.clone(),
        (resource::BOOTSTRAP_SERVER, ResourceValue::Boolean(v)) => inst.is_bootstrap_server = *v,
        (resource::SECURITY_MODE, ResourceValue::Integer(v)) => inst.security_mode = *v as u8,
        (resource::PUBLIC_KEY_OR_IDENTITY, ResourceValue::Opaque(v)) => inst.public_key_or_identity = v.clone(),
        (resource::SERVER_PUBLIC_KEY, ResourceValue::Opaque(v)) => inst.server_public_key = v.clone(),
        (resource::SECRET_KEY, ResourceValue::Opaque(v)) => inst.secret_key = v.clone(),
        (resource::SHORT_SERVER_ID, ResourceValue::Integer(v)) => inst.short_server_id = Some(*v as u16),
        (resource::CLIENT_HOLD_OFF_TIME, ResourceValue::Integer(v)) => inst.client_hold_off_time = Some(*v as u32),
        (rid, _) => return Err(not_found(inst.instance_id, rid)),
    }
    Ok(())
}

impl ObjectHandler for SecurityObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::CREATE | Capabilities::DELETE
    }

    fn instance_ids(&self) -> Vec<u16> {
        self.instances.iter().map(|i| i.instance_id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(instance_id: u16, bootstrap: bool) -> SecurityInstance {
        SecurityInstance {
            instance_id,
            server_uri: "coaps://bootstrap.example:5684".to_string(),
            is_bootstrap_server: bootstrap,
            security_mode: 0,
            public_key_or_identity: b"client-psk-id".to_vec(),
            server_public_key: Vec::new(),
            secret_key: b"secret".to_vec(),
            short_server_id: if bootstrap { None } else { Some(123) },
            client_hold_off_time: if bootstrap { Some(5) } else { None },
        }
    }

    #[test]
    fn bootstrap_instance_is_found_by_flag() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        obj.put_instance(sample(1, false));
        assert_eq!(obj.bootstrap_instance().unwrap().instance_id, 0);
        assert_eq!(obj.instance_for_server(123).unwrap().instance_id, 1);
    }

    #[test]
    fn first_operational_instance_skips_bootstrap_entry() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        obj.put_instance(sample(1, false));
        assert_eq!(obj.first_operational_instance().unwrap().instance_id, 1);
    }

    #[test]
    fn read_round_trips_server_uri() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        assert_eq!(
            obj.read(0, resource::SERVER_URI).unwrap(),
            ResourceValue::String("coaps://bootstrap.example:5684".to_string())
        );
    }

    #[test]
    fn unknown_resource_is_not_found() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        assert!(obj.read(0, 99).is_err());
    }

    #[test]
    fn remove_instance_drops_it() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        obj.remove_instance(0);
        assert!(obj.instance_ids().is_empty());
    }

    #[test]
    fn write_instance_creates_from_scratch() {
        let mut obj = SecurityObject::new();
        obj.write_instance(
            1,
            &[
                (resource::SERVER_URI, ResourceValue::String("coap://server:5683".to_string())),
                (resource::SECURITY_MODE, ResourceValue::Integer(3)),
                (resource::SHORT_SERVER_ID, ResourceValue::Integer(123)),
            ],
        )
        .unwrap();
        assert_eq!(obj.read(1, resource::SERVER_URI).unwrap(), ResourceValue::String("coap://server:5683".to_string()));
        assert_eq!(obj.instance_for_server(123).unwrap().instance_id, 1);
    }

    #[test]
    fn write_updates_existing_instance_in_place() {
        let mut obj = SecurityObject::new();
        obj.put_instance(sample(0, true));
        obj.write(0, resource::SECRET_KEY, ResourceValue::Opaque(b"rotated".to_vec())).unwrap();
        assert_eq!(obj.read(0, resource::SECRET_KEY).unwrap(), ResourceValue::Opaque(b"rotated".to_vec()));
        assert!(obj.bootstrap_instance().is_some());
    }
}
