//! Top-level object model aggregate.
//!
//! [`Lwm2mClient`] owns the six object handlers every constrained device
//! exposes plus the ACL table gating them, and dispatches a decoded
//! request to the right one. Like the registry it builds on, dispatch is
//! pure: no socket, no clock beyond what the caller supplies.

use lwm2m_core::{
    acl::Permission,
    error::CoreError,
    registry::{self, Capabilities, ObjectHandler, Operation, Path, Registry},
};
use lwm2m_proto::{BlockOption, Code, CoapOption, number, option_as_uint};

use crate::{
    error::ClientError,
    objects::{
        AccessControlObject, ConnectivityObject, DeviceObject, FirmwareObject, ResourceValue,
        SecurityObject, ServerObject,
    },
};

/// Object id/alias table, used to resolve both numeric and named path
/// segments the same way the registry does.
const OBJECT_ALIASES: &[(&str, u16)] = &[
    ("security", 0),
    ("server", 1),
    ("access-control", 2),
    ("device", 3),
    ("connectivity", 4),
    ("firmware", 5),
];

/// What invoking an executable resource, anywhere in the object model,
/// should cause the caller (the per-server lifecycle context, or the
/// orchestration layer) to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteEffect {
    /// `/3/0/4`.
    Reboot,
    /// `/3/0/5`.
    FactoryReset,
    /// `/1/x/4`.
    Disable,
    /// `/1/x/8`.
    UpdateTrigger,
    /// `/5/0/2`.
    ScheduleFirmwareReboot,
}

/// The result of dispatching one decoded request into the object model.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// A `Read` or `Discover` resolved to this value.
    Value(ResourceValue),
    /// A `Write` or `Create` completed.
    Written,
    /// One non-final `Block1` segment of a block-wise write landed; the
    /// caller replies `2.31 Continue` echoing this descriptor rather than
    /// `2.04 Changed`, since the object hasn't actually changed yet.
    WrittenPartial {
        /// The `Block1` descriptor the request carried, echoed back as-is.
        block: BlockOption,
    },
    /// A `Delete` completed.
    Deleted,
    /// An `Execute` completed, with this effect for the caller to act on.
    /// `None` for executable resources with no caller-visible effect
    /// (e.g. `/3/0/12` Reset Error Code).
    Executed(Option<ExecuteEffect>),
    /// An `Observe` request resolved to this current value; `register` is
    /// `true` to subscribe, `false` to cancel. The object model only
    /// validates and reads here — the observer store and notification
    /// timers live with the caller, which owns the socket the
    /// notifications go out on.
    Observed {
        /// The resource's current value, echoed back the same way a Read
        /// response would be.
        value: ResourceValue,
        /// `true` to subscribe, `false` to cancel.
        register: bool,
    },
}

/// The full constrained-device object model: Security, Server,
/// Access-Control, Device, Connectivity, and Firmware.
pub struct Lwm2mClient {
    acls: Registry,
    security: SecurityObject,
    server: ServerObject,
    access_control: AccessControlObject,
    device: DeviceObject,
    connectivity: ConnectivityObject,
    firmware: FirmwareObject,
}

impl Lwm2mClient {
    /// A client with the given device identity and every other object
    /// empty, awaiting bootstrap.
    pub fn new(device: DeviceObject) -> Self {
        Self {
            acls: Registry::new(),
            security: SecurityObject::new(),
            server: ServerObject::new(),
            access_control: AccessControlObject::new(),
            device,
            connectivity: ConnectivityObject::new(),
            firmware: FirmwareObject::new(),
        }
    }

    /// Read-only access to the Security object.
    pub fn security(&self) -> &SecurityObject {
        &self.security
    }

    /// Mutable access to the Security object (bootstrap writes).
    pub fn security_mut(&mut self) -> &mut SecurityObject {
        &mut self.security
    }

    /// Read-only access to the Server object.
    pub fn server(&self) -> &ServerObject {
        &self.server
    }

    /// Mutable access to the Server object (bootstrap writes).
    pub fn server_mut(&mut self) -> &mut ServerObject {
        &mut self.server
    }

    /// Read-only access to the Access-Control object.
    pub fn access_control(&self) -> &AccessControlObject {
        &self.access_control
    }

    /// Mutable access to the Access-Control object.
    pub fn access_control_mut(&mut self) -> &mut AccessControlObject {
        &mut self.access_control
    }

    /// Read-only access to the Device object.
    pub fn device(&self) -> &DeviceObject {
        &self.device
    }

    /// Mutable access to the Device object.
    pub fn device_mut(&mut self) -> &mut DeviceObject {
        &mut self.device
    }

    /// Read-only access to the Connectivity object.
    pub fn connectivity(&self) -> &ConnectivityObject {
        &self.connectivity
    }

    /// Mutable access to the Connectivity object (modem telemetry
    /// updates).
    pub fn connectivity_mut(&mut self) -> &mut ConnectivityObject {
        &mut self.connectivity
    }

    /// Read-only access to the Firmware object.
    pub fn firmware(&self) -> &FirmwareObject {
        &self.firmware
    }

    /// Mutable access to the Firmware object.
    pub fn firmware_mut(&mut self) -> &mut FirmwareObject {
        &mut self.firmware
    }

    /// The ACL/path-parsing registry backing every instance's access
    /// control. Exposed so bootstrap writes can seed ownership directly.
    pub fn acls_mut(&mut self) -> &mut Registry {
        &mut self.acls
    }

    fn capabilities_and_exists(&self, object_id: u16, instance_id: Option<u16>, resource_id: Option<u16>) -> Result<(Capabilities, bool), ClientError> {
        let (caps_fn, exists): (Capabilities, bool) = match object_id {
            0 => {
                let exists = instance_id.is_some_and(|iid| self.security.instance_exists(iid));
                let caps = resource_id.map_or_else(|| self.security.capabilities(), |r| self.security.permitted(r));
                (caps, exists)
            },
            1 => {
                let exists = instance_id.is_some_and(|iid| self.server.instance_exists(iid));
                let caps = resource_id.map_or_else(|| self.server.capabilities(), |r| self.server.permitted(r));
                (caps, exists)
            },
            2 => {
                let exists = instance_id.is_some_and(|iid| self.access_control.instance_exists(iid));
                let caps = resource_id
                    .map_or_else(|| self.access_control.capabilities(), |r| self.access_control.permitted(r));
                (caps, exists)
            },
            3 => {
                let exists = instance_id.is_none_or(|iid| self.device.instance_exists(iid));
                let caps = resource_id.map_or_else(|| self.device.capabilities(), |r| self.device.permitted(r));
                (caps, exists)
            },
            4 => {
                let exists = instance_id.is_none_or(|iid| self.connectivity.instance_exists(iid));
                let caps =
                    resource_id.map_or_else(|| self.connectivity.capabilities(), |r| self.connectivity.permitted(r));
                (caps, exists)
            },
            5 => {
                let exists = instance_id.is_none_or(|iid| self.firmware.instance_exists(iid));
                let caps = resource_id.map_or_else(|| self.firmware.capabilities(), |r| self.firmware.permitted(r));
                (caps, exists)
            },
            _ => return Err(ClientError::Core(CoreError::NotFound(format!("/{object_id}")))),
        };
        Ok((caps_fn, exists))
    }

    /// Parse, authorize, and dispatch one decoded request.
    ///
    /// `requester_ssid` is the short server id of whoever sent the
    /// request; `requester_is_bootstrap` bypasses the per-instance ACL
    /// check entirely, per the bootstrap server's blanket authority.
    pub fn dispatch(
        &mut self,
        path_segments: &[&str],
        code: Code,
        options: &[CoapOption],
        payload: Option<ResourceValue>,
        requester_ssid: u16,
        requester_is_bootstrap: bool,
        now_unix: i64,
    ) -> Result<DispatchOutcome, ClientError> {
        let path = Path::parse(path_segments, OBJECT_ALIASES)?;
        let (link_format, observe) = registry::request_hints(options);
        let (capabilities, instance_exists) =
            self.capabilities_and_exists(path.object_id, path.instance_id, path.resource_id)?;
        let operation = registry::resolve_operation(code, link_format, observe, instance_exists)?;

        let required = match operation {
            Operation::Read => Capabilities::READ,
            Operation::Discover => Capabilities::DISCOVER,
            Operation::Observe { .. } => Capabilities::OBSERVE,
            Operation::Write => Capabilities::WRITE,
            Operation::Create => Capabilities::CREATE,
            Operation::Execute => Capabilities::EXECUTE,
            Operation::Delete => Capabilities::DELETE,
        };
        if !capabilities.contains(required) {
            return Err(ClientError::Core(CoreError::MethodNotAllowed {
                operation: "dispatch",
                path: format_path(&path),
            }));
        }

        if !requester_is_bootstrap {
            if let Some(instance_id) = path.instance_id {
                let acl = self.acls.acl_for(path.object_id, instance_id);
                let required_permission = match operation {
                    Operation::Read | Operation::Observe { .. } => Permission::READ,
                    Operation::Discover => Permission::DISCOVER,
                    Operation::Write => Permission::WRITE,
                    Operation::Create => Permission::CREATE,
                    Operation::Execute => Permission::EXECUTE,
                    Operation::Delete => Permission::DELETE,
                };
                acl.check(requester_ssid, required_permission, "dispatch", &format_path(&path))?;
            }
        }

        self.invoke(
            path.object_id,
            path.instance_id,
            path.resource_id,
            operation,
            payload,
            requester_ssid,
            requester_is_bootstrap,
            now_unix,
            block1_option(options),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn invoke(
        &mut self,
        object_id: u16,
        instance_id: Option<u16>,
        resource_id: Option<u16>,
        operation: Operation,
        payload: Option<ResourceValue>,
        requester_ssid: u16,
        requester_is_bootstrap: bool,
        now_unix: i64,
        block1: Option<BlockOption>,
    ) -> Result<DispatchOutcome, ClientError> {
        let instance_id = instance_id.unwrap_or(0);

        if let Operation::Observe { register } = operation {
            let rid = resource_id.ok_or_else(|| not_found(object_id))?;
            let value = self.read_value(object_id, instance_id, rid, now_unix)?;
            return Ok(DispatchOutcome::Observed { value, register });
        }

        match (object_id, operation) {
            (0, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.security.read(instance_id, rid)?))
            },
            (0, Operation::Write) => {
                match resource_id {
                    Some(rid) => self.security.write(instance_id, rid, payload.ok_or_else(missing_payload)?)?,
                    None => self.security.write_instance(instance_id, &instance_resources(payload)?)?,
                }
                Ok(DispatchOutcome::Written)
            },
            (0, Operation::Create) => {
                self.security.write_instance(instance_id, &instance_resources(payload)?)?;
                Ok(DispatchOutcome::Written)
            },
            (0, Operation::Delete) => {
                self.security.remove_instance(instance_id);
                Ok(DispatchOutcome::Deleted)
            },
            (1, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.server.read(instance_id, rid)?))
            },
            (1, Operation::Write) => {
                match resource_id {
                    Some(rid) => self.server.write(instance_id, rid, payload.ok_or_else(missing_payload)?)?,
                    None => self.server.write_instance(instance_id, &instance_resources(payload)?)?,
                }
                Ok(DispatchOutcome::Written)
            },
            (1, Operation::Execute) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                let effect = match self.server.execute(instance_id, rid)? {
                    crate::objects::server::ServerExecuteEffect::Disable => ExecuteEffect::Disable,
                    crate::objects::server::ServerExecuteEffect::UpdateTrigger => ExecuteEffect::UpdateTrigger,
                };
                Ok(DispatchOutcome::Executed(Some(effect)))
            },
            (2, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.access_control.read(&mut self.acls, instance_id, rid, None)?))
            },
            (2, Operation::Write) => {
                use crate::objects::access_control::resource as ac_resource;
                match resource_id {
                    Some(ac_resource::ACCESS_CONTROL_OWNER) => {
                        let new_owner = match payload.ok_or_else(missing_payload)? {
                            ResourceValue::Integer(v) => v as u16,
                            _ => return Err(not_found(object_id)),
                        };
                        self.access_control.transfer_owner(
                            &mut self.acls,
                            instance_id,
                            requester_ssid,
                            requester_is_bootstrap,
                            new_owner,
                        )?;
                    },
                    Some(ac_resource::ACL) => {
                        for (ssid, mask) in instance_acl_entries(payload)? {
                            self.access_control.set_acl_entry(&mut self.acls, instance_id, ssid, mask)?;
                        }
                    },
                    Some(_) => return Err(not_found(object_id)),
                    None => {
                        self.access_control.write_instance(&mut self.acls, instance_id, &instance_resources(payload)?)?;
                    },
                }
                Ok(DispatchOutcome::Written)
            },
            (2, Operation::Create) => {
                self.access_control.write_instance(&mut self.acls, instance_id, &instance_resources(payload)?)?;
                Ok(DispatchOutcome::Written)
            },
            (2, Operation::Delete) => {
                self.access_control.remove_instance(instance_id);
                Ok(DispatchOutcome::Deleted)
            },
            (3, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.device.read(rid, 0, now_unix)?))
            },
            (3, Operation::Write) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                self.device.write(rid, payload.ok_or_else(missing_payload)?, now_unix)?;
                Ok(DispatchOutcome::Written)
            },
            (3, Operation::Execute) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                let effect = self.device.execute(rid)?.map(|e| match e {
                    crate::objects::device::DeviceExecuteEffect::Reboot => ExecuteEffect::Reboot,
                    crate::objects::device::DeviceExecuteEffect::FactoryReset => ExecuteEffect::FactoryReset,
                });
                Ok(DispatchOutcome::Executed(effect))
            },
            (4, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.connectivity.read(rid, 0)?))
            },
            (5, Operation::Read) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                Ok(DispatchOutcome::Value(self.firmware.read(rid)?))
            },
            (5, Operation::Write) => {
                let rid = resource_id.ok_or_else(|| not_found(object_id))?;
                match (rid, payload.ok_or_else(missing_payload)?) {
                    (crate::objects::firmware::resource::PACKAGE_URI, ResourceValue::String(uri)) => {
                        self.firmware.write_package_uri(uri)?;
                        Ok(DispatchOutcome::Written)
                    },
                    (crate::objects::firmware::resource::PACKAGE, ResourceValue::Opaque(bytes)) => {
                        match block1 {
                            Some(block) if block.more => {
                                self.firmware.write_package_block(&bytes, None)?;
                                Ok(DispatchOutcome::WrittenPartial { block })
                            },
                            _ => {
                                self.firmware.write_package_block(&bytes, Some(true))?;
                                Ok(DispatchOutcome::Written)
                            },
                        }
                    },
                    _ => Err(not_found(object_id)),
                }
            },
            (5, Operation::Execute) => {
                self.firmware.execute_update()?;
                Ok(DispatchOutcome::Executed(Some(ExecuteEffect::ScheduleFirmwareReboot)))
            },
            _ => Err(ClientError::Core(CoreError::MethodNotAllowed {
                operation: "dispatch",
                path: format!("/{object_id}"),
            })),
        }
    }

    /// Read a single resource's value regardless of which object owns it,
    /// for the generic Observe path: unlike the per-object `Read` arms
    /// above, the caller only knows it resolved to a resource capable of
    /// `OBSERVE`, not which object that is.
    fn read_value(
        &mut self,
        object_id: u16,
        instance_id: u16,
        resource_id: u16,
        now_unix: i64,
    ) -> Result<ResourceValue, ClientError> {
        match object_id {
            0 => self.security.read(instance_id, resource_id),
            1 => self.server.read(instance_id, resource_id),
            2 => self.access_control.read(&mut self.acls, instance_id, resource_id, None),
            3 => self.device.read(resource_id, 0, now_unix),
            4 => self.connectivity.read(resource_id, 0),
            5 => self.firmware.read(resource_id),
            _ => Err(not_found(object_id)),
        }
    }
}

fn not_found(object_id: u16) -> ClientError {
    ClientError::Core(CoreError::NotFound(format!("/{object_id}")))
}

fn missing_payload() -> ClientError {
    ClientError::Core(CoreError::InvalidArgument("write requires a payload"))
}

/// Unwraps a whole-instance payload (a bootstrap write addressed at an
/// object or instance path, with no resource segment) into its id/value
/// pairs.
fn instance_resources(payload: Option<ResourceValue>) -> Result<Vec<(u16, ResourceValue)>, ClientError> {
    match payload.ok_or_else(missing_payload)? {
        ResourceValue::Instance(resources) => Ok(resources),
        _ => Err(ClientError::Core(CoreError::InvalidArgument("expected a whole-instance payload"))),
    }
}

/// Unwraps an ACL resource payload (short-server-id to permission-mask
/// pairs) into `(ssid, mask)` entries.
fn instance_acl_entries(payload: Option<ResourceValue>) -> Result<Vec<(u16, Permission)>, ClientError> {
    match payload.ok_or_else(missing_payload)? {
        ResourceValue::Instance(entries) => Ok(entries
            .into_iter()
            .filter_map(|(ssid, value)| match value {
                ResourceValue::Integer(bits) => Some((ssid, Permission::from_bits_truncate(bits as u8))),
                _ => None,
            })
            .collect()),
        _ => Err(ClientError::Core(CoreError::InvalidArgument("ACL writes require a per-server entry list"))),
    }
}

/// Extract the `Block1` descriptor from a request's options, if it carries
/// one — the only place in the object model that needs to know a write is
/// part of a block-wise transfer, since every other write lands in one
/// shot.
fn block1_option(options: &[CoapOption]) -> Option<BlockOption> {
    options
        .iter()
        .find(|o| o.number == number::BLOCK1)
        .and_then(|o| option_as_uint(o).ok())
        .and_then(|raw| BlockOption::from_u32(raw).ok())
}

fn format_path(path: &Path) -> String {
    match (path.instance_id, path.resource_id) {
        (None, _) => format!("/{}", path.object_id),
        (Some(iid), None) => format!("/{}/{iid}", path.object_id),
        (Some(iid), Some(rid)) => format!("/{}/{iid}/{rid}", path.object_id),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::{ServerInstance, device::resource as device_resource};

    fn sample_device() -> DeviceObject {
        DeviceObject::new("acme".into(), "m1".into(), "sn1".into(), "1.0".into())
    }

    #[test]
    fn default_acl_entry_grants_read() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(3, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::READ);
        let outcome = client
            .dispatch(&["3", "0", "0"], Code::GET, &[], None, 5, false, 0)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Value(ResourceValue::String("acme".to_string())));
    }

    #[test]
    fn security_object_denies_non_bootstrap_by_default() {
        let mut client = Lwm2mClient::new(sample_device());
        client
            .security_mut()
            .put_instance(crate::objects::SecurityInstance {
                instance_id: 0,
                server_uri: "coaps://bootstrap:5684".to_string(),
                is_bootstrap_server: true,
                security_mode: 0,
                public_key_or_identity: Vec::new(),
                server_public_key: Vec::new(),
                secret_key: Vec::new(),
                short_server_id: None,
                client_hold_off_time: None,
            });
        let err = client.dispatch(&["0", "0", "0"], Code::GET, &[], None, 5, false, 0).unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::Unauthorized { .. })));
    }

    #[test]
    fn read_without_acl_entry_is_denied() {
        let mut client = Lwm2mClient::new(sample_device());
        let err = client.dispatch(&["3", "0", "0"], Code::GET, &[], None, 5, false, 0).unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::Unauthorized { .. })));
    }

    #[test]
    fn bootstrap_server_bypasses_acl() {
        let mut client = Lwm2mClient::new(sample_device());
        let outcome = client.dispatch(&["3", "0", "0"], Code::GET, &[], None, 0, true, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::Value(ResourceValue::String("acme".to_string())));
    }

    #[test]
    fn execute_disable_reports_effect_through_dispatch() {
        let mut client = Lwm2mClient::new(sample_device());
        client.server_mut().put_instance(ServerInstance { instance_id: 0, short_server_id: 123, ..Default::default() });
        client.acls_mut().acl_for(1, 0).set_owner(123);
        let outcome = client.dispatch(&["1", "0", "4"], Code::POST, &[], None, 123, false, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::Executed(Some(ExecuteEffect::Disable)));
    }

    #[test]
    fn write_rejected_on_read_only_resource() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(3, 0).set_owner(5);
        assert_eq!(device_resource::MANUFACTURER, 0);
        let err = client
            .dispatch(
                &["3", "0", "0"],
                Code::PUT,
                &[],
                Some(ResourceValue::String("other".to_string())),
                5,
                false,
                0,
            )
            .unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::MethodNotAllowed { .. })));
    }

    #[test]
    fn bootstrap_writes_whole_security_instance() {
        let mut client = Lwm2mClient::new(sample_device());
        let payload = ResourceValue::Instance(vec![
            (crate::objects::security::resource::SERVER_URI, ResourceValue::String("coap://server:5683".to_string())),
            (crate::objects::security::resource::SHORT_SERVER_ID, ResourceValue::Integer(123)),
        ]);
        let outcome = client.dispatch(&["0", "1"], Code::PUT, &[], Some(payload), 0, true, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::Written);
        assert_eq!(client.security().instance_for_server(123).unwrap().instance_id, 1);
    }

    #[test]
    fn bootstrap_deletes_security_instance() {
        let mut client = Lwm2mClient::new(sample_device());
        client.security_mut().write_instance(1, &[(crate::objects::security::resource::SHORT_SERVER_ID, ResourceValue::Integer(123))]).unwrap();
        let outcome = client.dispatch(&["0", "1"], Code::DELETE, &[], None, 0, true, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::Deleted);
        assert!(client.security().instance_for_server(123).is_none());
    }

    #[test]
    fn bootstrap_writes_access_control_instance_with_acl_entries() {
        let mut client = Lwm2mClient::new(sample_device());
        use crate::objects::access_control::resource as ac_resource;
        let payload = ResourceValue::Instance(vec![
            (ac_resource::OBJECT_ID, ResourceValue::Integer(3)),
            (ac_resource::OBJECT_INSTANCE_ID, ResourceValue::Integer(0)),
            (ac_resource::ACCESS_CONTROL_OWNER, ResourceValue::Integer(100)),
            (ac_resource::ACL, ResourceValue::Instance(vec![(123, ResourceValue::Integer(Permission::READ.bits().into()))])),
        ]);
        let outcome = client.dispatch(&["2", "0"], Code::PUT, &[], Some(payload), 0, true, 0).unwrap();
        assert_eq!(outcome, DispatchOutcome::Written);
        assert_eq!(client.acls_mut().acl_for(3, 0).owner_ssid, 100);
    }

    #[test]
    fn non_bootstrap_owner_transfer_requires_authorization() {
        let mut client = Lwm2mClient::new(sample_device());
        client
            .access_control_mut()
            .put_instance(crate::objects::AccessControlInstance { instance_id: 0, target_object_id: 3, target_instance_id: 0 });
        client.acls_mut().acl_for(3, 0).set_owner(100);
        use crate::objects::access_control::resource as ac_resource;
        let err = client
            .dispatch(&["2", "0", &ac_resource::ACCESS_CONTROL_OWNER.to_string()], Code::PUT, &[], Some(ResourceValue::Integer(200)), 999, false, 0)
            .unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::Unauthorized { .. })));
    }

    #[test]
    fn observe_register_reads_current_value_generically() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(3, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::READ);
        let options = vec![lwm2m_proto::CoapOption::uint(lwm2m_proto::number::OBSERVE, 0)];
        let outcome = client.dispatch(&["3", "0", "0"], Code::GET, &options, None, 5, false, 0).unwrap();
        assert_eq!(
            outcome,
            DispatchOutcome::Observed { value: ResourceValue::String("acme".to_string()), register: true }
        );
    }

    #[test]
    fn observe_rejected_when_object_does_not_advertise_capability() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(5, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::READ);
        let options = vec![lwm2m_proto::CoapOption::uint(lwm2m_proto::number::OBSERVE, 0)];
        let err = client.dispatch(&["5", "0", "0"], Code::GET, &options, None, 5, false, 0).unwrap_err();
        assert!(matches!(err, ClientError::Core(CoreError::MethodNotAllowed { .. })));
    }

    #[test]
    fn block1_intermediate_segment_stays_downloading() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(5, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::WRITE);
        let block = BlockOption::new(0, true, 512).unwrap();
        let options = vec![lwm2m_proto::CoapOption::uint(number::BLOCK1, block.to_u32())];
        let outcome = client
            .dispatch(&["5", "0", "0"], Code::PUT, &options, Some(ResourceValue::Opaque(vec![0u8; 512])), 5, false, 0)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::WrittenPartial { block });
        assert_eq!(client.firmware().state(), crate::objects::firmware::FirmwareState::Downloading);
    }

    #[test]
    fn block1_final_segment_completes_download() {
        let mut client = Lwm2mClient::new(sample_device());
        client.acls_mut().acl_for(5, 0).set_entry(lwm2m_core::acl::DEFAULT_SHORT_SERVER_ID, Permission::WRITE);
        for num in 0..3 {
            let block = BlockOption::new(num, true, 512).unwrap();
            let options = vec![lwm2m_proto::CoapOption::uint(number::BLOCK1, block.to_u32())];
            client
                .dispatch(&["5", "0", "0"], Code::PUT, &options, Some(ResourceValue::Opaque(vec![0u8; 512])), 5, false, 0)
                .unwrap();
        }
        let last_block = BlockOption::new(3, false, 512).unwrap();
        let options = vec![lwm2m_proto::CoapOption::uint(number::BLOCK1, last_block.to_u32())];
        let outcome = client
            .dispatch(&["5", "0", "0"], Code::PUT, &options, Some(ResourceValue::Opaque(vec![0u8; 512])), 5, false, 0)
            .unwrap();
        assert_eq!(outcome, DispatchOutcome::Written);
        assert_eq!(client.firmware().state(), crate::objects::firmware::FirmwareState::Downloaded);
    }
}
