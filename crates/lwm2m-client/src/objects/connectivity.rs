//! Connectivity Monitoring object (`/4`): read-only radio/PDN telemetry
//! sourced from the modem oracle. Nothing here is ever written by a
//! server — `update_from_modem` is the only mutator, called by the
//! orchestration layer each time it polls the modem.

use lwm2m_core::registry::{Capabilities, ObjectHandler};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/4/0`.
pub mod resource {
    /// Network Bearer (radio access technology in use).
    pub const NETWORK_BEARER: u16 = 0;
    /// Radio Signal Strength, dBm.
    pub const RADIO_SIGNAL_STRENGTH: u16 = 2;
    /// Link Quality.
    pub const LINK_QUALITY: u16 = 3;
    /// IP Addresses (multi-instance).
    pub const IP_ADDRESSES: u16 = 4;
    /// Access Point Name.
    pub const APN: u16 = 7;
    /// Cell ID.
    pub const CELL_ID: u16 = 8;
}

/// Current telemetry snapshot, as last reported by the modem.
#[derive(Debug, Clone, Default)]
pub struct ConnectivityObject {
    network_bearer: u8,
    radio_signal_strength: i32,
    link_quality: u8,
    ip_addresses: Vec<String>,
    apn: String,
    cell_id: i64,
}

impl ConnectivityObject {
    /// A fresh object with no telemetry recorded yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the telemetry snapshot with what the modem oracle last
    /// reported.
    pub fn update_from_modem(
        &mut self,
        network_bearer: u8,
        radio_signal_strength: i32,
        link_quality: u8,
        ip_addresses: Vec<String>,
        apn: String,
        cell_id: i64,
    ) {
        self.network_bearer = network_bearer;
        self.radio_signal_strength = radio_signal_strength;
        self.link_quality = link_quality;
        self.ip_addresses = ip_addresses;
        self.apn = apn;
        self.cell_id = cell_id;
    }

    /// Read `resource_id`. `instance_index` selects an entry of the
    /// multi-instance `IP_ADDRESSES` resource.
    pub fn read(&self, resource_id: u16, instance_index: usize) -> Result<ResourceValue, ClientError> {
        Ok(match resource_id {
            resource::NETWORK_BEARER => ResourceValue::Integer(i64::from(self.network_bearer)),
            resource::RADIO_SIGNAL_STRENGTH => ResourceValue::Integer(i64::from(self.radio_signal_strength)),
            resource::LINK_QUALITY => ResourceValue::Integer(i64::from(self.link_quality)),
            resource::IP_ADDRESSES => {
                let addr = self.ip_addresses.get(instance_index).ok_or_else(|| {
                    ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/4/0/4/{instance_index}")))
                })?;
                ResourceValue::String(addr.clone())
            },
            resource::APN => ResourceValue::String(self.apn.clone()),
            resource::CELL_ID => ResourceValue::Integer(self.cell_id),
            _ => return Err(ClientError::Core(lwm2m_core::CoreError::NotFound(format!("/4/0/{resource_id}")))),
        })
    }
}

impl ObjectHandler for ConnectivityObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::DISCOVER | Capabilities::OBSERVE
    }

    fn instance_ids(&self) -> Vec<u16> {
        vec![0]
    }
}
