//! Device object (`/3`): identity, clock, error log, and the three
//! executable maintenance actions.

use lwm2m_core::{
    error::CoreError,
    registry::{Capabilities, ObjectHandler},
};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/3/0`.
pub mod resource {
    /// Manufacturer.
    pub const MANUFACTURER: u16 = 0;
    /// Model Number.
    pub const MODEL_NUMBER: u16 = 1;
    /// Serial Number.
    pub const SERIAL_NUMBER: u16 = 2;
    /// Firmware Version.
    pub const FIRMWARE_VERSION: u16 = 3;
    /// Reboot (execute).
    pub const REBOOT: u16 = 4;
    /// Factory Reset (execute).
    pub const FACTORY_RESET: u16 = 5;
    /// Error Code (multi-instance, read-only).
    pub const ERROR_CODE: u16 = 11;
    /// Battery Level, percent (0-100).
    pub const BATTERY_LEVEL: u16 = 9;
    /// Reset Error Code (execute).
    pub const RESET_ERROR_CODE: u16 = 12;
    /// Current Time, Unix epoch seconds.
    pub const CURRENT_TIME: u16 = 13;
    /// UTC Offset, e.g. "+01:00".
    pub const UTC_OFFSET: u16 = 14;
    /// Timezone, e.g. "Europe/Oslo" or a raw offset string.
    pub const TIMEZONE: u16 = 15;
}

/// What invoking an executable Device resource should cause the caller
/// to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceExecuteEffect {
    /// `/3/0/4`: schedule a reboot.
    Reboot,
    /// `/3/0/5`: restore factory configuration and reboot.
    FactoryReset,
}

/// No error recorded (the sole entry when the error log is clean).
pub const ERROR_CODE_NONE: u8 = 0;

/// The Device object (`/3`). Single instance, per the LWM2M object
/// registry.
#[derive(Debug, Clone)]
pub struct DeviceObject {
    manufacturer: String,
    model_number: String,
    serial_number: String,
    firmware_version: String,
    current_time_offset_secs: i64,
    utc_offset: String,
    timezone: String,
    error_codes: Vec<u8>,
    battery_level: u8,
}

impl DeviceObject {
    /// A device object with identity strings set and a clean error log.
    pub fn new(manufacturer: String, model_number: String, serial_number: String, firmware_version: String) -> Self {
        Self {
            manufacturer,
            model_number,
            serial_number,
            firmware_version,
            current_time_offset_secs: 0,
            utc_offset: "+00:00".to_string(),
            timezone: "UTC".to_string(),
            error_codes: vec![ERROR_CODE_NONE],
            battery_level: 100,
        }
    }

    /// Append an error to the log (e.g. on PDN failure, SMS failure).
    pub fn push_error(&mut self, code: u8) {
        if self.error_codes == [ERROR_CODE_NONE] {
            self.error_codes.clear();
        }
        self.error_codes.push(code);
    }

    /// Set the reported battery level, e.g. on a power-source telemetry
    /// sample, clamped to the valid 0-100 percent range.
    pub fn set_battery_level(&mut self, percent: u8) {
        self.battery_level = percent.min(100);
    }

    fn reset_error_codes(&mut self) {
        self.error_codes = vec![ERROR_CODE_NONE];
    }

    /// Read `resource_id`. `instance_index` selects which entry of a
    /// multi-instance resource (only `ERROR_CODE` is multi-instance).
    pub fn read(&self, resource_id: u16, instance_index: usize, now_unix: i64) -> Result<ResourceValue, ClientError> {
        Ok(match resource_id {
            resource::MANUFACTURER => ResourceValue::String(self.manufacturer.clone()),
            resource::MODEL_NUMBER => ResourceValue::String(self.model_number.clone()),
            resource::SERIAL_NUMBER => ResourceValue::String(self.serial_number.clone()),
            resource::FIRMWARE_VERSION => ResourceValue::String(self.firmware_version.clone()),
            resource::ERROR_CODE => {
                let code = self
                    .error_codes
                    .get(instance_index)
                    .ok_or_else(|| ClientError::Core(CoreError::NotFound(format!("/3/0/11/{instance_index}"))))?;
                ResourceValue::Integer(i64::from(*code))
            },
            resource::BATTERY_LEVEL => ResourceValue::Integer(i64::from(self.battery_level)),
            resource::CURRENT_TIME => ResourceValue::Time(now_unix + self.current_time_offset_secs),
            resource::UTC_OFFSET => ResourceValue::String(self.utc_offset.clone()),
            resource::TIMEZONE => ResourceValue::String(self.timezone.clone()),
            _ => return Err(ClientError::Core(CoreError::NotFound(format!("/3/0/{resource_id}")))),
        })
    }

    /// Write `resource_id`. Writing `CURRENT_TIME` adjusts the reported
    /// clock by the delta from the caller's view of "now"; writing
    /// `UTC_OFFSET`/`TIMEZONE` validates the string per the format rules
    /// below before accepting it.
    pub fn write(&mut self, resource_id: u16, value: ResourceValue, now_unix: i64) -> Result<(), ClientError> {
        match (resource_id, value) {
            (resource::CURRENT_TIME, ResourceValue::Time(t)) => {
                self.current_time_offset_secs = t - now_unix;
                Ok(())
            },
            (resource::UTC_OFFSET, ResourceValue::String(s)) => {
                parse_timezone_offset(&s)?;
                self.utc_offset = s;
                Ok(())
            },
            (resource::TIMEZONE, ResourceValue::String(s)) => {
                parse_timezone_offset(&s)?;
                self.timezone = s;
                Ok(())
            },
            (rid, _) => Err(ClientError::Core(CoreError::NotFound(format!("/3/0/{rid}")))),
        }
    }

    /// Invoke an executable resource.
    pub fn execute(&mut self, resource_id: u16) -> Result<Option<DeviceExecuteEffect>, ClientError> {
        match resource_id {
            resource::REBOOT => Ok(Some(DeviceExecuteEffect::Reboot)),
            resource::FACTORY_RESET => Ok(Some(DeviceExecuteEffect::FactoryReset)),
            resource::RESET_ERROR_CODE => {
                self.reset_error_codes();
                Ok(None)
            },
            _ => Err(ClientError::Core(CoreError::NotFound(format!("/3/0/{resource_id}")))),
        }
    }
}

impl ObjectHandler for DeviceObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::DISCOVER | Capabilities::OBSERVE
    }

    fn permitted(&self, resource_id: u16) -> Capabilities {
        match resource_id {
            resource::REBOOT | resource::FACTORY_RESET | resource::RESET_ERROR_CODE => Capabilities::EXECUTE,
            resource::CURRENT_TIME | resource::UTC_OFFSET | resource::TIMEZONE => {
                Capabilities::READ | Capabilities::WRITE | Capabilities::DISCOVER | Capabilities::OBSERVE
            },
            _ => self.capabilities(),
        }
    }

    fn instance_ids(&self) -> Vec<u16> {
        vec![0]
    }
}

/// Parse a timezone/UTC-offset string into a signed offset in seconds.
///
/// Accepted forms, with an optional leading `UTC`: `±hh`, `±hhmm`, or
/// `±hh:mm`. Anything else, including a missing sign or an out-of-range
/// hour/minute, is rejected with a `4.00`-mapped
/// [`CoreError::InvalidEncoding`].
pub fn parse_timezone_offset(raw: &str) -> Result<i32, ClientError> {
    let s = raw.strip_prefix("UTC").unwrap_or(raw);
    let invalid = || ClientError::Core(CoreError::InvalidEncoding(format!("invalid timezone string: {raw}")));

    let mut chars = s.chars();
    let sign = match chars.next().ok_or_else(invalid)? {
        '+' => 1,
        '-' => -1,
        _ => return Err(invalid()),
    };
    let rest = chars.as_str();

    let (hours, minutes) = if let Some((h, m)) = rest.split_once(':') {
        (h, m)
    } else if rest.len() == 4 {
        rest.split_at(2)
    } else if rest.len() == 2 {
        (rest, "0")
    } else {
        return Err(invalid());
    };

    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..24).contains(&hours) || !(0..60).contains(&minutes) {
        return Err(invalid());
    }

    Ok(sign * (hours * 3600 + minutes * 60))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hh_form() {
        assert_eq!(parse_timezone_offset("+02").unwrap(), 2 * 3600);
        assert_eq!(parse_timezone_offset("-05").unwrap(), -5 * 3600);
    }

    #[test]
    fn accepts_hhmm_form() {
        assert_eq!(parse_timezone_offset("+0530").unwrap(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn accepts_colon_form() {
        assert_eq!(parse_timezone_offset("+05:30").unwrap(), 5 * 3600 + 30 * 60);
    }

    #[test]
    fn accepts_utc_prefix() {
        assert_eq!(parse_timezone_offset("UTC+01:00").unwrap(), 3600);
    }

    #[test]
    fn rejects_missing_sign() {
        assert!(parse_timezone_offset("0530").is_err());
    }

    #[test]
    fn rejects_out_of_range_hour() {
        assert!(parse_timezone_offset("+25:00").is_err());
    }

    #[test]
    fn reboot_and_factory_reset_report_effects() {
        let mut obj =
            DeviceObject::new("acme".into(), "m1".into(), "sn1".into(), "1.0".into());
        assert_eq!(obj.execute(resource::REBOOT).unwrap(), Some(DeviceExecuteEffect::Reboot));
        assert_eq!(obj.execute(resource::FACTORY_RESET).unwrap(), Some(DeviceExecuteEffect::FactoryReset));
    }

    #[test]
    fn error_log_accumulates_and_resets() {
        let mut obj =
            DeviceObject::new("acme".into(), "m1".into(), "sn1".into(), "1.0".into());
        obj.push_error(7);
        assert_eq!(obj.read(resource::ERROR_CODE, 0, 0).unwrap(), ResourceValue::Integer(7));
        obj.execute(resource::RESET_ERROR_CODE).unwrap();
        assert_eq!(obj.read(resource::ERROR_CODE, 0, 0).unwrap(), ResourceValue::Integer(0));
    }

    #[test]
    fn battery_level_reads_back_clamped_value() {
        let mut obj = DeviceObject::new("acme".into(), "m1".into(), "sn1".into(), "1.0".into());
        obj.set_battery_level(200);
        assert_eq!(obj.read(resource::BATTERY_LEVEL, 0, 0).unwrap(), ResourceValue::Integer(100));
    }

    #[test]
    fn current_time_tracks_offset_from_write() {
        let mut obj =
            DeviceObject::new("acme".into(), "m1".into(), "sn1".into(), "1.0".into());
        obj.write(resource::CURRENT_TIME, ResourceValue::Time(1_000_100), 1_000_000).unwrap();
        assert_eq!(obj.read(resource::CURRENT_TIME, 0, 1_000_000).unwrap(), ResourceValue::Time(1_000_100));
        assert_eq!(obj.read(resource::CURRENT_TIME, 0, 1_000_010).unwrap(), ResourceValue::Time(1_000_110));
    }
}
