//! Firmware Update object (`/5`): the pull (`Package URI`) and push
//! (`Package`, block-wise) download paths, and the `Update` resource that
//! schedules the reboot into the new image.

use lwm2m_core::{
    error::CoreError,
    registry::{Capabilities, ObjectHandler},
};

use super::ResourceValue;
use crate::error::ClientError;

/// Resource ids under `/5/0`.
pub mod resource {
    /// Package: push a firmware image as block-wise opaque writes.
    pub const PACKAGE: u16 = 0;
    /// Package URI: pull a firmware image from this URI.
    pub const PACKAGE_URI: u16 = 1;
    /// Update (execute): apply the downloaded image.
    pub const UPDATE: u16 = 2;
    /// State (read-only).
    pub const STATE: u16 = 3;
    /// Update Result (read-only).
    pub const UPDATE_RESULT: u16 = 5;
}

/// Firmware download/apply state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirmwareState {
    /// No download in progress.
    Idle,
    /// A pull or push download is underway.
    Downloading,
    /// A download completed and passed verification; ready to apply.
    Downloaded,
    /// `Update` was invoked; a reboot into the new image is pending.
    Updating,
}

/// Outcome of the most recent download/update attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateResult {
    /// No attempt has completed yet.
    Initial,
    /// The firmware was applied successfully.
    Success,
    /// The device ran out of storage for the incoming image.
    NotEnoughStorage,
    /// The transfer was interrupted.
    ConnectionLost,
    /// The final image failed its integrity check.
    CrcCheckFailed,
    /// `Package URI` named a scheme or host this device cannot reach.
    InvalidUri,
}

impl UpdateResult {
    fn as_u8(self) -> u8 {
        match self {
            Self::Initial => 0,
            Self::Success => 1,
            Self::NotEnoughStorage => 2,
            Self::ConnectionLost => 4,
            Self::CrcCheckFailed => 5,
            Self::InvalidUri => 7,
        }
    }
}

/// What invoking `Update` should cause the caller to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleReboot;

/// The Firmware Update object (`/5`).
#[derive(Debug, Clone)]
pub struct FirmwareObject {
    state: FirmwareState,
    update_result: UpdateResult,
    package_uri: String,
    buffer: Vec<u8>,
}

impl Default for FirmwareObject {
    fn default() -> Self {
        Self {
            state: FirmwareState::Idle,
            update_result: UpdateResult::Initial,
            package_uri: String::new(),
            buffer: Vec::new(),
        }
    }
}

impl FirmwareObject {
    /// A fresh object, idle with no download history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current download/apply state.
    #[must_use]
    pub fn state(&self) -> FirmwareState {
        self.state
    }

    /// Write `PACKAGE_URI`: begin a pull download. An empty URI cancels
    /// an in-progress download and returns to `Idle`.
    pub fn write_package_uri(&mut self, uri: String) -> Result<(), ClientError> {
        if uri.is_empty() {
            self.state = FirmwareState::Idle;
            self.package_uri.clear();
            return Ok(());
        }
        if self.state != FirmwareState::Idle {
            return Err(ClientError::Core(CoreError::InvalidEncoding(
                "Package URI write is only valid while Idle".to_string(),
            )));
        }
        self.package_uri = uri;
        self.state = FirmwareState::Downloading;
        Ok(())
    }

    /// The orchestration layer finished (or failed) the pull fetch
    /// triggered by [`Self::write_package_uri`].
    pub fn complete_pull(&mut self, image: Option<Vec<u8>>) {
        match image {
            Some(bytes) => {
                self.buffer = bytes;
                self.state = FirmwareState::Downloaded;
                self.update_result = UpdateResult::Success;
            },
            None => {
                self.state = FirmwareState::Idle;
                self.update_result = UpdateResult::InvalidUri;
            },
        }
    }

    /// Write one block of a push (`Package`) download. `last_block_valid`
    /// is `Some(passed_crc)` only for the final block; intermediate
    /// blocks pass `None`. A failed final-block check drops the buffer
    /// and returns to `Idle` with `UpdateResult::CrcCheckFailed`, matching
    /// a verification fault on the completed image.
    pub fn write_package_block(
        &mut self,
        data: &[u8],
        last_block_valid: Option<bool>,
    ) -> Result<(), ClientError> {
        if self.state == FirmwareState::Idle {
            self.state = FirmwareState::Downloading;
        }
        if self.state != FirmwareState::Downloading {
            return Err(ClientError::Core(CoreError::InvalidEncoding(
                "Package write is only valid while Idle or Downloading".to_string(),
            )));
        }
        self.buffer.extend_from_slice(data);

        match last_block_valid {
            None => {},
            Some(true) => {
                self.state = FirmwareState::Downloaded;
                self.update_result = UpdateResult::Success;
            },
            Some(false) => {
                self.buffer.clear();
                self.state = FirmwareState::Idle;
                self.update_result = UpdateResult::CrcCheckFailed;
            },
        }
        Ok(())
    }

    /// Invoke `Update`: only valid once a verified image is `Downloaded`.
    pub fn execute_update(&mut self) -> Result<ScheduleReboot, ClientError> {
        if self.state != FirmwareState::Downloaded {
            return Err(ClientError::Core(CoreError::MethodNotAllowed {
                operation: "execute",
                path: "/5/0/2".to_string(),
            }));
        }
        self.state = FirmwareState::Updating;
        Ok(ScheduleReboot)
    }

    /// The scheduled reboot completed and the new image is running;
    /// return to `Idle` with the result preserved for the server to read.
    pub fn finish_update(&mut self) {
        self.state = FirmwareState::Idle;
    }

    /// Read a resource.
    pub fn read(&self, resource_id: u16) -> Result<ResourceValue, ClientError> {
        Ok(match resource_id {
            resource::PACKAGE_URI => ResourceValue::String(self.package_uri.clone()),
            resource::STATE => ResourceValue::Integer(state_as_u8(self.state).into()),
            resource::UPDATE_RESULT => ResourceValue::Integer(self.update_result.as_u8().into()),
            _ => return Err(ClientError::Core(CoreError::NotFound(format!("/5/0/{resource_id}")))),
        })
    }
}

fn state_as_u8(state: FirmwareState) -> u8 {
    match state {
        FirmwareState::Idle => 0,
        FirmwareState::Downloading => 1,
        FirmwareState::Downloaded => 2,
        FirmwareState::Updating => 3,
    }
}

impl ObjectHandler for FirmwareObject {
    fn capabilities(&self) -> Capabilities {
        Capabilities::READ | Capabilities::WRITE | Capabilities::DISCOVER
    }

    fn permitted(&self, resource_id: u16) -> Capabilities {
        match resource_id {
            resource::UPDATE => Capabilities::EXECUTE,
            resource::STATE | resource::UPDATE_RESULT => Capabilities::READ | Capabilities::DISCOVER,
            _ => self.capabilities(),
        }
    }

    fn instance_ids(&self) -> Vec<u16> {
        vec![0]
    }
}
