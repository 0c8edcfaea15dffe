//! Request packet constructors.
//!
//! Requests originate from the V1connection id. Constructors that target
//! the V1 take the current bus variant: it becomes the destination id and
//! decides whether the encoded frame carries a checksum. Until the variant
//! is known the no-checksum form is used, matching the device's own
//! startup behavior.

use bytes::Bytes;

use crate::data::{SweepDefinition, VolumeSettings, USER_BYTES_LEN};
use crate::protocol::{DeviceId, Frame, PacketId, V1Mode};

/// SAVVY thumbwheel override: no override.
pub const THUMBWHEEL_NONE: u8 = 0x00;
/// SAVVY thumbwheel override: automatic.
pub const THUMBWHEEL_AUTO: u8 = 0xFF;

/// A request this library originates (or observes on the bus).
#[derive(Debug, Clone, PartialEq)]
pub struct RequestPacket {
    /// Backing wire frame.
    pub frame: Frame,
}

impl RequestPacket {
    /// Build a request with explicit addressing.
    pub fn new(v1_type: DeviceId, destination: DeviceId, id: PacketId, payload: &[u8]) -> Self {
        let frame = Frame::new(
            destination,
            DeviceId::V1Connection,
            id,
            Bytes::copy_from_slice(payload),
            v1_type.uses_checksum(),
        );
        Self { frame }
    }

    /// Build a request addressed to the V1 itself.
    fn to_v1(v1_type: DeviceId, id: PacketId, payload: &[u8]) -> Self {
        Self::new(v1_type, v1_destination(v1_type), id, payload)
    }

    /// Packet id of this request.
    pub fn packet_id(&self) -> PacketId {
        self.frame.packet_id()
    }

    /// Destination of this request.
    pub fn destination(&self) -> DeviceId {
        self.frame.destination()
    }

    // Identification ------------------------------------------------------

    pub fn version(v1_type: DeviceId, destination: DeviceId) -> Self {
        Self::new(v1_type, destination, PacketId::ReqVersion, &[])
    }

    pub fn serial_number(v1_type: DeviceId, destination: DeviceId) -> Self {
        Self::new(v1_type, destination, PacketId::ReqSerialNumber, &[])
    }

    // Settings ------------------------------------------------------------

    pub fn user_bytes(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqUserBytes, &[])
    }

    pub fn write_user_bytes(v1_type: DeviceId, bytes: &[u8; USER_BYTES_LEN]) -> Self {
        Self::to_v1(v1_type, PacketId::ReqWriteUserBytes, bytes)
    }

    pub fn factory_default(v1_type: DeviceId, destination: DeviceId) -> Self {
        Self::new(v1_type, destination, PacketId::ReqFactoryDefault, &[])
    }

    // Sweeps --------------------------------------------------------------

    pub fn write_sweep_definition(v1_type: DeviceId, definition: &SweepDefinition) -> Self {
        Self::to_v1(
            v1_type,
            PacketId::ReqWriteSweepDefinition,
            &definition.to_payload(),
        )
    }

    pub fn all_sweep_definitions(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqAllSweepDefinitions, &[])
    }

    pub fn default_sweeps(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqDefaultSweeps, &[])
    }

    pub fn max_sweep_index(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqMaxSweepIndex, &[])
    }

    pub fn sweep_sections(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqSweepSections, &[])
    }

    pub fn default_sweep_definitions(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqDefaultSweepDefinitions, &[])
    }

    // Display and audio ---------------------------------------------------

    pub fn main_display(v1_type: DeviceId, on: bool) -> Self {
        let id = if on {
            PacketId::ReqTurnOnMainDisplay
        } else {
            PacketId::ReqTurnOffMainDisplay
        };
        Self::to_v1(v1_type, id, &[])
    }

    pub fn mute(v1_type: DeviceId, on: bool) -> Self {
        let id = if on {
            PacketId::ReqMuteOn
        } else {
            PacketId::ReqMuteOff
        };
        Self::to_v1(v1_type, id, &[])
    }

    pub fn change_mode(v1_type: DeviceId, mode: V1Mode) -> Self {
        Self::to_v1(v1_type, PacketId::ReqChangeMode, &[mode.to_byte()])
    }

    pub fn current_volume(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqCurrentVolume, &[])
    }

    pub fn write_volume(v1_type: DeviceId, volume: VolumeSettings) -> Self {
        Self::to_v1(
            v1_type,
            PacketId::ReqWriteVolume,
            &[volume.main, volume.muted, 0x00],
        )
    }

    pub fn abort_audio_delay(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqAbortAudioDelay, &[])
    }

    // Alert data ----------------------------------------------------------

    pub fn start_alert_data(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqStartAlertData, &[])
    }

    pub fn stop_alert_data(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqStopAlertData, &[])
    }

    // Status --------------------------------------------------------------

    pub fn battery_voltage(v1_type: DeviceId) -> Self {
        Self::to_v1(v1_type, PacketId::ReqBatteryVoltage, &[])
    }

    pub fn savvy_status(v1_type: DeviceId) -> Self {
        Self::new(v1_type, DeviceId::Savvy, PacketId::ReqSavvyStatus, &[])
    }

    pub fn vehicle_speed(v1_type: DeviceId) -> Self {
        Self::new(v1_type, DeviceId::Savvy, PacketId::ReqVehicleSpeed, &[])
    }

    pub fn override_thumbwheel(v1_type: DeviceId, speed: u8) -> Self {
        Self::new(
            v1_type,
            DeviceId::Savvy,
            PacketId::ReqOverrideThumbwheel,
            &[speed],
        )
    }

    pub fn savvy_unmute_enable(v1_type: DeviceId, enabled: bool) -> Self {
        Self::new(
            v1_type,
            DeviceId::Savvy,
            PacketId::ReqSetSavvyUnmuteEnable,
            &[u8::from(enabled)],
        )
    }
}

/// Destination id for requests aimed at the V1: the detected variant, or
/// the no-checksum id while the variant is still unknown.
fn v1_destination(v1_type: DeviceId) -> DeviceId {
    if v1_type.is_v1() {
        v1_type
    } else {
        DeviceId::ValentineOneNoChecksum
    }
}
