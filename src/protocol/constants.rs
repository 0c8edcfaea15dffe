//! ESP wire constants: frame markers, device ids and packet ids.
//!
//! Frame layout (all packets, both directions):
//! ```text
//! ┌──────┬───────────┬───────────┬───────────┬─────────┬─────────────┬──────┐
//! │ SOF  │ 0xD0|dest │ 0xE0|orig │ packet id │ length  │ payload     │ EOF  │
//! │ 0xAA │ 1 byte    │ 1 byte    │ 1 byte    │ 1 byte  │ 0..n bytes  │ 0xAB │
//! └──────┴───────────┴───────────┴───────────┴─────────┴─────────────┴──────┘
//! ```
//!
//! When the bus V1 is the checksum variant, the last payload byte is a
//! checksum over every preceding frame byte and is counted *inside* the
//! length byte. A frame is therefore always `length + 6` bytes long.

use serde::{Deserialize, Serialize};

/// Start-of-frame marker.
pub const FRAME_SOF: u8 = 0xAA;
/// End-of-frame marker.
pub const FRAME_EOF: u8 = 0xAB;
/// High-nibble base OR-ed into the destination id byte.
pub const DEST_ID_BASE: u8 = 0xD0;
/// High-nibble base OR-ed into the origin id byte.
pub const ORIG_ID_BASE: u8 = 0xE0;

/// Byte offsets within a frame.
pub const SOF_IDX: usize = 0;
pub const DEST_IDX: usize = 1;
pub const ORIG_IDX: usize = 2;
pub const PACKET_ID_IDX: usize = 3;
pub const PAYLOAD_LEN_IDX: usize = 4;
pub const PAYLOAD_START_IDX: usize = 5;

/// Fixed overhead around the length-counted payload: SOF, dest, orig, id,
/// length and EOF.
pub const FRAME_OVERHEAD: usize = 6;

/// Smallest possible frame (empty payload, no checksum).
pub const MIN_FRAME_LEN: usize = FRAME_OVERHEAD;

/// Largest possible frame (length byte is a u8).
pub const MAX_FRAME_LEN: usize = u8::MAX as usize + FRAME_OVERHEAD;

/// Sum-no-carry checksum over `data`.
pub fn checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |sum, b| sum.wrapping_add(*b))
}

/// ESP device ids, as carried in the low nibble of the destination and
/// origin bytes (Legacy V1 being the full-byte exception).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceId {
    /// Concealed Display (the Tech Display shares this id).
    ConcealedDisplay,
    /// Remote Audio adapter.
    RemoteAudio,
    /// SAVVY speed module.
    Savvy,
    ThirdParty1,
    ThirdParty2,
    ThirdParty3,
    /// The V1connection adapter — this library's own id on the bus.
    V1Connection,
    Reserved,
    /// Packets addressed here are suitable for every bus participant.
    GeneralBroadcast,
    /// Valentine One that omits frame checksums.
    ValentineOneNoChecksum,
    /// Valentine One that appends frame checksums.
    ValentineOne,
    /// Pre-ESP Valentine One.
    ValentineOneLegacy,
    /// Any id this library does not recognize.
    Unknown,
}

impl DeviceId {
    /// Map a wire id byte (low nibble already masked, except Legacy) to a
    /// device id. Unrecognized values map to [`DeviceId::Unknown`].
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x00 => DeviceId::ConcealedDisplay,
            0x01 => DeviceId::RemoteAudio,
            0x02 => DeviceId::Savvy,
            0x03 => DeviceId::ThirdParty1,
            0x04 => DeviceId::ThirdParty2,
            0x05 => DeviceId::ThirdParty3,
            0x06 => DeviceId::V1Connection,
            0x07 => DeviceId::Reserved,
            0x08 => DeviceId::GeneralBroadcast,
            0x09 => DeviceId::ValentineOneNoChecksum,
            0x0A => DeviceId::ValentineOne,
            0x98 => DeviceId::ValentineOneLegacy,
            _ => DeviceId::Unknown,
        }
    }

    /// Wire byte value of this device id.
    pub fn to_byte(self) -> u8 {
        match self {
            DeviceId::ConcealedDisplay => 0x00,
            DeviceId::RemoteAudio => 0x01,
            DeviceId::Savvy => 0x02,
            DeviceId::ThirdParty1 => 0x03,
            DeviceId::ThirdParty2 => 0x04,
            DeviceId::ThirdParty3 => 0x05,
            DeviceId::V1Connection => 0x06,
            DeviceId::Reserved => 0x07,
            DeviceId::GeneralBroadcast => 0x08,
            DeviceId::ValentineOneNoChecksum => 0x09,
            DeviceId::ValentineOne => 0x0A,
            DeviceId::ValentineOneLegacy => 0x98,
            DeviceId::Unknown => 0x99,
        }
    }

    /// True for any of the three V1 variants.
    pub fn is_v1(self) -> bool {
        matches!(
            self,
            DeviceId::ValentineOne
                | DeviceId::ValentineOneNoChecksum
                | DeviceId::ValentineOneLegacy
        )
    }

    /// True if frames transmitted by this V1 variant carry a checksum byte.
    pub fn uses_checksum(self) -> bool {
        self == DeviceId::ValentineOne
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DeviceId::ConcealedDisplay => "Concealed Display",
            DeviceId::RemoteAudio => "Remote Audio",
            DeviceId::Savvy => "SAVVY",
            DeviceId::ThirdParty1 => "Third Party 1",
            DeviceId::ThirdParty2 => "Third Party 2",
            DeviceId::ThirdParty3 => "Third Party 3",
            DeviceId::V1Connection => "V1connection",
            DeviceId::Reserved => "Reserved",
            DeviceId::GeneralBroadcast => "General Broadcast",
            DeviceId::ValentineOneNoChecksum => "Valentine One w/o CS",
            DeviceId::ValentineOne => "Valentine One w/ CS",
            DeviceId::ValentineOneLegacy => "Valentine One Legacy",
            DeviceId::Unknown => "Unknown Device",
        };
        f.write_str(name)
    }
}

/// ESP packet ids.
///
/// The id space is open on the wire: values this library does not know
/// round-trip through [`PacketId::Other`] untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PacketId {
    ReqVersion,
    RespVersion,
    ReqSerialNumber,
    RespSerialNumber,
    ReqUserBytes,
    RespUserBytes,
    ReqWriteUserBytes,
    ReqFactoryDefault,
    ReqWriteSweepDefinition,
    ReqAllSweepDefinitions,
    RespSweepDefinition,
    ReqDefaultSweeps,
    ReqMaxSweepIndex,
    RespMaxSweepIndex,
    RespSweepWriteResult,
    ReqSweepSections,
    RespSweepSections,
    ReqDefaultSweepDefinitions,
    RespDefaultSweepDefinitions,
    InfDisplayData,
    ReqTurnOffMainDisplay,
    ReqTurnOnMainDisplay,
    ReqMuteOn,
    ReqMuteOff,
    ReqChangeMode,
    ReqCurrentVolume,
    RespCurrentVolume,
    ReqWriteVolume,
    ReqAbortAudioDelay,
    ReqStartAlertData,
    ReqStopAlertData,
    RespAlertData,
    RespDataReceived,
    ReqBatteryVoltage,
    RespBatteryVoltage,
    RespUnsupportedPacket,
    RespRequestNotProcessed,
    InfV1Busy,
    RespDataError,
    ReqSavvyStatus,
    RespSavvyStatus,
    ReqVehicleSpeed,
    RespVehicleSpeed,
    ReqOverrideThumbwheel,
    ReqSetSavvyUnmuteEnable,
    /// Any id outside the table above.
    Other(u8),
}

impl PacketId {
    /// Map a wire id byte to a packet id. Total: unknown values wrap in
    /// [`PacketId::Other`].
    pub fn from_byte(value: u8) -> Self {
        match value {
            0x01 => PacketId::ReqVersion,
            0x02 => PacketId::RespVersion,
            0x03 => PacketId::ReqSerialNumber,
            0x04 => PacketId::RespSerialNumber,
            0x11 => PacketId::ReqUserBytes,
            0x12 => PacketId::RespUserBytes,
            0x13 => PacketId::ReqWriteUserBytes,
            0x14 => PacketId::ReqFactoryDefault,
            0x15 => PacketId::ReqWriteSweepDefinition,
            0x16 => PacketId::ReqAllSweepDefinitions,
            0x17 => PacketId::RespSweepDefinition,
            0x18 => PacketId::ReqDefaultSweeps,
            0x19 => PacketId::ReqMaxSweepIndex,
            0x20 => PacketId::RespMaxSweepIndex,
            0x21 => PacketId::RespSweepWriteResult,
            0x22 => PacketId::ReqSweepSections,
            0x23 => PacketId::RespSweepSections,
            0x24 => PacketId::ReqDefaultSweepDefinitions,
            0x25 => PacketId::RespDefaultSweepDefinitions,
            0x31 => PacketId::InfDisplayData,
            0x32 => PacketId::ReqTurnOffMainDisplay,
            0x33 => PacketId::ReqTurnOnMainDisplay,
            0x34 => PacketId::ReqMuteOn,
            0x35 => PacketId::ReqMuteOff,
            0x36 => PacketId::ReqChangeMode,
            0x37 => PacketId::ReqCurrentVolume,
            0x38 => PacketId::RespCurrentVolume,
            0x39 => PacketId::ReqWriteVolume,
            0x3A => PacketId::ReqAbortAudioDelay,
            0x41 => PacketId::ReqStartAlertData,
            0x42 => PacketId::ReqStopAlertData,
            0x43 => PacketId::RespAlertData,
            0x61 => PacketId::RespDataReceived,
            0x62 => PacketId::ReqBatteryVoltage,
            0x63 => PacketId::RespBatteryVoltage,
            0x64 => PacketId::RespUnsupportedPacket,
            0x65 => PacketId::RespRequestNotProcessed,
            0x66 => PacketId::InfV1Busy,
            0x67 => PacketId::RespDataError,
            0x71 => PacketId::ReqSavvyStatus,
            0x72 => PacketId::RespSavvyStatus,
            0x73 => PacketId::ReqVehicleSpeed,
            0x74 => PacketId::RespVehicleSpeed,
            0x75 => PacketId::ReqOverrideThumbwheel,
            0x76 => PacketId::ReqSetSavvyUnmuteEnable,
            other => PacketId::Other(other),
        }
    }

    /// Wire byte value of this packet id.
    pub fn to_byte(self) -> u8 {
        match self {
            PacketId::ReqVersion => 0x01,
            PacketId::RespVersion => 0x02,
            PacketId::ReqSerialNumber => 0x03,
            PacketId::RespSerialNumber => 0x04,
            PacketId::ReqUserBytes => 0x11,
            PacketId::RespUserBytes => 0x12,
            PacketId::ReqWriteUserBytes => 0x13,
            PacketId::ReqFactoryDefault => 0x14,
            PacketId::ReqWriteSweepDefinition => 0x15,
            PacketId::ReqAllSweepDefinitions => 0x16,
            PacketId::RespSweepDefinition => 0x17,
            PacketId::ReqDefaultSweeps => 0x18,
            PacketId::ReqMaxSweepIndex => 0x19,
            PacketId::RespMaxSweepIndex => 0x20,
            PacketId::RespSweepWriteResult => 0x21,
            PacketId::ReqSweepSections => 0x22,
            PacketId::RespSweepSections => 0x23,
            PacketId::ReqDefaultSweepDefinitions => 0x24,
            PacketId::RespDefaultSweepDefinitions => 0x25,
            PacketId::InfDisplayData => 0x31,
            PacketId::ReqTurnOffMainDisplay => 0x32,
            PacketId::ReqTurnOnMainDisplay => 0x33,
            PacketId::ReqMuteOn => 0x34,
            PacketId::ReqMuteOff => 0x35,
            PacketId::ReqChangeMode => 0x36,
            PacketId::ReqCurrentVolume => 0x37,
            PacketId::RespCurrentVolume => 0x38,
            PacketId::ReqWriteVolume => 0x39,
            PacketId::ReqAbortAudioDelay => 0x3A,
            PacketId::ReqStartAlertData => 0x41,
            PacketId::ReqStopAlertData => 0x42,
            PacketId::RespAlertData => 0x43,
            PacketId::RespDataReceived => 0x61,
            PacketId::ReqBatteryVoltage => 0x62,
            PacketId::RespBatteryVoltage => 0x63,
            PacketId::RespUnsupportedPacket => 0x64,
            PacketId::RespRequestNotProcessed => 0x65,
            PacketId::InfV1Busy => 0x66,
            PacketId::RespDataError => 0x67,
            PacketId::ReqSavvyStatus => 0x71,
            PacketId::RespSavvyStatus => 0x72,
            PacketId::ReqVehicleSpeed => 0x73,
            PacketId::RespVehicleSpeed => 0x74,
            PacketId::ReqOverrideThumbwheel => 0x75,
            PacketId::ReqSetSavvyUnmuteEnable => 0x76,
            PacketId::Other(other) => other,
        }
    }

    /// True if this id names a request the V1connection may originate.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            PacketId::ReqVersion
                | PacketId::ReqSerialNumber
                | PacketId::ReqUserBytes
                | PacketId::ReqWriteUserBytes
                | PacketId::ReqFactoryDefault
                | PacketId::ReqWriteSweepDefinition
                | PacketId::ReqAllSweepDefinitions
                | PacketId::ReqDefaultSweeps
                | PacketId::ReqMaxSweepIndex
                | PacketId::ReqSweepSections
                | PacketId::ReqDefaultSweepDefinitions
                | PacketId::ReqTurnOffMainDisplay
                | PacketId::ReqTurnOnMainDisplay
                | PacketId::ReqMuteOn
                | PacketId::ReqMuteOff
                | PacketId::ReqChangeMode
                | PacketId::ReqCurrentVolume
                | PacketId::ReqWriteVolume
                | PacketId::ReqAbortAudioDelay
                | PacketId::ReqStartAlertData
                | PacketId::ReqStopAlertData
                | PacketId::ReqBatteryVoltage
                | PacketId::ReqSavvyStatus
                | PacketId::ReqVehicleSpeed
                | PacketId::ReqOverrideThumbwheel
                | PacketId::ReqSetSavvyUnmuteEnable
        )
    }
}

/// V1 operating modes accepted by a change-mode request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum V1Mode {
    /// All bogeys (gen1) / K & Ka (gen2).
    AllBogeys,
    /// Logic (gen1) / Ka (gen2).
    Logic,
    /// Advanced logic.
    AdvancedLogic,
}

impl V1Mode {
    pub fn to_byte(self) -> u8 {
        match self {
            V1Mode::AllBogeys => 0x01,
            V1Mode::Logic => 0x02,
            V1Mode::AdvancedLogic => 0x03,
        }
    }

    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0x01 => Some(V1Mode::AllBogeys),
            0x02 => Some(V1Mode::Logic),
            0x03 => Some(V1Mode::AdvancedLogic),
            _ => None,
        }
    }
}
