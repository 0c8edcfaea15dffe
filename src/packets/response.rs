//! Typed response bodies.
//!
//! Every known response id parses into a [`ResponseBody`] at decode time so
//! dispatch and callers work with domain values, never raw offsets. The raw
//! frame stays the encoding source of truth; the body is a validated view.

use bytes::Bytes;

use crate::data::{
    AlertData, DisplayData, SavvyStatus, SweepDefinition, SweepSection, VolumeSettings,
    USER_BYTES_LEN,
};
use crate::error::EspError;
use crate::protocol::PacketId;

/// Parsed payload of a response or notification packet.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    /// Version string, e.g. `V4.1032`.
    Version(String),
    /// Serial number string.
    SerialNumber(String),
    /// The six raw user bytes.
    UserBytes([u8; USER_BYTES_LEN]),
    /// One sweep definition out of a multi-packet set.
    SweepDefinition(SweepDefinition),
    /// Highest valid sweep slot index.
    MaxSweepIndex(u8),
    /// Zero on success, else the 1-based index of the rejected definition.
    SweepWriteResult(u8),
    /// Up to three sweep sections from one packet.
    SweepSections(Vec<SweepSection>),
    /// One factory-default sweep definition out of a multi-packet set.
    DefaultSweepDefinition(SweepDefinition),
    /// Front-panel state broadcast.
    DisplayData(DisplayData),
    /// One alert out of the current alert table.
    AlertData(AlertData),
    /// The device acknowledged receipt of the given request id.
    DataReceived(u8),
    /// Battery voltage as integer and tenths digits.
    BatteryVoltage { volts: u8, tenths: u8 },
    /// The destination does not support the given request id.
    Unsupported(u8),
    /// The destination could not process the given request id right now.
    NotProcessed(u8),
    /// Request ids the V1 is still busy processing.
    V1Busy(Vec<u8>),
    /// The destination reported a data error for the given request id.
    DataError(u8),
    /// SAVVY accessory status.
    SavvyStatus(SavvyStatus),
    /// Vehicle speed as reported through the SAVVY.
    VehicleSpeed(u8),
    /// Current main/muted volume.
    CurrentVolume(VolumeSettings),
}

impl ResponseBody {
    /// Parse the payload of a known response id.
    ///
    /// Returns [`EspError::MalformedPayload`] when the payload is too short
    /// for the id's shape; the raw bytes ride along for the malformed-data
    /// report.
    pub fn parse(id: PacketId, payload: &Bytes) -> Result<Self, EspError> {
        let malformed = || EspError::MalformedPayload {
            packet_id: id.to_byte(),
            payload: payload.clone(),
        };

        let body = match id {
            PacketId::RespVersion => ResponseBody::Version(ascii_string(payload)),
            PacketId::RespSerialNumber => ResponseBody::SerialNumber(ascii_string(payload)),
            PacketId::RespUserBytes => {
                let bytes: [u8; USER_BYTES_LEN] = payload
                    .get(..USER_BYTES_LEN)
                    .and_then(|b| b.try_into().ok())
                    .ok_or_else(malformed)?;
                ResponseBody::UserBytes(bytes)
            }
            PacketId::RespSweepDefinition => ResponseBody::SweepDefinition(
                SweepDefinition::from_payload(payload).ok_or_else(malformed)?,
            ),
            PacketId::RespMaxSweepIndex => {
                ResponseBody::MaxSweepIndex(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespSweepWriteResult => {
                ResponseBody::SweepWriteResult(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespSweepSections => {
                if payload.len() < crate::data::sweep::SWEEP_ENTRY_LEN {
                    return Err(malformed());
                }
                ResponseBody::SweepSections(SweepSection::all_from_payload(payload))
            }
            PacketId::RespDefaultSweepDefinitions => ResponseBody::DefaultSweepDefinition(
                SweepDefinition::from_payload(payload).ok_or_else(malformed)?,
            ),
            PacketId::InfDisplayData => ResponseBody::DisplayData(
                DisplayData::from_payload(payload).ok_or_else(malformed)?,
            ),
            PacketId::RespAlertData => {
                ResponseBody::AlertData(AlertData::from_payload(payload).ok_or_else(malformed)?)
            }
            PacketId::RespDataReceived => {
                ResponseBody::DataReceived(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespBatteryVoltage => {
                let volts = *payload.first().ok_or_else(malformed)?;
                let tenths = *payload.get(1).ok_or_else(malformed)?;
                ResponseBody::BatteryVoltage { volts, tenths }
            }
            PacketId::RespUnsupportedPacket => {
                ResponseBody::Unsupported(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespRequestNotProcessed => {
                ResponseBody::NotProcessed(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::InfV1Busy => ResponseBody::V1Busy(payload.to_vec()),
            PacketId::RespDataError => {
                ResponseBody::DataError(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespSavvyStatus => ResponseBody::SavvyStatus(
                SavvyStatus::from_payload(payload).ok_or_else(malformed)?,
            ),
            PacketId::RespVehicleSpeed => {
                ResponseBody::VehicleSpeed(*payload.first().ok_or_else(malformed)?)
            }
            PacketId::RespCurrentVolume => ResponseBody::CurrentVolume(
                VolumeSettings::from_payload(payload).ok_or_else(malformed)?,
            ),
            other => {
                debug_assert!(false, "parse called for non-response id {other:?}");
                return Err(malformed());
            }
        };
        Ok(body)
    }

    /// True for the three device-reported failure notifications.
    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            ResponseBody::Unsupported(_)
                | ResponseBody::NotProcessed(_)
                | ResponseBody::DataError(_)
        )
    }
}

/// Collect ASCII characters up to the first NUL.
fn ascii_string(payload: &[u8]) -> String {
    payload
        .iter()
        .take_while(|&&b| b != 0)
        .map(|&b| b as char)
        .collect()
}

/// Parse the numeric part of a 7-character version string (`V4.1032` →
/// `4.1032`). `None` if the string has an unexpected shape.
pub fn version_value(version: &str) -> Option<f64> {
    let mut chars = version.chars();
    let first = chars.next()?;
    if version.len() != 7 || !first.is_ascii_alphabetic() {
        return None;
    }
    version[1..].parse().ok()
}
