//! User settings, volume and SAVVY status.
//!
//! The V1 stores its configuration in six "user bytes". The bit layout of
//! those bytes changed between firmware generations, so decoding goes
//! through a schema table selected at runtime by the detected version value
//! rather than a fixed layout: Gen2 platforms (4.1000 and up) use the
//! [`Gen2Settings`] layout, everything earlier the [`Gen1Settings`] layout.
//! Bits default to 1 (factory state is six 0xFF bytes), so several options
//! are encoded inverted: for those, 0 means enabled.

use serde::{Deserialize, Serialize};

/// Number of user bytes.
pub const USER_BYTES_LEN: usize = 6;

/// Factory-default user bytes.
pub const DEFAULT_USER_BYTES: [u8; USER_BYTES_LEN] = [0xFF; USER_BYTES_LEN];

/// First firmware version of the Gen2 platform.
pub const GEN2_BASELINE_VERSION: f64 = 4.1000;
/// First firmware version supporting volume read/write requests.
pub const VOLUME_SUPPORT_VERSION: f64 = 4.1026;
/// First firmware version reporting junked-out alerts.
pub const JUNK_ALERT_VERSION: f64 = 4.1032;
/// First firmware version with readable default sweeps.
pub const READ_DEFAULT_SWEEPS_VERSION: f64 = 3.8950;

// Bits 0-3 of user byte 0 are common to both generations.
const X_BAND_BIT: u8 = 0;
const K_BAND_BIT: u8 = 1;
const KA_BAND_BIT: u8 = 2;
const LASER_BIT: u8 = 3;

fn bit(bytes: &[u8; USER_BYTES_LEN], byte: usize, bit: u8) -> bool {
    bytes[byte] & (1 << bit) != 0
}

fn set_bit(bytes: &mut [u8; USER_BYTES_LEN], byte: usize, bit: u8, on: bool) {
    if on {
        bytes[byte] |= 1 << bit;
    } else {
        bytes[byte] &= !(1 << bit);
    }
}

/// User settings decoded under the layout of the detected firmware
/// generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserSettings {
    Gen1(Gen1Settings),
    Gen2(Gen2Settings),
}

/// One entry of the version-to-layout schema table.
struct SettingsSchema {
    min_version: f64,
    decode: fn([u8; USER_BYTES_LEN]) -> UserSettings,
}

/// Ordered most-recent-first; the first entry whose baseline the version
/// reaches wins.
const SCHEMAS: &[SettingsSchema] = &[
    SettingsSchema {
        min_version: GEN2_BASELINE_VERSION,
        decode: |bytes| UserSettings::Gen2(Gen2Settings { bytes }),
    },
    SettingsSchema {
        min_version: 0.0,
        decode: |bytes| UserSettings::Gen1(Gen1Settings { bytes }),
    },
];

impl UserSettings {
    /// Decode user bytes under the layout for `version`.
    pub fn for_version(version: f64, bytes: [u8; USER_BYTES_LEN]) -> Self {
        let schema = SCHEMAS
            .iter()
            .find(|s| version >= s.min_version)
            .unwrap_or(&SCHEMAS[SCHEMAS.len() - 1]);
        (schema.decode)(bytes)
    }

    /// Factory defaults under the layout for `version`.
    pub fn default_for_version(version: f64) -> Self {
        Self::for_version(version, DEFAULT_USER_BYTES)
    }

    /// The raw user bytes.
    pub fn bytes(&self) -> &[u8; USER_BYTES_LEN] {
        match self {
            UserSettings::Gen1(s) => &s.bytes,
            UserSettings::Gen2(s) => &s.bytes,
        }
    }

    fn common(&self) -> &[u8; USER_BYTES_LEN] {
        self.bytes()
    }

    fn common_mut(&mut self) -> &mut [u8; USER_BYTES_LEN] {
        match self {
            UserSettings::Gen1(s) => &mut s.bytes,
            UserSettings::Gen2(s) => &mut s.bytes,
        }
    }

    pub fn x_band_enabled(&self) -> bool {
        bit(self.common(), 0, X_BAND_BIT)
    }

    pub fn set_x_band_enabled(&mut self, on: bool) {
        set_bit(self.common_mut(), 0, X_BAND_BIT, on);
    }

    pub fn k_band_enabled(&self) -> bool {
        bit(self.common(), 0, K_BAND_BIT)
    }

    pub fn set_k_band_enabled(&mut self, on: bool) {
        set_bit(self.common_mut(), 0, K_BAND_BIT, on);
    }

    pub fn ka_band_enabled(&self) -> bool {
        bit(self.common(), 0, KA_BAND_BIT)
    }

    pub fn set_ka_band_enabled(&mut self, on: bool) {
        set_bit(self.common_mut(), 0, KA_BAND_BIT, on);
    }

    pub fn laser_enabled(&self) -> bool {
        bit(self.common(), 0, LASER_BIT)
    }

    pub fn set_laser_enabled(&mut self, on: bool) {
        set_bit(self.common_mut(), 0, LASER_BIT, on);
    }

    /// Ku band, layout-dependent (stored inverted in both generations).
    pub fn ku_band_enabled(&self) -> bool {
        match self {
            UserSettings::Gen1(s) => s.ku_band_enabled(),
            UserSettings::Gen2(s) => s.ku_band_enabled(),
        }
    }

    /// Euro mode, layout-dependent (stored inverted in both generations).
    pub fn euro_enabled(&self) -> bool {
        match self {
            UserSettings::Gen1(s) => s.euro_enabled(),
            UserSettings::Gen2(s) => s.euro_enabled(),
        }
    }

    /// Traffic-monitor filter, layout-dependent.
    pub fn tmf_enabled(&self) -> bool {
        match self {
            UserSettings::Gen1(s) => s.tmf_enabled(),
            UserSettings::Gen2(s) => s.tmf_enabled(),
        }
    }
}

/// Gen1 (pre-4.1000) user byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen1Settings {
    bytes: [u8; USER_BYTES_LEN],
}

impl Gen1Settings {
    pub fn new(bytes: [u8; USER_BYTES_LEN]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8; USER_BYTES_LEN] {
        &self.bytes
    }

    /// Bargraph sensitivity: set means normal, clear means responsive.
    pub fn bargraph_normal(&self) -> bool {
        bit(&self.bytes, 0, 4)
    }

    pub fn set_bargraph_normal(&mut self, normal: bool) {
        set_bit(&mut self.bytes, 0, 4, normal);
    }

    pub fn ka_false_guard_enabled(&self) -> bool {
        bit(&self.bytes, 0, 5)
    }

    /// K muting is stored inverted.
    pub fn k_muting_enabled(&self) -> bool {
        !bit(&self.bytes, 0, 6)
    }

    pub fn set_k_muting_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 0, 6, !on);
    }

    pub fn mute_at_mute_volume(&self) -> bool {
        bit(&self.bytes, 0, 7)
    }

    pub fn k_initial_unmute(&self) -> bool {
        bit(&self.bytes, 1, 4)
    }

    pub fn k_persistent_unmute(&self) -> bool {
        bit(&self.bytes, 1, 5)
    }

    pub fn k_rear_mute(&self) -> bool {
        bit(&self.bytes, 1, 6)
    }

    /// Ku band is stored inverted.
    pub fn ku_band_enabled(&self) -> bool {
        !bit(&self.bytes, 1, 7)
    }

    pub fn set_ku_band_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 1, 7, !on);
    }

    pub fn pop_enabled(&self) -> bool {
        bit(&self.bytes, 2, 0)
    }

    /// Euro mode is stored inverted.
    pub fn euro_enabled(&self) -> bool {
        !bit(&self.bytes, 2, 1)
    }

    pub fn set_euro_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 2, 1, !on);
    }

    pub fn euro_x_enabled(&self) -> bool {
        bit(&self.bytes, 2, 2)
    }

    pub fn tmf_enabled(&self) -> bool {
        bit(&self.bytes, 2, 3)
    }

    pub fn set_tmf_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 2, 3, on);
    }

    pub fn force_legacy(&self) -> bool {
        bit(&self.bytes, 2, 4)
    }
}

/// Gen2 (4.1000+) user byte layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gen2Settings {
    bytes: [u8; USER_BYTES_LEN],
}

impl Gen2Settings {
    pub fn new(bytes: [u8; USER_BYTES_LEN]) -> Self {
        Self { bytes }
    }

    pub fn bytes(&self) -> &[u8; USER_BYTES_LEN] {
        &self.bytes
    }

    pub fn mute_at_mute_volume(&self) -> bool {
        bit(&self.bytes, 0, 4)
    }

    pub fn set_mute_at_mute_volume(&mut self, on: bool) {
        set_bit(&mut self.bytes, 0, 4, on);
    }

    /// Bogey-lock tone loud after muting.
    pub fn memo_loud(&self) -> bool {
        bit(&self.bytes, 0, 5)
    }

    /// X and K rear mute is stored inverted.
    pub fn mute_x_k_rear(&self) -> bool {
        !bit(&self.bytes, 0, 6)
    }

    /// Ku band is stored inverted.
    pub fn ku_band_enabled(&self) -> bool {
        !bit(&self.bytes, 0, 7)
    }

    pub fn set_ku_band_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 0, 7, !on);
    }

    /// Euro mode is stored inverted.
    pub fn euro_enabled(&self) -> bool {
        !bit(&self.bytes, 1, 0)
    }

    pub fn set_euro_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 1, 0, !on);
    }

    pub fn tmf_enabled(&self) -> bool {
        bit(&self.bytes, 1, 1)
    }

    pub fn set_tmf_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 1, 1, on);
    }

    pub fn laser_rear_enabled(&self) -> bool {
        bit(&self.bytes, 1, 2)
    }

    /// Custom frequencies are stored inverted.
    pub fn custom_frequencies_enabled(&self) -> bool {
        !bit(&self.bytes, 1, 3)
    }

    pub fn set_custom_frequencies_enabled(&mut self, on: bool) {
        set_bit(&mut self.bytes, 1, 3, !on);
    }

    /// Ka always radar priority is stored inverted.
    pub fn ka_always_priority(&self) -> bool {
        !bit(&self.bytes, 1, 4)
    }

    pub fn fast_laser_detect(&self) -> bool {
        bit(&self.bytes, 1, 5)
    }

    pub fn startup_sequence_enabled(&self) -> bool {
        bit(&self.bytes, 2, 0)
    }

    pub fn resting_display_enabled(&self) -> bool {
        bit(&self.bytes, 2, 1)
    }

    pub fn bsm_plus_enabled(&self) -> bool {
        bit(&self.bytes, 2, 2)
    }
}

/// Main and muted volume levels (Gen2 platforms, 4.1026 and up).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VolumeSettings {
    pub main: u8,
    pub muted: u8,
}

impl VolumeSettings {
    /// Parse from a current-volume response payload.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        Some(Self {
            main: *payload.first()?,
            muted: *payload.get(1)?,
        })
    }
}

/// SAVVY accessory status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SavvyStatus {
    /// Speed threshold below which the SAVVY mutes, in the unit the SAVVY
    /// was configured with.
    pub speed_threshold: u8,
    /// The user overrode the threshold with the thumbwheel.
    pub threshold_overridden: bool,
    /// Unmuting at speed is enabled.
    pub unmute_enabled: bool,
}

impl SavvyStatus {
    /// Parse from a SAVVY-status response payload.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let threshold = *payload.first()?;
        let status = *payload.get(1)?;
        Some(Self {
            speed_threshold: threshold,
            threshold_overridden: status & 0x01 != 0,
            unmute_enabled: status & 0x02 != 0,
        })
    }
}
