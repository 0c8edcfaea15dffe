//! Display data: the V1's front-panel state, broadcast continuously.
//!
//! The 8-byte payload mirrors the physical display: two seven-segment bogey
//! counter images (current vs. resting), the signal-strength bargraph, two
//! band/arrow indicator images (lit vs. blinking) and three aux bytes.

use serde::{Deserialize, Serialize};

/// Payload size of a display-data record.
pub const DISPLAY_DATA_LEN: usize = 8;

const BOGEY_IMG1_IDX: usize = 0;
const BOGEY_IMG2_IDX: usize = 1;
const BARGRAPH_IDX: usize = 2;
const BAND_ARROW_IMG1_IDX: usize = 3;
const BAND_ARROW_IMG2_IDX: usize = 4;
const AUX0_IDX: usize = 5;
const AUX1_IDX: usize = 6;
const AUX2_IDX: usize = 7;

// Aux 0 bit assignments.
const AUX0_SOFT_MUTE: u8 = 0x01;
const AUX0_TS_HOLDOFF: u8 = 0x02;
const AUX0_SYSTEM_STATUS: u8 = 0x04;
const AUX0_DISPLAY_ON: u8 = 0x08;
const AUX0_EURO_MODE: u8 = 0x10;
const AUX0_CUSTOM_SWEEPS: u8 = 0x20;
const AUX0_LEGACY_MODE: u8 = 0x40;

/// Decoded display-data record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisplayData {
    data: [u8; DISPLAY_DATA_LEN],
}

impl DisplayData {
    pub fn new(data: [u8; DISPLAY_DATA_LEN]) -> Self {
        Self { data }
    }

    /// Parse from a payload slice; `None` if too short.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let data: [u8; DISPLAY_DATA_LEN] = payload.get(..DISPLAY_DATA_LEN)?.try_into().ok()?;
        Some(Self { data })
    }

    /// Raw record bytes.
    pub fn as_bytes(&self) -> &[u8; DISPLAY_DATA_LEN] {
        &self.data
    }

    /// Seven-segment image of the bogey counter.
    pub fn bogey_counter_image1(&self) -> u8 {
        self.data[BOGEY_IMG1_IDX] & 0x7F
    }

    /// Seven-segment image of the blinking phase of the bogey counter.
    pub fn bogey_counter_image2(&self) -> u8 {
        self.data[BOGEY_IMG2_IDX] & 0x7F
    }

    /// Signal-strength bargraph image (one bit per lit segment).
    pub fn bargraph_image(&self) -> u8 {
        self.data[BARGRAPH_IDX]
    }

    /// Number of lit bargraph segments.
    pub fn bargraph_segments(&self) -> u32 {
        self.data[BARGRAPH_IDX].count_ones()
    }

    /// Band/arrow indicator image (steady phase).
    pub fn band_arrow_image1(&self) -> u8 {
        self.data[BAND_ARROW_IMG1_IDX]
    }

    /// Band/arrow indicator image (blinking phase).
    pub fn band_arrow_image2(&self) -> u8 {
        self.data[BAND_ARROW_IMG2_IDX]
    }

    fn indicator(&self, mask: u8) -> bool {
        self.system_status() && self.data[BAND_ARROW_IMG1_IDX] & mask != 0
    }

    /// Laser indicator lit (only meaningful while system status is valid).
    pub fn laser(&self) -> bool {
        self.indicator(0x01)
    }

    /// Ka indicator lit.
    pub fn ka(&self) -> bool {
        self.indicator(0x02)
    }

    /// K indicator lit.
    pub fn k(&self) -> bool {
        self.indicator(0x04)
    }

    /// X indicator lit.
    pub fn x(&self) -> bool {
        self.indicator(0x08)
    }

    /// Front arrow lit.
    pub fn front(&self) -> bool {
        self.indicator(0x20)
    }

    /// Side arrow lit.
    pub fn side(&self) -> bool {
        self.indicator(0x40)
    }

    /// Rear arrow lit.
    pub fn rear(&self) -> bool {
        self.indicator(0x80)
    }

    /// Any alert currently displayed.
    pub fn has_active_alerts(&self) -> bool {
        self.system_status() && (self.front() || self.side() || self.rear())
    }

    /// Audio is soft-muted.
    pub fn soft_mute(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_SOFT_MUTE != 0
    }

    /// Time-slice hold-off: the V1 asks bus devices to pause transmissions.
    pub fn ts_holdoff(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_TS_HOLDOFF != 0
    }

    /// The band/arrow image reflects live system status (as opposed to a
    /// display test or startup sequence).
    pub fn system_status(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_SYSTEM_STATUS != 0
    }

    /// Main display is on.
    pub fn display_on(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_DISPLAY_ON != 0
    }

    /// Euro mode active.
    pub fn euro_mode(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_EURO_MODE != 0
    }

    /// Custom sweeps active.
    pub fn custom_sweeps(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_CUSTOM_SWEEPS != 0
    }

    /// The V1 is operating in pre-ESP legacy mode.
    pub fn legacy_mode(&self) -> bool {
        self.data[AUX0_IDX] & AUX0_LEGACY_MODE != 0
    }

    /// First auxiliary byte (bluetooth indicator bits live here).
    pub fn aux1(&self) -> u8 {
        self.data[AUX1_IDX]
    }

    /// Second auxiliary byte.
    pub fn aux2(&self) -> u8 {
        self.data[AUX2_IDX]
    }
}
