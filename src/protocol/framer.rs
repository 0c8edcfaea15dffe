//! Byte framer: accumulates raw transport bytes and extracts valid frames.
//!
//! Radio links deliver ESP data in arbitrary chunks — frames split mid-byte
//! across notifications, several frames per chunk, or garbage in between.
//! The framer keeps a single growing buffer, scans for the start marker and
//! emits every structurally valid frame it can prove complete. On any
//! validation failure it discards exactly one byte and rescans, so a corrupt
//! prefix can never hide a valid frame behind it.
//!
//! Corruption is not an error to the caller: dropped bytes and failed
//! checksums are tallied in [`FramerStats`] and the scan continues.

use bytes::{Bytes, BytesMut};

use super::constants::{
    checksum, DEST_ID_BASE, FRAME_EOF, FRAME_OVERHEAD, FRAME_SOF, ORIG_ID_BASE, PAYLOAD_LEN_IDX,
    PAYLOAD_START_IDX,
};
use super::frame::Frame;

/// Counters describing what the framer has seen, for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FramerStats {
    /// Complete frames emitted.
    pub frames: u64,
    /// Bytes discarded while resynchronizing.
    pub discarded_bytes: u64,
    /// Frames rejected on a checksum mismatch.
    pub checksum_failures: u64,
}

/// Stateful frame scanner over an untrusted byte stream.
pub struct ByteFramer {
    /// Accumulated bytes awaiting framing.
    buffer: BytesMut,
    /// Whether frames from non-V1 origins are expected to carry a checksum
    /// (decided by the last detected bus V1 variant).
    bus_checksum: bool,
    stats: FramerStats,
}

impl ByteFramer {
    /// Create a framer. `bus_checksum` seeds the checksum expectation for
    /// frames whose origin byte does not identify a V1 variant.
    pub fn new(bus_checksum: bool) -> Self {
        Self {
            buffer: BytesMut::with_capacity(1024),
            bus_checksum,
            stats: FramerStats::default(),
        }
    }

    /// Update the checksum expectation after a bus variant change.
    pub fn set_bus_checksum(&mut self, on: bool) {
        self.bus_checksum = on;
    }

    /// Framer counters.
    pub fn stats(&self) -> FramerStats {
        self.stats
    }

    /// Number of buffered bytes not yet framed.
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Drop all buffered bytes and restart the scan. Used on reconnect so a
    /// partial frame from a dead link cannot prefix the new stream.
    pub fn reset(&mut self) {
        self.buffer.clear();
    }

    /// Feed raw bytes and collect every complete frame now available.
    ///
    /// The chunking of the input is irrelevant: a frame split across any
    /// number of `feed` calls is emitted exactly once, identical to the
    /// single-chunk case.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Frame> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            match self.scan_one() {
                Scan::Frame(frame) => frames.push(frame),
                Scan::Discard(n) => {
                    let _ = self.buffer.split_to(n);
                    self.stats.discarded_bytes += n as u64;
                }
                Scan::NeedMore => break,
            }
        }
        frames
    }

    /// Try to extract one frame from the head of the buffer.
    fn scan_one(&mut self) -> Scan {
        let buf = &self.buffer[..];
        if buf.is_empty() {
            return Scan::NeedMore;
        }

        // Hunt for the start marker; everything in front of it is noise.
        match buf.iter().position(|&b| b == FRAME_SOF) {
            Some(0) => {}
            Some(n) => return Scan::Discard(n),
            None => return Scan::Discard(buf.len()),
        }

        if buf.len() <= PAYLOAD_LEN_IDX {
            return Scan::NeedMore;
        }

        // Addressing bytes must carry their base nibbles.
        if buf[1] & DEST_ID_BASE != DEST_ID_BASE || buf[2] & ORIG_ID_BASE != ORIG_ID_BASE {
            return Scan::Discard(1);
        }

        let len = buf[PAYLOAD_LEN_IDX] as usize;
        let total = len + FRAME_OVERHEAD;
        if buf.len() < total {
            return Scan::NeedMore;
        }

        if buf[total - 1] != FRAME_EOF {
            return Scan::Discard(1);
        }

        // The origin byte overrides the bus default: a V1 always stamps its
        // own variant.
        let orig_id = buf[2] & 0x0F;
        let checksummed = match orig_id {
            0x0A => true,
            0x09 => false,
            _ => self.bus_checksum,
        };

        if checksummed {
            if len == 0 {
                // A checksummed frame needs room for the checksum byte.
                return Scan::Discard(1);
            }
            let expected = buf[total - 2];
            let computed = checksum(&buf[..total - 2]);
            if expected != computed {
                self.stats.checksum_failures += 1;
                return Scan::Discard(1);
            }
        }

        let wire: Bytes = self.buffer.split_to(total).freeze();
        let payload_len = len - usize::from(checksummed);
        let frame = Frame::from_wire(
            wire[1],
            wire[2],
            wire[3],
            wire.slice(PAYLOAD_START_IDX..PAYLOAD_START_IDX + payload_len),
            checksummed,
        );
        self.stats.frames += 1;
        Scan::Frame(frame)
    }
}

enum Scan {
    /// A complete frame was extracted.
    Frame(Frame),
    /// Discard this many leading bytes and rescan.
    Discard(usize),
    /// The buffer holds no complete frame yet.
    NeedMore,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::constants::{DeviceId, PacketId};

    fn version_request(checksummed: bool) -> Frame {
        Frame::new(
            if checksummed {
                DeviceId::ValentineOne
            } else {
                DeviceId::ValentineOneNoChecksum
            },
            DeviceId::V1Connection,
            PacketId::ReqVersion,
            Bytes::new(),
            checksummed,
        )
    }

    fn v1_response(payload: &'static [u8]) -> Frame {
        Frame::new(
            DeviceId::V1Connection,
            DeviceId::ValentineOne,
            PacketId::RespVersion,
            Bytes::from_static(payload),
            true,
        )
    }

    #[test]
    fn test_single_complete_frame() {
        let mut framer = ByteFramer::new(true);
        let wire = v1_response(b"V4.1032").to_bytes();

        let frames = framer.feed(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].packet_id(), PacketId::RespVersion);
        assert_eq!(&frames[0].payload()[..], b"V4.1032");
        assert_eq!(framer.pending(), 0);
    }

    #[test]
    fn test_roundtrip_is_byte_identical() {
        let mut framer = ByteFramer::new(true);
        let wire = v1_response(b"V4.1032").to_bytes();
        let frames = framer.feed(&wire);
        assert_eq!(frames[0].to_bytes(), wire);
    }

    #[test]
    fn test_multiple_frames_in_one_feed() {
        let mut framer = ByteFramer::new(false);
        let mut wire = Vec::new();
        wire.extend_from_slice(&version_request(false).to_bytes());
        wire.extend_from_slice(&version_request(false).to_bytes());
        wire.extend_from_slice(&version_request(false).to_bytes());

        let frames = framer.feed(&wire);
        assert_eq!(frames.len(), 3);
    }

    #[test]
    fn test_byte_at_a_time_delivery() {
        let mut framer = ByteFramer::new(true);
        let wire = v1_response(b"V3.8952").to_bytes();

        let mut frames = Vec::new();
        for b in wire.iter() {
            frames.extend(framer.feed(&[*b]));
        }

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_bytes(), wire);
    }

    #[test]
    fn test_every_split_point_yields_one_frame() {
        let wire = v1_response(b"V3.8952").to_bytes();
        for split in 1..wire.len() {
            let mut framer = ByteFramer::new(true);
            let mut frames = framer.feed(&wire[..split]);
            frames.extend(framer.feed(&wire[split..]));
            assert_eq!(frames.len(), 1, "split at {split}");
            assert_eq!(frames[0].to_bytes(), wire);
        }
    }

    #[test]
    fn test_garbage_before_frame_is_discarded() {
        let mut framer = ByteFramer::new(true);
        let mut wire = vec![0x00, 0x13, 0x37];
        wire.extend_from_slice(&v1_response(b"V4.1032").to_bytes());

        let frames = framer.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(framer.stats().discarded_bytes, 3);
    }

    #[test]
    fn test_resync_after_corrupt_frame() {
        // A frame whose checksum byte is flipped, immediately followed by a
        // valid frame: exactly the valid one must come out.
        let good = v1_response(b"V4.1032").to_bytes();
        let mut bad = good.to_vec();
        let cs_idx = bad.len() - 2;
        bad[cs_idx] ^= 0xFF;

        let mut wire = bad;
        wire.extend_from_slice(&good);

        let mut framer = ByteFramer::new(true);
        let frames = framer.feed(&wire);

        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_bytes(), good);
        assert!(framer.stats().checksum_failures >= 1);
        assert!(framer.stats().discarded_bytes > 0);
    }

    #[test]
    fn test_truncated_frame_then_valid() {
        let good = v1_response(b"V4.1032").to_bytes();
        // First half of one frame, then a complete one.
        let mut wire = good[..5].to_vec();
        wire.extend_from_slice(&good);

        let mut framer = ByteFramer::new(true);
        let frames = framer.feed(&wire);
        // The truncated prefix claims more payload than follows before the
        // embedded frame's bytes resolve the scan; only one frame is valid.
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_bytes(), good);
    }

    #[test]
    fn test_bad_eof_discards_and_recovers() {
        let good = version_request(false).to_bytes();
        let mut bad = good.to_vec();
        let last = bad.len() - 1;
        bad[last] = 0x00;
        let mut wire = bad;
        wire.extend_from_slice(&good);

        let mut framer = ByteFramer::new(false);
        let frames = framer.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].to_bytes(), good);
    }

    #[test]
    fn test_origin_overrides_bus_checksum_default() {
        // Framer believes the bus has no checksums, but the frame's origin
        // byte says it came from the checksum variant.
        let mut framer = ByteFramer::new(false);
        let wire = v1_response(b"V4.1032").to_bytes();
        let frames = framer.feed(&wire);
        assert_eq!(frames.len(), 1);
        assert!(frames[0].checksummed());
    }

    #[test]
    fn test_pure_garbage_never_emits() {
        let mut framer = ByteFramer::new(true);
        let garbage: Vec<u8> = (0u16..512).map(|i| (i % 0xA9) as u8).collect();
        let frames = framer.feed(&garbage);
        assert!(frames.is_empty());
    }

    #[test]
    fn test_reset_clears_partial_state() {
        let mut framer = ByteFramer::new(true);
        let wire = v1_response(b"V4.1032").to_bytes();
        framer.feed(&wire[..4]);
        assert!(framer.pending() > 0);
        framer.reset();
        assert_eq!(framer.pending(), 0);
        // A fresh full frame still parses.
        assert_eq!(framer.feed(&wire).len(), 1);
    }
}
