//! Wire frame envelope.
//!
//! A [`Frame`] is the validated wire unit between the byte framer and the
//! packet codec. It keeps the raw destination/origin bytes exactly as they
//! appeared on the wire so that re-encoding a received frame reproduces the
//! original bytes bit for bit, including ids this library does not know.

use bytes::{BufMut, Bytes, BytesMut};

use super::constants::{
    checksum, DeviceId, PacketId, DEST_ID_BASE, FRAME_EOF, FRAME_OVERHEAD, FRAME_SOF, ORIG_ID_BASE,
};

/// One complete, structurally valid ESP frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Destination byte as on the wire (`0xD0 | id`).
    dest_byte: u8,
    /// Origin byte as on the wire (`0xE0 | id`).
    orig_byte: u8,
    /// Packet id byte.
    packet_id: u8,
    /// Payload bytes, checksum byte excluded.
    payload: Bytes,
    /// Whether the wire form carries a trailing checksum byte.
    checksummed: bool,
}

impl Frame {
    /// Build a frame to originate locally.
    ///
    /// `checksummed` must reflect the current bus V1 variant; it decides
    /// whether the encoded form appends a checksum byte.
    pub fn new(
        destination: DeviceId,
        origin: DeviceId,
        packet_id: PacketId,
        payload: Bytes,
        checksummed: bool,
    ) -> Self {
        debug_assert!(payload.len() + usize::from(checksummed) <= u8::MAX as usize);
        Self {
            dest_byte: DEST_ID_BASE | destination.to_byte(),
            orig_byte: ORIG_ID_BASE | origin.to_byte(),
            packet_id: packet_id.to_byte(),
            payload,
            checksummed,
        }
    }

    /// Reconstitute a frame from fields the framer already validated.
    pub(crate) fn from_wire(
        dest_byte: u8,
        orig_byte: u8,
        packet_id: u8,
        payload: Bytes,
        checksummed: bool,
    ) -> Self {
        Self {
            dest_byte,
            orig_byte,
            packet_id,
            payload,
            checksummed,
        }
    }

    /// Destination device id.
    #[inline]
    pub fn destination(&self) -> DeviceId {
        DeviceId::from_byte(self.dest_byte & 0x0F)
    }

    /// Origin device id.
    #[inline]
    pub fn origin(&self) -> DeviceId {
        DeviceId::from_byte(self.orig_byte & 0x0F)
    }

    /// Typed packet id.
    #[inline]
    pub fn packet_id(&self) -> PacketId {
        PacketId::from_byte(self.packet_id)
    }

    /// Raw packet id byte.
    #[inline]
    pub fn packet_id_byte(&self) -> u8 {
        self.packet_id
    }

    /// Payload bytes (checksum excluded).
    #[inline]
    pub fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Whether the wire form of this frame carries a checksum byte.
    #[inline]
    pub fn checksummed(&self) -> bool {
        self.checksummed
    }

    /// True if this frame is addressed to the V1connection or broadcast.
    pub fn is_for_me(&self) -> bool {
        matches!(
            self.destination(),
            DeviceId::V1Connection | DeviceId::GeneralBroadcast
        )
    }

    /// True if this frame was transmitted by a V1.
    pub fn is_from_v1(&self) -> bool {
        self.origin().is_v1()
    }

    /// Total encoded length in bytes.
    pub fn wire_len(&self) -> usize {
        self.payload.len() + usize::from(self.checksummed) + FRAME_OVERHEAD
    }

    /// Encode to the exact wire byte sequence.
    pub fn to_bytes(&self) -> Bytes {
        let len_byte = (self.payload.len() + usize::from(self.checksummed)) as u8;
        let mut buf = BytesMut::with_capacity(self.wire_len());
        buf.put_u8(FRAME_SOF);
        buf.put_u8(self.dest_byte);
        buf.put_u8(self.orig_byte);
        buf.put_u8(self.packet_id);
        buf.put_u8(len_byte);
        buf.put_slice(&self.payload);
        if self.checksummed {
            let sum = checksum(&buf);
            buf.put_u8(sum);
        }
        buf.put_u8(FRAME_EOF);
        buf.freeze()
    }
}

impl std::fmt::Display for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bytes = self.to_bytes();
        for (i, b) in bytes.iter().enumerate() {
            if i > 0 {
                f.write_str(" ")?;
            }
            write!(f, "{b:02X}")?;
        }
        Ok(())
    }
}
