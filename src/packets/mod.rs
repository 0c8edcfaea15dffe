//! Typed packets: the decoded in-memory form of a wire frame.
//!
//! The taxonomy is closed at the type level — request, response, unknown —
//! but open at the wire level: ids this library does not know still decode
//! (to [`UnknownPacket`]) and re-encode byte-identically. Every packet keeps
//! its [`Frame`] as the encoding source of truth, so the round-trip law
//! `encode(decode(f)) == f` holds structurally rather than by convention.

pub mod codec;
pub mod request;
pub mod response;

pub use codec::{decode, encode};
pub use request::RequestPacket;
pub use response::{version_value, ResponseBody};

use bytes::Bytes;

use crate::protocol::{DeviceId, Frame, PacketId};

/// A decoded ESP packet.
#[derive(Debug, Clone, PartialEq)]
pub enum Packet {
    /// A request observed on the bus (ours echoed, or another device's).
    Request(RequestPacket),
    /// A response or unsolicited notification.
    Response(ResponsePacket),
    /// A packet with an id outside this library's table.
    Unknown(UnknownPacket),
}

impl Packet {
    /// The wire frame backing this packet.
    pub fn frame(&self) -> &Frame {
        match self {
            Packet::Request(p) => &p.frame,
            Packet::Response(p) => &p.frame,
            Packet::Unknown(p) => &p.frame,
        }
    }

    /// Packet id.
    pub fn packet_id(&self) -> PacketId {
        self.frame().packet_id()
    }

    /// Originating device.
    pub fn origin(&self) -> DeviceId {
        self.frame().origin()
    }

    /// Destination device.
    pub fn destination(&self) -> DeviceId {
        self.frame().destination()
    }

    /// Raw payload bytes.
    pub fn payload(&self) -> &Bytes {
        self.frame().payload()
    }

    /// The parsed response body, when this is a response.
    pub fn response_body(&self) -> Option<&ResponseBody> {
        match self {
            Packet::Response(p) => Some(&p.body),
            _ => None,
        }
    }
}

/// A response or notification packet with its parsed body.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponsePacket {
    /// Backing wire frame.
    pub frame: Frame,
    /// Validated view of the payload.
    pub body: ResponseBody,
}

/// A packet whose id is not in this library's table. The payload is kept
/// verbatim so newer protocol revisions pass through unharmed.
#[derive(Debug, Clone, PartialEq)]
pub struct UnknownPacket {
    /// Backing wire frame.
    pub frame: Frame,
}

impl UnknownPacket {
    /// Raw wire id byte.
    pub fn packet_id_byte(&self) -> u8 {
        self.frame.packet_id_byte()
    }
}
