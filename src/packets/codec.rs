//! Frame ↔ packet codec.
//!
//! Decoding maps the wire packet id to a typed variant. Unregistered ids
//! are not an error — they decode to [`Packet::Unknown`] so the library
//! keeps working against protocol revisions newer than itself. Encoding
//! hands back the packet's frame untouched, which is what makes the
//! round-trip law hold for every variant.

use crate::error::EspError;
use crate::protocol::{Frame, PacketId};

use super::request::RequestPacket;
use super::response::ResponseBody;
use super::{Packet, ResponsePacket, UnknownPacket};

/// Decode a validated frame into a typed packet.
///
/// # Errors
///
/// [`EspError::MalformedPayload`] when a known response id carries a payload
/// that does not fit its shape. The frame's raw payload is attached.
pub fn decode(frame: Frame) -> Result<Packet, EspError> {
    let id = frame.packet_id();
    match id {
        PacketId::Other(_) => Ok(Packet::Unknown(UnknownPacket { frame })),
        id if id.is_request() => Ok(Packet::Request(RequestPacket { frame })),
        id => {
            let body = ResponseBody::parse(id, frame.payload())?;
            Ok(Packet::Response(ResponsePacket { frame, body }))
        }
    }
}

/// Encode a packet back into its wire frame.
pub fn encode(packet: &Packet) -> Frame {
    packet.frame().clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{ByteFramer, DeviceId};
    use bytes::Bytes;

    fn response_frame(id: PacketId, payload: &'static [u8]) -> Frame {
        Frame::new(
            DeviceId::V1Connection,
            DeviceId::ValentineOne,
            id,
            Bytes::from_static(payload),
            true,
        )
    }

    #[test]
    fn test_decode_response() {
        let frame = response_frame(PacketId::RespBatteryVoltage, &[12, 6]);
        let packet = decode(frame).unwrap();
        assert_eq!(
            packet.response_body(),
            Some(&ResponseBody::BatteryVoltage { volts: 12, tenths: 6 })
        );
    }

    #[test]
    fn test_decode_request() {
        let req = RequestPacket::version(DeviceId::ValentineOne, DeviceId::ValentineOne);
        let packet = decode(req.frame.clone()).unwrap();
        assert!(matches!(packet, Packet::Request(_)));
    }

    #[test]
    fn test_unknown_id_decodes_and_keeps_payload() {
        let frame = Frame::new(
            DeviceId::V1Connection,
            DeviceId::ValentineOne,
            PacketId::Other(0xF0),
            Bytes::from_static(&[1, 2, 3, 4]),
            true,
        );
        let packet = decode(frame.clone()).unwrap();
        match &packet {
            Packet::Unknown(unknown) => {
                assert_eq!(unknown.packet_id_byte(), 0xF0);
                assert_eq!(&unknown.frame.payload()[..], &[1, 2, 3, 4]);
            }
            other => panic!("expected unknown packet, got {other:?}"),
        }
        assert_eq!(encode(&packet), frame);
    }

    #[test]
    fn test_malformed_known_id_is_an_error() {
        let frame = response_frame(PacketId::RespUserBytes, &[1, 2, 3]);
        assert!(matches!(
            decode(frame),
            Err(EspError::MalformedPayload { packet_id: 0x12, .. })
        ));
    }

    #[test]
    fn test_wire_roundtrip_through_framer() {
        // encode(decode(f)) must reproduce the received bytes exactly.
        let cases = vec![
            response_frame(PacketId::RespVersion, b"V4.1032"),
            response_frame(PacketId::RespMaxSweepIndex, &[5]),
            response_frame(PacketId::InfV1Busy, &[0x16, 0x19]),
            Frame::new(
                DeviceId::V1Connection,
                DeviceId::ValentineOne,
                PacketId::Other(0xEE),
                Bytes::from_static(&[9, 9, 9]),
                true,
            ),
        ];
        for frame in cases {
            let wire = frame.to_bytes();
            let mut framer = ByteFramer::new(true);
            let frames = framer.feed(&wire);
            assert_eq!(frames.len(), 1);
            let packet = decode(frames[0].clone()).unwrap();
            assert_eq!(encode(&packet).to_bytes(), wire);
        }
    }
}
