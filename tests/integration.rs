//! End-to-end tests over in-memory transports.

use std::time::Duration;

use bytes::Bytes;
use esplink::data::{SweepDefinition, VolumeSettings};
use esplink::packets::{decode, Packet};
use esplink::protocol::{ByteFramer, DeviceId, Frame, PacketId};
use esplink::session::{ConnectionEvent, ConnectionState};
use esplink::transport::{
    spp_encode, BleTransport, DemoScript, DemoTransport, SerialTransport, SppDecoder,
    TransportKind,
};
use esplink::{ClientConfig, EspClient, EspError};

fn quick_config() -> ClientConfig {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let mut config = ClientConfig::default();
    config.request_timeout = Duration::from_millis(500);
    config
}

fn demo_client_transport() -> DemoTransport {
    DemoTransport::builder()
        .tick(Duration::from_millis(5))
        .repeat(true)
        .build()
}

/// A request on a connected session resolves with the decoded value well
/// inside its deadline.
#[tokio::test]
async fn test_battery_voltage_end_to_end() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let volts = client.request_battery_voltage().await.unwrap();
    assert!((volts - 12.6).abs() < 0.01);
}

#[tokio::test]
async fn test_identification_requests() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    assert_eq!(client.request_version().await.unwrap(), "V4.1032");
    assert_eq!(client.request_version_value().await.unwrap(), 4.1032);
    assert_eq!(client.request_serial_number().await.unwrap(), "DEMO2041");
}

#[tokio::test]
async fn test_v1_variant_detection_from_stream() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    // The demo script broadcasts display data from the checksum variant.
    let mut display = client.display_data();
    display.recv().await.unwrap();
    assert_eq!(client.v1_type(), DeviceId::ValentineOne);
    assert!(!client.is_legacy());
}

#[tokio::test]
async fn test_user_settings_versioned_decode() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let settings = client.request_user_settings().await.unwrap();
    // Demo firmware is Gen2 with factory bytes.
    assert!(matches!(settings, esplink::data::UserSettings::Gen2(_)));
    assert!(settings.x_band_enabled());
    assert!(!settings.euro_enabled());
}

/// Multi-packet reassembly: the sweep set streams in as one response per
/// slot after a max-index pre-flight.
#[tokio::test]
async fn test_all_sweep_definitions_reassembled() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let sweeps = client.request_all_sweep_definitions().await.unwrap();
    assert_eq!(sweeps.len(), 6);
    for (i, sweep) in sweeps.iter().enumerate() {
        assert_eq!(sweep.index as usize, i);
    }
}

#[tokio::test]
async fn test_sweep_sections_and_write() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let sections = client.request_sweep_sections().await.unwrap();
    assert_eq!(sections.len(), 2);
    assert_eq!(sections[0].index, 1);

    let batch = vec![
        SweepDefinition::new(0, 33_900, 34_106),
        SweepDefinition::new(1, 34_200, 34_400),
    ];
    client.write_sweep_definitions(batch).await.unwrap();
}

#[tokio::test]
async fn test_alert_stream() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let mut alerts = client.alert_tables();
    client.start_alert_data().await.unwrap();

    let table = alerts.recv().await.unwrap();
    assert_eq!(table.len(), 1);
    assert!(table[0].is_priority());
    assert_eq!(table[0].frequency(), 34_700);
}

#[tokio::test]
async fn test_current_volume_roundtrip() {
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let volume = client.request_current_volume().await.unwrap();
    assert_eq!(volume, VolumeSettings { main: 9, muted: 2 });
    client.write_volume(volume).await.unwrap();
}

/// A request with nobody answering times out with the distinct timeout
/// reason, not a decode or connection error.
#[tokio::test]
async fn test_request_timeout_distinct() {
    // The demo device never simulates a SAVVY, so nothing answers.
    let client = EspClient::connect(demo_client_transport(), quick_config())
        .await
        .unwrap();

    let err = client.request_savvy_status().await.unwrap_err();
    assert!(matches!(err, EspError::RequestTimeout(0x72)));
}

/// A pending request resolves with ConnectionLost when the transport
/// drops, and the session transitions to Disconnected.
#[tokio::test]
async fn test_connection_loss_fails_pending() {
    let (transport, endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();
    let mut events = client.connection_events();

    // Issue a request, then kill the link while it is pending.
    let (pending, ()) = tokio::join!(client.request_battery_voltage(), async {
        tokio::time::sleep(Duration::from_millis(50)).await;
        endpoint.disconnect();
    });

    let err = pending.unwrap_err();
    assert!(matches!(err, EspError::ConnectionLost));
    assert_eq!(client.state(), ConnectionState::Disconnected);
    assert_eq!(
        events.recv().await.unwrap(),
        ConnectionEvent::Disconnected(TransportKind::BleLowEnergy)
    );
}

#[tokio::test]
async fn test_duplicate_request_rejected() {
    // No responder: the first request parks, the identical second one must
    // be refused outright.
    let (transport, _endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();

    let (first, second) = tokio::join!(client.request_battery_voltage(), async {
        tokio::time::sleep(Duration::from_millis(20)).await;
        client.request_battery_voltage().await
    });

    assert!(matches!(first, Err(EspError::RequestTimeout(_))));
    assert!(matches!(second, Err(EspError::RequestInFlight(0x63, _))));
}

/// Drive the BLE path like a platform GATT stack: reads arrive as 20-byte
/// notifications, writes leave as MTU-sized chunks.
#[tokio::test]
async fn test_ble_endpoint_roundtrip_with_chunked_notifications() {
    let (transport, mut endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();

    let device = tokio::spawn(async move {
        let mut framer = ByteFramer::new(false);
        loop {
            let Some(chunk) = endpoint.next_write().await else {
                return;
            };
            for frame in framer.feed(&chunk) {
                let Ok(Packet::Request(request)) = decode(frame) else {
                    continue;
                };
                if request.packet_id() == PacketId::ReqBatteryVoltage {
                    let response = Frame::new(
                        DeviceId::V1Connection,
                        DeviceId::ValentineOne,
                        PacketId::RespBatteryVoltage,
                        Bytes::from_static(&[13, 1]),
                        true,
                    )
                    .to_bytes();
                    // Deliver split across tiny notifications.
                    for piece in response.chunks(3) {
                        endpoint.notify(piece).await;
                    }
                }
            }
        }
    });

    let volts = client.request_battery_voltage().await.unwrap();
    assert!((volts - 13.1).abs() < 0.01);

    client.disconnect().await;
    drop(client);
    device.await.unwrap();
}

/// Serial path: the SPP envelope is applied on writes and stripped on
/// reads, transparently to the protocol engine.
#[tokio::test]
async fn test_serial_transport_end_to_end() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    let (client_io, device_io) = tokio::io::duplex(4096);
    let (client_r, client_w) = tokio::io::split(client_io);
    let (mut device_r, mut device_w) = tokio::io::split(device_io);

    let transport = SerialTransport::new(client_r, client_w);
    let client = EspClient::connect(transport, quick_config()).await.unwrap();

    let device = tokio::spawn(async move {
        let mut decoder = SppDecoder::new();
        let mut framer = ByteFramer::new(false);
        let mut buf = vec![0u8; 512];
        loop {
            let Ok(n) = device_r.read(&mut buf).await else {
                return;
            };
            if n == 0 {
                return;
            }
            for esp in decoder.feed(&buf[..n]) {
                for frame in framer.feed(&esp) {
                    let Ok(Packet::Request(request)) = decode(frame) else {
                        continue;
                    };
                    if request.packet_id() == PacketId::ReqSerialNumber {
                        let response = Frame::new(
                            DeviceId::V1Connection,
                            DeviceId::ValentineOne,
                            PacketId::RespSerialNumber,
                            Bytes::from_static(b"SER12345"),
                            true,
                        );
                        let wire = spp_encode(&response.to_bytes());
                        if device_w.write_all(&wire).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    });

    let serial = client.request_serial_number().await.unwrap();
    assert_eq!(serial, "SER12345");

    client.disconnect().await;
    drop(client);
    device.await.unwrap();
}

/// Reconnection policy lives with the caller: after a drop, a fresh
/// transport on the same client restores service and keeps subscriptions.
#[tokio::test]
async fn test_caller_driven_reconnect() {
    let (transport, endpoint) = BleTransport::new();
    let mut client = EspClient::connect(transport, quick_config()).await.unwrap();

    let mut display = client.display_data();
    endpoint.disconnect();

    // Wait for the session to observe the loss.
    let mut state = client.state_watch();
    while *state.borrow() != ConnectionState::Disconnected {
        state.changed().await.unwrap();
    }

    client.reconnect(demo_client_transport()).await.unwrap();
    assert!(client.is_connected());
    assert_eq!(client.transport_kind(), TransportKind::Demo);

    // The pre-reconnect subscription still delivers.
    display.recv().await.unwrap();
}

/// Unknown packet ids pass through to generic subscribers untouched.
#[tokio::test]
async fn test_unknown_packet_forward_compat() {
    let (transport, endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();
    let mut packets = client.packets();

    let newer_protocol = Frame::new(
        DeviceId::GeneralBroadcast,
        DeviceId::ValentineOne,
        PacketId::Other(0x7A),
        Bytes::from_static(&[1, 2, 3]),
        true,
    );
    endpoint.notify(&newer_protocol.to_bytes()).await;

    let packet = packets.recv().await.unwrap();
    match packet {
        Packet::Unknown(unknown) => {
            assert_eq!(unknown.packet_id_byte(), 0x7A);
            assert_eq!(&unknown.frame.payload()[..], &[1, 2, 3]);
            assert_eq!(unknown.frame.to_bytes(), newer_protocol.to_bytes());
        }
        other => panic!("expected unknown packet, got {other:?}"),
    }
}

/// Malformed payloads for known ids surface on the malformed channel and
/// never kill the stream.
#[tokio::test]
async fn test_malformed_payload_reported_stream_survives() {
    let (transport, endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();
    let mut malformed = client.malformed_reports();
    let mut display = client.display_data();

    // User-bytes response with a truncated payload.
    let bad = Frame::new(
        DeviceId::V1Connection,
        DeviceId::ValentineOne,
        PacketId::RespUserBytes,
        Bytes::from_static(&[1, 2, 3]),
        true,
    );
    endpoint.notify(&bad.to_bytes()).await;

    let report = malformed.recv().await.unwrap();
    assert_eq!(report.packet_id, 0x12);
    assert_eq!(&report.payload[..], &[1, 2, 3]);

    // The session keeps decoding afterwards.
    let good = Frame::new(
        DeviceId::GeneralBroadcast,
        DeviceId::ValentineOne,
        PacketId::InfDisplayData,
        Bytes::from_static(&[0, 0, 0, 0, 0, 0x0C, 0, 0]),
        true,
    );
    endpoint.notify(&good.to_bytes()).await;
    display.recv().await.unwrap();
}

/// Corrupted bytes between frames are resynchronized away end to end.
#[tokio::test]
async fn test_corruption_resync_end_to_end() {
    let (transport, endpoint) = BleTransport::new();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();
    let mut display = client.display_data();

    let good = Frame::new(
        DeviceId::GeneralBroadcast,
        DeviceId::ValentineOne,
        PacketId::InfDisplayData,
        Bytes::from_static(&[0, 0, 0, 0, 0, 0x0C, 0, 0]),
        true,
    )
    .to_bytes();

    let mut corrupted = good.to_vec();
    corrupted[7] ^= 0xFF; // break the checksum
    endpoint.notify(&corrupted).await;
    endpoint.notify(&[0x00, 0xAA, 0x01]).await; // line noise
    endpoint.notify(&good).await;

    let data = display.recv().await.unwrap();
    assert!(data.display_on());
}

#[tokio::test]
async fn test_demo_script_from_frames() {
    let frames = vec![Frame::new(
        DeviceId::GeneralBroadcast,
        DeviceId::ValentineOne,
        PacketId::InfDisplayData,
        Bytes::from_static(&[0x06, 0x06, 0, 0, 0, 0x0C, 0, 0]),
        true,
    )];
    let transport = DemoTransport::builder()
        .script(DemoScript::from_frames(frames))
        .tick(Duration::from_millis(5))
        .repeat(true)
        .build();
    let client = EspClient::connect(transport, quick_config()).await.unwrap();

    let mut display = client.display_data();
    let data = display.recv().await.unwrap();
    assert_eq!(data.bogey_counter_image1(), 0x06);
}
