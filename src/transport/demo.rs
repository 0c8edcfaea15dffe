//! Demo transport: a scripted V1 for offline development and tests.
//!
//! Replays a script of pre-encoded frames on a fixed tick (display data,
//! mostly), optionally looping, and answers the common requests from a
//! canned device state so the full request/response path works without a
//! radio. The simulated device is a checksum-variant V1 running Gen2
//! firmware.

use bytes::Bytes;
use std::time::Duration;
use tokio::sync::mpsc;

use crate::data::{SweepDefinition, SweepSection};
use crate::error::{EspError, Result};
use crate::packets::{decode, Packet};
use crate::protocol::{ByteFramer, DeviceId, Frame, PacketId};

use super::{
    BoxFuture, Transport, TransportKind, TransportLink, TransportWrite, LINK_CHANNEL_CAPACITY,
};

/// Cadence of scripted frames, close to the V1's own display refresh.
pub const DEFAULT_TICK: Duration = Duration::from_millis(68);

const DEMO_VERSION: &[u8] = b"V4.1032";
const DEMO_SERIAL: &[u8] = b"DEMO2041";
const DEMO_MAX_SWEEP_INDEX: u8 = 5;

/// A sequence of frames the demo device transmits on its own.
#[derive(Debug, Clone)]
pub struct DemoScript {
    pub frames: Vec<Bytes>,
}

impl DemoScript {
    /// Resting display data: display on, live system status, no alerts.
    pub fn standard() -> Self {
        let display = demo_frame(
            PacketId::InfDisplayData,
            &[0x3F, 0x3F, 0x00, 0x00, 0x00, 0x0C, 0x00, 0x00],
        );
        Self {
            frames: vec![display.to_bytes()],
        }
    }

    /// Build a script from typed frames.
    pub fn from_frames(frames: Vec<Frame>) -> Self {
        Self {
            frames: frames.iter().map(Frame::to_bytes).collect(),
        }
    }
}

/// Scripted transport implementation.
pub struct DemoTransport {
    script: DemoScript,
    tick: Duration,
    repeat: bool,
    opened: bool,
}

/// Builder for [`DemoTransport`].
pub struct DemoTransportBuilder {
    script: DemoScript,
    tick: Duration,
    repeat: bool,
}

impl DemoTransportBuilder {
    pub fn script(mut self, script: DemoScript) -> Self {
        self.script = script;
        self
    }

    pub fn tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Loop the script instead of going quiet at its end.
    pub fn repeat(mut self, repeat: bool) -> Self {
        self.repeat = repeat;
        self
    }

    pub fn build(self) -> DemoTransport {
        DemoTransport {
            script: self.script,
            tick: self.tick,
            repeat: self.repeat,
            opened: false,
        }
    }
}

impl DemoTransport {
    pub fn builder() -> DemoTransportBuilder {
        DemoTransportBuilder {
            script: DemoScript::standard(),
            tick: DEFAULT_TICK,
            repeat: true,
        }
    }
}

impl Transport for DemoTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::Demo
    }

    fn open(&mut self) -> BoxFuture<'_, Result<TransportLink>> {
        Box::pin(async move {
            if self.opened {
                return Err(EspError::TransportOpen("demo already opened".into()));
            }
            self.opened = true;

            let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(LINK_CHANNEL_CAPACITY);
            let (outbound_tx, outbound_rx) =
                mpsc::channel::<TransportWrite>(LINK_CHANNEL_CAPACITY);

            let device = DemoDevice {
                script: self.script.clone(),
                tick: self.tick,
                repeat: self.repeat,
                inbound_tx,
                alerts_on: false,
            };
            tokio::spawn(device.run(outbound_rx));

            Ok(TransportLink {
                kind: TransportKind::Demo,
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}

struct DemoDevice {
    script: DemoScript,
    tick: Duration,
    repeat: bool,
    inbound_tx: mpsc::Sender<Bytes>,
    alerts_on: bool,
}

impl DemoDevice {
    async fn run(mut self, mut outbound_rx: mpsc::Receiver<TransportWrite>) {
        // Lenient framing: the client sends checksum-free frames until it
        // has identified the bus variant.
        let mut framer = ByteFramer::new(false);
        let mut step = 0usize;
        let mut interval = tokio::time::interval(self.tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                write = outbound_rx.recv() => {
                    match write {
                        Some(TransportWrite { bytes, ack }) => {
                            let responses = self.handle_write(&mut framer, &bytes);
                            let _ = ack.send(Ok(()));
                            for frame in responses {
                                if self.inbound_tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                        // Session closed the link.
                        None => return,
                    }
                }
                _ = interval.tick() => {
                    if step >= self.script.frames.len() {
                        if !self.repeat {
                            continue;
                        }
                        step = 0;
                    }
                    if !self.script.frames.is_empty() {
                        let frame = self.script.frames[step].clone();
                        step += 1;
                        if self.inbound_tx.send(frame).await.is_err() {
                            return;
                        }
                    }
                    if self.alerts_on {
                        let alert = demo_frame(
                            PacketId::RespAlertData,
                            // One-alert table: Ka ahead, strong and priority.
                            &[0x11, 0x87, 0x8C, 0xA8, 0x10, 0x22, 0x80],
                        );
                        if self.inbound_tx.send(alert.to_bytes()).await.is_err() {
                            return;
                        }
                    }
                }
            }
        }
    }

    /// Answer one written frame from the canned device state.
    fn handle_write(&mut self, framer: &mut ByteFramer, bytes: &[u8]) -> Vec<Bytes> {
        let mut responses = Vec::new();
        for frame in framer.feed(bytes) {
            let Ok(Packet::Request(request)) = decode(frame) else {
                continue;
            };
            match request.packet_id() {
                PacketId::ReqVersion => {
                    responses.push(demo_frame(PacketId::RespVersion, DEMO_VERSION).to_bytes());
                }
                PacketId::ReqSerialNumber => {
                    responses.push(demo_frame(PacketId::RespSerialNumber, DEMO_SERIAL).to_bytes());
                }
                PacketId::ReqBatteryVoltage => {
                    responses.push(demo_frame(PacketId::RespBatteryVoltage, &[12, 6]).to_bytes());
                }
                PacketId::ReqUserBytes => {
                    responses.push(demo_frame(PacketId::RespUserBytes, &[0xFF; 6]).to_bytes());
                }
                PacketId::ReqMaxSweepIndex => {
                    responses.push(
                        demo_frame(PacketId::RespMaxSweepIndex, &[DEMO_MAX_SWEEP_INDEX]).to_bytes(),
                    );
                }
                PacketId::ReqAllSweepDefinitions => {
                    for index in 0..=DEMO_MAX_SWEEP_INDEX {
                        let def = SweepDefinition::new(index, 33_900, 34_106);
                        responses.push(
                            demo_frame(PacketId::RespSweepDefinition, &def.to_payload()).to_bytes(),
                        );
                    }
                }
                PacketId::ReqSweepSections => {
                    let a = SweepSection {
                        index: 1,
                        count: 2,
                        lower_edge: 33_383,
                        upper_edge: 34_770,
                    };
                    let b = SweepSection {
                        index: 2,
                        count: 2,
                        lower_edge: 34_774,
                        upper_edge: 36_072,
                    };
                    let mut payload = Vec::new();
                    payload.extend_from_slice(&a.to_payload());
                    payload.extend_from_slice(&b.to_payload());
                    responses.push(demo_frame(PacketId::RespSweepSections, &payload).to_bytes());
                }
                PacketId::ReqCurrentVolume => {
                    responses
                        .push(demo_frame(PacketId::RespCurrentVolume, &[9, 2, 0]).to_bytes());
                }
                PacketId::ReqStartAlertData => {
                    self.alerts_on = true;
                }
                PacketId::ReqStopAlertData => {
                    self.alerts_on = false;
                }
                PacketId::ReqWriteSweepDefinition => {
                    // Commit sweep triggers the write result.
                    if request.frame.payload().first().is_some_and(|b| b & 0x40 != 0) {
                        responses
                            .push(demo_frame(PacketId::RespSweepWriteResult, &[0]).to_bytes());
                    }
                }
                other => {
                    tracing::debug!(id = ?other, "demo device ignoring request");
                }
            }
        }
        responses
    }
}

/// A frame as the demo V1 would transmit it.
fn demo_frame(id: PacketId, payload: &[u8]) -> Frame {
    Frame::new(
        DeviceId::V1Connection,
        DeviceId::ValentineOne,
        id,
        Bytes::copy_from_slice(payload),
        true,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    use crate::packets::{RequestPacket, ResponseBody};

    async fn write_request(link: &TransportLink, request: RequestPacket) {
        let (ack, ack_rx) = oneshot::channel();
        link.outbound
            .send(TransportWrite {
                bytes: request.frame.to_bytes(),
                ack,
            })
            .await
            .unwrap();
        ack_rx.await.unwrap().unwrap();
    }

    async fn next_response(link: &mut TransportLink, framer: &mut ByteFramer) -> Packet {
        loop {
            let chunk = link.inbound.recv().await.unwrap();
            let frames = framer.feed(&chunk);
            if let Some(frame) = frames.into_iter().next() {
                return decode(frame).unwrap();
            }
        }
    }

    #[tokio::test]
    async fn test_script_replays() {
        let mut transport = DemoTransport::builder()
            .tick(Duration::from_millis(5))
            .repeat(true)
            .build();
        let mut link = transport.open().await.unwrap();

        let mut framer = ByteFramer::new(true);
        for _ in 0..3 {
            let packet = next_response(&mut link, &mut framer).await;
            assert_eq!(packet.packet_id(), PacketId::InfDisplayData);
        }
    }

    #[tokio::test]
    async fn test_version_request_answered() {
        let mut transport = DemoTransport::builder()
            .script(DemoScript { frames: vec![] })
            .build();
        let mut link = transport.open().await.unwrap();

        write_request(&link, RequestPacket::version(DeviceId::ValentineOne, DeviceId::ValentineOne)).await;

        let mut framer = ByteFramer::new(true);
        let packet = next_response(&mut link, &mut framer).await;
        assert_eq!(
            packet.response_body(),
            Some(&ResponseBody::Version("V4.1032".into()))
        );
    }

    #[tokio::test]
    async fn test_all_sweeps_streams_full_set() {
        let mut transport = DemoTransport::builder()
            .script(DemoScript { frames: vec![] })
            .build();
        let mut link = transport.open().await.unwrap();

        write_request(&link, RequestPacket::all_sweep_definitions(DeviceId::ValentineOne)).await;

        let mut framer = ByteFramer::new(true);
        for _ in 0..=DEMO_MAX_SWEEP_INDEX {
            let packet = next_response(&mut link, &mut framer).await;
            assert_eq!(packet.packet_id(), PacketId::RespSweepDefinition);
        }
    }

    #[tokio::test]
    async fn test_alert_stream_toggle() {
        let mut transport = DemoTransport::builder()
            .script(DemoScript { frames: vec![] })
            .tick(Duration::from_millis(5))
            .build();
        let mut link = transport.open().await.unwrap();

        write_request(&link, RequestPacket::start_alert_data(DeviceId::ValentineOne)).await;

        let mut framer = ByteFramer::new(true);
        let packet = next_response(&mut link, &mut framer).await;
        assert_eq!(packet.packet_id(), PacketId::RespAlertData);
    }
}
