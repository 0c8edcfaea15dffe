//! Connection session: one logical connection over one transport.
//!
//! The session owns the transport link, the byte framer and the lifecycle
//! state machine. Inbound chunks flow through the framer and codec into the
//! dispatcher; outbound frames go through a dedicated writer task that
//! keeps exactly one write in flight. Reads and writes are independent
//! directions.
//!
//! On transport loss the session fails every pending request with
//! `ConnectionLost`, discards partial reassembly state and reports a
//! disconnection event. It never reconnects on its own — that policy
//! belongs to the caller, which simply connects a fresh session (the
//! dispatcher and its subscribers survive the swap).

pub mod writer;

pub use writer::{WriterHandle, DEFAULT_WRITE_ACK_TIMEOUT};

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};

use crate::dispatch::PacketDispatcher;
use crate::error::{EspError, Result};
use crate::packets::{decode, Packet, ResponseBody};
use crate::protocol::{ByteFramer, DeviceId, Frame};
use crate::transport::{Transport, TransportKind};

/// Consecutive display-data observations required before accepting a V1
/// variant change; jitter on the line can corrupt the origin id.
const V1_TYPE_SWITCH_THRESHOLD: u8 = 10;

/// How many recently written frames the echo filter remembers.
const ECHO_WINDOW: usize = 8;

/// Channel depth for session event fan-out.
const EVENT_CAPACITY: usize = 16;

/// Lifecycle states of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Lifecycle notifications delivered to connection listeners.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConnectionEvent {
    Connecting(TransportKind),
    Connected(TransportKind),
    ConnectionFailed(TransportKind),
    Disconnected(TransportKind),
}

/// Session tuning knobs.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Silence on the inbound stream longer than this produces a no-data
    /// report (and another per further quiet interval).
    pub data_timeout: Duration,
    /// Bound on waiting for the transport to acknowledge one write.
    pub write_ack_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            data_timeout: Duration::from_secs(5),
            write_ack_timeout: DEFAULT_WRITE_ACK_TIMEOUT,
        }
    }
}

/// Session counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Inbound frames dropped as echoes of our own writes.
    pub echoes_dropped: u64,
    /// Frames addressed to other bus devices, not dispatched.
    pub not_for_me: u64,
}

/// Debounced tracker of the live V1 variant on the bus.
struct V1TypeTracker {
    state: Mutex<TrackerState>,
}

struct TrackerState {
    current: DeviceId,
    candidate: DeviceId,
    streak: u8,
}

impl V1TypeTracker {
    fn new() -> Self {
        Self {
            state: Mutex::new(TrackerState {
                current: DeviceId::Unknown,
                candidate: DeviceId::Unknown,
                streak: 0,
            }),
        }
    }

    fn current(&self) -> DeviceId {
        self.state.lock().unwrap().current
    }

    /// Record one observation. Returns the new variant when it changes.
    fn observe(&self, seen: DeviceId) -> Option<DeviceId> {
        let mut state = self.state.lock().unwrap();
        if seen == state.current {
            state.candidate = DeviceId::Unknown;
            state.streak = 0;
            return None;
        }
        // First determination is taken immediately; a change away from a
        // known variant must persist for the full threshold.
        if state.current == DeviceId::Unknown {
            state.current = seen;
            return Some(seen);
        }
        if seen == state.candidate {
            state.streak += 1;
        } else {
            state.candidate = seen;
            state.streak = 1;
        }
        if state.streak >= V1_TYPE_SWITCH_THRESHOLD {
            state.current = seen;
            state.candidate = DeviceId::Unknown;
            state.streak = 0;
            Some(seen)
        } else {
            None
        }
    }
}

struct SessionShared {
    kind: TransportKind,
    dispatcher: Arc<PacketDispatcher>,
    state_tx: watch::Sender<ConnectionState>,
    events_tx: broadcast::Sender<ConnectionEvent>,
    no_data_tx: broadcast::Sender<Duration>,
    v1_type: V1TypeTracker,
    echo_ring: Mutex<VecDeque<Bytes>>,
    stats: Mutex<SessionStats>,
    shutdown_tx: watch::Sender<bool>,
}

impl SessionShared {
    /// Transition to Disconnected exactly once; fail pendings and notify.
    fn teardown(&self) {
        let previous = self.state_tx.send_replace(ConnectionState::Disconnected);
        if previous == ConnectionState::Disconnected {
            return;
        }
        self.dispatcher.fail_all(|| EspError::ConnectionLost);
        self.echo_ring.lock().unwrap().clear();
        let _ = self.events_tx.send(ConnectionEvent::Disconnected(self.kind));
        tracing::info!(transport = %self.kind, "session disconnected");
    }
}

/// One live connection to a device.
pub struct ConnectionSession {
    shared: Arc<SessionShared>,
    writer: WriterHandle,
}

impl ConnectionSession {
    /// Open `transport` and start the session machinery.
    ///
    /// # Errors
    ///
    /// [`EspError::TransportOpen`] (or an I/O error) if the link cannot be
    /// opened; the session ends Disconnected with a failure event.
    pub async fn connect(
        mut transport: Box<dyn Transport>,
        dispatcher: Arc<PacketDispatcher>,
        config: SessionConfig,
    ) -> Result<Self> {
        let kind = transport.kind();
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (no_data_tx, _) = broadcast::channel(EVENT_CAPACITY);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let _ = events_tx.send(ConnectionEvent::Connecting(kind));
        tracing::debug!(transport = %kind, "opening transport");

        let link = match transport.open().await {
            Ok(link) => link,
            Err(e) => {
                let _ = events_tx.send(ConnectionEvent::ConnectionFailed(kind));
                let _ = state_tx.send_replace(ConnectionState::Disconnected);
                tracing::warn!(transport = %kind, "transport open failed: {e}");
                return Err(e);
            }
        };

        let (writer, _writer_task) = writer::spawn_writer_task(link.outbound, config.write_ack_timeout);

        let shared = Arc::new(SessionShared {
            kind,
            dispatcher,
            state_tx,
            events_tx,
            no_data_tx,
            v1_type: V1TypeTracker::new(),
            echo_ring: Mutex::new(VecDeque::with_capacity(ECHO_WINDOW)),
            stats: Mutex::new(SessionStats::default()),
            shutdown_tx,
        });

        tokio::spawn(read_loop(
            link.inbound,
            shared.clone(),
            config.data_timeout,
            shutdown_rx,
        ));

        let _ = shared.state_tx.send_replace(ConnectionState::Connected);
        let _ = shared.events_tx.send(ConnectionEvent::Connected(kind));
        tracing::info!(transport = %kind, "session connected");

        Ok(Self { shared, writer })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ConnectionState {
        *self.shared.state_tx.borrow()
    }

    /// Watch lifecycle state changes.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ConnectionState::Connected
    }

    /// The transport kind underneath this session.
    pub fn kind(&self) -> TransportKind {
        self.shared.kind
    }

    /// Last detected V1 variant on the bus.
    pub fn v1_type(&self) -> DeviceId {
        self.shared.v1_type.current()
    }

    /// Lifecycle event stream.
    pub fn events(&self) -> broadcast::Receiver<ConnectionEvent> {
        self.shared.events_tx.subscribe()
    }

    /// Stream-silence reports, carrying the quiet interval length.
    pub fn no_data_reports(&self) -> broadcast::Receiver<Duration> {
        self.shared.no_data_tx.subscribe()
    }

    /// Session counters.
    pub fn stats(&self) -> SessionStats {
        *self.shared.stats.lock().unwrap()
    }

    /// Write one frame, serialized behind any write already in flight.
    pub async fn write_frame(&self, frame: &Frame) -> Result<()> {
        if !self.is_connected() {
            return Err(EspError::NotConnected);
        }
        let bytes = frame.to_bytes();
        self.writer.write(bytes.clone()).await?;

        // Remember the wire form: the ESP bus echoes transmissions back.
        let mut ring = self.shared.echo_ring.lock().unwrap();
        if ring.len() == ECHO_WINDOW {
            ring.pop_front();
        }
        ring.push_back(bytes);
        Ok(())
    }

    /// Tear the session down deliberately.
    pub async fn disconnect(&self) {
        if self.state() == ConnectionState::Disconnected {
            return;
        }
        let _ = self.shared.state_tx.send_replace(ConnectionState::Disconnecting);
        let _ = self.shared.shutdown_tx.send(true);
        self.shared.teardown();
    }
}

/// Inbound pump: transport chunks → framer → codec → dispatcher.
async fn read_loop(
    mut inbound: mpsc::Receiver<Bytes>,
    shared: Arc<SessionShared>,
    data_timeout: Duration,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut framer = ByteFramer::new(shared.v1_type.current().uses_checksum());

    loop {
        tokio::select! {
            _ = shutdown_rx.changed() => break,
            chunk = inbound.recv() => match chunk {
                Some(bytes) => process_chunk(&bytes, &mut framer, &shared),
                None => {
                    // Transport dropped underneath us.
                    shared.teardown();
                    return;
                }
            },
            _ = tokio::time::sleep(data_timeout) => {
                tracing::debug!(transport = %shared.kind, "no data within {data_timeout:?}");
                let _ = shared.no_data_tx.send(data_timeout);
            }
        }
    }
}

fn process_chunk(bytes: &[u8], framer: &mut ByteFramer, shared: &SessionShared) {
    for frame in framer.feed(bytes) {
        if is_echo(shared, &frame) {
            shared.stats.lock().unwrap().echoes_dropped += 1;
            continue;
        }

        match decode(frame) {
            Ok(packet) => {
                track_v1_type(shared, framer, &packet);
                if packet.frame().is_for_me() {
                    shared.dispatcher.on_packet(packet);
                } else {
                    shared.stats.lock().unwrap().not_for_me += 1;
                    tracing::trace!(dest = %packet.destination(), "frame for another device");
                }
            }
            Err(EspError::MalformedPayload { packet_id, payload }) => {
                shared.dispatcher.report_malformed(packet_id, payload);
            }
            Err(e) => tracing::warn!("decode failed: {e}"),
        }
    }
}

/// Drop frames that are byte-identical to something we recently wrote.
fn is_echo(shared: &SessionShared, frame: &Frame) -> bool {
    let wire = frame.to_bytes();
    let mut ring = shared.echo_ring.lock().unwrap();
    if let Some(pos) = ring.iter().position(|sent| *sent == wire) {
        ring.remove(pos);
        true
    } else {
        false
    }
}

/// Display data names the live V1 variant; feed the debounce tracker and
/// retune the framer's checksum expectation on a switch.
fn track_v1_type(shared: &SessionShared, framer: &mut ByteFramer, packet: &Packet) {
    let Some(ResponseBody::DisplayData(display)) = packet.response_body() else {
        return;
    };
    let seen = if display.legacy_mode() {
        DeviceId::ValentineOneLegacy
    } else if packet.origin() == DeviceId::ValentineOneNoChecksum {
        DeviceId::ValentineOneNoChecksum
    } else {
        DeviceId::ValentineOne
    };
    if let Some(switched) = shared.v1_type.observe(seen) {
        framer.set_bus_checksum(switched.uses_checksum());
        tracing::info!(variant = %switched, "V1 variant detected");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::PacketId;
    use crate::transport::{TransportLink, TransportWrite, BoxFuture};
    use tokio::sync::mpsc;

    /// Transport handing out a pre-wired link.
    struct TestTransport {
        link: Option<TransportLink>,
    }

    struct TestRemote {
        inbound_tx: mpsc::Sender<Bytes>,
        outbound_rx: mpsc::Receiver<TransportWrite>,
    }

    fn test_transport() -> (TestTransport, TestRemote) {
        let (inbound_tx, inbound_rx) = mpsc::channel(16);
        let (outbound_tx, outbound_rx) = mpsc::channel(16);
        (
            TestTransport {
                link: Some(TransportLink {
                    kind: TransportKind::Demo,
                    outbound: outbound_tx,
                    inbound: inbound_rx,
                }),
            },
            TestRemote {
                inbound_tx,
                outbound_rx,
            },
        )
    }

    impl Transport for TestTransport {
        fn kind(&self) -> TransportKind {
            TransportKind::Demo
        }

        fn open(&mut self) -> BoxFuture<'_, Result<TransportLink>> {
            Box::pin(async move {
                self.link
                    .take()
                    .ok_or_else(|| EspError::TransportOpen("taken".into()))
            })
        }
    }

    fn display_frame(aux0: u8, origin: DeviceId) -> Frame {
        Frame::new(
            DeviceId::GeneralBroadcast,
            origin,
            PacketId::InfDisplayData,
            Bytes::copy_from_slice(&[0, 0, 0, 0, 0, aux0, 0, 0]),
            origin == DeviceId::ValentineOne,
        )
    }

    async fn connect(
        transport: TestTransport,
    ) -> (ConnectionSession, Arc<PacketDispatcher>) {
        let dispatcher = Arc::new(PacketDispatcher::new());
        let session = ConnectionSession::connect(
            Box::new(transport),
            dispatcher.clone(),
            SessionConfig::default(),
        )
        .await
        .unwrap();
        (session, dispatcher)
    }

    #[tokio::test]
    async fn test_connect_reaches_connected_state() {
        let (transport, _remote) = test_transport();
        let (session, _) = connect(transport).await;
        assert_eq!(session.state(), ConnectionState::Connected);
        assert!(session.is_connected());
    }

    #[tokio::test]
    async fn test_inbound_frames_reach_dispatcher() {
        let (transport, remote) = test_transport();
        let (_session, dispatcher) = connect(transport).await;
        let mut packets = dispatcher.packets();

        let frame = display_frame(0x0C, DeviceId::ValentineOne);
        remote.inbound_tx.send(frame.to_bytes()).await.unwrap();

        let packet = packets.recv().await.unwrap();
        assert_eq!(packet.packet_id(), PacketId::InfDisplayData);
    }

    #[tokio::test]
    async fn test_v1_type_detected_from_display_data() {
        let (transport, remote) = test_transport();
        let (session, _dispatcher) = connect(transport).await;
        assert_eq!(session.v1_type(), DeviceId::Unknown);

        remote
            .inbound_tx
            .send(display_frame(0x0C, DeviceId::ValentineOne).to_bytes())
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(session.v1_type(), DeviceId::ValentineOne);
    }

    #[tokio::test]
    async fn test_transport_loss_fails_pending_and_disconnects() {
        use crate::dispatch::{CorrelationKey, PendingKind};

        let (transport, remote) = test_transport();
        let (session, dispatcher) = connect(transport).await;
        let mut events = session.events();

        let ticket = dispatcher
            .register(
                CorrelationKey::new(0x63, DeviceId::ValentineOne),
                0x62,
                PendingKind::Single,
            )
            .unwrap();

        drop(remote); // transport dies

        let err = dispatcher
            .wait(ticket, Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, EspError::ConnectionLost));

        let event = events.recv().await.unwrap();
        assert_eq!(event, ConnectionEvent::Disconnected(TransportKind::Demo));
        assert_eq!(session.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_write_serialization_and_echo_drop() {
        let (transport, mut remote) = test_transport();
        let (session, dispatcher) = connect(transport).await;

        let frame = Frame::new(
            DeviceId::ValentineOneNoChecksum,
            DeviceId::V1Connection,
            PacketId::ReqVersion,
            Bytes::new(),
            false,
        );

        let writer_session = frame.clone();
        let write = {
            let frame = writer_session;
            let session = &session;
            async move { session.write_frame(&frame).await }
        };

        let remote_task = async {
            let w = remote.outbound_rx.recv().await.unwrap();
            let bytes = w.bytes.clone();
            w.ack.send(Ok(())).unwrap();
            bytes
        };

        let (write_result, written) = tokio::join!(write, remote_task);
        write_result.unwrap();
        assert_eq!(written, frame.to_bytes());

        // The bus echoes our own request back: it must be filtered, not
        // dispatched.
        let mut packets = dispatcher.packets();
        remote.inbound_tx.send(frame.to_bytes()).await.unwrap();
        remote
            .inbound_tx
            .send(display_frame(0x0C, DeviceId::ValentineOne).to_bytes())
            .await
            .unwrap();

        let packet = packets.recv().await.unwrap();
        assert_eq!(packet.packet_id(), PacketId::InfDisplayData);
        assert_eq!(session.stats().echoes_dropped, 1);
    }

    #[tokio::test]
    async fn test_explicit_disconnect() {
        let (transport, _remote) = test_transport();
        let (session, _) = connect(transport).await;
        let mut events = session.events();

        session.disconnect().await;

        assert_eq!(session.state(), ConnectionState::Disconnected);
        assert_eq!(
            events.recv().await.unwrap(),
            ConnectionEvent::Disconnected(TransportKind::Demo)
        );
        assert!(matches!(
            session
                .write_frame(&display_frame(0, DeviceId::ValentineOne))
                .await,
            Err(EspError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_no_data_watchdog_fires() {
        let (transport, _remote) = test_transport();
        let dispatcher = Arc::new(PacketDispatcher::new());
        let session = ConnectionSession::connect(
            Box::new(transport),
            dispatcher,
            SessionConfig {
                data_timeout: Duration::from_millis(20),
                ..SessionConfig::default()
            },
        )
        .await
        .unwrap();

        let mut reports = session.no_data_reports();
        let quiet = reports.recv().await.unwrap();
        assert_eq!(quiet, Duration::from_millis(20));
    }
}
