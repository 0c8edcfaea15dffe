//! Packet dispatch: request/response correlation, reassembly and fan-out.
//!
//! Every decoded inbound packet flows through [`PacketDispatcher::on_packet`].
//! Routing order:
//!
//! 1. Device-side failure reports fail the pending request they name.
//! 2. A packet matching an outstanding correlation key completes (or feeds)
//!    that pending request — at most once; a late duplicate falls through
//!    and is treated as a plain notification.
//! 3. Multi-segment families feed their reassembly accumulator and emit the
//!    assembled entity to subscribers when complete.
//! 4. Everything fans out to category subscribers; a packet nobody consumed
//!    is counted as dropped.
//!
//! Timeouts, cancellation and connection teardown all resolve through the
//! same rule: whoever removes the pending entry first owns the completion,
//! the loser is a no-op.

pub mod pending;
pub mod reassembly;

pub use pending::{CorrelationKey, PendingKind, PendingTicket, RequestOutcome};
pub use reassembly::{AlertTableAssembler, SectionSetAssembler, SweepSetAssembler};

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::broadcast;

use crate::data::{AlertTable, DisplayData};
use crate::error::{EspError, Result};
use crate::packets::{Packet, ResponseBody, ResponsePacket};

use pending::PendingEntry;

/// Channel depth for notification fan-out.
const SUBSCRIBER_CAPACITY: usize = 64;

/// A known packet id whose payload did not fit its shape.
#[derive(Debug, Clone, PartialEq)]
pub struct MalformedReport {
    /// Wire packet id.
    pub packet_id: u8,
    /// Raw payload as received.
    pub payload: Bytes,
}

/// Dispatch counters for diagnostics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DispatchStats {
    /// Packets no pending request or subscriber consumed.
    pub dropped: u64,
    /// Responses that matched a key after its request had completed.
    pub late_responses: u64,
    /// Malformed payload reports.
    pub malformed: u64,
}

struct Inner {
    pending: HashMap<CorrelationKey, PendingEntry>,
    alert_assembler: AlertTableAssembler,
    busy_ids: Vec<u8>,
    stats: DispatchStats,
}

/// Routes decoded packets to pending requests, accumulators and
/// subscribers.
pub struct PacketDispatcher {
    inner: Mutex<Inner>,
    packets_tx: broadcast::Sender<Packet>,
    alerts_tx: broadcast::Sender<AlertTable>,
    display_tx: broadcast::Sender<DisplayData>,
    busy_tx: broadcast::Sender<Vec<u8>>,
    malformed_tx: broadcast::Sender<MalformedReport>,
}

impl PacketDispatcher {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                pending: HashMap::new(),
                alert_assembler: AlertTableAssembler::new(),
                busy_ids: Vec::new(),
                stats: DispatchStats::default(),
            }),
            packets_tx: broadcast::channel(SUBSCRIBER_CAPACITY).0,
            alerts_tx: broadcast::channel(SUBSCRIBER_CAPACITY).0,
            display_tx: broadcast::channel(SUBSCRIBER_CAPACITY).0,
            busy_tx: broadcast::channel(SUBSCRIBER_CAPACITY).0,
            malformed_tx: broadcast::channel(SUBSCRIBER_CAPACITY).0,
        }
    }

    // Pending requests ----------------------------------------------------

    /// Register a pending request under `key`.
    ///
    /// # Errors
    ///
    /// [`EspError::RequestInFlight`] if a live entry already holds the key;
    /// the protocol has no transaction ids, so two identical keys in flight
    /// would make correlation ambiguous.
    pub fn register(
        &self,
        key: CorrelationKey,
        request_id: u8,
        kind: PendingKind,
    ) -> Result<PendingTicket> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(existing) = inner.pending.get(&key) {
            if existing.is_abandoned() {
                inner.pending.remove(&key);
            } else {
                return Err(EspError::RequestInFlight(key.response_id, key.device));
            }
        }
        let (entry, rx) = PendingEntry::new(request_id, kind);
        inner.pending.insert(key, entry);
        Ok(PendingTicket { key, rx })
    }

    /// Await a registered request's outcome, bounded by `timeout`.
    ///
    /// Exactly-once completion is guaranteed under the response/timeout
    /// race: a response that arrives strictly before the deadline wins even
    /// when both fire in the same poll.
    pub async fn wait(&self, ticket: PendingTicket, timeout: Duration) -> Result<RequestOutcome> {
        let PendingTicket { key, mut rx } = ticket;
        match tokio::time::timeout(timeout, &mut rx).await {
            Ok(Ok(outcome)) => outcome,
            // Sender dropped without completing: teardown raced us.
            Ok(Err(_)) => Err(EspError::ConnectionLost),
            Err(_) => {
                let removed = self.inner.lock().unwrap().pending.remove(&key);
                if removed.is_some() {
                    Err(EspError::RequestTimeout(key.response_id))
                } else {
                    // The entry is gone: the response side won the race and
                    // its outcome is already in the channel.
                    match rx.try_recv() {
                        Ok(outcome) => outcome,
                        Err(_) => Err(EspError::RequestTimeout(key.response_id)),
                    }
                }
            }
        }
    }

    /// Cancel a pending request. Later matches for the key become plain
    /// notifications.
    pub fn cancel(&self, key: CorrelationKey) {
        if let Some(entry) = self.inner.lock().unwrap().pending.remove(&key) {
            let _ = entry.complete(Err(EspError::RequestCancelled));
        }
    }

    /// Fail every pending request and drop all partial reassembly state.
    /// Called on connection teardown.
    pub fn fail_all(&self, reason: fn() -> EspError) {
        let entries: Vec<PendingEntry> = {
            let mut inner = self.inner.lock().unwrap();
            inner.alert_assembler.clear();
            inner.busy_ids.clear();
            inner.pending.drain().map(|(_, e)| e).collect()
        };
        for entry in entries {
            let _ = entry.complete(Err(reason()));
        }
    }

    /// Number of requests currently in flight.
    pub fn pending_count(&self) -> usize {
        self.inner.lock().unwrap().pending.len()
    }

    // Inbound -------------------------------------------------------------

    /// Route one decoded inbound packet.
    pub fn on_packet(&self, packet: Packet) {
        let mut consumed = false;

        if let Packet::Response(response) = &packet {
            if response.body.is_failure() {
                consumed |= self.fail_reported_request(response);
            }
            consumed |= self.route_to_pending(response);
            consumed |= self.route_unsolicited(response);
        }

        // Every packet reaches the generic subscribers, matched or not.
        let observed = self.packets_tx.send(packet.clone()).is_ok();

        if !consumed && !observed {
            let mut inner = self.inner.lock().unwrap();
            inner.stats.dropped += 1;
            tracing::debug!(id = ?packet.packet_id(), origin = %packet.origin(), "packet dropped");
        }
    }

    /// Surface a malformed-payload decode failure.
    pub fn report_malformed(&self, packet_id: u8, payload: Bytes) {
        self.inner.lock().unwrap().stats.malformed += 1;
        tracing::warn!(packet_id, len = payload.len(), "malformed payload");
        let _ = self.malformed_tx.send(MalformedReport { packet_id, payload });
    }

    /// Complete or feed the pending request matching this response.
    fn route_to_pending(&self, response: &ResponsePacket) -> bool {
        let key = CorrelationKey::new(response.frame.packet_id_byte(), response.frame.origin());
        let mut inner = self.inner.lock().unwrap();

        let Some(mut entry) = inner.pending.remove(&key) else {
            return false;
        };

        let outcome = match &mut entry.kind {
            PendingKind::Single => Some(RequestOutcome::Packet(response.clone())),
            PendingKind::SweepSet(assembler) => {
                let definition = match &response.body {
                    ResponseBody::SweepDefinition(d) => Some(*d),
                    ResponseBody::DefaultSweepDefinition(d) => Some(*d),
                    _ => None,
                };
                match definition {
                    Some(d) => assembler.add(d).map(RequestOutcome::SweepSet),
                    None => None,
                }
            }
            PendingKind::SectionSet(assembler) => match &response.body {
                ResponseBody::SweepSections(sections) => {
                    assembler.add(sections.clone()).map(RequestOutcome::SectionSet)
                }
                _ => None,
            },
        };

        match outcome {
            Some(outcome) => {
                drop(inner);
                if !entry.complete(Ok(outcome)) {
                    // The caller cancelled; the response demotes to a plain
                    // notification.
                    self.inner.lock().unwrap().stats.late_responses += 1;
                    return false;
                }
                true
            }
            None => {
                // Multi-segment request still accumulating.
                inner.pending.insert(key, entry);
                true
            }
        }
    }

    /// Fail the pending request a device-side failure report names.
    fn fail_reported_request(&self, response: &ResponsePacket) -> bool {
        let (bad_id, reason) = match &response.body {
            ResponseBody::Unsupported(id) => (*id, "request not supported"),
            ResponseBody::NotProcessed(id) => (*id, "request not processed"),
            ResponseBody::DataError(id) => (*id, "data error"),
            _ => return false,
        };
        let origin = pending::canonical_device(response.frame.origin());

        let entry = {
            let mut inner = self.inner.lock().unwrap();
            let key = inner
                .pending
                .iter()
                .find(|(k, e)| e.request_id == bad_id && k.device == origin)
                .map(|(k, _)| *k);
            key.and_then(|k| inner.pending.remove(&k))
        };

        match entry {
            Some(entry) => {
                tracing::info!(request_id = bad_id, device = %origin, reason, "request rejected by device");
                let _ = entry.complete(Err(EspError::RequestRejected {
                    device: origin,
                    request_id: bad_id,
                    reason,
                }));
                true
            }
            None => false,
        }
    }

    /// Feed unsolicited streams: display data, alert tables, busy reports.
    fn route_unsolicited(&self, response: &ResponsePacket) -> bool {
        match &response.body {
            ResponseBody::DisplayData(display) => self.display_tx.send(*display).is_ok(),
            ResponseBody::AlertData(alert) => {
                let table = self.inner.lock().unwrap().alert_assembler.add(*alert);
                match table {
                    Some(table) => self.alerts_tx.send(table).is_ok(),
                    // Partial tables count as consumed: the accumulator took
                    // the packet.
                    None => true,
                }
            }
            ResponseBody::V1Busy(ids) => {
                self.inner.lock().unwrap().busy_ids = ids.clone();
                self.busy_tx.send(ids.clone()).is_ok()
            }
            _ => false,
        }
    }

    // Subscriptions -------------------------------------------------------

    /// Every decoded packet, in arrival order.
    pub fn packets(&self) -> broadcast::Receiver<Packet> {
        self.packets_tx.subscribe()
    }

    /// Fully assembled alert tables.
    pub fn alert_tables(&self) -> broadcast::Receiver<AlertTable> {
        self.alerts_tx.subscribe()
    }

    /// Display-data notifications.
    pub fn display_data(&self) -> broadcast::Receiver<DisplayData> {
        self.display_tx.subscribe()
    }

    /// Busy-id reports from the V1.
    pub fn busy(&self) -> broadcast::Receiver<Vec<u8>> {
        self.busy_tx.subscribe()
    }

    /// Malformed-payload reports.
    pub fn malformed(&self) -> broadcast::Receiver<MalformedReport> {
        self.malformed_tx.subscribe()
    }

    /// Request ids the V1 most recently reported busy.
    pub fn busy_ids(&self) -> Vec<u8> {
        self.inner.lock().unwrap().busy_ids.clone()
    }

    /// Dispatch counters.
    pub fn stats(&self) -> DispatchStats {
        self.inner.lock().unwrap().stats
    }
}

impl Default for PacketDispatcher {
    fn default() -> Self {
        Self::new()
    }
}
