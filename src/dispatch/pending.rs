//! Pending requests: correlation of one outgoing request with its eventual
//! response(s).
//!
//! The protocol carries no transaction id, so responses are matched by
//! (response packet id, responding device). The dispatcher never holds two
//! pending entries under the same key — a second submission is rejected —
//! which keeps the correlation unambiguous.

use tokio::sync::oneshot;

use crate::data::{SweepDefinition, SweepSection};
use crate::error::{EspError, Result};
use crate::packets::ResponsePacket;
use crate::protocol::DeviceId;

use super::reassembly::{SectionSetAssembler, SweepSetAssembler};

/// Correlation key for matching a response to its request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationKey {
    /// Packet id of the expected response.
    pub response_id: u8,
    /// Device the request was addressed to.
    pub device: DeviceId,
}

impl CorrelationKey {
    /// Build a key. V1 variant ids collapse to one bucket: a request sent
    /// to the no-checksum variant may be answered under the checksum
    /// variant's id once the bus settles on its real type.
    pub fn new(response_id: u8, device: DeviceId) -> Self {
        Self {
            response_id,
            device: canonical_device(device),
        }
    }
}

/// Collapse the V1 variant ids into one correlation bucket.
pub(crate) fn canonical_device(device: DeviceId) -> DeviceId {
    if device.is_v1() {
        DeviceId::ValentineOne
    } else {
        device
    }
}

/// What a completed request yields.
#[derive(Debug)]
pub enum RequestOutcome {
    /// A single response packet.
    Packet(ResponsePacket),
    /// A reassembled sweep-definition set.
    SweepSet(Vec<SweepDefinition>),
    /// A reassembled sweep-section set.
    SectionSet(Vec<SweepSection>),
}

/// How many response packets a pending request consumes.
pub enum PendingKind {
    /// Completes on the first matching response.
    Single,
    /// Accumulates sweep definitions until the set is full.
    SweepSet(SweepSetAssembler),
    /// Accumulates sweep sections until the set is full.
    SectionSet(SectionSetAssembler),
}

impl std::fmt::Debug for PendingKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PendingKind::Single => f.write_str("Single"),
            PendingKind::SweepSet(_) => f.write_str("SweepSet"),
            PendingKind::SectionSet(_) => f.write_str("SectionSet"),
        }
    }
}

/// Book-keeping for one in-flight request. Owned by the dispatcher; removed
/// on completion, timeout, cancellation or connection teardown, whichever
/// comes first.
#[derive(Debug)]
pub struct PendingEntry {
    /// Packet id of the originating request (matched against device-side
    /// failure reports).
    pub request_id: u8,
    pub kind: PendingKind,
    tx: oneshot::Sender<Result<RequestOutcome>>,
}

impl PendingEntry {
    pub fn new(
        request_id: u8,
        kind: PendingKind,
    ) -> (Self, oneshot::Receiver<Result<RequestOutcome>>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                request_id,
                kind,
                tx,
            },
            rx,
        )
    }

    /// Complete the request. Returns false if the caller is gone (the
    /// request was cancelled).
    pub fn complete(self, outcome: Result<RequestOutcome>) -> bool {
        self.tx.send(outcome).is_ok()
    }

    /// True once the caller has dropped its receiver.
    pub fn is_abandoned(&self) -> bool {
        self.tx.is_closed()
    }
}

/// Caller-side handle for one submitted request.
#[derive(Debug)]
pub struct PendingTicket {
    pub key: CorrelationKey,
    pub rx: oneshot::Receiver<Result<RequestOutcome>>,
}

impl PendingTicket {
    /// Extract the single-response outcome.
    pub fn into_packet(outcome: RequestOutcome) -> Result<ResponsePacket> {
        match outcome {
            RequestOutcome::Packet(packet) => Ok(packet),
            _ => Err(EspError::InvalidData("expected a single response")),
        }
    }
}
