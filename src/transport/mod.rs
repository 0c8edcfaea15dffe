//! Transport seam: how a session reaches the radio.
//!
//! A [`Transport`] opens into a [`TransportLink`] — a message-oriented pair
//! of channels. The session pushes [`TransportWrite`]s (one encoded frame
//! each, acknowledged when the underlying link finished the write) and
//! receives inbound byte chunks exactly as the radio delivered them,
//! arbitrary boundaries included. A transport signals disconnection by
//! closing the inbound channel; the session closes the link by dropping
//! both ends.
//!
//! Three implementations ship with the crate: a GATT-style channel adapter
//! ([`BleTransport`]), a byte-stream adapter with SPP link framing
//! ([`SerialTransport`]) and a scripted generator ([`DemoTransport`]).

pub mod ble;
pub mod demo;
pub mod serial;

pub use ble::{BleTransport, GattEndpoint};
pub use demo::{DemoScript, DemoTransport};
pub use serial::{spp_encode, SerialTransport, SppDecoder};

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, oneshot};

use crate::error::Result;

/// Boxed future used to keep [`Transport`] object safe.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The kind of radio link underneath a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransportKind {
    /// BLE GATT notify/write.
    BleLowEnergy,
    /// Classic serial profile (SPP).
    Serial,
    /// Simulated device for offline use.
    Demo,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            TransportKind::BleLowEnergy => "BLE",
            TransportKind::Serial => "Serial",
            TransportKind::Demo => "Demo",
        })
    }
}

/// One outgoing frame write. `ack` resolves once the transport finished
/// the write (or failed); the session issues the next write only then.
#[derive(Debug)]
pub struct TransportWrite {
    /// Complete encoded frame.
    pub bytes: Bytes,
    /// Completion signal for the write.
    pub ack: oneshot::Sender<std::io::Result<()>>,
}

/// An opened, bidirectional link to the device.
#[derive(Debug)]
pub struct TransportLink {
    /// What kind of link this is.
    pub kind: TransportKind,
    /// Frame writes toward the device.
    pub outbound: mpsc::Sender<TransportWrite>,
    /// Raw inbound byte chunks from the device. Closed on disconnect.
    pub inbound: mpsc::Receiver<Bytes>,
}

/// A way to reach a device. Implemented by the bundled adapters and by
/// embedders wrapping a platform radio API.
pub trait Transport: Send {
    /// Which kind of link this transport produces.
    fn kind(&self) -> TransportKind;

    /// Open the link. Consumes the transport's one connection; a second
    /// call fails.
    fn open(&mut self) -> BoxFuture<'_, Result<TransportLink>>;
}

/// Depth of the link channels. Writes are serialized one at a time, so the
/// queue stays shallow by construction; inbound depth absorbs radio bursts.
pub(crate) const LINK_CHANNEL_CAPACITY: usize = 64;
