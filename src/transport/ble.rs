//! BLE GATT transport adapter.
//!
//! The BLE stack itself lives outside this crate: the platform delivers
//! characteristic notifications and accepts characteristic writes. This
//! adapter is the glue — the session side behaves like any other transport,
//! while the embedder drives a [`GattEndpoint`]: push every notification's
//! bytes in with [`GattEndpoint::notify`], pull outgoing characteristic
//! writes (already chunked to the MTU) with [`GattEndpoint::next_write`].
//!
//! ESP frames cross BLE as raw bytes split over ~20-byte notifications;
//! the session's framer reassembles them, so no link framing exists here.

use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::{EspError, Result};

use super::{
    BoxFuture, Transport, TransportKind, TransportLink, TransportWrite, LINK_CHANNEL_CAPACITY,
};

/// Default write chunk: the classic 23-byte ATT MTU minus headers.
pub const DEFAULT_WRITE_MTU: usize = 20;

/// Session-side BLE transport.
pub struct BleTransport {
    mtu: usize,
    link: Option<Wiring>,
}

struct Wiring {
    inbound_rx: mpsc::Receiver<Bytes>,
    write_tx: mpsc::Sender<Bytes>,
}

/// Embedder-side handle wired to the platform GATT callbacks.
#[derive(Debug)]
pub struct GattEndpoint {
    inbound_tx: mpsc::Sender<Bytes>,
    write_rx: mpsc::Receiver<Bytes>,
}

impl BleTransport {
    /// Create a transport/endpoint pair with the default MTU.
    pub fn new() -> (Self, GattEndpoint) {
        Self::with_mtu(DEFAULT_WRITE_MTU)
    }

    /// Create a transport/endpoint pair chunking writes to `mtu` bytes.
    pub fn with_mtu(mtu: usize) -> (Self, GattEndpoint) {
        assert!(mtu > 0, "write MTU must be non-zero");
        let (inbound_tx, inbound_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        let (write_tx, write_rx) = mpsc::channel(LINK_CHANNEL_CAPACITY);
        (
            Self {
                mtu,
                link: Some(Wiring {
                    inbound_rx,
                    write_tx,
                }),
            },
            GattEndpoint {
                inbound_tx,
                write_rx,
            },
        )
    }
}

impl Transport for BleTransport {
    fn kind(&self) -> TransportKind {
        TransportKind::BleLowEnergy
    }

    fn open(&mut self) -> BoxFuture<'_, Result<TransportLink>> {
        Box::pin(async move {
            let wiring = self
                .link
                .take()
                .ok_or_else(|| EspError::TransportOpen("BLE link already opened".into()))?;
            let mtu = self.mtu;

            let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportWrite>(LINK_CHANNEL_CAPACITY);
            let write_tx = wiring.write_tx;

            // Write pump: split each frame into MTU-sized characteristic
            // writes and ack once the last chunk is handed to the endpoint.
            tokio::spawn(async move {
                while let Some(TransportWrite { bytes, ack }) = outbound_rx.recv().await {
                    let mut result = Ok(());
                    let mut offset = 0;
                    while offset < bytes.len() {
                        let end = (offset + mtu).min(bytes.len());
                        if write_tx.send(bytes.slice(offset..end)).await.is_err() {
                            result = Err(std::io::Error::new(
                                std::io::ErrorKind::BrokenPipe,
                                "GATT endpoint gone",
                            ));
                            break;
                        }
                        offset = end;
                    }
                    let failed = result.is_err();
                    let _ = ack.send(result);
                    if failed {
                        break;
                    }
                }
            });

            Ok(TransportLink {
                kind: TransportKind::BleLowEnergy,
                outbound: outbound_tx,
                inbound: wiring.inbound_rx,
            })
        })
    }
}

impl GattEndpoint {
    /// Feed one characteristic notification's bytes to the session.
    ///
    /// Returns `false` once the session side is gone.
    pub async fn notify(&self, bytes: &[u8]) -> bool {
        self.inbound_tx
            .send(Bytes::copy_from_slice(bytes))
            .await
            .is_ok()
    }

    /// Next outgoing characteristic write, already chunked to the MTU.
    /// `None` once the session closed the link.
    pub async fn next_write(&mut self) -> Option<Bytes> {
        self.write_rx.recv().await
    }

    /// Drop the device side, simulating a link loss: the session observes
    /// its inbound stream closing.
    pub fn disconnect(self) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    async fn open() -> (TransportLink, GattEndpoint) {
        let (mut transport, endpoint) = BleTransport::with_mtu(4);
        let link = transport.open().await.unwrap();
        (link, endpoint)
    }

    #[tokio::test]
    async fn test_writes_chunked_to_mtu() {
        let (link, mut endpoint) = open().await;

        let (ack, ack_rx) = oneshot::channel();
        link.outbound
            .send(TransportWrite {
                bytes: Bytes::from_static(&[1, 2, 3, 4, 5, 6, 7, 8, 9]),
                ack,
            })
            .await
            .unwrap();

        assert_eq!(&endpoint.next_write().await.unwrap()[..], &[1, 2, 3, 4]);
        assert_eq!(&endpoint.next_write().await.unwrap()[..], &[5, 6, 7, 8]);
        assert_eq!(&endpoint.next_write().await.unwrap()[..], &[9]);
        assert!(ack_rx.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_notifications_reach_session() {
        let (mut link, endpoint) = open().await;
        assert!(endpoint.notify(&[0xAA, 0xD6]).await);
        assert_eq!(&link.inbound.recv().await.unwrap()[..], &[0xAA, 0xD6]);
    }

    #[tokio::test]
    async fn test_endpoint_drop_closes_inbound() {
        let (mut link, endpoint) = open().await;
        endpoint.disconnect();
        assert!(link.inbound.recv().await.is_none());
    }

    #[tokio::test]
    async fn test_write_after_endpoint_gone_fails_ack() {
        let (link, endpoint) = open().await;
        drop(endpoint);

        let (ack, ack_rx) = oneshot::channel();
        link.outbound
            .send(TransportWrite {
                bytes: Bytes::from_static(&[1, 2, 3]),
                ack,
            })
            .await
            .unwrap();
        assert!(ack_rx.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_second_open_rejected() {
        let (mut transport, _endpoint) = BleTransport::new();
        let _link = transport.open().await.unwrap();
        assert!(matches!(
            transport.open().await,
            Err(EspError::TransportOpen(_))
        ));
    }
}
