//! Dedicated writer task: strict one-write-in-flight serialization.
//!
//! Radio transports forbid overlapping operations — a GATT write must be
//! acknowledged before the next one is issued. Rather than a mutex around
//! the transport, writes flow through an mpsc channel into a single task
//! that issues one [`TransportWrite`] at a time and waits for the
//! transport's acknowledgment (bounded by a timeout) before taking the
//! next. Callers await their own frame's completion through a oneshot.

use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::error::{EspError, Result};
use crate::transport::TransportWrite;

/// Default bound on waiting for a transport write acknowledgment.
pub const DEFAULT_WRITE_ACK_TIMEOUT: Duration = Duration::from_secs(2);

/// Queue depth for callers waiting to write.
const WRITE_QUEUE_CAPACITY: usize = 32;

/// One queued frame plus its caller's completion signal.
struct QueuedWrite {
    bytes: Bytes,
    done: oneshot::Sender<Result<()>>,
}

/// Cheap handle for submitting frames to the writer task.
#[derive(Clone)]
pub struct WriterHandle {
    tx: mpsc::Sender<QueuedWrite>,
}

impl WriterHandle {
    /// Write one encoded frame and wait until the transport acknowledged
    /// it (or the serialized queue ahead of it failed).
    pub async fn write(&self, bytes: Bytes) -> Result<()> {
        let (done, done_rx) = oneshot::channel();
        self.tx
            .send(QueuedWrite { bytes, done })
            .await
            .map_err(|_| EspError::ConnectionLost)?;
        done_rx.await.map_err(|_| EspError::ConnectionLost)?
    }
}

/// Spawn the writer task feeding `outbound`.
///
/// The task ends when every [`WriterHandle`] is dropped or the transport
/// goes away; queued writers are failed with [`EspError::ConnectionLost`].
pub fn spawn_writer_task(
    outbound: mpsc::Sender<TransportWrite>,
    ack_timeout: Duration,
) -> (WriterHandle, JoinHandle<()>) {
    let (tx, rx) = mpsc::channel(WRITE_QUEUE_CAPACITY);
    let task = tokio::spawn(writer_loop(rx, outbound, ack_timeout));
    (WriterHandle { tx }, task)
}

async fn writer_loop(
    mut rx: mpsc::Receiver<QueuedWrite>,
    outbound: mpsc::Sender<TransportWrite>,
    ack_timeout: Duration,
) {
    while let Some(QueuedWrite { bytes, done }) = rx.recv().await {
        let result = issue_write(&outbound, bytes, ack_timeout).await;
        let failed = result.is_err();
        let _ = done.send(result);
        if failed {
            break;
        }
    }
    // Fail anything still queued behind a dead transport.
    rx.close();
    while let Ok(QueuedWrite { done, .. }) = rx.try_recv() {
        let _ = done.send(Err(EspError::ConnectionLost));
    }
}

async fn issue_write(
    outbound: &mpsc::Sender<TransportWrite>,
    bytes: Bytes,
    ack_timeout: Duration,
) -> Result<()> {
    let (ack, ack_rx) = oneshot::channel();
    outbound
        .send(TransportWrite { bytes, ack })
        .await
        .map_err(|_| EspError::ConnectionLost)?;

    match tokio::time::timeout(ack_timeout, ack_rx).await {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(e))) => {
            tracing::warn!("transport write failed: {e}");
            Err(EspError::Io(e))
        }
        Ok(Err(_)) => Err(EspError::ConnectionLost),
        Err(_) => Err(EspError::WriteAckTimeout),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[tokio::test]
    async fn test_write_completes_on_ack() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportWrite>(4);
        let (handle, _task) = spawn_writer_task(outbound_tx, DEFAULT_WRITE_ACK_TIMEOUT);

        let transport = tokio::spawn(async move {
            let write = outbound_rx.recv().await.unwrap();
            assert_eq!(&write.bytes[..], &[1, 2, 3]);
            write.ack.send(Ok(())).unwrap();
        });

        handle.write(Bytes::from_static(&[1, 2, 3])).await.unwrap();
        transport.await.unwrap();
    }

    #[tokio::test]
    async fn test_writes_are_serialized() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportWrite>(4);
        let (handle, _task) = spawn_writer_task(outbound_tx, DEFAULT_WRITE_ACK_TIMEOUT);

        let h2 = handle.clone();
        let first = tokio::spawn(async move { h2.write(Bytes::from_static(&[1])).await });
        let h3 = handle.clone();
        let second = tokio::spawn(async move { h3.write(Bytes::from_static(&[2])).await });

        // Only one TransportWrite may be outstanding at a time: the second
        // must not appear before the first is acknowledged.
        let w1 = outbound_rx.recv().await.unwrap();
        assert!(outbound_rx.try_recv().is_err());
        w1.ack.send(Ok(())).unwrap();

        let w2 = outbound_rx.recv().await.unwrap();
        w2.ack.send(Ok(())).unwrap();

        first.await.unwrap().unwrap();
        second.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ack_timeout_surfaces() {
        let (outbound_tx, mut outbound_rx) = mpsc::channel::<TransportWrite>(4);
        let (handle, _task) = spawn_writer_task(outbound_tx, Duration::from_millis(20));

        let hold = tokio::spawn(async move {
            // Receive but never ack.
            let _write = outbound_rx.recv().await.unwrap();
            tokio::time::sleep(Duration::from_millis(100)).await;
        });

        let err = handle.write(Bytes::from_static(&[1])).await.unwrap_err();
        assert!(matches!(err, EspError::WriteAckTimeout));
        hold.await.unwrap();
    }

    #[tokio::test]
    async fn test_transport_gone_fails_write() {
        let (outbound_tx, outbound_rx) = mpsc::channel::<TransportWrite>(4);
        drop(outbound_rx);
        let (handle, _task) = spawn_writer_task(outbound_tx, DEFAULT_WRITE_ACK_TIMEOUT);

        let err = handle.write(Bytes::from_static(&[1])).await.unwrap_err();
        assert!(matches!(err, EspError::ConnectionLost));
    }
}
