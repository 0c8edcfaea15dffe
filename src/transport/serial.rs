//! Classic serial (SPP) transport adapter.
//!
//! Works over any async byte stream — a serial port handle, an RFCOMM
//! socket, or an in-memory duplex in tests. The serial profile wraps each
//! ESP frame in its own link envelope:
//!
//! ```text
//! 0x7F  len  <esp frame bytes>  chksum  0x7F
//! ```
//!
//! where `len` counts the unescaped ESP bytes, `chksum` is the wrapping sum
//! of `len` and those bytes, and 0x7D/0x7F occurrences inside the envelope
//! are escaped (`7D 5D` ⇒ `7D`, `7D 5F` ⇒ `7F`). This layer applies the
//! envelope on write and strips it on read, so the session's framer always
//! sees raw ESP bytes regardless of transport.

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::error::{EspError, Result};

use super::{
    BoxFuture, Transport, TransportKind, TransportLink, TransportWrite, LINK_CHANNEL_CAPACITY,
};

/// Link-level frame delimiter.
const DELIMITER: u8 = 0x7F;
/// Data-link escape byte.
const DLE: u8 = 0x7D;
/// Escaped form of 0x7D.
const DLE_FOR_DLE: u8 = 0x5D;
/// Escaped form of 0x7F.
const DLE_FOR_DELIMITER: u8 = 0x5F;

/// Serial transport over an async byte stream.
pub struct SerialTransport<R, W> {
    io: Option<(R, W)>,
}

impl<R, W> SerialTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            io: Some((reader, writer)),
        }
    }
}

impl<R, W> Transport for SerialTransport<R, W>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    fn kind(&self) -> TransportKind {
        TransportKind::Serial
    }

    fn open(&mut self) -> BoxFuture<'_, Result<TransportLink>> {
        Box::pin(async move {
            let (mut reader, mut writer) = self
                .io
                .take()
                .ok_or_else(|| EspError::TransportOpen("serial stream already opened".into()))?;

            let (inbound_tx, inbound_rx) = mpsc::channel::<Bytes>(LINK_CHANNEL_CAPACITY);
            let (outbound_tx, mut outbound_rx) =
                mpsc::channel::<TransportWrite>(LINK_CHANNEL_CAPACITY);

            // Read pump: stream bytes → link decoder → ESP byte chunks.
            tokio::spawn(async move {
                let mut decoder = SppDecoder::new();
                let mut buf = vec![0u8; 4096];
                loop {
                    match reader.read(&mut buf).await {
                        Ok(0) => break,
                        Ok(n) => {
                            for frame in decoder.feed(&buf[..n]) {
                                if inbound_tx.send(frame).await.is_err() {
                                    return;
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!("serial read failed: {e}");
                            break;
                        }
                    }
                }
                // Dropping inbound_tx signals disconnection to the session.
            });

            // Write pump: one enveloped frame per write, acked after flush.
            tokio::spawn(async move {
                while let Some(TransportWrite { bytes, ack }) = outbound_rx.recv().await {
                    let enveloped = spp_encode(&bytes);
                    let result = async {
                        writer.write_all(&enveloped).await?;
                        writer.flush().await
                    }
                    .await;
                    let failed = result.is_err();
                    let _ = ack.send(result);
                    if failed {
                        break;
                    }
                }
            });

            Ok(TransportLink {
                kind: TransportKind::Serial,
                outbound: outbound_tx,
                inbound: inbound_rx,
            })
        })
    }
}

/// Wrap one ESP frame in the SPP link envelope.
pub fn spp_encode(esp: &[u8]) -> Vec<u8> {
    let len = esp.len() as u8;
    let chksum = esp
        .iter()
        .fold(len, |sum, b| sum.wrapping_add(*b));

    let mut out = Vec::with_capacity(esp.len() + 6);
    out.push(DELIMITER);
    push_escaped(&mut out, len);
    for &b in esp {
        push_escaped(&mut out, b);
    }
    push_escaped(&mut out, chksum);
    out.push(DELIMITER);
    out
}

fn push_escaped(out: &mut Vec<u8>, b: u8) {
    match b {
        DLE => out.extend_from_slice(&[DLE, DLE_FOR_DLE]),
        DELIMITER => out.extend_from_slice(&[DLE, DLE_FOR_DELIMITER]),
        other => out.push(other),
    }
}

/// Stateful decoder for the SPP link envelope.
pub struct SppDecoder {
    buffer: Vec<u8>,
}

impl SppDecoder {
    pub fn new() -> Self {
        Self { buffer: Vec::new() }
    }

    /// Feed raw stream bytes; returns every complete, checksum-valid ESP
    /// frame now available. Corrupt envelopes are silently dropped.
    pub fn feed(&mut self, data: &[u8]) -> Vec<Bytes> {
        self.buffer.extend_from_slice(data);

        let mut frames = Vec::new();
        loop {
            // Noise before the first delimiter can never become a frame.
            match self.buffer.iter().position(|&b| b == DELIMITER) {
                Some(0) => {}
                Some(n) => {
                    self.buffer.drain(..n);
                }
                None => {
                    self.buffer.clear();
                    break;
                }
            }

            // Find the closing delimiter; a delimiter right after the
            // opener is a new opener (back-to-back envelopes or a cut-off
            // head we cannot recover).
            let mut start = 0usize;
            let mut end = None;
            for (i, &b) in self.buffer.iter().enumerate().skip(start + 1) {
                if b == DELIMITER {
                    if i == start + 1 {
                        start = i;
                    } else {
                        end = Some(i);
                        break;
                    }
                }
            }
            let Some(end) = end else {
                // Keep from the last candidate opener.
                if start > 0 {
                    self.buffer.drain(..start);
                }
                break;
            };

            let raw = unescape(&self.buffer[start + 1..end]);
            self.buffer.drain(..=end);

            if raw.len() < 2 {
                continue;
            }
            let len = raw[0];
            let esp = &raw[1..raw.len() - 1];
            let expected = raw[raw.len() - 1];
            let computed = esp.iter().fold(len, |sum, b| sum.wrapping_add(*b));
            if computed != expected || esp.len() != len as usize {
                tracing::debug!(len, esp_len = esp.len(), "dropping corrupt serial envelope");
                continue;
            }
            frames.push(Bytes::copy_from_slice(esp));
        }
        frames
    }
}

impl Default for SppDecoder {
    fn default() -> Self {
        Self::new()
    }
}

fn unescape(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        let b = data[i];
        if b == DLE && i + 1 < data.len() {
            match data[i + 1] {
                DLE_FOR_DLE => {
                    out.push(DLE);
                    i += 2;
                    continue;
                }
                DLE_FOR_DELIMITER => {
                    out.push(DELIMITER);
                    i += 2;
                    continue;
                }
                _ => {}
            }
        }
        out.push(b);
        i += 1;
    }
    out
}
