//! Unidirectional line relay
//!
//! A relay reads one newline-delimited message at a time from its source and
//! writes the exact bytes, delimiter included, to its destination. The write
//! is flushed before the next read so at most one message per direction is in
//! flight. Cancellation is only observed while waiting for the next message,
//! never in the middle of a write.

use crate::error::BridgeError;
use std::fmt;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio_stream::StreamExt;
use tokio_util::bytes::BytesMut;
use tokio_util::codec::{Decoder, FramedRead};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayDirection {
    /// Controlling input stream to the TCP connection
    InboundToUpstream,
    /// TCP connection to the controlling output stream
    UpstreamToOutbound,
}

impl fmt::Display for RelayDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RelayDirection::InboundToUpstream => f.write_str("stdin->tcp"),
            RelayDirection::UpstreamToOutbound => f.write_str("tcp->stdout"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelayState {
    Running,
    /// Source reached end-of-stream
    Completed,
    Cancelled,
    Failed,
}

impl fmt::Display for RelayState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RelayState::Running => "running",
            RelayState::Completed => "completed",
            RelayState::Cancelled => "cancelled",
            RelayState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Final accounting of one relay
#[derive(Debug)]
pub struct RelayReport {
    pub direction: RelayDirection,
    pub state: RelayState,
    pub messages: u64,
    pub bytes: u64,
    pub error: Option<BridgeError>,
}

impl RelayReport {
    fn new(direction: RelayDirection) -> Self {
        Self {
            direction,
            state: RelayState::Running,
            messages: 0,
            bytes: 0,
            error: None,
        }
    }
}

/// Splits a byte stream into newline-terminated frames, keeping the delimiter
///
/// Content is never inspected. At end-of-stream a trailing fragment without a
/// delimiter is emitted as a final frame.
#[derive(Debug, Default, Clone)]
pub struct LineFrameCodec {
    max_length: Option<usize>,
    next_index: usize,
}

impl LineFrameCodec {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject frames whose content (without delimiter) exceeds `max_length` bytes
    pub fn with_max_length(max_length: usize) -> Self {
        Self {
            max_length: Some(max_length),
            next_index: 0,
        }
    }

    fn too_long(&self, content_len: usize) -> Option<io::Error> {
        match self.max_length {
            Some(max) if content_len > max => Some(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("message exceeds {max} bytes"),
            )),
            _ => None,
        }
    }
}

impl Decoder for LineFrameCodec {
    type Item = BytesMut;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        let start = self.next_index.min(src.len());
        match src[start..].iter().position(|b| *b == b'\n') {
            Some(offset) => {
                let end = start + offset + 1;
                self.next_index = 0;
                if let Some(err) = self.too_long(end - 1) {
                    return Err(err);
                }
                Ok(Some(src.split_to(end)))
            }
            None => {
                if let Some(err) = self.too_long(src.len()) {
                    return Err(err);
                }
                self.next_index = src.len();
                Ok(None)
            }
        }
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> Result<Option<BytesMut>, io::Error> {
        match self.decode(src)? {
            Some(frame) => Ok(Some(frame)),
            None if src.is_empty() => Ok(None),
            None => {
                self.next_index = 0;
                Ok(Some(src.split()))
            }
        }
    }
}

/// One direction of the bridge
pub struct Relay<R, W> {
    direction: RelayDirection,
    frames: FramedRead<R, LineFrameCodec>,
    writer: W,
    cancel: CancellationToken,
}

impl<R, W> Relay<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(
        direction: RelayDirection,
        reader: R,
        writer: W,
        cancel: CancellationToken,
        max_message_bytes: Option<usize>,
    ) -> Self {
        let codec = match max_message_bytes {
            Some(max) => LineFrameCodec::with_max_length(max),
            None => LineFrameCodec::new(),
        };
        Self {
            direction,
            frames: FramedRead::new(reader, codec),
            writer,
            cancel,
        }
    }

    /// Forward messages until end-of-stream, error or cancellation
    ///
    /// The destination's write side is shut down exactly once on the way out.
    pub async fn run(mut self) -> RelayReport {
        let direction = self.direction;
        let mut report = RelayReport::new(direction);
        debug!(direction = %direction, "Relay started");

        match self.pump(&mut report).await {
            Ok(state) => report.state = state,
            Err(e) => {
                warn!(direction = %direction, error = %e, "Relay failed");
                report.state = RelayState::Failed;
                report.error = Some(e);
            }
        }

        if let Err(e) = self.writer.shutdown().await {
            debug!(direction = %direction, error = %e, "Closing destination failed");
        }

        info!(
            direction = %direction,
            state = %report.state,
            messages = report.messages,
            bytes = report.bytes,
            "Relay stopped"
        );
        report
    }

    async fn pump(&mut self, report: &mut RelayReport) -> Result<RelayState, BridgeError> {
        loop {
            let frame = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(RelayState::Cancelled),
                frame = self.frames.next() => frame,
            };

            let message = match frame {
                None => return Ok(RelayState::Completed),
                Some(Err(source)) => return Err(self.transport_error(source)),
                Some(Ok(message)) => message,
            };

            // Drain point: the whole message is written and flushed before the next read
            self.writer
                .write_all(&message)
                .await
                .map_err(|e| self.transport_error(e))?;
            self.writer
                .flush()
                .await
                .map_err(|e| self.transport_error(e))?;

            report.messages += 1;
            report.bytes += message.len() as u64;
            trace!(direction = %self.direction, len = message.len(), "Forwarded message");
        }
    }

    fn transport_error(&self, source: io::Error) -> BridgeError {
        BridgeError::Transport {
            direction: self.direction,
            source,
        }
    }
}
