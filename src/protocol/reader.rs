//! Framed stream reader.
//!
//! Turns a raw byte stream into [`Frame`]s, one call per protocol unit.
//! Implements a small state machine on top of an internal `BytesMut`:
//! - `WaitingForHeader`: scanning for a `\n`-terminated header line
//! - `WaitingForPayload`: header parsed, need N more payload bytes
//!
//! Every read is bounded by the read timeout. A timeout is not an error:
//! the attempt is retried and the [`CancelToken`] is polled before and
//! after every attempt, so a cancelled session unblocks within one
//! timeout period.
//!
//! # Example
//!
//! ```ignore
//! use pcd_capture::protocol::{FrameReader, ReadEvent};
//!
//! let mut reader = FrameReader::new(stream, cancel);
//! loop {
//!     match reader.next_event().await? {
//!         ReadEvent::Frame(frame) => println!("{:?}", frame),
//!         ReadEvent::Closed | ReadEvent::Cancelled => break,
//!     }
//! }
//! ```

use std::io;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt};

use super::wire_format::{
    Header, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_PAYLOAD_SIZE, DEFAULT_READ_TIMEOUT,
};
use super::Frame;
use crate::cancel::CancelToken;
use crate::error::{CaptureError, Result};

/// Minimum spare capacity reserved before each read.
const READ_CHUNK_SIZE: usize = 64 * 1024;

/// Outcome of a single bounded read attempt.
#[derive(Debug)]
pub enum ReadAttempt {
    /// `n` bytes were appended to the internal buffer.
    Data(usize),
    /// Nothing arrived within the read timeout.
    TimedOut,
    /// The peer closed the connection (zero-byte read).
    Closed,
    /// Any other I/O failure.
    Failed(io::Error),
}

/// What the reader produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadEvent {
    /// A complete protocol frame.
    Frame(Frame),
    /// The stream ended. Any in-flight payload was discarded.
    Closed,
    /// The cancel token was signalled. Any in-flight payload was discarded.
    Cancelled,
}

/// Parsing state.
#[derive(Debug, Clone, Copy)]
enum State {
    WaitingForHeader,
    WaitingForPayload { length: usize },
}

/// Internal result of a multi-attempt read.
enum Step<T> {
    Ready(T),
    Closed,
    Cancelled,
}

/// A decoded header line.
enum Line {
    /// Terminated by `\n`.
    Complete(String),
    /// Cut short by end of stream.
    Truncated(String),
}

/// Reads protocol frames from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
    /// Bytes read from the stream but not yet consumed.
    buffer: BytesMut,
    state: State,
    cancel: CancelToken,
    read_timeout: Duration,
    max_payload_size: usize,
    max_line_length: usize,
    /// Set once the underlying stream returned a zero-byte read.
    eof: bool,
    malformed_headers: u64,
    timeouts: u64,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    /// Create a reader with default limits.
    ///
    /// Defaults: 1s read timeout, 256 MiB payload ceiling, 4 KiB header lines.
    pub fn new(reader: R, cancel: CancelToken) -> Self {
        Self {
            reader,
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            state: State::WaitingForHeader,
            cancel,
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            eof: false,
            malformed_headers: 0,
            timeouts: 0,
        }
    }

    /// Set the bound on each read attempt.
    pub fn with_read_timeout(mut self, timeout: Duration) -> Self {
        self.read_timeout = timeout;
        self
    }

    /// Set the largest payload a `PCD` header may announce.
    pub fn with_max_payload_size(mut self, max_payload_size: usize) -> Self {
        self.max_payload_size = max_payload_size;
        self
    }

    /// Set the longest header line accepted before failing.
    pub fn with_max_line_length(mut self, max_line_length: usize) -> Self {
        self.max_line_length = max_line_length;
        self
    }

    /// Read the next frame.
    ///
    /// Blank lines and malformed `PCD` headers are skipped. Unrecognized
    /// lines are returned so the caller can report them.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::Io`] on any transport failure other than a
    /// timeout, and [`CaptureError::Protocol`] if a header line exceeds the
    /// configured maximum length.
    pub async fn next_event(&mut self) -> Result<ReadEvent> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(ReadEvent::Cancelled);
            }

            let line = match self.read_line().await? {
                Step::Ready(Line::Complete(line)) => line,
                Step::Ready(Line::Truncated(text)) => {
                    tracing::debug!("Stream ended mid-line after {} bytes", text.len());
                    return Ok(ReadEvent::Frame(Frame::Unrecognized(text)));
                }
                Step::Closed => return Ok(ReadEvent::Closed),
                Step::Cancelled => return Ok(ReadEvent::Cancelled),
            };

            match Header::parse(&line, self.max_payload_size) {
                Header::Empty => continue,
                Header::Ping => {
                    tracing::trace!("Heartbeat");
                    return Ok(ReadEvent::Frame(Frame::Heartbeat));
                }
                Header::Unrecognized(text) => {
                    return Ok(ReadEvent::Frame(Frame::Unrecognized(text)));
                }
                Header::Malformed { line, reason } => {
                    self.malformed_headers += 1;
                    tracing::warn!("Malformed PCD header '{}': {}", line, reason);
                    continue;
                }
                Header::Pcd { length } => {
                    return Ok(match self.read_payload(length).await? {
                        Step::Ready(payload) => ReadEvent::Frame(Frame::PointPayload(payload)),
                        Step::Closed => ReadEvent::Closed,
                        Step::Cancelled => ReadEvent::Cancelled,
                    });
                }
            }
        }
    }

    /// Make a single read attempt bounded by the read timeout.
    ///
    /// Read errors of kind `TimedOut`/`WouldBlock` are reported as
    /// [`ReadAttempt::TimedOut`], the same as an elapsed deadline.
    pub async fn read_attempt(&mut self) -> ReadAttempt {
        if self.buffer.capacity() - self.buffer.len() < READ_CHUNK_SIZE {
            self.buffer.reserve(READ_CHUNK_SIZE);
        }

        match tokio::time::timeout(self.read_timeout, self.reader.read_buf(&mut self.buffer)).await
        {
            Err(_elapsed) => ReadAttempt::TimedOut,
            Ok(Ok(0)) => ReadAttempt::Closed,
            Ok(Ok(n)) => ReadAttempt::Data(n),
            Ok(Err(e)) if is_timeout(&e) => ReadAttempt::TimedOut,
            Ok(Err(e)) => ReadAttempt::Failed(e),
        }
    }

    /// Number of malformed `PCD` headers skipped so far.
    pub fn malformed_headers(&self) -> u64 {
        self.malformed_headers
    }

    /// Number of read attempts that timed out and were retried.
    pub fn read_timeouts(&self) -> u64 {
        self.timeouts
    }

    /// Bytes read from the stream but not yet consumed.
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Consume the reader, returning the underlying stream.
    pub fn into_inner(self) -> R {
        self.reader
    }

    /// Read one `\n`-terminated line. `\r` bytes are discarded.
    async fn read_line(&mut self) -> Result<Step<Line>> {
        let mut scanned = 0;

        loop {
            if let Some(pos) = self.buffer[scanned..].iter().position(|&b| b == b'\n') {
                let end = scanned + pos;
                let raw = self.buffer.split_to(end + 1);
                return Ok(Step::Ready(Line::Complete(decode_line(&raw[..end]))));
            }

            scanned = self.buffer.len();
            if scanned > self.max_line_length {
                return Err(CaptureError::Protocol(format!(
                    "Header line exceeds {} bytes without a newline",
                    self.max_line_length
                )));
            }

            match self.await_data().await? {
                Step::Ready(()) => continue,
                Step::Closed if self.buffer.is_empty() => return Ok(Step::Closed),
                Step::Closed => {
                    let raw = self.buffer.split();
                    return Ok(Step::Ready(Line::Truncated(decode_line(&raw))));
                }
                // A line completed by the last read is still delivered.
                Step::Cancelled if self.buffer[scanned..].contains(&b'\n') => continue,
                Step::Cancelled => return Ok(Step::Cancelled),
            }
        }
    }

    /// Read exactly `length` payload bytes.
    ///
    /// On close or cancel a partial payload is dropped. A payload completed
    /// by the read that observed the cancel is still returned.
    async fn read_payload(&mut self, length: usize) -> Result<Step<Bytes>> {
        self.state = State::WaitingForPayload { length };

        while self.buffer.len() < length {
            self.buffer.reserve(length - self.buffer.len());

            match self.await_data().await? {
                Step::Ready(()) => continue,
                Step::Closed => {
                    tracing::warn!(
                        "Connection closed after {} of {} payload bytes; discarding partial frame",
                        self.buffer.len(),
                        length
                    );
                    self.buffer.clear();
                    self.state = State::WaitingForHeader;
                    return Ok(Step::Closed);
                }
                Step::Cancelled if self.buffer.len() >= length => break,
                Step::Cancelled => return Ok(Step::Cancelled),
            }
        }

        let payload = self.buffer.split_to(length).freeze();
        self.state = State::WaitingForHeader;
        Ok(Step::Ready(payload))
    }

    /// Retry read attempts until data arrives, the stream closes, or the
    /// cancel token is signalled.
    async fn await_data(&mut self) -> Result<Step<()>> {
        if self.eof {
            return Ok(Step::Closed);
        }

        loop {
            if self.cancel.is_cancelled() {
                return Ok(Step::Cancelled);
            }

            match self.read_attempt().await {
                ReadAttempt::Data(n) => {
                    tracing::trace!("Read {} bytes ({:?})", n, self.state);
                    if self.cancel.is_cancelled() {
                        return Ok(Step::Cancelled);
                    }
                    return Ok(Step::Ready(()));
                }
                ReadAttempt::TimedOut => {
                    self.timeouts += 1;
                    tracing::trace!("Read timed out after {:?}, retrying", self.read_timeout);
                }
                ReadAttempt::Closed => {
                    self.eof = true;
                    return Ok(Step::Closed);
                }
                ReadAttempt::Failed(e) => {
                    tracing::error!("Read failed ({:?}): {}", self.state, e);
                    return Err(CaptureError::Io(e));
                }
            }
        }
    }

    /// Get the current state for debugging.
    #[cfg(test)]
    fn state_name(&self) -> &'static str {
        match self.state {
            State::WaitingForHeader => "WaitingForHeader",
            State::WaitingForPayload { .. } => "WaitingForPayload",
        }
    }
}

fn decode_line(raw: &[u8]) -> String {
    let bytes: Vec<u8> = raw.iter().copied().filter(|&b| b != b'\r').collect();
    String::from_utf8_lossy(&bytes).into_owned()
}

fn is_timeout(e: &io::Error) -> bool {
    matches!(
        e.kind(),
        io::ErrorKind::TimedOut | io::ErrorKind::WouldBlock
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{build_pcd_frame, build_ping};
    use tokio::io::AsyncWriteExt;
    use tokio_test::io::Builder;

    async fn next_frame<R: AsyncRead + Unpin>(reader: &mut FrameReader<R>) -> Frame {
        match reader.next_event().await.unwrap() {
            ReadEvent::Frame(frame) => frame,
            other => panic!("expected a frame, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_ping_and_payload() {
        let mut wire = build_ping();
        wire.extend(build_pcd_frame(&[7u8; 32]));
        let mock = Builder::new().read(&wire).build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        let frame = next_frame(&mut reader).await;
        assert_eq!(frame.payload(), Some(&[7u8; 32][..]));
        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Closed);
    }

    #[tokio::test]
    async fn test_crlf_is_tolerated() {
        let mock = Builder::new()
            .read(b"PING\r\nPCD 16\r\n")
            .read(&[1u8; 16])
            .build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(next_frame(&mut reader).await.payload_len(), 16);
    }

    #[tokio::test]
    async fn test_byte_at_a_time() {
        let wire = build_pcd_frame(b"0123456789abcdef");
        let mut builder = Builder::new();
        for byte in &wire {
            builder.read(&[*byte]);
        }
        let mut reader = FrameReader::new(builder.build(), CancelToken::new());

        let frame = next_frame(&mut reader).await;
        assert_eq!(frame.payload(), Some(&b"0123456789abcdef"[..]));
        assert_eq!(reader.state_name(), "WaitingForHeader");
        assert_eq!(reader.buffered_len(), 0);
    }

    #[tokio::test]
    async fn test_header_and_payload_in_one_chunk_with_trailing_data() {
        let mut wire = build_pcd_frame(&[2u8; 16]);
        wire.extend(b"PI");
        let mock = Builder::new().read(&wire).read(b"NG\n").build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await.payload_len(), 16);
        assert_eq!(reader.buffered_len(), 2);
        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
    }

    #[tokio::test]
    async fn test_unrecognized_line_is_returned() {
        let mock = Builder::new().read(b"HELLO WORLD\nPING\n").build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(
            next_frame(&mut reader).await,
            Frame::Unrecognized("HELLO WORLD".to_string())
        );
        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
    }

    #[tokio::test]
    async fn test_blank_lines_are_skipped() {
        let mock = Builder::new().read(b"\n\r\n\nPING\n").build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
    }

    #[tokio::test]
    async fn test_malformed_header_is_skipped() {
        let mock = Builder::new().read(b"PCD abc\nPCD 0\nPING\n").build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(reader.malformed_headers(), 2);
    }

    #[tokio::test]
    async fn test_oversized_payload_is_malformed() {
        let mock = Builder::new().read(b"PCD 1000\nPING\n").build();
        let mut reader = FrameReader::new(mock, CancelToken::new()).with_max_payload_size(100);

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(reader.malformed_headers(), 1);
    }

    #[tokio::test]
    async fn test_truncated_line_at_eof() {
        let mock = Builder::new().read(b"PING\nPCD 16").build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(
            next_frame(&mut reader).await,
            Frame::Unrecognized("PCD 16".to_string())
        );
        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Closed);
    }

    #[tokio::test]
    async fn test_close_mid_payload_discards_frame() {
        let mock = Builder::new().read(b"PCD 32\n").read(&[0u8; 10]).build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Closed);
        assert_eq!(reader.buffered_len(), 0);
        assert_eq!(reader.state_name(), "WaitingForHeader");
    }

    #[tokio::test]
    async fn test_close_via_duplex() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"PCD 64\n").await.unwrap();
        server.write_all(&[0u8; 40]).await.unwrap();
        drop(server);

        let mut reader = FrameReader::new(client, CancelToken::new());
        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Closed);
    }

    #[tokio::test]
    async fn test_transport_error() {
        let mock = Builder::new()
            .read(b"PCD 32\n")
            .read_error(io::Error::new(io::ErrorKind::ConnectionReset, "reset"))
            .build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        let err = reader.next_event().await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::Io(ref e) if e.kind() == io::ErrorKind::ConnectionReset
        ));
    }

    #[tokio::test]
    async fn test_timed_out_error_is_retried() {
        let mock = Builder::new()
            .read_error(io::Error::from(io::ErrorKind::TimedOut))
            .read_error(io::Error::from(io::ErrorKind::WouldBlock))
            .read(b"PING\n")
            .build();
        let mut reader = FrameReader::new(mock, CancelToken::new());

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(reader.read_timeouts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_idle_stream_is_retried() {
        let mock = Builder::new()
            .read(b"PCD 16\n")
            .wait(Duration::from_millis(3500))
            .read(&[9u8; 16])
            .build();
        let mut reader = FrameReader::new(mock, CancelToken::new())
            .with_read_timeout(Duration::from_secs(1));

        assert_eq!(next_frame(&mut reader).await.payload_len(), 16);
        assert!(reader.read_timeouts() >= 3);
    }

    #[tokio::test]
    async fn test_cancelled_before_read() {
        let cancel = CancelToken::new();
        cancel.cancel();
        let mock = Builder::new().build();
        let mut reader = FrameReader::new(mock, cancel);

        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_unblocks_idle_read() {
        let (client, _server) = tokio::io::duplex(1024);
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            remote.cancel();
        });

        let mut reader =
            FrameReader::new(client, cancel).with_read_timeout(Duration::from_secs(1));

        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
        assert!(reader.read_timeouts() >= 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_mid_payload_discards_frame() {
        let (client, mut server) = tokio::io::duplex(1024);
        server.write_all(b"PCD 32\n").await.unwrap();
        server.write_all(&[0u8; 8]).await.unwrap();

        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(1500)).await;
            remote.cancel();
        });

        let mut reader =
            FrameReader::new(client, cancel).with_read_timeout(Duration::from_secs(1));

        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
        drop(server);
    }

    #[tokio::test(start_paused = true)]
    async fn test_payload_completed_while_cancel_pending_is_kept() {
        let mock = Builder::new()
            .read(b"PCD 16\n")
            .wait(Duration::from_secs(2))
            .read(&[5u8; 16])
            .build();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel();
        });

        let mut reader =
            FrameReader::new(mock, cancel).with_read_timeout(Duration::from_secs(5));

        let frame = next_frame(&mut reader).await;
        assert_eq!(frame.payload(), Some(&[5u8; 16][..]));
        assert_eq!(reader.buffered_len(), 0);
        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_line_completed_while_cancel_pending_is_kept() {
        let mock = Builder::new()
            .read(b"PI")
            .wait(Duration::from_secs(2))
            .read(b"NG\n")
            .build();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel();
        });

        let mut reader =
            FrameReader::new(mock, cancel).with_read_timeout(Duration::from_secs(5));

        assert_eq!(next_frame(&mut reader).await, Frame::Heartbeat);
        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_with_partial_payload_still_discards() {
        let mock = Builder::new()
            .read(b"PCD 32\n")
            .wait(Duration::from_secs(2))
            .read(&[5u8; 16])
            .build();
        let cancel = CancelToken::new();
        let remote = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(1)).await;
            remote.cancel();
        });

        let mut reader =
            FrameReader::new(mock, cancel).with_read_timeout(Duration::from_secs(5));

        assert_eq!(reader.next_event().await.unwrap(), ReadEvent::Cancelled);
    }

    #[tokio::test]
    async fn test_line_too_long() {
        let mock = Builder::new().read(&[b'A'; 64]).build();
        let mut reader = FrameReader::new(mock, CancelToken::new()).with_max_line_length(32);

        let err = reader.next_event().await.unwrap_err();
        assert!(matches!(err, CaptureError::Protocol(_)));
    }

    #[test]
    fn test_decode_line_strips_carriage_returns() {
        assert_eq!(decode_line(b"PI\rNG\r"), "PING");
        assert_eq!(decode_line(b""), "");
    }
}
