//! Capture session builder and state machine.
//!
//! The [`SessionBuilder`] provides a fluent API for configuring limits and
//! timeouts. A [`Session`] drives the lifecycle:
//! 1. `Connecting` - open the TCP connection (no retry)
//! 2. `Capturing` - read frames into a [`CaptureState`] until the stream
//!    closes, the user cancels, or the transport fails
//! 3. `Saving` - serialize the capture to PCD if any points were captured
//! 4. `Done`
//!
//! Every exit from `Capturing` keeps what was aggregated so far.
//!
//! # Example
//!
//! ```ignore
//! use pcd_capture::Session;
//!
//! let session = Session::builder()
//!     .endpoint("127.0.0.1:23511".parse()?)
//!     .build();
//! session.cancel_token().cancel_on_ctrl_c();
//!
//! let report = session.run().await?;
//! if !report.capture.is_empty() {
//!     session.save(&report, "capture.pcd").await?;
//! }
//! ```

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tokio::io::AsyncRead;

use crate::cancel::CancelToken;
use crate::capture::{format_size, CaptureSnapshot, CaptureState};
use crate::endpoint::Endpoint;
use crate::error::Result;
use crate::pcd::{save_pcd, DEFAULT_GENERATOR};
use crate::protocol::{
    Frame, FrameReader, ReadEvent, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_PAYLOAD_SIZE,
    DEFAULT_READ_TIMEOUT,
};
use crate::transport::{connect, DEFAULT_CONNECT_TIMEOUT};

/// Lifecycle phase, used for logging transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Connecting,
    Capturing,
    Saving,
    Done,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Connecting => "connecting",
            SessionState::Capturing => "capturing",
            SessionState::Saving => "saving",
            SessionState::Done => "done",
        };
        f.write_str(name)
    }
}

/// Why the capture loop ended. Exactly one holds at exit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum SessionResult {
    StreamClosed,
    UserCancelled,
    ProtocolError(String),
}

impl fmt::Display for SessionResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionResult::StreamClosed => f.write_str("Stream closed by the server"),
            SessionResult::UserCancelled => f.write_str("Capture stopped by user request"),
            SessionResult::ProtocolError(detail) => write!(f, "Connection error: {}", detail),
        }
    }
}

/// Session settings.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub endpoint: Endpoint,
    pub read_timeout: Duration,
    pub connect_timeout: Duration,
    pub max_payload_size: usize,
    pub max_line_length: usize,
    /// Name written into the PCD header comment.
    pub generator: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            endpoint: Endpoint::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            max_payload_size: DEFAULT_MAX_PAYLOAD_SIZE,
            max_line_length: DEFAULT_MAX_LINE_LENGTH,
            generator: DEFAULT_GENERATOR.to_string(),
        }
    }
}

/// Builder for configuring and creating a capture session.
pub struct SessionBuilder {
    config: SessionConfig,
    cancel: CancelToken,
}

impl SessionBuilder {
    /// Create a new builder with default settings.
    pub fn new() -> Self {
        Self {
            config: SessionConfig::default(),
            cancel: CancelToken::new(),
        }
    }

    /// Set the endpoint to connect to.
    ///
    /// Default: 127.0.0.1:23511
    pub fn endpoint(mut self, endpoint: Endpoint) -> Self {
        self.config.endpoint = endpoint;
        self
    }

    /// Set the bound on each read attempt.
    ///
    /// Default: 1 second
    pub fn read_timeout(mut self, timeout: Duration) -> Self {
        self.config.read_timeout = timeout;
        self
    }

    /// Set the bound on establishing the connection.
    ///
    /// Default: 10 seconds
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set the largest payload a single `PCD` header may announce.
    ///
    /// Default: 256 MiB
    pub fn max_payload_size(mut self, max: usize) -> Self {
        self.config.max_payload_size = max;
        self
    }

    /// Set the longest accepted header line.
    ///
    /// Default: 4 KiB
    pub fn max_line_length(mut self, max: usize) -> Self {
        self.config.max_line_length = max;
        self
    }

    /// Set the generator name written into the PCD header.
    pub fn generator(mut self, generator: impl Into<String>) -> Self {
        self.config.generator = generator.into();
        self
    }

    /// Use an existing cancel token instead of a fresh one.
    pub fn cancel_token(mut self, cancel: CancelToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn build(self) -> Session {
        Session {
            config: self.config,
            cancel: self.cancel,
        }
    }
}

impl Default for SessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the capture loop produced.
#[derive(Debug)]
pub struct CaptureReport {
    pub result: SessionResult,
    pub capture: CaptureState,
    pub heartbeats: u64,
    pub unrecognized: u64,
    pub malformed_headers: u64,
}

impl CaptureReport {
    /// Serializable summary of this report.
    pub fn summary(&self, endpoint: &Endpoint, output: Option<&Path>) -> CaptureSummary {
        CaptureSummary {
            endpoint: endpoint.to_string(),
            result: self.result.clone(),
            totals: self.capture.snapshot(),
            heartbeats: self.heartbeats,
            unrecognized: self.unrecognized,
            malformed_headers: self.malformed_headers,
            output: output.map(|p| p.display().to_string()),
        }
    }
}

/// Machine-readable end-of-session summary.
#[derive(Debug, Clone, Serialize)]
pub struct CaptureSummary {
    pub endpoint: String,
    pub result: SessionResult,
    #[serde(flatten)]
    pub totals: CaptureSnapshot,
    pub heartbeats: u64,
    pub unrecognized: u64,
    pub malformed_headers: u64,
    pub output: Option<String>,
}

/// A configured capture session.
pub struct Session {
    config: SessionConfig,
    cancel: CancelToken,
}

impl Session {
    /// Create a new session builder.
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Token that stops the capture loop when cancelled.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Connect and capture until the loop terminates.
    ///
    /// # Errors
    ///
    /// Only connection failures are returned as errors. Everything that
    /// happens after the connection is up is reported in
    /// [`CaptureReport::result`].
    pub async fn run(&self) -> Result<CaptureReport> {
        enter(SessionState::Connecting);
        tracing::info!("Connecting to {}", self.config.endpoint);
        let stream = connect(&self.config.endpoint, self.config.connect_timeout).await?;
        tracing::info!("Connected. Press Ctrl+C to stop capturing and proceed to saving");

        // The stream is owned by the reader and closed when capture returns.
        Ok(self.capture(stream).await)
    }

    /// Run the capture loop over any byte stream.
    pub async fn capture<R: AsyncRead + Unpin>(&self, stream: R) -> CaptureReport {
        enter(SessionState::Capturing);

        let mut reader = FrameReader::new(stream, self.cancel.clone())
            .with_read_timeout(self.config.read_timeout)
            .with_max_payload_size(self.config.max_payload_size)
            .with_max_line_length(self.config.max_line_length);

        let mut capture = CaptureState::new();
        let mut heartbeats = 0u64;
        let mut unrecognized = 0u64;

        let result = loop {
            match reader.next_event().await {
                Ok(ReadEvent::Frame(Frame::Heartbeat)) => {
                    heartbeats += 1;
                    tracing::debug!("Heartbeat");
                }
                Ok(ReadEvent::Frame(Frame::Unrecognized(text))) => {
                    unrecognized += 1;
                    tracing::warn!("Received unexpected message: '{}'", text);
                }
                Ok(ReadEvent::Frame(Frame::PointPayload(payload))) => {
                    let frame = capture.append(&payload);
                    let totals = capture.snapshot();
                    tracing::info!(
                        "Frame {}: {} pts ({}); total {} pts ({})",
                        frame.index,
                        frame.points,
                        format_size(frame.bytes),
                        totals.points,
                        format_size(totals.bytes)
                    );
                }
                Ok(ReadEvent::Closed) => break SessionResult::StreamClosed,
                Ok(ReadEvent::Cancelled) => break SessionResult::UserCancelled,
                Err(e) => {
                    tracing::error!("Capture aborted: {}", e);
                    break SessionResult::ProtocolError(e.to_string());
                }
            }
        };

        let malformed_headers = reader.malformed_headers();
        drop(reader);

        tracing::info!("{}", result);
        CaptureReport {
            result,
            capture,
            heartbeats,
            unrecognized,
            malformed_headers,
        }
    }

    /// Serialize the capture to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CaptureError::EmptyCapture`](crate::CaptureError::EmptyCapture)
    /// if nothing was captured, or an I/O error if the file cannot be
    /// written. The in-memory capture is left untouched either way.
    pub async fn save(&self, report: &CaptureReport, path: impl AsRef<Path>) -> Result<()> {
        enter(SessionState::Saving);
        let path = path.as_ref();

        let saved = save_pcd(path, &report.capture, &self.config.generator).await;
        if saved.is_ok() {
            tracing::info!(
                "Saved {} points to '{}'",
                report.capture.total_points(),
                path.display()
            );
        }

        enter(SessionState::Done);
        saved
    }
}

fn enter(state: SessionState) {
    tracing::debug!("Session {}", state);
}
