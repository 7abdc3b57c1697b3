//! Wire format constants and header-line parsing.
//!
//! The stream is a sequence of ASCII header lines, each terminated by `\n`
//! (a `\r` before it is tolerated). A header is one of:
//!
//! ```text
//! PING        heartbeat, nothing follows
//! PCD <N>     N bytes of binary point data follow immediately
//! <other>     ignored
//! ```
//!
//! The payload is `N / 16` points, each four little-endian `f32`
//! values `(x, y, z, intensity)`.

use std::time::Duration;

/// Heartbeat keyword.
pub const PING: &str = "PING";

/// Payload header keyword (followed by a space and the byte length).
pub const PCD_KEYWORD: &str = "PCD";

/// Number of `f32` fields per point.
pub const FLOATS_PER_POINT: usize = 4;

/// Size of one `f32` field in bytes.
pub const BYTES_PER_FLOAT: usize = 4;

/// Size of one point in bytes.
pub const POINT_STRIDE: usize = FLOATS_PER_POINT * BYTES_PER_FLOAT;

/// Default ceiling for a single payload (256 MiB).
///
/// Headers announcing more than this are rejected as malformed instead of
/// triggering an unbounded allocation.
pub const DEFAULT_MAX_PAYLOAD_SIZE: usize = 256 * 1024 * 1024;

/// Default ceiling for a single header line (4 KiB).
pub const DEFAULT_MAX_LINE_LENGTH: usize = 4 * 1024;

/// Default bound on each blocking read attempt.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(1);

/// Interpreted header line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Header {
    /// `PING`.
    Ping,
    /// `PCD <length>` with a valid, in-range length.
    Pcd { length: usize },
    /// A `PCD` line whose length is missing, not a positive integer, or
    /// above the payload ceiling.
    Malformed { line: String, reason: String },
    /// Any other non-empty line.
    Unrecognized(String),
    /// A blank line.
    Empty,
}

impl Header {
    /// Interpret a decoded header line.
    ///
    /// Matching is case-insensitive. The `PCD` length is the second
    /// whitespace-separated token; further tokens are ignored.
    ///
    /// # Example
    ///
    /// ```
    /// use pcd_capture::protocol::{Header, DEFAULT_MAX_PAYLOAD_SIZE};
    ///
    /// assert_eq!(Header::parse("ping", DEFAULT_MAX_PAYLOAD_SIZE), Header::Ping);
    /// assert_eq!(
    ///     Header::parse("PCD 64", DEFAULT_MAX_PAYLOAD_SIZE),
    ///     Header::Pcd { length: 64 }
    /// );
    /// ```
    pub fn parse(line: &str, max_payload_size: usize) -> Self {
        if line.is_empty() {
            return Header::Empty;
        }

        if line.eq_ignore_ascii_case(PING) {
            return Header::Ping;
        }

        if !is_pcd_line(line) {
            return Header::Unrecognized(line.to_string());
        }

        let malformed = |reason: String| Header::Malformed {
            line: line.to_string(),
            reason,
        };

        let Some(token) = line.split_whitespace().nth(1) else {
            return malformed("missing payload length".to_string());
        };

        match token.parse::<u64>() {
            Ok(0) => malformed("payload length must be positive".to_string()),
            Ok(n) if n > max_payload_size as u64 => malformed(format!(
                "payload size {} exceeds maximum {}",
                n, max_payload_size
            )),
            Ok(n) => Header::Pcd { length: n as usize },
            Err(_) => malformed(format!("'{}' is not a positive integer", token)),
        }
    }
}

/// `PCD ` prefix, compared case-insensitively.
fn is_pcd_line(line: &str) -> bool {
    let bytes = line.as_bytes();
    let keyword = PCD_KEYWORD.as_bytes();
    bytes.len() > keyword.len()
        && bytes[..keyword.len()].eq_ignore_ascii_case(keyword)
        && bytes[keyword.len()] == b' '
}

/// Number of whole points in a payload of `len` bytes.
#[inline]
pub fn points_in(len: usize) -> usize {
    len / POINT_STRIDE
}
