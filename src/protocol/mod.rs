//! Protocol module - wire format, header parsing, and the frame reader.
//!
//! This module implements the line-delimited capture protocol:
//! - `PING` / `PCD <N>` header lines
//! - Exact-length binary payloads
//! - A timeout-tolerant, cancellable reader yielding [`Frame`]s

mod frame;
mod reader;
mod wire_format;

pub use frame::{build_pcd_frame, build_ping, encode_points, Frame};
pub use reader::{FrameReader, ReadAttempt, ReadEvent};
pub use wire_format::{
    points_in, Header, BYTES_PER_FLOAT, DEFAULT_MAX_LINE_LENGTH, DEFAULT_MAX_PAYLOAD_SIZE,
    DEFAULT_READ_TIMEOUT, FLOATS_PER_POINT, PCD_KEYWORD, PING, POINT_STRIDE,
};
