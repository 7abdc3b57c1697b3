//! Frame type and wire encoders.
//!
//! A [`Frame`] is one protocol unit yielded by the
//! [`FrameReader`](super::FrameReader). Payloads are `bytes::Bytes` split
//! off the reader's buffer without copying; the aggregator copies them once
//! into its contiguous capture buffer.
//!
//! The encoders build the byte form of each frame. The capture client
//! never sends anything, so they are used by feeders and tests.
//!
//! # Example
//!
//! ```
//! use pcd_capture::protocol::{build_pcd_frame, build_ping};
//!
//! let mut wire = build_ping();
//! wire.extend(build_pcd_frame(&[0u8; 16]));
//! assert_eq!(&wire[..12], b"PING\nPCD 16\n");
//! ```

use bytes::Bytes;

use super::wire_format::{points_in, PCD_KEYWORD, PING, POINT_STRIDE};

/// A single protocol unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Idle-connection keep-alive. Carries no data.
    Heartbeat,
    /// Raw point data announced by a `PCD <N>` header; exactly `N` bytes.
    PointPayload(Bytes),
    /// Any header line the protocol does not define.
    Unrecognized(String),
}

impl Frame {
    /// Payload bytes, if this is a point payload.
    #[inline]
    pub fn payload(&self) -> Option<&[u8]> {
        match self {
            Frame::PointPayload(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// Payload length in bytes (0 for non-payload frames).
    #[inline]
    pub fn payload_len(&self) -> usize {
        self.payload().map_or(0, <[u8]>::len)
    }

    /// Whole points carried by this frame.
    #[inline]
    pub fn point_count(&self) -> usize {
        points_in(self.payload_len())
    }

    /// Check if the payload length is not a multiple of the point stride.
    #[inline]
    pub fn has_partial_point(&self) -> bool {
        self.payload_len() % POINT_STRIDE != 0
    }

    /// Check if this is a heartbeat.
    #[inline]
    pub fn is_heartbeat(&self) -> bool {
        matches!(self, Frame::Heartbeat)
    }
}

/// Encode a `PING` line.
pub fn build_ping() -> Vec<u8> {
    format!("{}\n", PING).into_bytes()
}

/// Encode a `PCD <N>` header followed by the payload.
pub fn build_pcd_frame(payload: &[u8]) -> Vec<u8> {
    let mut buf = format!("{} {}\n", PCD_KEYWORD, payload.len()).into_bytes();
    buf.extend_from_slice(payload);
    buf
}

/// Encode points as the little-endian `(x, y, z, intensity)` payload layout.
///
/// # Example
///
/// ```
/// use pcd_capture::protocol::encode_points;
///
/// let bytes = encode_points(&[[1.0, 2.0, 3.0, 0.5]]);
/// assert_eq!(bytes.len(), 16);
/// assert_eq!(&bytes[..4], &1.0f32.to_le_bytes());
/// ```
pub fn encode_points(points: &[[f32; 4]]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(points.len() * POINT_STRIDE);
    for point in points {
        for value in point {
            buf.extend_from_slice(&value.to_le_bytes());
        }
    }
    buf
}
