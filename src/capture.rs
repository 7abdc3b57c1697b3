//! Capture aggregation.
//!
//! [`CaptureState`] accumulates point payloads into one contiguous buffer
//! and keeps running totals. Only the capture loop mutates it; progress
//! reporting reads cheap [`CaptureSnapshot`] copies.

use bytes::{Bytes, BytesMut};
use serde::Serialize;

use crate::protocol::{points_in, POINT_STRIDE};

/// Accounting for one appended payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameStats {
    /// 1-based index of the frame within the capture.
    pub index: u64,
    /// Payload length in bytes.
    pub bytes: u64,
    /// Whole points in the payload.
    pub points: u64,
    /// Trailing bytes that do not form a whole point.
    pub remainder: u64,
}

/// Point-in-time copy of the running totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CaptureSnapshot {
    pub frames: u64,
    pub points: u64,
    pub bytes: u64,
}

/// Accumulated capture data.
#[derive(Debug, Default)]
pub struct CaptureState {
    buffer: BytesMut,
    frame_count: u64,
    total_points: u64,
    total_bytes: u64,
}

impl CaptureState {
    /// Create an empty capture.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one payload and update the totals.
    ///
    /// A payload whose length is not a multiple of 16 is still appended in
    /// full; its point count is the floor and a warning is logged.
    pub fn append(&mut self, payload: &[u8]) -> FrameStats {
        let bytes = payload.len() as u64;
        let points = points_in(payload.len()) as u64;
        let remainder = (payload.len() % POINT_STRIDE) as u64;

        self.buffer.extend_from_slice(payload);
        self.frame_count += 1;
        self.total_points += points;
        self.total_bytes += bytes;

        if remainder != 0 {
            tracing::warn!(
                "Payload size {} is not divisible by {}; point count may be inaccurate",
                bytes,
                POINT_STRIDE
            );
        }

        FrameStats {
            index: self.frame_count,
            bytes,
            points,
            remainder,
        }
    }

    /// Current totals.
    pub fn snapshot(&self) -> CaptureSnapshot {
        CaptureSnapshot {
            frames: self.frame_count,
            points: self.total_points,
            bytes: self.total_bytes,
        }
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn total_points(&self) -> u64 {
        self.total_points
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_bytes
    }

    /// Check if no points were captured.
    pub fn is_empty(&self) -> bool {
        self.total_points == 0
    }

    /// The raw accumulated payload bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Consume the capture, returning the accumulated bytes.
    pub fn into_bytes(self) -> Bytes {
        self.buffer.freeze()
    }
}

/// Format a byte count with binary units (`B`, `KiB`, `MiB`, `GiB`).
pub fn format_size(bytes: u64) -> String {
    const SCALE: f64 = 1024.0;
    let value = bytes as f64;

    if value >= SCALE * SCALE * SCALE {
        format!("{:.2} GiB", value / (SCALE * SCALE * SCALE))
    } else if value >= SCALE * SCALE {
        format!("{:.2} MiB", value / (SCALE * SCALE))
    } else if value >= SCALE {
        format!("{:.1} KiB", value / SCALE)
    } else {
        format!("{} B", bytes)
    }
}
