//! PCD v0.7 serializer.
//!
//! Writes a fixed ASCII header followed by the raw capture buffer:
//!
//! ```text
//! # .PCD v0.7 - Generated by <generator>
//! VERSION 0.7
//! FIELDS x y z intensity
//! SIZE 4 4 4 4
//! TYPE F F F F
//! COUNT 1 1 1 1
//! WIDTH <points>
//! HEIGHT 1
//! VIEWPOINT 0 0 0 1 0 0 0
//! POINTS <points>
//! DATA binary
//! <body>
//! ```
//!
//! The body is written unmodified. No byte reordering or validation of the
//! point values is performed.

use std::path::Path;

use tokio::fs::File;
use tokio::io::{AsyncWrite, AsyncWriteExt, BufWriter};

use crate::capture::CaptureState;
use crate::error::{CaptureError, Result};

/// Generator name written into the header comment.
pub const DEFAULT_GENERATOR: &str = env!("CARGO_PKG_NAME");

/// Marker line that ends the header.
pub const DATA_LINE: &str = "DATA binary";

/// Render the ASCII header for `points` points.
///
/// # Example
///
/// ```
/// use pcd_capture::pcd::render_header;
///
/// let header = render_header(42, "demo");
/// assert!(header.starts_with("# .PCD v0.7 - Generated by demo\n"));
/// assert!(header.contains("\nWIDTH 42\n"));
/// assert!(header.ends_with("DATA binary\n"));
/// ```
pub fn render_header(points: u64, generator: &str) -> String {
    format!(
        "# .PCD v0.7 - Generated by {generator}\n\
         VERSION 0.7\n\
         FIELDS x y z intensity\n\
         SIZE 4 4 4 4\n\
         TYPE F F F F\n\
         COUNT 1 1 1 1\n\
         WIDTH {points}\n\
         HEIGHT 1\n\
         VIEWPOINT 0 0 0 1 0 0 0\n\
         POINTS {points}\n\
         {DATA_LINE}\n"
    )
}

/// Write header and body to any async writer, then flush it.
pub async fn write_pcd<W: AsyncWrite + Unpin>(
    writer: &mut W,
    points: u64,
    body: &[u8],
    generator: &str,
) -> Result<()> {
    writer
        .write_all(render_header(points, generator).as_bytes())
        .await?;
    writer.write_all(body).await?;
    writer.flush().await?;
    Ok(())
}

/// Save a capture to `path`, overwriting any existing file.
///
/// # Errors
///
/// Returns [`CaptureError::EmptyCapture`] if no points were captured (no
/// file is created), or [`CaptureError::Io`] if the file cannot be written.
pub async fn save_pcd(
    path: impl AsRef<Path>,
    capture: &CaptureState,
    generator: &str,
) -> Result<()> {
    if capture.is_empty() {
        return Err(CaptureError::EmptyCapture);
    }

    let path = path.as_ref();
    let file = File::create(path).await?;
    let mut writer = BufWriter::new(file);

    write_pcd(&mut writer, capture.total_points(), capture.as_bytes(), generator).await?;
    writer.get_mut().sync_all().await?;

    tracing::debug!(
        "Wrote {} points ({} body bytes) to {}",
        capture.total_points(),
        capture.total_bytes(),
        path.display()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::encode_points;

    fn split_body(bytes: &[u8]) -> (&str, &[u8]) {
        let marker = format!("{}\n", DATA_LINE);
        let pos = bytes
            .windows(marker.len())
            .position(|w| w == marker.as_bytes())
            .expect("header terminator");
        let end = pos + marker.len();
        (std::str::from_utf8(&bytes[..end]).unwrap(), &bytes[end..])
    }

    #[test]
    fn test_header_lines() {
        let header = render_header(7, "tool");
        let lines: Vec<&str> = header.lines().collect();

        assert_eq!(
            lines,
            vec![
                "# .PCD v0.7 - Generated by tool",
                "VERSION 0.7",
                "FIELDS x y z intensity",
                "SIZE 4 4 4 4",
                "TYPE F F F F",
                "COUNT 1 1 1 1",
                "WIDTH 7",
                "HEIGHT 1",
                "VIEWPOINT 0 0 0 1 0 0 0",
                "POINTS 7",
                "DATA binary",
            ]
        );
        assert!(!header.contains('\r'));
    }

    #[tokio::test]
    async fn test_write_pcd_body_is_unmodified() {
        let body = encode_points(&[[1.0, 2.0, 3.0, 4.0], [-1.0, 0.5, 9.0, 0.0]]);
        let mut out: Vec<u8> = Vec::new();

        write_pcd(&mut out, 2, &body, "tool").await.unwrap();

        let (header, written) = split_body(&out);
        assert!(header.contains("WIDTH 2\n"));
        assert!(header.contains("POINTS 2\n"));
        assert_eq!(written, &body[..]);
    }

    #[tokio::test]
    async fn test_save_pcd_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.pcd");

        let mut capture = CaptureState::new();
        capture.append(&encode_points(&[[0.1, 0.2, 0.3, 0.4]; 3]));
        capture.append(&encode_points(&[[5.0, 6.0, 7.0, 8.0]; 2]));

        save_pcd(&path, &capture, DEFAULT_GENERATOR).await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        let (header, body) = split_body(&bytes);
        assert!(header.starts_with("# .PCD v0.7 - Generated by pcd-capture\n"));
        assert!(header.contains("WIDTH 5\n"));
        assert!(header.contains("POINTS 5\n"));
        assert_eq!(body.len(), 80);
        assert_eq!(body, capture.as_bytes());
    }

    #[tokio::test]
    async fn test_save_pcd_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("capture.pcd");
        std::fs::write(&path, vec![0xFFu8; 4096]).unwrap();

        let mut capture = CaptureState::new();
        capture.append(&[0u8; 16]);
        save_pcd(&path, &capture, "tool").await.unwrap();

        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes.len(), render_header(1, "tool").len() + 16);
    }

    #[tokio::test]
    async fn test_empty_capture_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.pcd");

        let err = save_pcd(&path, &CaptureState::new(), "tool")
            .await
            .unwrap_err();

        assert!(matches!(err, CaptureError::EmptyCapture));
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_unwritable_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("capture.pcd");

        let mut capture = CaptureState::new();
        capture.append(&[0u8; 16]);

        let err = save_pcd(&path, &capture, "tool").await.unwrap_err();
        assert!(matches!(err, CaptureError::Io(_)));
    }
}
