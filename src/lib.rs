//! # pcd-capture
//!
//! Streaming LiDAR capture client.
//!
//! Connects to a sensor TCP endpoint, reads a line-delimited protocol that
//! carries binary point payloads, accumulates the payloads in memory until
//! the stream closes or the user cancels, and writes the result as a binary
//! PCD v0.7 file.
//!
//! ## Protocol
//!
//! - `PING\n`: heartbeat
//! - `PCD <N>\n` followed by `N` bytes: `N / 16` points of four
//!   little-endian `f32` values `(x, y, z, intensity)`
//! - anything else: logged and ignored
//!
//! ## Example
//!
//! ```ignore
//! use pcd_capture::Session;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let session = Session::builder()
//!         .endpoint("tcp://127.0.0.1:23511".parse()?)
//!         .build();
//!     session.cancel_token().cancel_on_ctrl_c();
//!
//!     let report = session.run().await?;
//!     if !report.capture.is_empty() {
//!         session.save(&report, "capture.pcd").await?;
//!     }
//!     Ok(())
//! }
//! ```

pub mod cancel;
pub mod capture;
pub mod control;
pub mod endpoint;
pub mod error;
pub mod pcd;
pub mod protocol;
pub mod session;
pub mod transport;

pub use cancel::CancelToken;
pub use capture::{CaptureSnapshot, CaptureState};
pub use endpoint::Endpoint;
pub use error::CaptureError;
pub use session::{CaptureReport, Session, SessionBuilder, SessionResult};
