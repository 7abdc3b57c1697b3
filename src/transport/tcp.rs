//! TCP connection setup.
//!
//! # Example
//!
//! ```ignore
//! use pcd_capture::transport::{connect, DEFAULT_CONNECT_TIMEOUT};
//!
//! let stream = connect(&endpoint, DEFAULT_CONNECT_TIMEOUT).await?;
//! ```

use std::time::Duration;

use tokio::net::TcpStream;

use crate::endpoint::Endpoint;
use crate::error::{CaptureError, Result};

/// Default bound on establishing the connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Connect to `endpoint` with `TCP_NODELAY` enabled.
///
/// There is no retry: a failed connection ends the session.
pub async fn connect(endpoint: &Endpoint, timeout: Duration) -> Result<TcpStream> {
    let addr = endpoint.socket_addr_string();

    let stream = match tokio::time::timeout(timeout, TcpStream::connect(addr.as_str())).await {
        Ok(Ok(stream)) => stream,
        Ok(Err(source)) => {
            return Err(CaptureError::Connect {
                endpoint: addr,
                source,
            })
        }
        Err(_elapsed) => {
            return Err(CaptureError::ConnectTimeout {
                endpoint: addr,
                timeout,
            })
        }
    };

    stream.set_nodelay(true)?;
    tracing::debug!(
        "Connected to {} from {}",
        addr,
        stream
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "?".to_string())
    );
    Ok(stream)
}
