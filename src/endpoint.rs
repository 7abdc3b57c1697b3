//! Endpoint resolution.
//!
//! Turns user input into a connection target. Two forms are accepted:
//!
//! - `host:port`, split on the last colon; `[::1]:23511` is unbracketed
//! - `tcp://host:port`, `http://host[:port]`, `https://host[:port]`
//!
//! # Example
//!
//! ```
//! use pcd_capture::Endpoint;
//!
//! let endpoint: Endpoint = "tcp://10.0.0.5:23511".parse().unwrap();
//! assert_eq!(endpoint.host(), "10.0.0.5");
//! assert_eq!(endpoint.port(), 23511);
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{CaptureError, Result};

/// Host used when the user leaves the endpoint blank.
pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Port used when the user leaves the endpoint blank.
pub const DEFAULT_PORT: u16 = 23511;

/// URI schemes accepted in front of an authority.
const SUPPORTED_SCHEMES: &[&str] = &["tcp", "http", "https"];

/// A resolved connection target.
///
/// Immutable once resolved; `port` is always in `1..=65535`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Endpoint {
    host: String,
    port: u16,
}

impl Endpoint {
    /// Create an endpoint from parts, validating both.
    pub fn new(host: impl Into<String>, port: u16) -> Result<Self> {
        let host = host.into();
        if host.is_empty() {
            return Err(CaptureError::InvalidEndpoint(
                "Host part cannot be empty".to_string(),
            ));
        }
        if port == 0 {
            return Err(CaptureError::InvalidEndpoint(
                "Port must be between 1 and 65535".to_string(),
            ));
        }
        Ok(Self { host, port })
    }

    /// Resolve user input into an endpoint.
    ///
    /// Blank input is not handled here; see [`Endpoint::parse_or_default`].
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if let Some((scheme, rest)) = input.split_once("://") {
            return Self::parse_uri(scheme, rest);
        }

        Self::parse_host_port(input)
    }

    /// Resolve user input, falling back to the default endpoint when blank.
    pub fn parse_or_default(input: &str) -> Result<Self> {
        if input.trim().is_empty() {
            return Ok(Self::default());
        }
        Self::parse(input)
    }

    /// Host name or address, without IPv6 brackets.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// TCP port.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Address string suitable for `TcpStream::connect`.
    ///
    /// IPv6 literals are re-bracketed so the port separator is unambiguous.
    pub fn socket_addr_string(&self) -> String {
        if self.host.contains(':') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }

    fn parse_uri(scheme: &str, rest: &str) -> Result<Self> {
        let scheme = scheme.to_ascii_lowercase();
        if !SUPPORTED_SCHEMES.contains(&scheme.as_str()) {
            return Err(CaptureError::InvalidEndpoint(format!(
                "Unsupported scheme '{}' (expected tcp, http or https)",
                scheme
            )));
        }

        // Drop path, query and fragment, then any userinfo.
        let authority = rest
            .split(|c| c == '/' || c == '?' || c == '#')
            .next()
            .unwrap_or_default();
        let authority = authority.rsplit('@').next().unwrap_or_default();

        let (host, port) = match split_host_port(authority) {
            Some((host, port)) => (host, parse_port(port)?),
            None => {
                let port = match scheme.as_str() {
                    "http" => 80,
                    "https" => 443,
                    _ => {
                        return Err(CaptureError::InvalidEndpoint(
                            "The URI must include a valid port number".to_string(),
                        ))
                    }
                };
                (authority, port)
            }
        };

        Self::new(strip_brackets(host), port)
    }

    fn parse_host_port(input: &str) -> Result<Self> {
        let (host, port) = split_host_port(input).ok_or_else(|| {
            CaptureError::InvalidEndpoint(format!(
                "'{}' must be in the form host:port or a URI such as tcp://{}:{}",
                input, DEFAULT_HOST, DEFAULT_PORT
            ))
        })?;

        let port = parse_port(port)?;
        Self::new(strip_brackets(host.trim()), port)
    }
}

impl Default for Endpoint {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: DEFAULT_PORT,
        }
    }
}

impl FromStr for Endpoint {
    type Err = CaptureError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.socket_addr_string())
    }
}

/// Split on the last colon, unless that colon sits inside an unclosed
/// IPv6 bracket pair (e.g. `[::1]` with no port).
fn split_host_port(input: &str) -> Option<(&str, &str)> {
    let idx = input.rfind(':')?;
    if input.starts_with('[') && !input[..idx].ends_with(']') {
        return None;
    }
    Some((&input[..idx], &input[idx + 1..]))
}

fn strip_brackets(host: &str) -> &str {
    host.strip_prefix('[')
        .and_then(|h| h.strip_suffix(']'))
        .unwrap_or(host)
}

fn parse_port(port: &str) -> Result<u16> {
    match port.trim().parse::<u32>() {
        Ok(p) if (1..=65535).contains(&p) => Ok(p as u16),
        _ => Err(CaptureError::InvalidEndpoint(format!(
            "Port '{}' must be an integer between 1 and 65535",
            port
        ))),
    }
}
