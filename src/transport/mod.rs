//! Transport module - TCP connection to the sensor endpoint.

mod tcp;

pub use tcp::{connect, DEFAULT_CONNECT_TIMEOUT};
