//! TCP transport for GSE and ECU device links.
//!
//! Devices are plain TCP peers addressed as `host:port`. This is the lowest
//! layer of gsectl: it parses operator-supplied endpoints and opens sockets
//! with bounded waits. Everything else builds on the [`TcpStream`] returned
//! by [`connect`].
//!
//! [`TcpStream`]: tokio::net::TcpStream

pub mod endpoint;
pub mod error;
pub mod tcp;

pub use endpoint::Endpoint;
pub use error::{Result, TransportError};
pub use tcp::{bind, connect, DEFAULT_CONNECT_TIMEOUT};
