use gsectl_frame::FrameError;
use gsectl_transport::TransportError;

use crate::registry::ConnectionId;
use crate::request::ParseError;
use crate::role::{Device, Direction, Role};

/// Errors reported by the console core.
#[derive(Debug, thiserror::Error)]
pub enum ConsoleError {
    /// Frame-level error.
    #[error("frame error: {0}")]
    Frame(#[from] FrameError),

    /// Transport-level error.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// Operator text could not be parsed.
    #[error("invalid command: {0}")]
    Parse(#[from] ParseError),

    /// `setall` got the wrong number of values.
    #[error("{device} setall takes {expected} values, got {actual}")]
    Arity {
        device: Device,
        expected: usize,
        actual: usize,
    },

    /// `set` named a field the command schema does not have.
    #[error("{device} has no command field named {field:?}")]
    UnknownField { device: Device, field: String },

    /// No command connection is registered for the device.
    #[error("no {device} command connection is registered")]
    NoMatchingConnection { device: Device },

    /// The connection went away before the operation completed.
    #[error("connection {id} closed")]
    ConnectionClosed { id: ConnectionId },

    /// Writing a frame to a connection failed.
    #[error("write to connection {id} failed: {source}")]
    WriteFailure {
        id: ConnectionId,
        source: std::io::Error,
    },

    /// No registered connection matches the operator's target.
    #[error("no {direction} connection matches {target}")]
    UnknownConnection { direction: Direction, target: String },

    /// The connection id is already in the registry.
    #[error("connection {id} is already registered as {role}")]
    AlreadyRegistered { id: ConnectionId, role: Role },

    /// The multiplexer is draining and accepts no more requests.
    #[error("console is shutting down")]
    ShuttingDown,

    /// The request queue is closed (multiplexer stopped).
    #[error("console request queue closed")]
    QueueClosed,
}

pub type Result<T> = std::result::Result<T, ConsoleError>;
