//! Ground-station core: command state, device connections and the loop that
//! ties them together.
//!
//! ```text
//! operator text ──parse_line──► ConsoleHandle ──queue──► Multiplexer
//!                                                          │  ├─ CommandState ─► encode ─► command links
//!                       telemetry links ──reader tasks──►  │  └─ StreamDecoder ─► TelemetrySnapshot
//! ```
//!
//! A [`Multiplexer`] owns a [`Context`] and is the only code that mutates
//! it. Producers talk to it through cloneable [`ConsoleHandle`]s; telemetry
//! consumers read a [`SnapshotReader`].

pub mod command_state;
pub mod config;
pub mod error;
pub mod handle;
pub mod multiplexer;
pub mod registry;
pub mod request;
pub mod role;
pub mod snapshot;

pub use command_state::{CommandState, CommandStates, StagedCommand};
pub use config::{ConsoleConfig, DEFAULT_POLL_TIMEOUT, DEFAULT_WRITE_TIMEOUT};
pub use error::{ConsoleError, Result};
pub use handle::{ConsoleHandle, Envelope};
pub use multiplexer::{Context, MuxState, Multiplexer};
pub use registry::{Connection, ConnectionId, ConnectionInfo, ConnectionRegistry};
pub use request::{parse_line, CommandAction, Outcome, ParseError, Request, Target};
pub use role::{Device, Direction, Role};
pub use snapshot::{SnapshotReader, TelemetryReading, TelemetrySnapshot};

use tokio::task::JoinHandle;

/// Start a multiplexer on the current runtime.
///
/// The task ends after shutdown (via [`ConsoleHandle::shutdown`], a
/// `shutdown` request, or dropping every handle) has closed all connections.
pub fn spawn(config: ConsoleConfig) -> (ConsoleHandle, JoinHandle<()>) {
    let (ctx, handle) = Context::new(&config);
    let task = tokio::spawn(Multiplexer::new(ctx, config).run());
    (handle, task)
}
