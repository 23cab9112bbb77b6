//! Fixed-layout binary frames for GSE and ECU links.
//!
//! Every device speaks in frames of a single fixed size per message type:
//! - Telemetry frames are packed little-endian fields with no checksum
//! - Command frames are packed boolean fields followed by a 4-byte CRC-32
//!
//! [`codec`] encodes and decodes single frames; [`StreamDecoder`] turns an
//! arbitrarily chunked byte stream into whole frames.

pub mod codec;
pub mod decoder;
pub mod error;
pub mod schema;
pub mod value;

pub use codec::{checksum, decode, encode, encode_into, CHECKSUM_SIZE};
pub use decoder::{Drain, Fed, StreamDecoder};
pub use error::{FrameError, Result};
pub use schema::{
    Field, FieldKind, Schema, ECU_COMMAND, ECU_TELEMETRY, GSE_COMMAND, GSE_TELEMETRY,
};
pub use value::Value;
