use crate::schema::FieldKind;

/// Errors that can occur during frame encoding/decoding.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum FrameError {
    /// The supplied values do not line up with the schema.
    #[error("{schema}: {reason}")]
    SchemaMismatch { schema: &'static str, reason: String },

    /// Fewer bytes than one whole frame were supplied.
    #[error("{schema}: short buffer ({actual} bytes, need {needed})")]
    ShortBuffer {
        schema: &'static str,
        needed: usize,
        actual: usize,
    },

    /// A field's bytes cannot be read as its declared type.
    #[error("{schema}: field {field} is not a valid {kind} (byte 0x{byte:02x})")]
    FieldTypeError {
        schema: &'static str,
        field: &'static str,
        kind: FieldKind,
        byte: u8,
    },

    /// The trailing CRC-32 disagrees with the frame contents.
    #[error("{schema}: checksum mismatch (frame says 0x{received:08x}, computed 0x{computed:08x})")]
    ChecksumMismatch {
        schema: &'static str,
        received: u32,
        computed: u32,
    },
}

pub type Result<T> = std::result::Result<T, FrameError>;
