//! Error types for the protocol layer.
//!
//! Each crate in warpnet defines its own error enum. A `ProtocolError`
//! always means a buffer could not be turned into a message (or the
//! reverse), never that a connection misbehaved.

/// Errors that can occur while encoding or decoding wire messages.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ProtocolError {
    /// The buffer is too short to even hold a message-type tag.
    #[error("buffer too short for a message tag: {0} bytes")]
    MissingTag(usize),

    /// The message-type tag is not one this build knows about.
    #[error("unknown message type {0}")]
    UnknownType(u32),

    /// The buffer length does not match the fixed layout of the message.
    ///
    /// Both undersized and oversized buffers are rejected: the layouts
    /// are fixed, so any other length means a corrupt or foreign message.
    #[error("{message} expects {expected} bytes, got {actual}")]
    SizeMismatch {
        message: &'static str,
        expected: usize,
        actual: usize,
    },

    /// A length prefix claims more bytes than its field can hold.
    #[error("{field} length {len} exceeds maximum {max}")]
    LengthOutOfRange {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A value is too large to be encoded into its fixed-size field.
    #[error("{field} is {len} bytes, field holds at most {max}")]
    FieldTooLong {
        field: &'static str,
        len: usize,
        max: usize,
    },

    /// A one-byte boolean held something other than 0 or 1.
    #[error("invalid boolean byte {value:#04x} in {field}")]
    InvalidBool { field: &'static str, value: u8 },

    /// An enumerated field held an unknown discriminant.
    #[error("invalid {field} value {value}")]
    InvalidEnum { field: &'static str, value: u32 },

    /// A string field was not valid UTF-8 (or contained an interior NUL
    /// when encoding).
    #[error("invalid string in {0}")]
    InvalidString(&'static str),
}
