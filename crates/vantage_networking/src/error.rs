//! # Protocol Error Types
//!
//! Everything that can be wrong with a received datagram. Each error rejects
//! one packet (or one message of a bundle); none is fatal.

use thiserror::Error;

/// Errors that can occur while encoding or decoding OSC traffic.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// The packet ended before a value was complete.
    #[error("truncated packet: needed {needed} bytes, {remaining} left")]
    Truncated {
        /// Bytes the next value needs.
        needed: usize,
        /// Bytes left in the buffer.
        remaining: usize,
    },

    /// A string has no NUL terminator.
    #[error("unterminated string at offset {0}")]
    UnterminatedString(usize),

    /// Padding after a string contains non-zero bytes.
    #[error("non-zero padding at offset {0}")]
    BadPadding(usize),

    /// A string is not valid UTF-8.
    #[error("string at offset {0} is not valid UTF-8")]
    InvalidUtf8(usize),

    /// The packet is neither a message nor a bundle.
    #[error("packet does not start with an address or #bundle")]
    NotOsc,

    /// The type tag string does not start with ','.
    #[error("type tag string must start with ','")]
    MissingTypeTags,

    /// A type tag this codec does not understand.
    #[error("unsupported type tag {0:?}")]
    UnknownTypeTag(char),

    /// A bundle element size is negative, unaligned or too large.
    #[error("invalid bundle element size {0}")]
    BadBundleElement(i32),

    /// Bundles nested deeper than the codec allows.
    #[error("bundles nested deeper than {0}")]
    BundleTooDeep(usize),

    /// The encoded packet does not fit the send buffer.
    #[error("packet exceeds {0} bytes")]
    BufferOverflow(usize),

    /// The address is not part of the hub contract.
    #[error("unknown address {0}")]
    UnknownAddress(String),

    /// A required argument is absent.
    #[error("{address}: missing argument {index}")]
    MissingArgument {
        /// Message address.
        address: String,
        /// Zero-based argument position.
        index: usize,
    },

    /// An argument has a type that cannot be coerced.
    #[error("{address}: argument {index} should be {expected}, got {found:?}")]
    WrongArgumentType {
        /// Message address.
        address: String,
        /// Zero-based argument position.
        index: usize,
        /// What the contract wants.
        expected: &'static str,
        /// The type tag received.
        found: char,
    },

    /// A 64-bit integer argument does not fit 32 bits.
    #[error("{address}: argument {index} is out of range")]
    ArgumentOutOfRange {
        /// Message address.
        address: String,
        /// Zero-based argument position.
        index: usize,
    },

    /// A view announced a port outside 1..=65535.
    #[error("port {0} is out of range")]
    PortOutOfRange(i64),
}

/// Result type for protocol operations.
pub type ProtocolResult<T> = Result<T, ProtocolError>;
