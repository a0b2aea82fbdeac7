//! Error types for TRON operations.

use thiserror::Error;

/// Error type for TRON operations.
///
/// Every parsing and traversal operation either succeeds or returns one of
/// these variants; there is no panic path in the engine. A failed write
/// leaves the builder's previously emitted bytes intact — the caller simply
/// discards the in-progress root offset.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// Document does not start with the `TRON` magic, or is too short to
    /// hold the magic and trailer.
    #[error("document missing TRON magic or too short")]
    BadMagic,

    /// A declared length exceeds the remaining buffer (node body, length
    /// prefix, or value payload).
    #[error("truncated: declared length exceeds remaining buffer")]
    Truncated,

    /// Reserved bits in a scalar tag are not zero.
    #[error("invalid tag byte {0:#04x}: reserved bits set")]
    BadTag(u8),

    /// Length-of-length outside 1..=8, or a length prefix is missing.
    #[error("invalid length encoding")]
    BadLengthEncoding,

    /// A node body violates its shape: entry count disagrees with the
    /// bitmap, a reserved field is non-zero, shift is misaligned, or an
    /// array leaf carries a non-zero shift.
    #[error("malformed node: {0}")]
    BadNodeShape(&'static str),

    /// An operation expected one container kind and found the other.
    #[error("key type mismatch: expected {expected}, found {found}")]
    KeyTypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// A map leaf entry has a non-text key.
    #[error("map leaf key is not a text value")]
    MapLeafKeyNotTxt,

    /// Map leaf keys are not sorted ascending or not unique.
    #[error("map leaf keys not sorted or not unique")]
    MapLeafKeysUnsorted,

    /// Array index outside `[0, length)` (or beyond `length` on set).
    #[error("array index {index} out of range (length {length})")]
    IndexOutOfRange { index: u32, length: u32 },

    /// Map descent past the deepest hash-trie level.
    #[error("map depth exceeds maximum")]
    DepthExceeded,

    /// An `Arr`/`Map` value was passed where no usable node offset exists,
    /// e.g. encoding a container as a standalone scalar document.
    #[error("container value has no usable offset here")]
    MissingOffset,

    /// The encoder was handed the same key twice for one leaf.
    #[error("duplicate map key")]
    DuplicateMapKey,
}

/// Result type alias for TRON operations.
pub type Result<T> = std::result::Result<T, Error>;
