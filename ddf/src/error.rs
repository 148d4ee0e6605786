//! Error types for DDF tree operations and wire (de)serialization.

use thiserror::Error;

/// Failures from decoding a DDF wire-format byte stream.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DecodeError {
    #[error("unexpected end of input at offset {0}")]
    UnexpectedEof(usize),
    #[error("unknown type byte {0:#04x} at offset {1}")]
    UnknownTypeByte(u8, usize),
    #[error("expected '\"' at offset {0}")]
    ExpectedQuote(usize),
    #[error("expected space after name field at offset {0}")]
    ExpectedSpace(usize),
    #[error("invalid percent-encoding at offset {0}")]
    InvalidPercentEncoding(usize),
    #[error("invalid UTF-8 in safe string at offset {0}")]
    InvalidUtf8(usize),
    #[error("invalid integer literal at offset {0}")]
    InvalidInteger(usize),
    #[error("invalid float literal at offset {0}")]
    InvalidFloat(usize),
    #[error("expected '{0}' to close container at offset {1}")]
    UnterminatedContainer(char, usize),
    #[error("trailing bytes after top-level node at offset {0}")]
    TrailingBytes(usize),
}

/// Failures from tree-mutation operations.
///
/// Most DDF mutators are defined to be no-ops on misuse (see spec) rather
/// than erroring; this type covers the handful that are not, namely the
/// cycle check performed by `add`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("cannot insert a node as a descendant of itself")]
    WouldCreateCycle,
    #[error("node id is not valid in this tree")]
    InvalidNodeId,
}
