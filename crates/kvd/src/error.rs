//! Error types for the daemon

use std::fmt;

/// Malformed RESP input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// First byte of a frame is not a known RESP type
    UnknownType(u8),

    /// Length or integer line is not a valid number
    InvalidInteger(String),

    /// Negative length other than -1
    InvalidLength(i64),

    /// Bulk string larger than the allowed maximum
    BulkTooLarge(usize),

    /// Array with more elements than the allowed maximum
    ArrayTooLarge(usize),

    /// Simple string or error line is not UTF-8
    InvalidUtf8,

    /// Bulk payload not followed by CRLF
    MissingCrlf,

    /// Arrays nested deeper than the allowed maximum
    NestingTooDeep,
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProtocolError::UnknownType(b) => write!(f, "unknown RESP type byte 0x{:02x}", b),
            ProtocolError::InvalidInteger(s) => write!(f, "invalid integer '{}'", s),
            ProtocolError::InvalidLength(n) => write!(f, "invalid length {}", n),
            ProtocolError::BulkTooLarge(n) => write!(f, "bulk string too large: {} bytes", n),
            ProtocolError::ArrayTooLarge(n) => write!(f, "array too large: {} elements", n),
            ProtocolError::InvalidUtf8 => write!(f, "invalid UTF-8 in line"),
            ProtocolError::MissingCrlf => write!(f, "expected CRLF after bulk string"),
            ProtocolError::NestingTooDeep => write!(f, "array nesting too deep"),
        }
    }
}

impl std::error::Error for ProtocolError {}

/// A well-formed frame that is not a valid command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    /// Request is not a non-empty array of bulk strings
    InvalidFormat,

    /// Command name not supported
    UnknownCommand(String),

    /// Wrong number of arguments for the named command
    WrongArity(&'static str),

    /// Unsupported option or option combination
    Syntax,

    /// Key and value together exceed the cache size
    TooLarge,
}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommandError::InvalidFormat => write!(f, "ERR invalid command format"),
            CommandError::UnknownCommand(name) => write!(f, "ERR unknown command '{}'", name),
            CommandError::WrongArity(name) => {
                write!(f, "ERR wrong number of arguments for '{}' command", name)
            }
            CommandError::Syntax => write!(f, "ERR syntax error"),
            CommandError::TooLarge => write!(f, "ERR entry exceeds cache size"),
        }
    }
}

impl std::error::Error for CommandError {}
