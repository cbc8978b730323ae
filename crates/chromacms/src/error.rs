//! Error types for chromacms

use std::fmt;
use std::io;

/// Result type alias for color-management operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for profile handling and transform construction
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),

    /// Profile bytes could not be parsed
    Parse(String),

    /// A profile's bytes or handle could not be obtained
    ProfileUnavailable(String),

    /// The engine rejected the (source, destination, parameters) combination
    BuildFailed(String),

    /// A bounded cache wait exceeded its deadline
    Timeout,

    /// Pixel buffer layout does not match the transform
    ShapeMismatch(String),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Parse(msg) => write!(f, "Parse error: {}", msg),
            Error::ProfileUnavailable(msg) => write!(f, "Profile unavailable: {}", msg),
            Error::BuildFailed(msg) => write!(f, "Link build failed: {}", msg),
            Error::Timeout => write!(f, "Timed out waiting on the link cache"),
            Error::ShapeMismatch(msg) => write!(f, "Buffer shape mismatch: {}", msg),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(err: io::Error) -> Self {
        Error::Io(err)
    }
}

impl From<nom::Err<nom::error::Error<&[u8]>>> for Error {
    fn from(err: nom::Err<nom::error::Error<&[u8]>>) -> Self {
        Error::Parse(format!("{:?}", err))
    }
}
