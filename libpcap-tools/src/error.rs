use std::io;
use thiserror::Error;

/// Errors raised while reading, decoding or writing a capture file
///
/// Per-packet problems are never reported here: they are absorbed by the
/// dissector and the inspector. Only container-level failures escape.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad magic number, or header too short. Fatal to the whole decode.
    #[error("invalid capture format: {0}")]
    InvalidFormat(&'static str),
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    /// Serialization of a header or a record failed
    #[error("serialization failed: {0}")]
    Serialize(String),
    #[error("configuration error: {0}")]
    Config(String),
    /// The run was cancelled at a packet boundary
    #[error("analysis cancelled")]
    Cancelled,
    #[error("{0}")]
    Generic(&'static str),
}

impl From<&'static str> for Error {
    fn from(s: &'static str) -> Self {
        Error::Generic(s)
    }
}
