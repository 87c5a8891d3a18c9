//! # Error Definitions
//!
//! Failures raised while turning frames into messages and back.

/// Operational failures of the wire layer.
#[derive(Debug)]
pub enum Error {
    /// The frame is not valid JSON or does not match the message shape.
    Json(serde_json::Error),
    /// None of `discovery`, `init`, `exec` (or the reply variants) were present.
    MissingCommand,
    /// No known variant was present, but unknown top-level keys were.
    UnsupportedCommand(Vec<String>),
    /// More than one variant was present.
    AmbiguousCommand(Vec<&'static str>),
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Json(e) => write!(f, "Malformed frame: {}", e),
            Self::MissingCommand => write!(f, "Frame carries no command"),
            Self::UnsupportedCommand(keys) => write!(f, "Unsupported command: {}", keys.join(", ")),
            Self::AmbiguousCommand(keys) => {
                write!(f, "Exactly one command must be present, found: {}", keys.join(", "))
            }
        }
    }
}

impl std::error::Error for Error {}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

/// A specialized Result type for wire operations.
pub type Result<T> = std::result::Result<T, Error>;
