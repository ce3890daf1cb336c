//! Error kinds surfaced by the core, per the propagation policy: decoder
//! open/read failures are classified, everything else bubbles up through
//! `anyhow` at the call boundary.

use thiserror::Error;

/// The structured error kinds the engine can surface to a caller, carrying
/// their payload as typed Rust data (an errno, a redirect count, an HTTP
/// status/reason) instead of a single formatted message.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{context}: {source}")]
    Errno {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}: unrecognized filename extension")]
    UnrecognizedFileType(String),

    #[error("{0}: file format not supported or corrupted file")]
    FileFormat(String),

    #[error("{0}: input plugin doesn't support the sample format")]
    SampleFormat(String),

    #[error("{0}: function not supported")]
    FunctionNotSupported(String),

    #[error("{0}: invalid URI")]
    InvalidUri(String),

    #[error("{0}: invalid HTTP response")]
    HttpResponse(String),

    #[error("{context}: {code} {reason}")]
    HttpStatus {
        context: String,
        code: u16,
        reason: String,
    },

    #[error("{0}: too many HTTP redirections")]
    HttpRedirectLimit(String),

    #[error("{0}: internal error")]
    Internal(String),

    #[error("device error: {0}")]
    Device(String),
}

impl EngineError {
    pub fn errno(context: impl Into<String>, source: std::io::Error) -> Self {
        EngineError::Errno {
            context: context.into(),
            source,
        }
    }
}

pub type EngineResult<T> = Result<T, EngineError>;
