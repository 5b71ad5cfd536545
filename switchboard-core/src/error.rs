//! Error types for Switchboard

use thiserror::Error;

use crate::formats::PixelFormat;

/// Result type alias using SwitchboardError
pub type Result<T> = std::result::Result<T, SwitchboardError>;

/// Coarse classification of a [`SwitchboardError`]
///
/// Context wrapping is transparent: a wrapped error reports the kind of
/// the error it wraps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    SourceUnavailable,
    FormatUnsupported,
    UnknownSource,
    InvalidQuality,
    UnsupportedConversion,
    TransportClosed,
    TransmitBackpressure,
    InvalidFrame,
    Config,
    Io,
}

/// Main error type for Switchboard operations
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// The source could not be opened
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The source negotiated a pixel format we don't recognize
    #[error("Unsupported pixel format: {0}")]
    FormatUnsupported(String),

    /// No ingesting source with this id
    #[error("Unknown source: {0}")]
    UnknownSource(String),

    /// Preview quality outside low/medium/high
    #[error("Invalid preview quality: {0}")]
    InvalidQuality(String),

    /// The converter cannot go between these formats
    #[error("Unsupported conversion: {from} -> {to}")]
    UnsupportedConversion { from: PixelFormat, to: PixelFormat },

    /// The transmission session has been torn down
    #[error("Transport closed: {0}")]
    TransportClosed(String),

    /// The transmitter is still busy with the previous frame
    #[error("Transmitter busy, frame dropped")]
    TransmitBackpressure,

    /// Pixel buffer does not match the declared format and dimensions
    #[error("Invalid frame: {0}")]
    InvalidFrame(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<SwitchboardError>,
    },
}

impl SwitchboardError {
    /// Create a source-unavailable error
    pub fn source_unavailable(msg: impl Into<String>) -> Self {
        Self::SourceUnavailable(msg.into())
    }

    /// Create an unknown-source error
    pub fn unknown_source(id: impl Into<String>) -> Self {
        Self::UnknownSource(id.into())
    }

    /// Create a transport-closed error
    pub fn transport_closed(msg: impl Into<String>) -> Self {
        Self::TransportClosed(msg.into())
    }

    /// Create an invalid-frame error
    pub fn invalid_frame(msg: impl Into<String>) -> Self {
        Self::InvalidFrame(msg.into())
    }

    /// Create a config error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        Self::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Classify this error, looking through any context wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::SourceUnavailable(_) => ErrorKind::SourceUnavailable,
            Self::FormatUnsupported(_) => ErrorKind::FormatUnsupported,
            Self::UnknownSource(_) => ErrorKind::UnknownSource,
            Self::InvalidQuality(_) => ErrorKind::InvalidQuality,
            Self::UnsupportedConversion { .. } => ErrorKind::UnsupportedConversion,
            Self::TransportClosed(_) => ErrorKind::TransportClosed,
            Self::TransmitBackpressure => ErrorKind::TransmitBackpressure,
            Self::InvalidFrame(_) => ErrorKind::InvalidFrame,
            Self::Config(_) => ErrorKind::Config,
            Self::Io(_) => ErrorKind::Io,
            Self::WithContext { source, .. } => source.kind(),
        }
    }

    /// A short hint the operator can act on, if there is one
    pub fn user_hint(&self) -> Option<&'static str> {
        match self.kind() {
            ErrorKind::SourceUnavailable => {
                Some("Check that the source is still announced on the network and reachable")
            }
            ErrorKind::UnknownSource => {
                Some("Start ingestion for the source before selecting it (see list-sources)")
            }
            ErrorKind::InvalidQuality => Some("Valid preview qualities are: low, medium, high"),
            ErrorKind::TransportClosed => {
                Some("The output receiver went away; restart the output to reconnect")
            }
            ErrorKind::Config => Some("Check ~/.config/switchboard/config.toml for typos"),
            _ => None,
        }
    }

    /// Whether the operator can fix this without a code change
    pub fn is_user_recoverable(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::SourceUnavailable
                | ErrorKind::UnknownSource
                | ErrorKind::InvalidQuality
                | ErrorKind::TransportClosed
                | ErrorKind::Config
        )
    }
}

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
