//! Error handling for strokeplot
//!
//! Provides error types for every stage of a plot run:
//! - Font errors (glyph store loading)
//! - Layout errors (text input and height validation)
//! - Connection errors (transport open and I/O)
//! - Protocol errors (handshake and exchange failures)
//!
//! All error types use `thiserror` for ergonomic error handling.

use thiserror::Error;

/// Font error type
///
/// Raised while loading a stroke font. A malformed record is always a hard
/// error; partial glyphs are never kept.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FontError {
    /// Header record did not have the form `999 <code> <count>`
    #[error("Malformed glyph header at line {line}: '{content}'")]
    MalformedHeader {
        /// The 1-based line number of the record.
        line: usize,
        /// The offending record text.
        content: String,
    },

    /// Stroke record did not have the form `<dx> <dy> <pen>`
    #[error("Malformed stroke record at line {line}: '{content}'")]
    MalformedStroke {
        /// The 1-based line number of the record.
        line: usize,
        /// The offending record text.
        content: String,
    },

    /// Pen flag outside {0, 1}
    #[error("Invalid pen flag {value} at line {line} (expected 0 or 1)")]
    InvalidPenFlag {
        /// The 1-based line number of the record.
        line: usize,
        /// The pen flag that was read.
        value: i32,
    },

    /// File ended before all announced strokes were read
    #[error("Glyph {code} announced {expected} strokes but only {found} were present")]
    TruncatedGlyph {
        /// The character code of the glyph.
        code: u32,
        /// The stroke count from the header.
        expected: usize,
        /// The number of strokes actually read.
        found: usize,
    },

    /// A record appeared outside of any glyph
    #[error("Unexpected record at line {line}: '{content}'")]
    UnexpectedRecord {
        /// The 1-based line number of the record.
        line: usize,
        /// The offending record text.
        content: String,
    },

    /// The font source could not be read
    #[error("Failed to read font: {reason}")]
    Io {
        /// The reason the read failed.
        reason: String,
    },
}

/// Layout error type
///
/// Represents problems with the job input that are detected before any
/// compilation or transport activity.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LayoutError {
    /// Requested text height outside the supported range
    #[error("Text height {height}mm out of range ({min}..={max}mm)")]
    HeightOutOfRange {
        /// The requested height in millimetres.
        height: i32,
        /// The smallest accepted height.
        min: i32,
        /// The largest accepted height.
        max: i32,
    },

    /// The text source does not exist
    #[error("Text source not found: {path}")]
    InputSourceMissing {
        /// The path that was looked up.
        path: String,
    },

    /// The text source could not be decoded
    #[error("Invalid text in {path}: {reason}")]
    InvalidText {
        /// The path of the text source.
        path: String,
        /// The reason decoding failed.
        reason: String,
    },
}

/// Connection error type
///
/// Represents errors related to the transport between host and controller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// Failed to open port
    #[error("Failed to open port {port}: {reason}")]
    FailedToOpen {
        /// The name of the port that failed to open.
        port: String,
        /// The reason the port failed to open.
        reason: String,
    },

    /// No usable port was found
    #[error("No serial port found")]
    NoPortFound,

    /// Invalid connection parameters
    #[error("Invalid connection parameters: {reason}")]
    InvalidParameters {
        /// The reason the parameters are invalid.
        reason: String,
    },

    /// The transport stopped responding or was unplugged
    #[error("Connection lost: {reason}")]
    ConnectionLost {
        /// The reason the connection was lost.
        reason: String,
    },

    /// I/O error on an open transport
    #[error("I/O error: {reason}")]
    Io {
        /// The reason for the I/O error.
        reason: String,
    },
}

/// Protocol error type
///
/// Represents failures of the ready handshake and the stop-and-wait exchange.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// Controller never announced it was ready
    #[error("Controller not ready after {attempts} attempt(s) of {timeout_ms}ms")]
    ReadyTimeout {
        /// The per-attempt timeout in milliseconds.
        timeout_ms: u64,
        /// The number of wake attempts made.
        attempts: u32,
    },

    /// No reply to a command within the retry budget
    #[error("No reply to '{command}' after {attempts} attempt(s) of {timeout_ms}ms")]
    ReplyTimeout {
        /// The command line awaiting a reply.
        command: String,
        /// The per-attempt timeout in milliseconds.
        timeout_ms: u64,
        /// The number of times the command was sent.
        attempts: u32,
    },

    /// Command was rejected by controller
    #[error("Command '{command}' rejected: {reply}")]
    CommandRejected {
        /// The command line that was rejected.
        command: String,
        /// The reply line received.
        reply: String,
    },

    /// Alarm condition reported in reply to a command
    #[error("Alarm {code} after '{command}'")]
    Alarm {
        /// The command line that triggered the alarm.
        command: String,
        /// The alarm code.
        code: u8,
    },

    /// The run was cancelled
    #[error("Streaming cancelled")]
    Cancelled,

    /// Invalid state transition
    #[error("Invalid state transition from {current} to {requested}")]
    InvalidStateTransition {
        /// The current state name.
        current: String,
        /// The requested state name.
        requested: String,
    },
}

/// Main error type for strokeplot
///
/// A unified error type that can represent any error from all layers.
/// This is the primary error type used in public APIs.
#[derive(Error, Debug)]
pub enum Error {
    /// Font error
    #[error(transparent)]
    Font(#[from] FontError),

    /// Layout error
    #[error(transparent)]
    Layout(#[from] LayoutError),

    /// Connection error
    #[error(transparent)]
    Connection(#[from] ConnectionError),

    /// Protocol error
    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an error from a string message
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// Check if this is a timeout error
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Protocol(ProtocolError::ReadyTimeout { .. })
                | Error::Protocol(ProtocolError::ReplyTimeout { .. })
        )
    }

    /// Check if this is a connection error
    pub fn is_connection_error(&self) -> bool {
        matches!(self, Error::Connection(_))
    }

    /// Check if this is a font error
    pub fn is_font_error(&self) -> bool {
        matches!(self, Error::Font(_))
    }

    /// Check if the run was cancelled
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Error::Protocol(ProtocolError::Cancelled))
    }
}

/// Result type using Error
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_font_error_display() {
        let err = FontError::MalformedHeader {
            line: 3,
            content: "999 A 2".to_string(),
        };
        assert_eq!(err.to_string(), "Malformed glyph header at line 3: '999 A 2'");

        let err = FontError::TruncatedGlyph {
            code: 65,
            expected: 4,
            found: 1,
        };
        assert_eq!(
            err.to_string(),
            "Glyph 65 announced 4 strokes but only 1 were present"
        );
    }

    #[test]
    fn test_layout_error_display() {
        let err = LayoutError::HeightOutOfRange {
            height: 12,
            min: 4,
            max: 10,
        };
        assert_eq!(err.to_string(), "Text height 12mm out of range (4..=10mm)");
    }

    #[test]
    fn test_error_classification() {
        let err: Error = ProtocolError::ReplyTimeout {
            command: "M3".to_string(),
            timeout_ms: 100,
            attempts: 3,
        }
        .into();
        assert!(err.is_timeout());
        assert!(!err.is_connection_error());

        let err: Error = ConnectionError::FailedToOpen {
            port: "/dev/ttyUSB0".to_string(),
            reason: "busy".to_string(),
        }
        .into();
        assert!(err.is_connection_error());
        assert_eq!(err.to_string(), "Failed to open port /dev/ttyUSB0: busy");

        let err: Error = ProtocolError::Cancelled.into();
        assert!(err.is_cancelled());

        let err: Error = FontError::Io {
            reason: "gone".to_string(),
        }
        .into();
        assert!(err.is_font_error());
    }
}
