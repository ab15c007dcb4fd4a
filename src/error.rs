use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Everything that can go wrong between picking a port and persisting a line.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("invalid port configuration: {0}")]
    InvalidConfiguration(String),

    #[error("serial port '{port}' is unavailable: {reason}")]
    PortUnavailable { port: String, reason: String },

    #[error("cannot send '{input}': {reason}")]
    InvalidSendPayload { input: String, reason: String },

    #[error("no display mode selected, byte dropped")]
    FormattingUnconfigured,

    #[error("line ending detection by {0} is not implemented")]
    UnimplementedLineEndingRule(&'static str),

    #[error("serial port is closed")]
    PortClosed,

    #[error("a serial port is already open")]
    AlreadyOpen,

    #[error("logging is already running for this port")]
    AlreadyLogging,

    #[error("serial port failed while reading: {0}")]
    PortLost(#[source] io::Error),

    #[error("failed to write to serial port: {0}")]
    WriteFailed(#[source] io::Error),

    #[error("log file {path}: {source}")]
    LogWrite {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SessionError {
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        SessionError::InvalidConfiguration(reason.into())
    }
}
