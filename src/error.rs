//! Error types for the velours audio engine.

use std::fmt;

/// Errors that can occur when working with the velours audio engine.
#[derive(Debug)]
pub enum EngineError {
    /// The named output device is not present in the enumeration.
    DeviceNotFound(String),
    /// The OS refused to open the output device.
    DeviceOpenFailed(String),
    /// The requested block geometry violates the layout contract.
    InvalidLayout(String),
    /// The mixer thread could not be launched.
    ThreadStartFailed(String),
    /// A sample source path could not be read.
    SourceOpenFailed(String),
    /// A sample source is truncated or uses an unsupported layout.
    SourceMalformed(String),
    /// The output sink could not accept a composed block.
    SinkStalled,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::DeviceNotFound(name) => {
                write!(f, "output device not found: {name}")
            }
            EngineError::DeviceOpenFailed(msg) => {
                write!(f, "failed to open output device: {msg}")
            }
            EngineError::InvalidLayout(msg) => {
                write!(f, "invalid block layout: {msg}")
            }
            EngineError::ThreadStartFailed(msg) => {
                write!(f, "failed to start mixer thread: {msg}")
            }
            EngineError::SourceOpenFailed(msg) => {
                write!(f, "failed to open sample source: {msg}")
            }
            EngineError::SourceMalformed(msg) => {
                write!(f, "malformed sample source: {msg}")
            }
            EngineError::SinkStalled => {
                write!(f, "output sink refused a composed block")
            }
        }
    }
}

impl std::error::Error for EngineError {}
