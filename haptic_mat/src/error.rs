//! Error types for the pressure-mat feedback core.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MatError {
    #[error("Incomplete frame: expected {expected} bytes, received {received}")]
    IncompleteFrame { expected: usize, received: usize },

    #[error("Frame point outside the mat: row {row}, column {column}")]
    CoordinateOutOfRange { row: usize, column: usize },

    #[error("Degenerate clustering: need at least 2 active points, have {active_points}")]
    DegenerateClustering { active_points: usize },

    #[error("Empty hand region: cannot compute a center of pressure")]
    EmptyHandRegion,

    #[error("Device I/O error: {0}")]
    Device(#[from] std::io::Error),

    #[error("Serial port error: {0}")]
    SerialPort(#[from] serialport::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Feedback task failed: {0}")]
    Task(String),
}

impl MatError {
    /// Errors that only invalidate the current cycle. Everything else ends the
    /// connection and is handed back to the caller.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            MatError::IncompleteFrame { .. }
                | MatError::CoordinateOutOfRange { .. }
                | MatError::DegenerateClustering { .. }
                | MatError::EmptyHandRegion
        )
    }
}

pub type Result<T> = std::result::Result<T, MatError>;
