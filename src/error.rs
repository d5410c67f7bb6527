use std::path::PathBuf;

use thiserror::Error;

/// Failures raised by an inference engine while it runs.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Failed to prepare inputs: {0}")]
    Input(String),
    #[error("Failed to run inference: {0}")]
    Run(String),
    #[error("Failed to read outputs: {0}")]
    Output(String),
}

/// Coarse classification of [`TrackError`], for callers that branch on the
/// kind of failure rather than on its message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    AlreadyExists,
    NotFound,
    NotInitialized,
    TrackerOutput,
    ImageDecode,
    InvalidRequest,
    Engine,
}

impl ErrorKind {
    /// Whether the caller caused the failure (bad id, bad payload, wrong
    /// call order) as opposed to the tracker itself.
    pub fn is_client_error(self) -> bool {
        !matches!(self, ErrorKind::TrackerOutput | ErrorKind::Engine)
    }
}

/// Errors returned by session and target operations.
#[derive(Error, Debug)]
pub enum TrackError {
    #[error("Session '{0}' already exists")]
    AlreadyExists(String),
    #[error("Session '{0}' not found")]
    SessionNotFound(String),
    #[error("Target '{target}' not found in session '{session}'")]
    TargetNotFound { session: String, target: String },
    #[error("Target '{0}' is not initialized")]
    NotInitialized(String),
    #[error("Tracker output has no usable bbox: {0}")]
    TrackerOutput(String),
    #[error("Failed to decode image: {0}")]
    ImageDecode(String),
    #[error("Invalid request: {0}")]
    InvalidRequest(String),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

impl TrackError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TrackError::AlreadyExists(_) => ErrorKind::AlreadyExists,
            TrackError::SessionNotFound(_) | TrackError::TargetNotFound { .. } => {
                ErrorKind::NotFound
            }
            TrackError::NotInitialized(_) => ErrorKind::NotInitialized,
            TrackError::TrackerOutput(_) => ErrorKind::TrackerOutput,
            TrackError::ImageDecode(_) => ErrorKind::ImageDecode,
            TrackError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            TrackError::Engine(_) => ErrorKind::Engine,
        }
    }
}

/// Startup failures while loading the model. These are fatal: the service
/// must not accept traffic after one of them.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Parameter set not found: {0}")]
    ParamsNotFound(PathBuf),
    #[error("Failed to read parameters: {0}")]
    Config(#[from] config::ConfigError),
    #[error("Invalid parameters: {0}")]
    InvalidParams(String),
    #[error("Invalid device '{0}', expected 'auto', 'cpu', 'cuda' or 'cuda:N'")]
    InvalidDevice(String),
    #[error("Device {0} requested but no accelerator is available")]
    DeviceUnavailable(String),
}

pub type Result<T, E = TrackError> = std::result::Result<T, E>;
