use thiserror::Error;

/// Capture subsystem errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CaptureError {
    #[error("no capture device present (is the driver installed?)")]
    NoDevice,

    #[error("device not found: index {0}")]
    DeviceNotFound(usize),

    #[error("no video mode selected, call select_mode before start")]
    NoModeSelected,

    #[error("invalid mode {0} for this device")]
    InvalidMode(String),

    #[error("display mode {mode} is not supported with pixel format {pixel_format}")]
    UnsupportedMode { mode: String, pixel_format: String },

    #[error("pixel format {0} cannot be converted to RGB")]
    UnsupportedPixelFormat(String),

    #[error("display mode {0} is not supported with 3D")]
    Unsupported3D(String),

    #[error("capture is already streaming, stop before changing the mode")]
    AlreadyStreaming,

    #[error("failed to start stream: {0}")]
    StreamStart(String),

    #[error("driver call failed: {0}")]
    Driver(String),
}

/// Coarse classification used by callers deciding whether a retry makes sense.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Requires a configuration change before retrying.
    Configuration,
    /// The device is absent, busy or rejected the request.
    Device,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NoModeSelected
            | Self::InvalidMode(_)
            | Self::UnsupportedMode { .. }
            | Self::UnsupportedPixelFormat(_)
            | Self::Unsupported3D(_)
            | Self::AlreadyStreaming => ErrorKind::Configuration,
            Self::NoDevice | Self::DeviceNotFound(_) | Self::StreamStart(_) | Self::Driver(_) => {
                ErrorKind::Device
            }
        }
    }
}

/// Convenience Result alias.
pub type Result<T> = std::result::Result<T, CaptureError>;
