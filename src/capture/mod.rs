// Capture domain: driver boundary and session lifecycle.

pub mod driver;
pub mod error;
pub mod mock;
pub mod session;
pub mod simulated;
pub mod types;

pub use driver::{CaptureDriver, InputCallback, NullDriver};
pub use error::{CaptureError, ErrorKind, Result};
pub use session::CaptureSession;
pub use simulated::SimulatedDriver;
pub use types::{
    DeviceHandle, DisplayMode, DisplayModeId, FieldDominance, FormatChange, FrameFlags, FrameRate,
    InputFlags, InputFrame, ModeSupport, PixelFormat,
};
