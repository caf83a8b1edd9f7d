//! Capture-card frame grabber.
//!
//! Frames arrive from a [`CaptureDriver`] on the driver's own thread as packed
//! 4:2:2 (`[U, Y0, V, Y1]`) and are converted to interleaved RGB through
//! precomputed lookup tables. Finished frames land in a double buffer that an
//! application thread polls at its own pace.

pub mod capture;
pub mod convert;
pub mod diagnostics;
pub mod frame;
pub mod settings;

use std::sync::Arc;

pub use capture::{CaptureDriver, CaptureError, CaptureSession, DisplayModeId};
pub use convert::{Converter, DeinterlaceMethod, TableLayout};
pub use frame::{FrameSwap, FrontFrame, Rgb8};
pub use settings::{GrabberSettings, SettingsStore};

/// Create the capture driver for this build.
///
/// When `FRAMEGRAB_SIMULATED=1` is set, a simulated card is used instead.
/// No hardware SDK binding ships with this crate, so the fallback is a driver
/// that reports no devices.
pub fn create_driver() -> Arc<dyn CaptureDriver> {
    if capture::SimulatedDriver::is_enabled() {
        tracing::info!("Using simulated capture driver");
        return Arc::new(capture::SimulatedDriver::new());
    }
    Arc::new(capture::NullDriver)
}
