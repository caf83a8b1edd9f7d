//! Driver boundary.
//!
//! `CaptureDriver` abstracts the capture card SDK so the session controller
//! can run against real hardware, the `SimulatedDriver` or the `MockDriver`.
//! `InputCallback` is the other direction: the capability the core exposes to
//! the driver's delivery thread.

use std::sync::Arc;

use crate::capture::error::Result;
use crate::capture::types::{
    DeviceHandle, DisplayMode, DisplayModeId, FormatChange, InputFlags, InputFrame, ModeSupport,
    PixelFormat,
};

/// Notifications delivered on the driver's thread.
///
/// Both methods are infallible: nothing may unwind into driver code.
pub trait InputCallback: Send + Sync {
    /// The incoming signal changed resolution or frame rate.
    fn format_changed(&self, change: FormatChange);

    /// A frame was captured. `frame` is only valid for the duration of the call.
    fn frame_arrived(&self, frame: &InputFrame<'_>);
}

/// Abstraction over a capture card SDK.
///
/// All methods take `&self`; implementations manage interior mutability.
pub trait CaptureDriver: Send + Sync {
    /// Number of capture devices present.
    fn device_count(&self) -> Result<usize>;

    /// Open the device at `index`.
    fn open(&self, index: usize) -> Result<DeviceHandle>;

    /// Display modes the device can capture.
    fn display_modes(&self, device: DeviceHandle) -> Result<Vec<DisplayMode>>;

    /// Whether `mode` can be captured in `pixel_format` with `flags`.
    fn supports_mode(
        &self,
        device: DeviceHandle,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        flags: InputFlags,
    ) -> Result<ModeSupport>;

    /// Register (or with `None`, clear) the callback target for the device.
    fn set_callback(
        &self,
        device: DeviceHandle,
        callback: Option<Arc<dyn InputCallback>>,
    ) -> Result<()>;

    /// Configure video input. Fails when the card is in use elsewhere.
    fn enable_video_input(
        &self,
        device: DeviceHandle,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        flags: InputFlags,
    ) -> Result<()>;

    fn disable_video_input(&self, device: DeviceHandle) -> Result<()>;

    /// Begin delivering frames to the registered callback.
    fn start_streams(&self, device: DeviceHandle) -> Result<()>;

    /// Stop delivering frames.
    ///
    /// Must not return while a callback is still executing on the driver
    /// thread; buffers are torn down right after this call.
    fn stop_streams(&self, device: DeviceHandle) -> Result<()>;

    /// Release the device handle.
    fn release(&self, device: DeviceHandle);
}

/// Driver used when no capture backend is available on this build.
pub struct NullDriver;

impl CaptureDriver for NullDriver {
    fn device_count(&self) -> Result<usize> {
        Ok(0)
    }

    fn open(&self, _index: usize) -> Result<DeviceHandle> {
        Err(crate::capture::error::CaptureError::NoDevice)
    }

    fn display_modes(&self, _device: DeviceHandle) -> Result<Vec<DisplayMode>> {
        Ok(vec![])
    }

    fn supports_mode(
        &self,
        _device: DeviceHandle,
        _mode: DisplayModeId,
        _pixel_format: PixelFormat,
        _flags: InputFlags,
    ) -> Result<ModeSupport> {
        Ok(ModeSupport::NotSupported)
    }

    fn set_callback(
        &self,
        _device: DeviceHandle,
        _callback: Option<Arc<dyn InputCallback>>,
    ) -> Result<()> {
        Ok(())
    }

    fn enable_video_input(
        &self,
        _device: DeviceHandle,
        _mode: DisplayModeId,
        _pixel_format: PixelFormat,
        _flags: InputFlags,
    ) -> Result<()> {
        Err(crate::capture::error::CaptureError::NoDevice)
    }

    fn disable_video_input(&self, _device: DeviceHandle) -> Result<()> {
        Ok(())
    }

    fn start_streams(&self, _device: DeviceHandle) -> Result<()> {
        Err(crate::capture::error::CaptureError::NoDevice)
    }

    fn stop_streams(&self, _device: DeviceHandle) -> Result<()> {
        Ok(())
    }

    fn release(&self, _device: DeviceHandle) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::error::CaptureError;

    #[test]
    fn null_driver_has_no_devices() {
        let driver = NullDriver;
        assert_eq!(driver.device_count().unwrap(), 0);
        assert_eq!(driver.open(0), Err(CaptureError::NoDevice));
    }

    /// Verify the traits are object-safe.
    #[test]
    fn traits_are_object_safe() {
        fn _accepts_driver(_driver: &dyn CaptureDriver) {}
        fn _accepts_callback(_callback: &dyn InputCallback) {}
    }

    #[test]
    fn trait_objects_are_send_sync() {
        fn assert_send_sync<T: Send + Sync + ?Sized>() {}
        assert_send_sync::<Arc<dyn CaptureDriver>>();
        assert_send_sync::<Arc<dyn InputCallback>>();
    }
}
