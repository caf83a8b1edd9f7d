//! Mock capture driver for testing without a capture card.
//!
//! Uses a builder pattern to configure devices, display modes, support
//! answers and error injection. Frames and format changes are delivered
//! manually from the test thread through the registered callback.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::capture::driver::{CaptureDriver, InputCallback};
use crate::capture::error::{CaptureError, Result};
use crate::capture::types::{
    DeviceHandle, DisplayMode, DisplayModeId, FormatChange, InputFlags, InputFrame, ModeSupport,
    PixelFormat,
};

/// A simulated capture card in the mock.
#[derive(Default)]
struct MockDevice {
    modes: Vec<DisplayMode>,
    support: HashMap<(DisplayModeId, PixelFormat), ModeSupport>,
    open: bool,
    input_enabled: bool,
    streaming: bool,
    callback: Option<Arc<dyn InputCallback>>,
}

/// Configurable error injection for a specific operation.
#[derive(Debug, Clone)]
struct ErrorInjection {
    operation: &'static str,
    error: CaptureError,
}

/// Mock capture driver.
///
/// All state is behind a `Mutex` so the mock satisfies `Send + Sync`.
pub struct MockDriver {
    state: Mutex<MockState>,
    /// Held for the duration of every delivery so `stop_streams` can wait
    /// for an in-flight callback.
    delivery: Mutex<()>,
}

#[derive(Default)]
struct MockState {
    devices: Vec<MockDevice>,
    error_injections: Vec<ErrorInjection>,
    calls: Vec<&'static str>,
}

impl MockDriver {
    /// Create a new empty mock (no devices).
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            delivery: Mutex::new(()),
        }
    }

    /// Add a device offering the whole mode catalogue.
    pub fn with_device(self) -> Self {
        let modes = DisplayModeId::ALL.iter().map(|m| m.descriptor()).collect();
        self.with_device_modes(modes)
    }

    /// Add a device offering exactly `modes`.
    ///
    /// Modes may carry non-catalogue dimensions, which keeps test frames small.
    pub fn with_device_modes(self, modes: Vec<DisplayMode>) -> Self {
        self.state.lock().devices.push(MockDevice {
            modes,
            ..Default::default()
        });
        self
    }

    /// Override the `supports_mode` answer for one mode and pixel format.
    pub fn with_mode_support(
        self,
        device: usize,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        support: ModeSupport,
    ) -> Self {
        if let Some(dev) = self.state.lock().devices.get_mut(device) {
            dev.support.insert((mode, pixel_format), support);
        }
        self
    }

    /// Inject an error for a specific operation name.
    ///
    /// Operation names: `"device_count"`, `"open"`, `"display_modes"`,
    /// `"supports_mode"`, `"set_callback"`, `"enable_video_input"`,
    /// `"disable_video_input"`, `"start_streams"`, `"stop_streams"`.
    /// Each injection fires once.
    pub fn with_error(self, operation: &'static str, error: CaptureError) -> Self {
        self.state
            .lock()
            .error_injections
            .push(ErrorInjection { operation, error });
        self
    }

    /// Deliver a frame to the registered callback.
    ///
    /// Returns `false` when the device is not streaming or has no callback.
    pub fn deliver_frame(&self, device: usize, frame: &InputFrame<'_>) -> bool {
        let _delivery = self.delivery.lock();
        let Some(callback) = self.streaming_callback(device) else {
            return false;
        };
        callback.frame_arrived(frame);
        true
    }

    /// Deliver a format-change notification to the registered callback.
    pub fn deliver_format_change(&self, device: usize, change: FormatChange) -> bool {
        let _delivery = self.delivery.lock();
        let Some(callback) = self.streaming_callback(device) else {
            return false;
        };
        callback.format_changed(change);
        true
    }

    pub fn is_open(&self, device: usize) -> bool {
        self.with_dev(device, |d| d.open)
    }

    pub fn is_input_enabled(&self, device: usize) -> bool {
        self.with_dev(device, |d| d.input_enabled)
    }

    pub fn is_streaming(&self, device: usize) -> bool {
        self.with_dev(device, |d| d.streaming)
    }

    pub fn has_callback(&self, device: usize) -> bool {
        self.with_dev(device, |d| d.callback.is_some())
    }

    /// Names of the driver operations called so far, in order.
    pub fn calls(&self) -> Vec<&'static str> {
        self.state.lock().calls.clone()
    }

    fn with_dev(&self, device: usize, f: impl FnOnce(&MockDevice) -> bool) -> bool {
        self.state.lock().devices.get(device).is_some_and(f)
    }

    fn streaming_callback(&self, device: usize) -> Option<Arc<dyn InputCallback>> {
        let state = self.state.lock();
        let dev = state.devices.get(device)?;
        if !dev.streaming {
            return None;
        }
        dev.callback.clone()
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockState {
    /// Record the call and fire any injected error for it.
    fn enter(&mut self, operation: &'static str) -> Result<()> {
        self.calls.push(operation);
        if let Some(pos) = self
            .error_injections
            .iter()
            .position(|e| e.operation == operation)
        {
            let injection = self.error_injections.remove(pos);
            return Err(injection.error);
        }
        Ok(())
    }

    fn device_mut(&mut self, handle: DeviceHandle) -> Result<&mut MockDevice> {
        self.devices
            .get_mut(handle.0)
            .ok_or(CaptureError::DeviceNotFound(handle.0))
    }
}

impl CaptureDriver for MockDriver {
    fn device_count(&self) -> Result<usize> {
        let mut state = self.state.lock();
        state.enter("device_count")?;
        Ok(state.devices.len())
    }

    fn open(&self, index: usize) -> Result<DeviceHandle> {
        let mut state = self.state.lock();
        state.enter("open")?;
        let handle = DeviceHandle(index);
        state.device_mut(handle)?.open = true;
        Ok(handle)
    }

    fn display_modes(&self, device: DeviceHandle) -> Result<Vec<DisplayMode>> {
        let mut state = self.state.lock();
        state.enter("display_modes")?;
        Ok(state.device_mut(device)?.modes.clone())
    }

    fn supports_mode(
        &self,
        device: DeviceHandle,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        flags: InputFlags,
    ) -> Result<ModeSupport> {
        let mut state = self.state.lock();
        state.enter("supports_mode")?;
        let dev = state.device_mut(device)?;
        if let Some(support) = dev.support.get(&(mode, pixel_format)) {
            return Ok(*support);
        }
        let Some(descriptor) = dev.modes.iter().find(|m| m.id == mode) else {
            return Ok(ModeSupport::NotSupported);
        };
        if flags.dual_stream_3d && !descriptor.supports_3d {
            return Ok(ModeSupport::NotSupported);
        }
        Ok(ModeSupport::Supported)
    }

    fn set_callback(
        &self,
        device: DeviceHandle,
        callback: Option<Arc<dyn InputCallback>>,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("set_callback")?;
        state.device_mut(device)?.callback = callback;
        Ok(())
    }

    fn enable_video_input(
        &self,
        device: DeviceHandle,
        _mode: DisplayModeId,
        _pixel_format: PixelFormat,
        _flags: InputFlags,
    ) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("enable_video_input")?;
        state.device_mut(device)?.input_enabled = true;
        Ok(())
    }

    fn disable_video_input(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("disable_video_input")?;
        state.device_mut(device)?.input_enabled = false;
        Ok(())
    }

    fn start_streams(&self, device: DeviceHandle) -> Result<()> {
        let mut state = self.state.lock();
        state.enter("start_streams")?;
        let dev = state.device_mut(device)?;
        if !dev.input_enabled {
            return Err(CaptureError::Driver("video input not enabled".to_string()));
        }
        dev.streaming = true;
        Ok(())
    }

    fn stop_streams(&self, device: DeviceHandle) -> Result<()> {
        {
            let mut state = self.state.lock();
            state.enter("stop_streams")?;
            state.device_mut(device)?.streaming = false;
        }
        // Wait out a delivery that began before the flag was cleared
        drop(self.delivery.lock());
        Ok(())
    }

    fn release(&self, device: DeviceHandle) {
        let mut state = self.state.lock();
        state.calls.push("release");
        if let Ok(dev) = state.device_mut(device) {
            dev.open = false;
            dev.callback = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingCallback {
        frames: AtomicUsize,
        changes: AtomicUsize,
    }

    impl InputCallback for CountingCallback {
        fn format_changed(&self, _change: FormatChange) {
            self.changes.fetch_add(1, Ordering::SeqCst);
        }

        fn frame_arrived(&self, _frame: &InputFrame<'_>) {
            self.frames.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn empty_mock_has_no_devices() {
        let mock = MockDriver::new();
        assert_eq!(mock.device_count().unwrap(), 0);
        assert_eq!(mock.open(0), Err(CaptureError::DeviceNotFound(0)));
    }

    #[test]
    fn device_lists_full_catalogue() {
        let mock = MockDriver::new().with_device();
        let handle = mock.open(0).unwrap();
        assert!(mock.is_open(0));
        assert_eq!(mock.display_modes(handle).unwrap().len(), DisplayModeId::ALL.len());
    }

    #[test]
    fn injected_error_fires_once() {
        let mock = MockDriver::new()
            .with_device()
            .with_error("open", CaptureError::Driver("boom".to_string()));
        assert_eq!(
            mock.open(0),
            Err(CaptureError::Driver("boom".to_string()))
        );
        assert!(mock.open(0).is_ok());
    }

    #[test]
    fn support_override_and_3d_default() {
        let mock = MockDriver::new().with_device().with_mode_support(
            0,
            DisplayModeId::Pal,
            PixelFormat::Yuv8Bit,
            ModeSupport::SupportedWithConversion,
        );
        let handle = mock.open(0).unwrap();
        let plain = InputFlags::default();
        let stereo = InputFlags {
            dual_stream_3d: true,
        };
        assert_eq!(
            mock.supports_mode(handle, DisplayModeId::Pal, PixelFormat::Yuv8Bit, plain)
                .unwrap(),
            ModeSupport::SupportedWithConversion
        );
        assert_eq!(
            mock.supports_mode(handle, DisplayModeId::Ntsc, PixelFormat::Yuv8Bit, stereo)
                .unwrap(),
            ModeSupport::NotSupported
        );
        assert_eq!(
            mock.supports_mode(handle, DisplayModeId::Hd720p60, PixelFormat::Yuv8Bit, stereo)
                .unwrap(),
            ModeSupport::Supported
        );
    }

    #[test]
    fn delivery_requires_streaming_and_callback() {
        let mock = MockDriver::new().with_device();
        let handle = mock.open(0).unwrap();
        let callback = Arc::new(CountingCallback::default());
        let bytes = [128u8, 16, 128, 16];
        let frame = InputFrame::new(&bytes, 2, 1);

        mock.set_callback(handle, Some(callback.clone())).unwrap();
        assert!(!mock.deliver_frame(0, &frame), "not streaming yet");

        mock.enable_video_input(
            handle,
            DisplayModeId::Pal,
            PixelFormat::Yuv8Bit,
            InputFlags::default(),
        )
        .unwrap();
        mock.start_streams(handle).unwrap();
        assert!(mock.deliver_frame(0, &frame));
        assert!(mock.deliver_format_change(0, DisplayModeId::Pal.descriptor().into()));

        mock.stop_streams(handle).unwrap();
        assert!(!mock.deliver_frame(0, &frame));

        assert_eq!(callback.frames.load(Ordering::SeqCst), 1);
        assert_eq!(callback.changes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn start_streams_requires_enabled_input() {
        let mock = MockDriver::new().with_device();
        let handle = mock.open(0).unwrap();
        assert!(matches!(
            mock.start_streams(handle),
            Err(CaptureError::Driver(_))
        ));
    }

    #[test]
    fn release_clears_callback_and_records_calls() {
        let mock = MockDriver::new().with_device();
        let handle = mock.open(0).unwrap();
        mock.set_callback(handle, Some(Arc::new(CountingCallback::default())))
            .unwrap();
        mock.release(handle);
        assert!(!mock.is_open(0));
        assert!(!mock.has_callback(0));
        assert_eq!(mock.calls(), vec!["open", "set_callback", "release"]);
    }
}
