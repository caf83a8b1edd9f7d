use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use crate::capture::driver::{CaptureDriver, InputCallback};
use crate::capture::error::{CaptureError, Result};
use crate::capture::types::{
    DeviceHandle, DisplayModeId, FormatChange, InputFlags, InputFrame, ModeSupport, PixelFormat,
};
use crate::convert::{deinterlace, deinterlace_buffered, Converter, DeinterlaceMethod};
use crate::diagnostics::stats::{DiagnosticSnapshot, DiagnosticStats};
use crate::frame::swap::{FrameSwap, FrontFrame};
use crate::settings::types::GrabberSettings;

/// Frames logged at debug level after each start.
const LOGGED_FRAMES: u64 = 3;

/// State shared with the driver's delivery thread.
///
/// Registered as the driver callback while the session streams. Everything
/// the callback touches lives here so the controller can be reconfigured
/// from the application thread.
pub struct SessionCore {
    converter: Converter,
    frames: FrameSwap,
    /// Producer lock. Held for the whole of every callback; the vector is
    /// the scratch frame for buffered deinterlacing.
    producer: Mutex<Vec<u8>>,
    running: AtomicBool,
    deinterlace: AtomicBool,
    buffered_deinterlace: AtomicBool,
    stats: Mutex<DiagnosticStats>,
    frames_received: AtomicU64,
}

impl SessionCore {
    fn new(converter: Converter) -> Self {
        Self {
            converter,
            frames: FrameSwap::new(),
            producer: Mutex::new(Vec::new()),
            running: AtomicBool::new(false),
            deinterlace: AtomicBool::new(false),
            buffered_deinterlace: AtomicBool::new(false),
            stats: Mutex::new(DiagnosticStats::new()),
            frames_received: AtomicU64::new(0),
        }
    }

    /// Size both RGB buffers (and the scratch frame, when in use) for
    /// `width` x `height`.
    fn allocate(&self, width: u32, height: u32) {
        let mut scratch = self.producer.lock();
        self.frames.reallocate(width, height);
        scratch.clear();
        if self.buffered_deinterlace.load(Ordering::Relaxed) {
            scratch.resize(width as usize * height as usize * 3, 0);
        }
    }

    fn release(&self) {
        let mut scratch = self.producer.lock();
        self.frames.release();
        *scratch = Vec::new();
        self.frames_received.store(0, Ordering::Relaxed);
    }

    fn record_drop(&self) {
        self.stats.lock().record_drop();
    }
}

impl InputCallback for SessionCore {
    fn format_changed(&self, change: FormatChange) {
        self.allocate(change.width, change.height);
        let mode = change
            .mode
            .map_or_else(|| "unknown mode".to_string(), |m| m.display_name().to_string());
        tracing::info!(
            "Input format changed to {}x{} @ {:.2} fps ({mode})",
            change.width,
            change.height,
            change.frame_rate.fps()
        );
    }

    fn frame_arrived(&self, frame: &InputFrame<'_>) {
        if !self.running.load(Ordering::Acquire) {
            return;
        }
        let mut scratch = self.producer.lock();
        let n = self.frames_received.fetch_add(1, Ordering::Relaxed) + 1;

        if let Some(timecode) = frame.timecode {
            tracing::trace!("Frame #{n} timecode {timecode}");
        }
        if frame.right_eye.is_some() {
            tracing::trace!("Frame #{n} carries a right-eye image, converting left eye only");
        }

        if frame.flags.no_input_source {
            tracing::warn!("Frame received (#{n}) - No input signal detected");
            self.record_drop();
            return;
        }

        let started = Instant::now();
        let Some(mut back) = self.frames.back_buffer() else {
            tracing::debug!(
                "Dropping frame #{n}: the consumer is still reading the back buffer"
            );
            self.record_drop();
            return;
        };
        let (width, height) = (back.width() as usize, back.height() as usize);
        let src_row = width * 2;
        let row_bytes = frame.row_bytes as usize;
        let needed = match height {
            0 => 0,
            h => row_bytes * (h - 1) + src_row,
        };
        if frame.width as usize != width
            || frame.height as usize != height
            || row_bytes < src_row
            || frame.bytes.len() < needed
            || back.is_empty()
        {
            tracing::warn!(
                "Dropping frame #{n}: {}x{} with {} bytes does not fit the {width}x{height} buffers",
                frame.width,
                frame.height,
                frame.bytes.len()
            );
            drop(back);
            self.record_drop();
            return;
        }

        if row_bytes == src_row {
            self.converter.convert_frame(frame.bytes, width, height, &mut back);
        } else {
            for (src, dst) in frame
                .bytes
                .chunks(row_bytes)
                .zip(back.chunks_exact_mut(width * 3))
            {
                self.converter.convert_frame(&src[..src_row], width, 1, dst);
            }
        }

        if self.deinterlace.load(Ordering::Relaxed) {
            if self.buffered_deinterlace.load(Ordering::Relaxed) {
                scratch.resize(back.len(), 0);
                scratch.copy_from_slice(&back);
                deinterlace_buffered(&scratch, &mut back, width, height);
            } else {
                deinterlace(&mut back, width, height);
            }
        }

        let bytes = back.len();
        let published = self.frames.publish(back);
        let elapsed = started.elapsed();

        {
            let mut stats = self.stats.lock();
            stats.record_frame(bytes, elapsed);
            if published.overwrote_unpolled {
                stats.record_overwrite();
            }
        }

        if n <= LOGGED_FRAMES {
            tracing::debug!(
                "Frame received (#{n}) [{}] - {} - Size: {} bytes, converted in {} us",
                frame.timecode.unwrap_or("No timecode"),
                if frame.right_eye.is_some() {
                    "Valid Frame (3D left/right)"
                } else {
                    "Valid Frame"
                },
                frame.reported_len(),
                elapsed.as_micros()
            );
        }
    }
}

/// Capture session for one device: mode selection, start/stop, and the
/// consumer side of the frame handoff.
pub struct CaptureSession {
    driver: Arc<dyn CaptureDriver>,
    core: Arc<SessionCore>,
    device_index: usize,
    device: Option<DeviceHandle>,
    mode: Option<DisplayModeId>,
    pixel_format: PixelFormat,
    dual_stream_3d: bool,
    input_enabled: bool,
}

impl CaptureSession {
    /// Create an idle session configured from `settings`.
    ///
    /// Builds the conversion tables, which takes noticeable time with
    /// `TableLayout::Full`.
    pub fn new(driver: Arc<dyn CaptureDriver>, settings: &GrabberSettings) -> Self {
        let core = Arc::new(SessionCore::new(Converter::new(settings.table_layout)));
        let session = Self {
            driver,
            core,
            device_index: settings.device_index,
            device: None,
            mode: settings.mode,
            pixel_format: settings.pixel_format,
            dual_stream_3d: settings.dual_stream_3d,
            input_enabled: false,
        };
        session.set_deinterlace(settings.deinterlace);
        session.set_deinterlace_method(settings.deinterlace_method);
        session
    }

    pub fn set_device_index(&mut self, index: usize) {
        self.device_index = index;
    }

    /// Choose the display mode used by the next `start`.
    pub fn select_mode(&mut self, mode: DisplayModeId) -> Result<()> {
        if self.is_streaming() {
            return Err(CaptureError::AlreadyStreaming);
        }
        self.mode = Some(mode);
        Ok(())
    }

    pub fn mode(&self) -> Option<DisplayModeId> {
        self.mode
    }

    /// Enable or disable deinterlacing. Takes effect from the next frame.
    pub fn set_deinterlace(&self, enabled: bool) {
        self.core.deinterlace.store(enabled, Ordering::Relaxed);
    }

    pub fn set_deinterlace_method(&self, method: DeinterlaceMethod) {
        self.core.buffered_deinterlace.store(
            method == DeinterlaceMethod::Buffered,
            Ordering::Relaxed,
        );
    }

    /// Request both eyes of a stereoscopic signal on the next `start`.
    pub fn set_dual_stream_3d(&mut self, enabled: bool) {
        self.dual_stream_3d = enabled;
    }

    /// Open the device and start streaming the selected mode.
    ///
    /// `width` and `height` are what the caller expects; the mode's own
    /// dimensions win when they differ. Any failure leaves the session closed.
    pub fn start(&mut self, width: u32, height: u32) -> Result<()> {
        if self.is_streaming() {
            return Err(CaptureError::AlreadyStreaming);
        }
        let result = self.try_start(width, height);
        if let Err(e) = &result {
            tracing::warn!("Capture start failed: {e}");
            self.close();
        }
        result
    }

    fn try_start(&mut self, width: u32, height: u32) -> Result<()> {
        let count = self.driver.device_count()?;
        if count == 0 {
            return Err(CaptureError::NoDevice);
        }
        if self.device_index >= count {
            return Err(CaptureError::DeviceNotFound(self.device_index));
        }
        let device = self.driver.open(self.device_index)?;
        self.device = Some(device);

        let mode_id = self.mode.ok_or(CaptureError::NoModeSelected)?;
        let mode = self
            .driver
            .display_modes(device)?
            .into_iter()
            .find(|m| m.id == mode_id)
            .ok_or_else(|| CaptureError::InvalidMode(mode_id.to_string()))?;
        if (width, height) != (mode.width, mode.height) {
            tracing::warn!(
                "Requested {width}x{height} but {} is {}x{}, using the mode size",
                mode_id.display_name(),
                mode.width,
                mode.height
            );
        }
        self.core.allocate(mode.width, mode.height);

        let support =
            self.driver
                .supports_mode(device, mode_id, self.pixel_format, InputFlags::default())?;
        if support == ModeSupport::NotSupported {
            return Err(CaptureError::UnsupportedMode {
                mode: mode_id.to_string(),
                pixel_format: self.pixel_format.to_string(),
            });
        }
        if self.pixel_format != PixelFormat::Yuv8Bit {
            return Err(CaptureError::UnsupportedPixelFormat(
                self.pixel_format.to_string(),
            ));
        }

        let flags = InputFlags {
            dual_stream_3d: self.dual_stream_3d,
        };
        if flags.dual_stream_3d {
            let stereo = self
                .driver
                .supports_mode(device, mode_id, self.pixel_format, flags)?;
            if !mode.supports_3d || stereo == ModeSupport::NotSupported {
                return Err(CaptureError::Unsupported3D(mode_id.to_string()));
            }
        }

        let callback: Arc<dyn InputCallback> = self.core.clone();
        self.driver.set_callback(device, Some(callback))?;

        self.driver
            .enable_video_input(device, mode_id, self.pixel_format, flags)
            .map_err(|e| {
                CaptureError::StreamStart(format!(
                    "could not enable video input ({e}), is another application using the card?"
                ))
            })?;
        self.input_enabled = true;

        self.core.frames_received.store(0, Ordering::Relaxed);
        self.core.stats.lock().reset();
        self.core.running.store(true, Ordering::Release);
        self.driver
            .start_streams(device)
            .map_err(|e| CaptureError::StreamStart(e.to_string()))?;

        tracing::info!(
            "Capturing {} ({}x{} @ {:.2} fps) from device {}",
            mode_id.display_name(),
            mode.width,
            mode.height,
            mode.frame_rate.fps(),
            self.device_index
        );
        Ok(())
    }

    /// Stop streaming. Buffers and the last frame are kept. Idempotent.
    ///
    /// Returns once no callback is executing.
    pub fn stop(&mut self) {
        let was_running = self.core.running.swap(false, Ordering::AcqRel);
        let Some(device) = self.device else {
            return;
        };
        if !was_running && !self.input_enabled {
            return;
        }

        if let Err(e) = self.driver.stop_streams(device) {
            tracing::warn!("Failed to stop streams: {e}");
        }
        if let Err(e) = self.driver.disable_video_input(device) {
            tracing::warn!("Failed to disable video input: {e}");
        }
        if let Err(e) = self.driver.set_callback(device, None) {
            tracing::warn!("Failed to clear capture callback: {e}");
        }
        // Wait out a callback that was already past the running check
        drop(self.core.producer.lock());
        self.input_enabled = false;

        tracing::info!("Capture stopped after {} frames", self.frames_received());
    }

    /// Stop, release the device and free both frame buffers.
    pub fn close(&mut self) {
        self.stop();
        if let Some(device) = self.device.take() {
            if let Err(e) = self.driver.set_callback(device, None) {
                tracing::debug!("Failed to clear capture callback on close: {e}");
            }
            self.driver.release(device);
        }
        self.core.release();
    }

    /// Consume the new-frame flag. Call once per consumer cycle.
    pub fn poll_once(&self) -> bool {
        self.core.frames.poll_once()
    }

    /// Whether the last `poll_once` saw a new frame.
    pub fn is_frame_new(&self) -> bool {
        self.core.frames.is_frame_new()
    }

    /// The most recent complete RGB frame. Drop the guard after reading.
    pub fn frame(&self) -> FrontFrame<'_> {
        self.core.frames.front()
    }

    /// `poll_once` and `frame` in one call.
    pub fn poll_frame(&self) -> (bool, FrontFrame<'_>) {
        self.core.frames.poll_and_acquire()
    }

    pub fn width(&self) -> u32 {
        self.core.frames.width()
    }

    pub fn height(&self) -> u32 {
        self.core.frames.height()
    }

    pub fn is_streaming(&self) -> bool {
        self.core.running.load(Ordering::Acquire)
    }

    /// Frames delivered by the driver since start, including dropped ones.
    pub fn frames_received(&self) -> u64 {
        self.core.frames_received.load(Ordering::Relaxed)
    }

    /// Take a snapshot of diagnostic stats for this session.
    pub fn diagnostics(&self) -> DiagnosticSnapshot {
        self.core.stats.lock().snapshot()
    }
}

impl Drop for CaptureSession {
    fn drop(&mut self) {
        self.close();
    }
}
