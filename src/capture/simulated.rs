//! Simulated capture card.
//!
//! Spawns a delivery thread per stream that generates 75% colour bars with a
//! moving white marker in packed 4:2:2 and hands them to the registered
//! callback at the selected mode's frame rate. Can also emit no-signal frames
//! and a one-off format change.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use parking_lot::Mutex;

use crate::capture::driver::{CaptureDriver, InputCallback};
use crate::capture::error::{CaptureError, Result};
use crate::capture::types::{
    DeviceHandle, DisplayMode, DisplayModeId, FormatChange, FrameFlags, InputFlags, InputFrame,
    ModeSupport, PixelFormat,
};

/// Environment variable that selects the simulated driver.
pub const SIMULATED_ENV: &str = "FRAMEGRAB_SIMULATED";

/// 75% colour bars as `(Y, U, V)`: white, yellow, cyan, green, magenta, red,
/// blue, black.
const BARS: [(u8, u8, u8); 8] = [
    (180, 128, 128),
    (162, 44, 142),
    (131, 156, 44),
    (112, 72, 58),
    (84, 184, 198),
    (65, 100, 212),
    (35, 212, 114),
    (16, 128, 128),
];

/// Marker luma and width in pixels.
const MARKER_Y: u8 = 235;
const MARKER_WIDTH: usize = 8;

/// Behaviour knobs for the generator thread.
#[derive(Debug, Clone, Copy, Default)]
struct Behaviour {
    /// Every n-th frame carries the no-input flag.
    no_signal_every: Option<u64>,
    /// Switch to this mode after the given number of frames.
    format_change: Option<(u64, DisplayModeId)>,
    /// Replaces the mode's frame interval.
    interval: Option<Duration>,
}

struct Stream {
    running: Arc<AtomicBool>,
    thread: JoinHandle<()>,
}

#[derive(Default)]
struct DeviceState {
    open: bool,
    input: Option<(DisplayMode, InputFlags)>,
    callback: Option<Arc<dyn InputCallback>>,
    stream: Option<Stream>,
}

/// Thread-driven test-pattern capture driver.
pub struct SimulatedDriver {
    device_count: usize,
    behaviour: Behaviour,
    devices: Mutex<Vec<DeviceState>>,
}

impl SimulatedDriver {
    /// One simulated card offering the full mode catalogue.
    pub fn new() -> Self {
        Self::with_devices(1)
    }

    pub fn with_devices(count: usize) -> Self {
        Self {
            device_count: count,
            behaviour: Behaviour::default(),
            devices: Mutex::new((0..count).map(|_| DeviceState::default()).collect()),
        }
    }

    /// Whether the simulated driver was requested via `FRAMEGRAB_SIMULATED`.
    pub fn is_enabled() -> bool {
        std::env::var(SIMULATED_ENV).is_ok_and(|v| v == "1" || v == "true")
    }

    /// Flag every `n`-th frame as having no input source.
    pub fn with_no_signal_every(mut self, n: u64) -> Self {
        self.behaviour.no_signal_every = (n > 0).then_some(n);
        self
    }

    /// Report a format change to `mode` after `frames` frames.
    pub fn with_format_change(mut self, frames: u64, mode: DisplayModeId) -> Self {
        self.behaviour.format_change = Some((frames, mode));
        self
    }

    /// Deliver frames at `interval` instead of the mode's frame rate.
    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.behaviour.interval = Some(interval);
        self
    }

    /// Whether `open` was called for the device and it has not been released.
    pub fn is_open(&self, device: usize) -> bool {
        self.devices.lock().get(device).is_some_and(|d| d.open)
    }

    fn check(&self, device: DeviceHandle) -> Result<()> {
        if device.0 >= self.device_count {
            return Err(CaptureError::DeviceNotFound(device.0));
        }
        Ok(())
    }
}

impl Default for SimulatedDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl CaptureDriver for SimulatedDriver {
    fn device_count(&self) -> Result<usize> {
        Ok(self.device_count)
    }

    fn open(&self, index: usize) -> Result<DeviceHandle> {
        let handle = DeviceHandle(index);
        self.check(handle)?;
        self.devices.lock()[index].open = true;
        Ok(handle)
    }

    fn display_modes(&self, device: DeviceHandle) -> Result<Vec<DisplayMode>> {
        self.check(device)?;
        Ok(DisplayModeId::ALL.iter().map(|m| m.descriptor()).collect())
    }

    fn supports_mode(
        &self,
        device: DeviceHandle,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        flags: InputFlags,
    ) -> Result<ModeSupport> {
        self.check(device)?;
        if flags.dual_stream_3d && !mode.descriptor().supports_3d {
            return Ok(ModeSupport::NotSupported);
        }
        Ok(match pixel_format {
            PixelFormat::Yuv8Bit | PixelFormat::Yuv10Bit => ModeSupport::Supported,
            PixelFormat::Argb8Bit | PixelFormat::Bgra8Bit => ModeSupport::SupportedWithConversion,
            PixelFormat::Rgb10Bit => ModeSupport::NotSupported,
        })
    }

    fn set_callback(
        &self,
        device: DeviceHandle,
        callback: Option<Arc<dyn InputCallback>>,
    ) -> Result<()> {
        self.check(device)?;
        self.devices.lock()[device.0].callback = callback;
        Ok(())
    }

    fn enable_video_input(
        &self,
        device: DeviceHandle,
        mode: DisplayModeId,
        pixel_format: PixelFormat,
        flags: InputFlags,
    ) -> Result<()> {
        self.check(device)?;
        if pixel_format != PixelFormat::Yuv8Bit {
            return Err(CaptureError::Driver(format!(
                "simulated card only generates {}",
                PixelFormat::Yuv8Bit
            )));
        }
        let mut devices = self.devices.lock();
        let dev = &mut devices[device.0];
        if dev.input.is_some() {
            return Err(CaptureError::Driver("video input already enabled".to_string()));
        }
        dev.input = Some((mode.descriptor(), flags));
        Ok(())
    }

    fn disable_video_input(&self, device: DeviceHandle) -> Result<()> {
        self.check(device)?;
        self.devices.lock()[device.0].input = None;
        Ok(())
    }

    fn start_streams(&self, device: DeviceHandle) -> Result<()> {
        self.check(device)?;
        let mut devices = self.devices.lock();
        let dev = &mut devices[device.0];
        if dev.stream.is_some() {
            return Err(CaptureError::Driver("streams already running".to_string()));
        }
        let Some((mode, flags)) = dev.input else {
            return Err(CaptureError::Driver("video input not enabled".to_string()));
        };
        let callback = dev.callback.clone();
        let behaviour = self.behaviour;

        let running = Arc::new(AtomicBool::new(true));
        let running_clone = Arc::clone(&running);
        let thread = std::thread::Builder::new()
            .name(format!("sim-capture-{}", device.0))
            .spawn(move || {
                generate_frames(mode, flags, behaviour, callback, &running_clone);
            })
            .map_err(|e| CaptureError::Driver(format!("failed to spawn capture thread: {e}")))?;

        dev.stream = Some(Stream { running, thread });
        tracing::debug!("Simulated device {} streaming {}", device.0, mode.id);
        Ok(())
    }

    fn stop_streams(&self, device: DeviceHandle) -> Result<()> {
        self.check(device)?;
        // Take the stream out first: the thread may be inside a callback
        // that must not wait on this lock.
        let stream = self.devices.lock()[device.0].stream.take();
        if let Some(stream) = stream {
            stream.running.store(false, Ordering::Relaxed);
            if stream.thread.join().is_err() {
                tracing::warn!("Simulated capture thread {} panicked", device.0);
            }
        }
        Ok(())
    }

    fn release(&self, device: DeviceHandle) {
        if self.check(device).is_err() {
            return;
        }
        let _ = self.stop_streams(device);
        let mut devices = self.devices.lock();
        let dev = &mut devices[device.0];
        dev.open = false;
        dev.input = None;
        dev.callback = None;
    }
}

/// Fill `buf` with colour bars for a `width` x `height` packed 4:2:2 frame.
pub fn colour_bars(buf: &mut [u8], width: usize, height: usize) {
    let stride = width * 2;
    if stride == 0 {
        return;
    }
    let bar_width = width.div_ceil(BARS.len()).max(1);
    for row in buf[..stride * height].chunks_exact_mut(stride) {
        for (i, pair) in row.chunks_mut(4).enumerate() {
            let (y, u, v) = BARS[((i * 2) / bar_width).min(BARS.len() - 1)];
            let group = [u, y, v, y];
            pair.copy_from_slice(&group[..pair.len()]);
        }
    }
}

/// Paint the white marker at column `x` (rounded down to an even pixel).
fn paint_marker(buf: &mut [u8], width: usize, height: usize, x: usize) {
    let stride = width * 2;
    let start = (x & !1) * 2;
    let end = (start + MARKER_WIDTH * 2).min(stride);
    for row in buf[..stride * height].chunks_exact_mut(stride) {
        for group in row[start..end].chunks_mut(4) {
            let marker = [128, MARKER_Y, 128, MARKER_Y];
            group.copy_from_slice(&marker[..group.len()]);
        }
    }
}

/// Black filler the card sends while no input is connected.
fn black_frame(len: usize) -> Vec<u8> {
    let mut buf = vec![0u8; len];
    for group in buf.chunks_mut(4) {
        let black = [128, 16, 128, 16];
        group.copy_from_slice(&black[..group.len()]);
    }
    buf
}

/// `HH:MM:SS:FF` for frame `n` at `fps`.
fn timecode(n: u64, fps: f64) -> String {
    let fps = fps.round().max(1.0) as u64;
    let frames = n % fps;
    let secs = n / fps;
    format!(
        "{:02}:{:02}:{:02}:{:02}",
        secs / 3600 % 24,
        secs / 60 % 60,
        secs % 60,
        frames
    )
}

/// Generator loop that runs on the delivery thread.
fn generate_frames(
    mut mode: DisplayMode,
    flags: InputFlags,
    behaviour: Behaviour,
    callback: Option<Arc<dyn InputCallback>>,
    running: &AtomicBool,
) {
    let mut base = vec![0u8; mode.uyvy_len()];
    colour_bars(&mut base, mode.width as usize, mode.height as usize);
    let mut frame = base.clone();
    let mut blank = black_frame(mode.uyvy_len());
    let mut n: u64 = 0;

    while running.load(Ordering::Relaxed) {
        if let Some((after, next)) = behaviour.format_change {
            if n == after && next != mode.id {
                mode = next.descriptor();
                base = vec![0u8; mode.uyvy_len()];
                colour_bars(&mut base, mode.width as usize, mode.height as usize);
                frame = base.clone();
                blank = black_frame(mode.uyvy_len());
                if let Some(cb) = &callback {
                    cb.format_changed(FormatChange::from(mode));
                }
            }
        }

        let (width, height) = (mode.width as usize, mode.height as usize);
        let no_signal = behaviour
            .no_signal_every
            .is_some_and(|every| (n + 1) % every == 0);
        let tc = timecode(n, mode.frame_rate.fps());

        if let Some(cb) = &callback {
            if no_signal {
                let input = InputFrame::new(&blank, mode.width, mode.height).with_flags(FrameFlags {
                    no_input_source: true,
                });
                cb.frame_arrived(&input.with_timecode(&tc));
            } else {
                frame.copy_from_slice(&base);
                let x = (n as usize * 4) % width.max(1);
                paint_marker(&mut frame, width, height, x);
                let mut input = InputFrame::new(&frame, mode.width, mode.height).with_timecode(&tc);
                if flags.dual_stream_3d {
                    input = input.with_right_eye(&frame);
                }
                cb.frame_arrived(&input);
            }
        }

        n += 1;
        std::thread::sleep(
            behaviour
                .interval
                .unwrap_or_else(|| mode.frame_rate.frame_interval()),
        );
    }
}
