use serde::{Deserialize, Serialize};
use std::fmt;

/// Opaque device handle used across the driver boundary.
///
/// For a hardware driver this is the index of the opened card; mocks use it
/// as an index into their internal device list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeviceHandle(pub usize);

/// Identifies a capture display mode from the fixed catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayModeId {
    // SD modes
    Ntsc,
    Ntsc2398,
    Pal,
    NtscP,
    PalP,
    // HD 1080 modes
    Hd1080p2398,
    Hd1080p24,
    Hd1080p25,
    Hd1080p2997,
    Hd1080p30,
    Hd1080i50,
    Hd1080i5994,
    Hd1080i6000,
    // HD 720 modes
    Hd720p50,
    Hd720p5994,
    Hd720p60,
}

impl DisplayModeId {
    /// Every mode in the catalogue, SD first.
    pub const ALL: [DisplayModeId; 16] = [
        Self::Ntsc,
        Self::Ntsc2398,
        Self::Pal,
        Self::NtscP,
        Self::PalP,
        Self::Hd1080p2398,
        Self::Hd1080p24,
        Self::Hd1080p25,
        Self::Hd1080p2997,
        Self::Hd1080p30,
        Self::Hd1080i50,
        Self::Hd1080i5994,
        Self::Hd1080i6000,
        Self::Hd720p50,
        Self::Hd720p5994,
        Self::Hd720p60,
    ];

    /// Snake-case identifier, identical to the serde representation.
    pub fn as_id_str(self) -> &'static str {
        match self {
            Self::Ntsc => "ntsc",
            Self::Ntsc2398 => "ntsc2398",
            Self::Pal => "pal",
            Self::NtscP => "ntsc_p",
            Self::PalP => "pal_p",
            Self::Hd1080p2398 => "hd1080p2398",
            Self::Hd1080p24 => "hd1080p24",
            Self::Hd1080p25 => "hd1080p25",
            Self::Hd1080p2997 => "hd1080p2997",
            Self::Hd1080p30 => "hd1080p30",
            Self::Hd1080i50 => "hd1080i50",
            Self::Hd1080i5994 => "hd1080i5994",
            Self::Hd1080i6000 => "hd1080i6000",
            Self::Hd720p50 => "hd720p50",
            Self::Hd720p5994 => "hd720p5994",
            Self::Hd720p60 => "hd720p60",
        }
    }

    /// Parse a snake-case identifier.
    ///
    /// Returns `None` if the string does not match any known mode.
    pub fn from_str_id(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|m| m.as_id_str() == s)
    }

    /// Human-readable name as printed by capture utilities.
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Ntsc => "NTSC",
            Self::Ntsc2398 => "NTSC 23.98",
            Self::Pal => "PAL",
            Self::NtscP => "NTSC Progressive",
            Self::PalP => "PAL Progressive",
            Self::Hd1080p2398 => "1080p23.98",
            Self::Hd1080p24 => "1080p24",
            Self::Hd1080p25 => "1080p25",
            Self::Hd1080p2997 => "1080p29.97",
            Self::Hd1080p30 => "1080p30",
            Self::Hd1080i50 => "1080i50",
            Self::Hd1080i5994 => "1080i59.94",
            Self::Hd1080i6000 => "1080i60",
            Self::Hd720p50 => "720p50",
            Self::Hd720p5994 => "720p59.94",
            Self::Hd720p60 => "720p60",
        }
    }

    /// Full descriptor for this mode.
    pub fn descriptor(self) -> DisplayMode {
        use FieldDominance::{Interlaced, Progressive};

        let (width, height, duration, scale, field_dominance) = match self {
            Self::Ntsc => (720, 486, 1001, 30000, Interlaced),
            Self::Ntsc2398 => (720, 486, 1001, 24000, Interlaced),
            Self::Pal => (720, 576, 1000, 25000, Interlaced),
            Self::NtscP => (720, 486, 1001, 60000, Progressive),
            Self::PalP => (720, 576, 1000, 50000, Progressive),
            Self::Hd1080p2398 => (1920, 1080, 1001, 24000, Progressive),
            Self::Hd1080p24 => (1920, 1080, 1000, 24000, Progressive),
            Self::Hd1080p25 => (1920, 1080, 1000, 25000, Progressive),
            Self::Hd1080p2997 => (1920, 1080, 1001, 30000, Progressive),
            Self::Hd1080p30 => (1920, 1080, 1000, 30000, Progressive),
            Self::Hd1080i50 => (1920, 1080, 1000, 25000, Interlaced),
            Self::Hd1080i5994 => (1920, 1080, 1001, 30000, Interlaced),
            Self::Hd1080i6000 => (1920, 1080, 1000, 30000, Interlaced),
            Self::Hd720p50 => (1280, 720, 1000, 50000, Progressive),
            Self::Hd720p5994 => (1280, 720, 1001, 60000, Progressive),
            Self::Hd720p60 => (1280, 720, 1000, 60000, Progressive),
        };

        DisplayMode {
            id: self,
            width,
            height,
            frame_rate: FrameRate { duration, scale },
            field_dominance,
            supports_3d: width >= 1280,
        }
    }
}

impl fmt::Display for DisplayModeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_id_str())
    }
}

/// Frame rate expressed the way capture drivers report it: `scale / duration`
/// frames per second.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRate {
    pub duration: i64,
    pub scale: i64,
}

impl FrameRate {
    pub fn fps(&self) -> f64 {
        if self.duration == 0 {
            return 0.0;
        }
        self.scale as f64 / self.duration as f64
    }

    /// Time between two frames.
    pub fn frame_interval(&self) -> std::time::Duration {
        if self.scale <= 0 || self.duration <= 0 {
            return std::time::Duration::ZERO;
        }
        let nanos = (self.duration as u128 * 1_000_000_000) / self.scale as u128;
        std::time::Duration::from_nanos(nanos as u64)
    }
}

impl fmt::Display for FrameRate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scale, self.duration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldDominance {
    Progressive,
    Interlaced,
}

/// Video mode descriptor reported by the driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DisplayMode {
    pub id: DisplayModeId,
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    pub field_dominance: FieldDominance,
    pub supports_3d: bool,
}

impl DisplayMode {
    /// Size in bytes of one packed 4:2:2 frame in this mode.
    pub fn uyvy_len(&self) -> usize {
        self.width as usize * self.height as usize * 2
    }

    /// Size in bytes of one converted RGB frame in this mode.
    pub fn rgb_len(&self) -> usize {
        self.width as usize * self.height as usize * 3
    }
}

/// Pixel formats a capture card can deliver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    /// 8-bit 4:2:2 packed as `[U, Y0, V, Y1]`.
    #[default]
    Yuv8Bit,
    Yuv10Bit,
    Argb8Bit,
    Bgra8Bit,
    Rgb10Bit,
}

impl PixelFormat {
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Yuv8Bit => "8-bit YUV",
            Self::Yuv10Bit => "10-bit YUV",
            Self::Argb8Bit => "8-bit ARGB",
            Self::Bgra8Bit => "8-bit BGRA",
            Self::Rgb10Bit => "10-bit RGB",
        }
    }
}

impl fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.display_name())
    }
}

/// Driver answer to a mode/pixel-format support query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeSupport {
    Supported,
    SupportedWithConversion,
    NotSupported,
}

/// Flags passed when enabling video input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InputFlags {
    /// Capture both eyes of a stereoscopic stream.
    pub dual_stream_3d: bool,
}

/// Per-frame flags set by the driver.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FrameFlags {
    /// The card is receiving no input signal; the payload is filler.
    pub no_input_source: bool,
}

/// Format-change notification payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatChange {
    pub width: u32,
    pub height: u32,
    pub frame_rate: FrameRate,
    /// Catalogue mode matching the detected signal, when known.
    pub mode: Option<DisplayModeId>,
}

impl From<DisplayMode> for FormatChange {
    fn from(mode: DisplayMode) -> Self {
        Self {
            width: mode.width,
            height: mode.height,
            frame_rate: mode.frame_rate,
            mode: Some(mode.id),
        }
    }
}

/// A captured frame as handed to the callback.
///
/// Borrows driver-owned memory: it is only valid for the duration of the
/// `frame_arrived` call and must not be retained.
#[derive(Debug, Clone, Copy)]
pub struct InputFrame<'a> {
    pub bytes: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub row_bytes: u32,
    pub flags: FrameFlags,
    /// Right-eye payload for stereoscopic streams.
    pub right_eye: Option<&'a [u8]>,
    pub timecode: Option<&'a str>,
}

impl<'a> InputFrame<'a> {
    /// Packed 4:2:2 frame with tightly packed rows.
    pub fn new(bytes: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            bytes,
            width,
            height,
            row_bytes: width * 2,
            flags: FrameFlags::default(),
            right_eye: None,
            timecode: None,
        }
    }

    pub fn with_flags(mut self, flags: FrameFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_right_eye(mut self, right_eye: &'a [u8]) -> Self {
        self.right_eye = Some(right_eye);
        self
    }

    pub fn with_timecode(mut self, timecode: &'a str) -> Self {
        self.timecode = Some(timecode);
        self
    }

    /// Bytes the driver reports for the whole frame.
    pub fn reported_len(&self) -> usize {
        self.row_bytes as usize * self.height as usize
    }
}
