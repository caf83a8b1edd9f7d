use serde::{Deserialize, Serialize};

use crate::capture::types::{DisplayModeId, PixelFormat};
use crate::convert::{DeinterlaceMethod, TableLayout};

/// Grabber configuration as persisted to disk.
///
/// Every field has a default so partial files written by older versions still
/// load.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct GrabberSettings {
    /// Index of the capture card to open.
    pub device_index: usize,
    /// Mode to capture; `None` until one is chosen.
    pub mode: Option<DisplayModeId>,
    pub pixel_format: PixelFormat,
    pub deinterlace: bool,
    pub deinterlace_method: DeinterlaceMethod,
    pub dual_stream_3d: bool,
    pub table_layout: TableLayout,
    pub verbose: bool,
}
