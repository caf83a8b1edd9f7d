use crate::convert::tables::{LookupTables, TableLayout};

/// Bytes per packed macropixel: `[U, Y0, V, Y1]`.
pub const MACROPIXEL_BYTES: usize = 4;
/// RGB bytes produced per macropixel.
pub const MACROPIXEL_RGB_BYTES: usize = 6;

/// Table-driven UYVY to RGB24 converter.
///
/// Tables are built once in `new` and only read afterwards, so a converter
/// can be shared across threads without locking.
pub struct Converter {
    tables: LookupTables,
}

impl Converter {
    pub fn new(layout: TableLayout) -> Self {
        Self {
            tables: LookupTables::build(layout),
        }
    }

    pub fn tables(&self) -> &LookupTables {
        &self.tables
    }

    /// Convert packed `[U, Y0, V, Y1]` macropixels into interleaved RGB.
    ///
    /// Writes exactly `uyvy.len() / 2 * 3` bytes at the start of `rgb`.
    ///
    /// # Panics
    ///
    /// If `uyvy.len()` is not a multiple of 4 or `rgb` is too short. Both are
    /// caller bugs; the hot path does not recover from them.
    pub fn convert(&self, uyvy: &[u8], rgb: &mut [u8]) {
        assert!(
            uyvy.len() % MACROPIXEL_BYTES == 0,
            "UYVY source length {} is not a multiple of {MACROPIXEL_BYTES}",
            uyvy.len()
        );
        let needed = uyvy.len() / MACROPIXEL_BYTES * MACROPIXEL_RGB_BYTES;
        assert!(
            rgb.len() >= needed,
            "RGB destination holds {} bytes, {needed} required",
            rgb.len()
        );

        let t = &self.tables;
        for (src, dst) in uyvy
            .chunks_exact(MACROPIXEL_BYTES)
            .zip(rgb[..needed].chunks_exact_mut(MACROPIXEL_RGB_BYTES))
        {
            let (u, y0, v, y1) = (src[0], src[1], src[2], src[3]);

            dst[0] = t.red(y0, v);
            dst[1] = t.green(y0, u, v);
            dst[2] = t.blue(y0, u);

            dst[3] = t.red(y1, v);
            dst[4] = t.green(y1, u, v);
            dst[5] = t.blue(y1, u);
        }
    }

    /// Convert one `width` x `height` frame.
    ///
    /// Reads exactly `width * height * 2` bytes and writes exactly
    /// `width * height * 3`. When the pixel count is odd the trailing half
    /// macropixel `[U, Y]` has no V sample and is converted with neutral V.
    ///
    /// # Panics
    ///
    /// If either buffer is shorter than the frame requires.
    pub fn convert_frame(&self, uyvy: &[u8], width: usize, height: usize, rgb: &mut [u8]) {
        let pixels = width * height;
        let src_len = pixels * 2;
        let dst_len = pixels * 3;
        assert!(
            uyvy.len() >= src_len,
            "UYVY source holds {} bytes, {width}x{height} needs {src_len}",
            uyvy.len()
        );
        assert!(
            rgb.len() >= dst_len,
            "RGB destination holds {} bytes, {width}x{height} needs {dst_len}",
            rgb.len()
        );

        let whole = src_len / MACROPIXEL_BYTES * MACROPIXEL_BYTES;
        let converted = whole / 2 * 3;
        self.convert(&uyvy[..whole], &mut rgb[..converted]);

        if whole < src_len {
            let (u, y) = (uyvy[whole], uyvy[whole + 1]);
            let dst = &mut rgb[converted..dst_len];
            dst[0] = self.tables.red(y, 128);
            dst[1] = self.tables.green(y, u, 128);
            dst[2] = self.tables.blue(y, u);
        }
    }
}
