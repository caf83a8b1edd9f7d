//! Line-blend deinterlacing of RGB24 frames.

use serde::{Deserialize, Serialize};

/// How interior rows are reconstructed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeinterlaceMethod {
    /// In place, top to bottom. Rows read later may already have been
    /// rewritten by earlier iterations; output is bit-compatible with
    /// existing captures.
    #[default]
    LineBlend,
    /// Every row computed from the untouched source frame. Needs a scratch
    /// buffer of the frame's size.
    Buffered,
}

#[inline]
fn blend(dst: &mut [u8], above: &[u8], below: &[u8]) {
    for ((out, &a), &b) in dst.iter_mut().zip(above).zip(below) {
        *out = ((u16::from(a) + u16::from(b) + 1) / 2) as u8;
    }
}

/// Deinterlace `buf` in place.
///
/// Rows 0 and `height - 1` are left untouched. For every interior row `i`,
/// processed in ascending order: even rows become a copy of row `i + 1`, odd
/// rows the rounded average of rows `i - 1` and `i + 1`, each read as it is at
/// that point of the pass.
///
/// # Panics
///
/// If `buf` is shorter than `width * height * 3`.
pub fn deinterlace(buf: &mut [u8], width: usize, height: usize) {
    let stride = width * 3;
    assert!(
        buf.len() >= stride * height,
        "RGB buffer holds {} bytes, {width}x{height} needs {}",
        buf.len(),
        stride * height
    );
    if height < 3 || stride == 0 {
        return;
    }

    for i in 1..height - 1 {
        let (head, tail) = buf.split_at_mut(i * stride);
        let above = &head[(i - 1) * stride..];
        let (row, rest) = tail.split_at_mut(stride);
        let below = &rest[..stride];

        if i % 2 == 0 {
            row.copy_from_slice(below);
        } else {
            blend(row, above, below);
        }
    }
}

/// Deinterlace `src` into `dst` using only pristine source rows.
///
/// Same row policy as [`deinterlace`], but every row reads the original
/// neighbours. Boundary rows are copied through.
///
/// # Panics
///
/// If either buffer is shorter than `width * height * 3`.
pub fn deinterlace_buffered(src: &[u8], dst: &mut [u8], width: usize, height: usize) {
    let stride = width * 3;
    let len = stride * height;
    assert!(
        src.len() >= len && dst.len() >= len,
        "deinterlace buffers hold {} and {} bytes, {width}x{height} needs {len}",
        src.len(),
        dst.len()
    );
    if stride == 0 {
        return;
    }

    for (i, row) in dst[..len].chunks_exact_mut(stride).enumerate() {
        let own = &src[i * stride..(i + 1) * stride];
        if i == 0 || i + 1 == height {
            row.copy_from_slice(own);
            continue;
        }
        let below = &src[(i + 1) * stride..(i + 2) * stride];
        if i % 2 == 0 {
            row.copy_from_slice(below);
        } else {
            let above = &src[(i - 1) * stride..i * stride];
            blend(row, above, below);
        }
    }
}
