//! YUV to RGB lookup tables.
//!
//! Tables cover every byte value 0-255 of Y, U and V, not just the legal
//! studio range. Red and blue are two-dimensional; green depends on both
//! chroma samples and is either a full 256x256x256 table or a 256x256
//! chroma term combined with luma at lookup time.

use serde::{Deserialize, Serialize};

const RED_V: i32 = 359;
const BLUE_U: i32 = 454;
const GREEN_U: i32 = 88;
const GREEN_V: i32 = 183;

#[inline]
fn clamp(value: i32) -> u8 {
    value.clamp(0, 255) as u8
}

#[inline]
fn green_chroma(u: u8, v: u8) -> i32 {
    (i32::from(u) - 128) * GREEN_U + (i32::from(v) - 128) * GREEN_V
}

/// `clamp((Y*256 + (V-128)*359) >> 8)`
#[inline]
pub fn red_value(y: u8, v: u8) -> u8 {
    clamp(((i32::from(y) << 8) + (i32::from(v) - 128) * RED_V) >> 8)
}

/// `clamp((Y*256 - ((U-128)*88 + (V-128)*183)) >> 8)`
#[inline]
pub fn green_value(y: u8, u: u8, v: u8) -> u8 {
    clamp(((i32::from(y) << 8) - green_chroma(u, v)) >> 8)
}

/// `clamp((Y*256 + (U-128)*454) >> 8)`
#[inline]
pub fn blue_value(y: u8, u: u8) -> u8 {
    clamp(((i32::from(y) << 8) + (i32::from(u) - 128) * BLUE_U) >> 8)
}

/// Closed-form conversion of a single sample triplet.
pub fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    [red_value(y, v), green_value(y, u, v), blue_value(y, u)]
}

/// Storage layout for the green table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableLayout {
    /// 16 MiB table indexed by `[y][u][v]`.
    #[default]
    Full,
    /// 256 KiB chroma term plus one add, shift and clamp per lookup.
    Compact,
}

enum GreenTable {
    Full(Box<[u8]>),
    Compact(Box<[[i32; 256]]>),
}

/// Precomputed conversion tables. Immutable once built.
pub struct LookupTables {
    red: Box<[[u8; 256]]>,
    blue: Box<[[u8; 256]]>,
    green: GreenTable,
}

impl LookupTables {
    /// Build all three tables.
    pub fn build(layout: TableLayout) -> Self {
        let mut red = vec![[0u8; 256]; 256].into_boxed_slice();
        let mut blue = vec![[0u8; 256]; 256].into_boxed_slice();
        for (y, (red_row, blue_row)) in red.iter_mut().zip(blue.iter_mut()).enumerate() {
            let y = y as u8;
            for (c, (r, b)) in red_row.iter_mut().zip(blue_row.iter_mut()).enumerate() {
                *r = red_value(y, c as u8);
                *b = blue_value(y, c as u8);
            }
        }

        let green = match layout {
            TableLayout::Full => {
                let mut table = vec![0u8; 1 << 24].into_boxed_slice();
                for (i, entry) in table.iter_mut().enumerate() {
                    *entry = green_value((i >> 16) as u8, (i >> 8) as u8, i as u8);
                }
                GreenTable::Full(table)
            }
            TableLayout::Compact => {
                let mut table = vec![[0i32; 256]; 256].into_boxed_slice();
                for (u, row) in table.iter_mut().enumerate() {
                    for (v, entry) in row.iter_mut().enumerate() {
                        *entry = green_chroma(u as u8, v as u8);
                    }
                }
                GreenTable::Compact(table)
            }
        };

        Self { red, blue, green }
    }

    pub fn layout(&self) -> TableLayout {
        match self.green {
            GreenTable::Full(_) => TableLayout::Full,
            GreenTable::Compact(_) => TableLayout::Compact,
        }
    }

    #[inline]
    pub fn red(&self, y: u8, v: u8) -> u8 {
        self.red[usize::from(y)][usize::from(v)]
    }

    #[inline]
    pub fn blue(&self, y: u8, u: u8) -> u8 {
        self.blue[usize::from(y)][usize::from(u)]
    }

    #[inline]
    pub fn green(&self, y: u8, u: u8, v: u8) -> u8 {
        match &self.green {
            GreenTable::Full(table) => {
                table[(usize::from(y) << 16) | (usize::from(u) << 8) | usize::from(v)]
            }
            GreenTable::Compact(chroma) => {
                clamp(((i32::from(y) << 8) - chroma[usize::from(u)][usize::from(v)]) >> 8)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn neutral_chroma_is_grey() {
        for y in [0u8, 16, 128, 235, 255] {
            assert_eq!(yuv_to_rgb(y, 128, 128), [y, y, y]);
        }
    }

    #[test]
    fn formula_clamps_both_ends() {
        // Saturated red: Y=255, V=255 overflows, V=0 underflows
        assert_eq!(red_value(255, 255), 255);
        assert_eq!(red_value(0, 0), 0);
        assert_eq!(blue_value(255, 255), 255);
        assert_eq!(blue_value(0, 0), 0);
        assert_eq!(green_value(0, 255, 255), 0);
        assert_eq!(green_value(255, 0, 0), 255);
    }

    #[test]
    fn formula_uses_arithmetic_shift() {
        // (100*256 + (120-128)*359) >> 8 = (25600 - 2872) >> 8 = 22728 >> 8 = 88
        assert_eq!(red_value(100, 120), 88);
        // (50*256 + (100-128)*454) >> 8 = (12800 - 12712) >> 8 = 0
        assert_eq!(blue_value(50, 100), 0);
        // (10*256 + (90-128)*454) >> 8 = -14692 >> 8 = -58 -> clamped 0
        assert_eq!(blue_value(10, 90), 0);
        // (128*256 - ((140-128)*88 + (100-128)*183)) >> 8 = (32768 - (1056 - 5124)) >> 8
        //   = 36836 >> 8 = 143
        assert_eq!(green_value(128, 140, 100), 143);
    }

    #[test]
    fn red_and_blue_tables_match_formula() {
        let tables = LookupTables::build(TableLayout::Compact);
        for y in 0..=255u8 {
            for c in 0..=255u8 {
                assert_eq!(tables.red(y, c), red_value(y, c), "red[{y}][{c}]");
                assert_eq!(tables.blue(y, c), blue_value(y, c), "blue[{y}][{c}]");
            }
        }
    }

    #[test]
    fn full_and_compact_green_agree() {
        let full = LookupTables::build(TableLayout::Full);
        let compact = LookupTables::build(TableLayout::Compact);
        assert_eq!(full.layout(), TableLayout::Full);
        assert_eq!(compact.layout(), TableLayout::Compact);
        for y in 0..=255u8 {
            for u in 0..=255u8 {
                for v in 0..=255u8 {
                    let expected = green_value(y, u, v);
                    assert_eq!(full.green(y, u, v), expected);
                    assert_eq!(compact.green(y, u, v), expected);
                }
            }
        }
    }

    #[test]
    fn layout_serialises_snake_case() {
        assert_eq!(
            serde_json::to_value(TableLayout::Compact).unwrap(),
            "compact"
        );
        assert_eq!(TableLayout::default(), TableLayout::Full);
    }
}
