//! Dynamic equal-width bins for the social-mention heatmap.
//!
//! The scale adapts to the data: the largest count is split into five
//! buckets whose width is rounded up to a multiple of ten, so the legend
//! reads `0-10, 11-20, …` rather than `0-7.4, 7.5-14.8, …`. The last bucket
//! is open-ended.

use crate::config::Color;

/// Number of heatmap bins.
pub const BIN_COUNT: usize = 5;

/// Heatmap palette, ordered from low to high intensity.
pub const HEATMAP_PALETTE: [Color; BIN_COUNT] = [
    Color::rgb(0xE8, 0xF5, 0xE9),
    Color::rgb(0xA5, 0xD6, 0xA7),
    Color::rgb(0x66, 0xBB, 0x6A),
    Color::rgb(0x2E, 0x7D, 0x32),
    Color::rgb(0x1B, 0x5E, 0x20),
];

/// One contiguous value range with its colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Bin {
    pub min: u64,
    /// Inclusive upper bound; `None` for the unbounded last bin.
    pub max: Option<u64>,
    pub color: Color,
}

impl Bin {
    pub fn contains(&self, value: u64) -> bool {
        value >= self.min && self.max.is_none_or(|max| value <= max)
    }

    /// Legend label, e.g. `11-20` or `41+`.
    pub fn label(&self) -> String {
        match self.max {
            Some(max) => format!("{}-{}", self.min, max),
            None => format!("{}+", self.min),
        }
    }
}

/// Compute the five heatmap bins for a set of mention counts.
pub fn compute_bins(values: &[u64]) -> [Bin; BIN_COUNT] {
    let max_value = values.iter().copied().max().unwrap_or(1).max(1);
    let bin_size = max_value.div_ceil(BIN_COUNT as u64);
    let step = match bin_size.div_ceil(10) * 10 {
        0 => 10,
        s => s,
    };

    std::array::from_fn(|i| {
        let i = i as u64;
        let min = if i == 0 { 0 } else { i * step + 1 };
        let max = if (i as usize) < BIN_COUNT - 1 {
            Some((i + 1) * step)
        } else {
            None
        };
        Bin {
            min,
            max,
            color: HEATMAP_PALETTE[i as usize],
        }
    })
}

/// Index of the bin holding `value`.
///
/// Lookup follows `value >= min && (is_last || value <= max)`; every
/// non-negative integer lands in exactly one bin, so this never falls
/// through for bins built by [`compute_bins`].
pub fn bin_index(bins: &[Bin; BIN_COUNT], value: u64) -> usize {
    bins.iter()
        .position(|b| b.contains(value))
        .unwrap_or(BIN_COUNT - 1)
}
