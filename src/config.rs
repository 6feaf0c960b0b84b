// Heatshrink tuning knobs and the configuration grid.
//
// A configuration is a pair of exponents: the sliding-window size is
// 2^window_exp bytes and the lookahead is 2^lookahead_exp bytes. The
// device decoder needs 2^window_exp bytes of RAM, so the search grid is
// capped by a board-specific ceiling.

use std::fmt;

use crate::error::{Error, Result};

// ---------------------------------------------------------------------------
// Constants (matching the heatshrink / benchmark defaults)
// ---------------------------------------------------------------------------

/// Smallest lookahead exponent the codec accepts.
pub const MIN_LOOKAHEAD_EXP: u8 = 3;
/// Smallest window exponent (`MIN_LOOKAHEAD_EXP + 1`).
pub const MIN_WINDOW_EXP: u8 = MIN_LOOKAHEAD_EXP + 1;
/// Default RAM-derived ceiling for the window exponent.
pub const DEFAULT_MAX_WINDOW_EXP: u8 = 15;
/// Number of ranked results shown in reporting mode.
pub const TOP_RESULTS: usize = 5;

// ---------------------------------------------------------------------------
// CompressionConfig
// ---------------------------------------------------------------------------

/// A `(window_exp, lookahead_exp)` pair.
///
/// Fields are public so that a configuration read from an untrusted patch
/// header can be represented as-is; call [`validate`](Self::validate)
/// before handing one to a codec.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CompressionConfig {
    pub window_exp: u8,
    pub lookahead_exp: u8,
}

impl CompressionConfig {
    pub const fn new(window_exp: u8, lookahead_exp: u8) -> Self {
        Self {
            window_exp,
            lookahead_exp,
        }
    }

    /// Check `lookahead_exp >= MIN_LOOKAHEAD_EXP` and `lookahead_exp < window_exp`.
    pub fn validate(&self) -> Result<()> {
        if self.lookahead_exp < MIN_LOOKAHEAD_EXP {
            return Err(Error::InvalidConfig(format!(
                "lookahead_exp {} is below the minimum {MIN_LOOKAHEAD_EXP}",
                self.lookahead_exp
            )));
        }
        if self.lookahead_exp >= self.window_exp {
            return Err(Error::InvalidConfig(format!(
                "lookahead_exp {} must be smaller than window_exp {}",
                self.lookahead_exp, self.window_exp
            )));
        }
        Ok(())
    }

    /// [`validate`](Self::validate) plus `window_exp <= max_window_exp`.
    pub fn validate_ceiling(&self, max_window_exp: u8) -> Result<()> {
        self.validate()?;
        if self.window_exp > max_window_exp {
            return Err(Error::InvalidConfig(format!(
                "window_exp {} exceeds the board ceiling {max_window_exp}",
                self.window_exp
            )));
        }
        Ok(())
    }

    /// Window size in bytes (`2^window_exp`), saturating for absurd exponents.
    pub fn window_size(&self) -> usize {
        1usize.checked_shl(self.window_exp as u32).unwrap_or(usize::MAX)
    }

    /// Lookahead size in bytes (`2^lookahead_exp`).
    pub fn lookahead_size(&self) -> usize {
        1usize
            .checked_shl(self.lookahead_exp as u32)
            .unwrap_or(usize::MAX)
    }
}

impl fmt::Display for CompressionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "window_exp={} lookahead_exp={}",
            self.window_exp, self.lookahead_exp
        )
    }
}

// ---------------------------------------------------------------------------
// Grid enumeration
// ---------------------------------------------------------------------------

/// Every valid configuration up to `max_window_exp`, smaller window first,
/// then smaller lookahead.
pub fn grid(max_window_exp: u8) -> impl Iterator<Item = CompressionConfig> {
    (MIN_WINDOW_EXP..=max_window_exp).flat_map(|window_exp| {
        (MIN_LOOKAHEAD_EXP..window_exp)
            .map(move |lookahead_exp| CompressionConfig::new(window_exp, lookahead_exp))
    })
}

/// Number of points in [`grid`]: `sum_{w=4}^{W} (w - 3)`.
pub fn grid_len(max_window_exp: u8) -> usize {
    (MIN_WINDOW_EXP..=max_window_exp)
        .map(|w| (w - MIN_LOOKAHEAD_EXP) as usize)
        .sum()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_order_is_window_then_lookahead() {
        let points: Vec<_> = grid(6).collect();
        let expected = vec![
            CompressionConfig::new(4, 3),
            CompressionConfig::new(5, 3),
            CompressionConfig::new(5, 4),
            CompressionConfig::new(6, 3),
            CompressionConfig::new(6, 4),
            CompressionConfig::new(6, 5),
        ];
        assert_eq!(points, expected);
    }

    #[test]
    fn grid_len_matches_enumeration() {
        for max in 0..=20u8 {
            assert_eq!(grid(max).count(), grid_len(max), "max_window_exp={max}");
        }
        assert_eq!(grid_len(DEFAULT_MAX_WINDOW_EXP), 78);
        assert_eq!(grid_len(3), 0);
    }

    #[test]
    fn every_grid_point_is_valid() {
        for cfg in grid(DEFAULT_MAX_WINDOW_EXP) {
            cfg.validate_ceiling(DEFAULT_MAX_WINDOW_EXP).unwrap();
        }
    }

    #[test]
    fn validate_rejects_out_of_range() {
        assert!(CompressionConfig::new(8, 2).validate().is_err());
        assert!(CompressionConfig::new(5, 5).validate().is_err());
        assert!(CompressionConfig::new(4, 6).validate().is_err());
        assert!(CompressionConfig::new(12, 4).validate_ceiling(11).is_err());
        assert!(CompressionConfig::new(11, 4).validate_ceiling(11).is_ok());
    }

    #[test]
    fn sizes_and_display() {
        let cfg = CompressionConfig::new(10, 4);
        assert_eq!(cfg.window_size(), 1024);
        assert_eq!(cfg.lookahead_size(), 16);
        assert_eq!(cfg.to_string(), "window_exp=10 lookahead_exp=4");
    }
}
