//! Pure price/volume measurements shared by all pattern detectors.
//!
//! Everything here is deterministic for identical input slices, which keeps
//! pattern detection reproducible across reruns and unit-testable in
//! isolation.

use csim_core::Candle;

/// True iff the high at `index` strictly exceeds every high in the
/// `left` candles before it and the `right` candles after it. Returns
/// false when either flank runs off the end of the slice.
pub fn is_pivot_high(candles: &[Candle], index: usize, left: usize, right: usize) -> bool {
    if index < left || index + right >= candles.len() {
        return false;
    }
    let h = candles[index].high;
    let before = &candles[index - left..index];
    let after = &candles[index + 1..=index + right];
    before.iter().all(|c| c.high < h) && after.iter().all(|c| c.high < h)
}

/// Mirror of [`is_pivot_high`] on lows.
pub fn is_pivot_low(candles: &[Candle], index: usize, left: usize, right: usize) -> bool {
    if index < left || index + right >= candles.len() {
        return false;
    }
    let l = candles[index].low;
    let before = &candles[index - left..index];
    let after = &candles[index + 1..=index + right];
    before.iter().all(|c| c.low > l) && after.iter().all(|c| c.low > l)
}

/// Mean true range over the most recent `period` candles of the slice.
///
/// True range needs the previous close, so `period + 1` candles are
/// required; returns 0.0 below that.
pub fn average_true_range(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period + 1 {
        return 0.0;
    }
    let start = candles.len() - period;
    let mut sum = 0.0;
    for i in start..candles.len() {
        let c = &candles[i];
        let prev_close = candles[i - 1].close;
        let tr = (c.high - c.low)
            .max((c.high - prev_close).abs())
            .max((c.low - prev_close).abs());
        sum += tr;
    }
    sum / period as f64
}

/// Mean volume over the first `period` candles of the slice; 0.0 if the
/// slice is shorter than `period`.
pub fn average_volume(candles: &[Candle], period: usize) -> f64 {
    if period == 0 || candles.len() < period {
        return 0.0;
    }
    candles[..period].iter().map(|c| c.volume).sum::<f64>() / period as f64
}
