//! Legacy fixed-percentage retest recognizer.
//!
//! Kept as a configurable fallback; the pivot/ATR variant in
//! [`crate::strict_retest`] is preferred because its tolerances adapt to
//! each asset's volatility. LONG setups only.

use csim_core::{Candle, Pattern, PatternKind};

const TREND_LEN: usize = 8;
const ROLLING_WINDOW: usize = 3;
const MAX_ROLLING_HIGH_RISE: f64 = 0.005;
const MIN_BREAKOUT_PCT: f64 = 1.5;
const MAX_BREAKOUT_PCT: f64 = 3.5;
const MIN_HIGH_ABOVE_TREND_PCT: f64 = 1.0;
const CONTINUATION_LEN: usize = 6;
const MIN_CONTINUATION: usize = 4;
const RETEST_LEN: usize = 5;
const RETEST_TOLERANCE_PCT: f64 = 3.0;
const BOUNCE_LEN: usize = 5;
const MIN_BOUNCE: usize = 4;

/// Scan for a downtrend-breakout-retest-bounce shape starting at `origin`.
pub fn detect(candles: &[Candle], origin: usize) -> Option<Pattern> {
    let breakout_idx = origin + TREND_LEN;
    let retest_start = breakout_idx + 1 + CONTINUATION_LEN;
    let bounce_start = retest_start + RETEST_LEN;
    let end_idx = bounce_start + BOUNCE_LEN - 1;
    if end_idx >= candles.len() {
        return None;
    }

    // Stage 1: strict downtrend — no 3-candle rolling high may exceed the
    // prior rolling high by more than 0.5%
    let trend = &candles[origin..breakout_idx];
    let rolling_high = |start: usize| -> f64 {
        trend[start..start + ROLLING_WINDOW]
            .iter()
            .map(|c| c.high)
            .fold(f64::MIN, f64::max)
    };
    for i in 1..=TREND_LEN - ROLLING_WINDOW {
        if rolling_high(i) > rolling_high(i - 1) * (1.0 + MAX_ROLLING_HIGH_RISE) {
            return None;
        }
    }
    let trend_high = trend.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let trend_last_close = trend[TREND_LEN - 1].close;

    // Stage 2: breakout candle clears the trend decisively
    let breakout = &candles[breakout_idx];
    let rise_pct = (breakout.close / trend_last_close - 1.0) * 100.0;
    if !(MIN_BREAKOUT_PCT..=MAX_BREAKOUT_PCT).contains(&rise_pct) {
        return None;
    }
    if breakout.high < trend_high * (1.0 + MIN_HIGH_ABOVE_TREND_PCT / 100.0) {
        return None;
    }

    // Stage 3: continuation holds near the breakout close
    let held = candles[breakout_idx + 1..retest_start]
        .iter()
        .filter(|c| c.close > breakout.close * 0.995)
        .count();
    if held < MIN_CONTINUATION {
        return None;
    }

    // Stage 4: price returns to test the broken level
    let retest_low = candles[retest_start..bounce_start]
        .iter()
        .map(|c| c.low)
        .fold(f64::MAX, f64::min);
    let distance_pct = (retest_low - trend_high).abs() / trend_high * 100.0;
    if distance_pct > RETEST_TOLERANCE_PCT {
        return None;
    }

    // Stage 5: bounce off the retest low
    let bounced = candles[bounce_start..=end_idx]
        .iter()
        .filter(|c| c.close > retest_low * 1.005)
        .count();
    if bounced < MIN_BOUNCE {
        return None;
    }

    let quality = (70.0 + (RETEST_TOLERANCE_PCT - distance_pct) * 8.0).min(95.0) as u8;
    Some(Pattern {
        kind: PatternKind::Retest,
        start_index: origin,
        end_index: end_idx,
        expected_entry: retest_low * 1.003,
        expected_exit: retest_low * 1.04,
        stop_loss: retest_low * 0.985,
        quality,
        description: format!(
            "broken trend high retested within {distance_pct:.1}% and bounced"
        ),
        hint: "Price came back to test the broken level and held; the bounce is the entry"
            .to_string(),
    })
}
