//! Pivot/ATR-parameterized retest recognizer.
//!
//! Same structural intent as [`crate::retest`], but every tolerance is an
//! ATR multiple so the detector adapts to the asset's volatility instead of
//! assuming fixed percentages. All tunables live in
//! [`StrictRetestConfig`]; they are hand-tuned starting points, not derived
//! optima.

use csim_core::{Candle, Pattern, PatternKind, RetestMatchMode, StrictRetestConfig};

use crate::analyzer::{average_true_range, is_pivot_high};

/// Scan for a strict retest whose broken level is a confirmed pivot high
/// at `origin`.
pub fn detect(candles: &[Candle], origin: usize, cfg: &StrictRetestConfig) -> Option<Pattern> {
    // Stage 1: the origin must be a confirmed pivot high
    if !is_pivot_high(candles, origin, cfg.pivot_left, cfg.pivot_right) {
        return None;
    }
    let level = candles[origin].high;

    let confirm_idx = origin + cfg.pivot_right;
    let atr = average_true_range(&candles[..=confirm_idx], cfg.atr_period);
    if atr <= 0.0 {
        return None;
    }

    // Stage 2: a close above the level by the breakout buffer
    let breakout_threshold = level + cfg.breakout_atr_mult * atr;
    let search_start = confirm_idx + 1;
    let search_end = (search_start + cfg.max_wait_bars).min(candles.len());
    let breakout_idx = (search_start..search_end)
        .find(|&i| candles[i].close > breakout_threshold)?;

    // Stage 3: price returns to the level within the tolerance band,
    // without a close past the invalidation line
    let tolerance = level + cfg.retest_tol_atr_mult * atr;
    let invalidation = level - cfg.invalidation_atr_mult * atr;
    let retest_end = (breakout_idx + 1 + cfg.max_wait_bars).min(candles.len());
    let mut retest_idx = None;
    for i in breakout_idx + 1..retest_end {
        let c = &candles[i];
        if c.close < invalidation {
            return None;
        }
        let wick_hit = c.low <= tolerance;
        let close_hit = c.close <= tolerance;
        let hit = match cfg.match_mode {
            RetestMatchMode::Wick => wick_hit,
            RetestMatchMode::Close => close_hit,
            RetestMatchMode::Both => wick_hit || close_hit,
        };
        if hit {
            retest_idx = Some(i);
            break;
        }
    }
    let retest_idx = retest_idx?;
    let retest_low = candles[retest_idx].low;

    // Stage 4: a bounce close back above the level
    let bounce_end = (retest_idx + 1 + cfg.max_wait_bars).min(candles.len());
    let mut bounce_idx = None;
    for i in retest_idx + 1..bounce_end {
        let c = &candles[i];
        if c.close < invalidation {
            return None;
        }
        if c.close > level {
            bounce_idx = Some(i);
            break;
        }
    }
    let bounce_idx = bounce_idx?;

    // Tighter retests (extreme closer to the level, in ATRs) score higher
    let dist_atr = (level - retest_low).abs() / atr;
    let quality = (95.0 - dist_atr * 10.0).clamp(70.0, 95.0) as u8;

    let expected_entry = level + 0.25 * atr;
    Some(Pattern {
        kind: PatternKind::Retest,
        start_index: origin,
        end_index: bounce_idx,
        expected_entry,
        expected_exit: expected_entry + 2.0 * atr,
        stop_loss: retest_low - cfg.invalidation_atr_mult * atr,
        quality,
        description: format!(
            "pivot level {level:.2} broken and retested within {dist_atr:.2} ATR"
        ),
        hint: "A broken pivot high was retested and held; momentum favors continuation"
            .to_string(),
    })
}
