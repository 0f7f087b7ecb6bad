//! Bull-flag recognizer: a strong pole, a narrow flag, a breakout.

use csim_core::{Candle, Pattern, PatternKind};

const POLE_LEN: usize = 8;
const MIN_POLE_PCT: f64 = 3.0;
const MAX_POLE_PCT: f64 = 15.0;
const FLAG_LEN: usize = 12;
const MAX_FLAG_RANGE_PCT: f64 = 4.0;
const BREAKOUT_LEN: usize = 4;
const MIN_BREAKOUT_CLOSES: usize = 3;

/// Scan for a pole/flag/breakout shape starting at `origin`.
pub fn detect(candles: &[Candle], origin: usize) -> Option<Pattern> {
    let flag_start = origin + POLE_LEN;
    let breakout_start = flag_start + FLAG_LEN;
    let end_idx = breakout_start + BREAKOUT_LEN - 1;
    if end_idx >= candles.len() {
        return None;
    }

    // Stage 1: the pole — a strong rise into the flag
    let pole = &candles[origin..flag_start];
    let pole_top = pole.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let pole_move_pct = (pole_top / pole[0].close - 1.0) * 100.0;
    if !(MIN_POLE_PCT..=MAX_POLE_PCT).contains(&pole_move_pct) {
        return None;
    }

    // Stage 2: the flag — narrow drift with no close above the pole top
    let flag = &candles[flag_start..breakout_start];
    let flag_high = flag.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let flag_low = flag.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    if (flag_high - flag_low) / flag_low * 100.0 > MAX_FLAG_RANGE_PCT {
        return None;
    }
    if flag.iter().any(|c| c.close > pole_top) {
        return None;
    }

    // Stage 3: the breakout — closes clear the flag high
    let cleared = candles[breakout_start..=end_idx]
        .iter()
        .filter(|c| c.close > flag_high)
        .count();
    if cleared < MIN_BREAKOUT_CLOSES {
        return None;
    }

    let quality = (65.0 + pole_move_pct * 2.0).min(95.0) as u8;
    Some(Pattern {
        kind: PatternKind::Flag,
        start_index: origin,
        end_index: end_idx,
        expected_entry: flag_high * 1.002,
        expected_exit: pole_top * 1.03,
        stop_loss: flag_low * 0.995,
        quality,
        description: format!(
            "{pole_move_pct:.1}% pole consolidated into a flag and broke out"
        ),
        hint: "A strong rise paused in a tight flag and resumed; trend continuation setup"
            .to_string(),
    })
}
