//! Consolidation-breakout recognizer.
//!
//! Staged structural checks that short-circuit on the first failure; a
//! near-miss is a miss, never patched up into a pattern.

use csim_core::{Candle, Pattern, PatternKind};

const CONSOLIDATION_LEN: usize = 15;
const MAX_RANGE_PCT: f64 = 3.0;
const MIN_BREAKOUT_PCT: f64 = 0.3;
const CONTINUATION_LEN: usize = 5;
const MIN_CONTINUATION: usize = 3;

/// Scan for a consolidation-then-breakout shape starting at `origin`.
pub fn detect(candles: &[Candle], origin: usize) -> Option<Pattern> {
    let breakout_idx = origin + CONSOLIDATION_LEN;
    let end_idx = breakout_idx + CONTINUATION_LEN;
    if end_idx >= candles.len() {
        return None;
    }

    // Stage 1: tight consolidation
    let consolidation = &candles[origin..breakout_idx];
    let cons_high = consolidation.iter().map(|c| c.high).fold(f64::MIN, f64::max);
    let cons_low = consolidation.iter().map(|c| c.low).fold(f64::MAX, f64::min);
    let range_pct = (cons_high - cons_low) / cons_low * 100.0;
    if range_pct > MAX_RANGE_PCT {
        return None;
    }

    // Stage 2: decisive close above the consolidation high
    let breakout_close = candles[breakout_idx].close;
    if breakout_close < cons_high * (1.0 + MIN_BREAKOUT_PCT / 100.0) {
        return None;
    }

    // Stage 3: continuation holds above the breakout close
    let held = candles[breakout_idx + 1..=end_idx]
        .iter()
        .filter(|c| c.close > breakout_close)
        .count();
    if held < MIN_CONTINUATION {
        return None;
    }

    let quality = (70.0 + range_pct * 5.0).min(95.0) as u8;
    Some(Pattern {
        kind: PatternKind::Breakout,
        start_index: origin,
        end_index: end_idx,
        expected_entry: breakout_close * 1.002,
        expected_exit: breakout_close * 1.02,
        stop_loss: cons_low * 0.995,
        quality,
        description: format!(
            "{:.1}% consolidation broken by a close {:.1}% above range high",
            range_pct,
            (breakout_close / cons_high - 1.0) * 100.0
        ),
        hint: "Price broke out of a tight range; look for entries just above the breakout close"
            .to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticSeries;

    #[test]
    fn detects_embedded_breakout() {
        let series = SyntheticSeries::new(7)
            .flat(200, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .build();
        let pattern = detect(series.as_slice(), 60).expect("breakout should be detected");
        assert_eq!(pattern.kind, PatternKind::Breakout);
        assert_eq!(pattern.start_index, 60);
        assert!(pattern.quality >= 70);
        assert!(pattern.expected_entry > pattern.stop_loss);
        assert!(pattern.expected_exit > pattern.expected_entry);
    }

    #[test]
    fn rejects_wide_consolidation() {
        // Range well over 3% never consolidates
        let series = SyntheticSeries::new(7)
            .flat(200, 100.0)
            .embed_breakout(60, 6.0, 0.5)
            .build();
        assert!(detect(series.as_slice(), 60).is_none());
    }

    #[test]
    fn rejects_weak_breakout_close() {
        let series = SyntheticSeries::new(7)
            .flat(200, 100.0)
            .embed_breakout(60, 2.0, 0.1)
            .build();
        assert!(detect(series.as_slice(), 60).is_none());
    }

    #[test]
    fn rejects_near_series_end() {
        let series = SyntheticSeries::new(7).flat(30, 100.0).build();
        assert!(detect(series.as_slice(), 20).is_none());
    }
}
