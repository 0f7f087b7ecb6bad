//! Pattern scheduler: runs the configured detectors over a series and
//! returns a non-overlapping, time-ordered pattern list.

use rayon::prelude::*;

use csim_core::{CandleSeries, DetectionConfig, Pattern};

use crate::{breakout, flag, retest, strict_retest};

/// Detector identity, in scheduler priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Detector {
    StrictRetest,
    Breakout,
    Flag,
    LegacyRetest,
}

const PRIORITY: [Detector; 4] = [
    Detector::StrictRetest,
    Detector::Breakout,
    Detector::Flag,
    Detector::LegacyRetest,
];

/// Detect up to `target_count` patterns across the series.
///
/// Candidates for every (detector, origin) pair are pre-computed in
/// parallel; because each detector is a pure function of the series, the
/// sequential selection that follows is observationally identical to a
/// single cursor walk, so results are deterministic. Selection accepts a
/// candidate when its quality clears `min_quality` and its detector still
/// has quota, then jumps the cursor past the accepted pattern by at least
/// `min_gap` indices.
pub fn detect_patterns(
    series: &CandleSeries,
    target_count: usize,
    config: &DetectionConfig,
) -> Vec<Pattern> {
    let candles = series.as_slice();
    let len = candles.len();
    if target_count == 0 || len <= config.margin * 2 {
        return Vec::new();
    }

    let active: Vec<Detector> = PRIORITY
        .iter()
        .copied()
        .filter(|d| match d {
            Detector::StrictRetest => config.detectors.strict_retest,
            Detector::Breakout => config.detectors.breakout,
            Detector::Flag => config.detectors.flag,
            Detector::LegacyRetest => config.detectors.retest,
        })
        .collect();
    if active.is_empty() {
        return Vec::new();
    }

    let first_origin = config.margin;
    let last_origin = len - config.margin;

    // Parallel pre-scan: one candidate row per active detector.
    let candidates: Vec<Vec<Option<Pattern>>> = active
        .iter()
        .map(|&detector| {
            (first_origin..last_origin)
                .into_par_iter()
                .map(|origin| run_detector(detector, candles, origin, config))
                .collect()
        })
        .collect();

    // Quotas split the target across active detectors, remainder to the
    // higher-priority ones. A single active detector gets everything.
    let base = target_count / active.len();
    let extra = target_count % active.len();
    let mut quotas: Vec<usize> = (0..active.len())
        .map(|i| base + usize::from(i < extra))
        .collect();

    let mut accepted: Vec<Pattern> = Vec::with_capacity(target_count);
    let mut origin = first_origin;
    while origin < last_origin && accepted.len() < target_count {
        let mut hit = None;
        for (di, row) in candidates.iter().enumerate() {
            if quotas[di] == 0 {
                continue;
            }
            if let Some(p) = &row[origin - first_origin] {
                if p.quality >= config.min_quality {
                    hit = Some((di, p.clone()));
                    break;
                }
            }
        }
        match hit {
            Some((di, pattern)) => {
                quotas[di] -= 1;
                // Never let the next pattern start inside this one
                origin = (origin + config.min_gap).max(pattern.end_index + 1);
                accepted.push(pattern);
            }
            None => origin += 1,
        }
    }

    accepted.sort_by_key(|p| p.start_index);
    accepted
}

fn run_detector(
    detector: Detector,
    candles: &[csim_core::Candle],
    origin: usize,
    config: &DetectionConfig,
) -> Option<Pattern> {
    match detector {
        Detector::StrictRetest => strict_retest::detect(candles, origin, &config.strict_retest),
        Detector::Breakout => breakout::detect(candles, origin),
        Detector::Flag => flag::detect(candles, origin),
        Detector::LegacyRetest => retest::detect(candles, origin),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::synthetic::SyntheticSeries;
    use csim_core::{DetectorSet, PatternKind};

    fn breakout_only() -> DetectionConfig {
        DetectionConfig {
            detectors: DetectorSet {
                strict_retest: false,
                breakout: true,
                flag: false,
                retest: false,
            },
            ..DetectionConfig::default()
        }
    }

    #[test]
    fn embedded_breakout_found_at_origin() {
        // 200 candles, consolidation-then-breakout shape at index 60
        let series = SyntheticSeries::new(42)
            .flat(200, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .build();
        let patterns = detect_patterns(&series, 1, &breakout_only());
        assert_eq!(patterns.len(), 1);
        assert_eq!(patterns[0].kind, PatternKind::Breakout);
        assert_eq!(patterns[0].start_index, 60);
        assert!(patterns[0].quality >= 70);
    }

    #[test]
    fn detection_is_deterministic() {
        let series = SyntheticSeries::new(9)
            .flat(400, 100.0)
            .embed_breakout(70, 2.0, 0.5)
            .embed_breakout(150, 1.5, 0.6)
            .embed_strict_retest(250)
            .build();
        let config = DetectionConfig {
            detectors: DetectorSet {
                strict_retest: true,
                breakout: true,
                flag: false,
                retest: false,
            },
            ..DetectionConfig::default()
        };
        let a = detect_patterns(&series, 4, &config);
        let b = detect_patterns(&series, 4, &config);
        assert_eq!(a.len(), b.len());
        for (x, y) in a.iter().zip(&b) {
            assert_eq!(x.start_index, y.start_index);
            assert_eq!(x.kind, y.kind);
            assert_eq!(x.quality, y.quality);
            assert_eq!(x.expected_entry, y.expected_entry);
        }
    }

    #[test]
    fn accepted_patterns_never_overlap() {
        let series = SyntheticSeries::new(8)
            .flat(500, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .embed_breakout(100, 2.5, 0.5)
            .embed_breakout(200, 1.0, 0.8)
            .embed_breakout(300, 2.0, 0.5)
            .build();
        let config = breakout_only();
        let patterns = detect_patterns(&series, 10, &config);
        assert!(patterns.len() >= 2);
        for pair in patterns.windows(2) {
            let gap = pair[1].start_index - pair[0].start_index;
            assert!(gap >= config.min_gap, "patterns too close: {gap}");
            assert!(pair[1].start_index > pair[0].end_index);
        }
    }

    #[test]
    fn quota_limits_accepted_count() {
        let series = SyntheticSeries::new(8)
            .flat(500, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .embed_breakout(200, 2.0, 0.5)
            .embed_breakout(300, 2.0, 0.5)
            .build();
        let patterns = detect_patterns(&series, 2, &breakout_only());
        assert!(patterns.len() <= 2);
    }

    #[test]
    fn no_enabled_detectors_yields_nothing() {
        let series = SyntheticSeries::new(8)
            .flat(200, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .build();
        let config = DetectionConfig {
            detectors: DetectorSet {
                strict_retest: false,
                breakout: false,
                flag: false,
                retest: false,
            },
            ..DetectionConfig::default()
        };
        assert!(detect_patterns(&series, 5, &config).is_empty());
    }

    #[test]
    fn short_series_yields_nothing() {
        let series = SyntheticSeries::new(8).flat(80, 100.0).build();
        assert!(detect_patterns(&series, 5, &breakout_only()).is_empty());
    }

    #[test]
    fn results_sorted_by_start_index() {
        let series = SyntheticSeries::new(8)
            .flat(500, 100.0)
            .embed_breakout(60, 2.0, 0.5)
            .embed_breakout(200, 2.0, 0.5)
            .build();
        let patterns = detect_patterns(&series, 5, &breakout_only());
        for pair in patterns.windows(2) {
            assert!(pair[0].start_index < pair[1].start_index);
        }
    }
}
