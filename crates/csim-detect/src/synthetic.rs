//! Seeded synthetic candle series with embeddable textbook shapes.
//!
//! Used by tests, benches, and the CLI's demo mode. Output is fully
//! deterministic for a given seed.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use csim_core::{Candle, CandleSeries};

const BASE_TS: i64 = 1_735_689_600; // 2025-01-01T00:00:00Z
const STEP_SECS: i64 = 60;

/// Builder for synthetic OHLCV series.
pub struct SyntheticSeries {
    rng: StdRng,
    candles: Vec<Candle>,
}

impl SyntheticSeries {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            candles: Vec::new(),
        }
    }

    fn push_close(&mut self, close: f64) {
        let time = BASE_TS + self.candles.len() as i64 * STEP_SECS;
        self.candles.push(Candle {
            time,
            open: close,
            high: close * 1.0005,
            low: close * 0.9995,
            close,
            volume: 1_000.0,
        });
    }

    fn set(&mut self, index: usize, open: f64, high: f64, low: f64, close: f64) {
        let c = &mut self.candles[index];
        c.open = open;
        c.high = high;
        c.low = low;
        c.close = close;
    }

    /// Append `n` quiet candles around `price` (±0.05% wiggle).
    pub fn flat(mut self, n: usize, price: f64) -> Self {
        for _ in 0..n {
            let wiggle = 1.0 + self.rng.gen_range(-0.0005..0.0005);
            self.push_close(price * wiggle);
        }
        self
    }

    /// Append `n` candles following a noisy geometric random walk.
    pub fn random_walk(mut self, n: usize, start_price: f64, vol_pct: f64) -> Self {
        let mut price = start_price;
        for _ in 0..n {
            let step = self.rng.gen_range(-vol_pct..vol_pct) / 100.0;
            price *= 1.0 + step;
            self.push_close(price);
        }
        self
    }

    /// Rewrite 21 candles starting at `at` into a consolidation of the
    /// given range followed by a breakout close `breakout_pct` above the
    /// range high and a 4-of-5 continuation.
    pub fn embed_breakout(mut self, at: usize, range_pct: f64, breakout_pct: f64) -> Self {
        assert!(at + 21 <= self.candles.len(), "series too short for shape");
        let base = self.candles[at].close;
        let half = range_pct / 200.0;
        let cons_low = base * (1.0 - half);
        let cons_high = base * (1.0 + half);

        for i in 0..15 {
            // Oscillate so the extremes are actually printed
            let (close, high, low) = if i % 2 == 0 {
                (cons_low * 1.001, cons_high, cons_low)
            } else {
                (cons_high * 0.999, cons_high * 0.9995, cons_low * 1.0005)
            };
            self.set(at + i, close, high, low, close);
        }

        let breakout_close = cons_high * (1.0 + breakout_pct / 100.0);
        self.set(
            at + 15,
            cons_high,
            breakout_close * 1.001,
            cons_high * 0.999,
            breakout_close,
        );

        for i in 0..5 {
            // One shallow pullback, four closes holding above the breakout
            let close = if i == 2 {
                breakout_close * 0.997
            } else {
                breakout_close * (1.001 + i as f64 * 0.001)
            };
            self.set(at + 16 + i, close, close * 1.001, close * 0.998, close);
        }
        self
    }

    /// Rewrite 24 candles at `at` into a pole/flag/breakout shape.
    pub fn embed_flag(mut self, at: usize, pole_pct: f64, flag_range_pct: f64) -> Self {
        assert!(at + 24 <= self.candles.len(), "series too short for shape");
        let base = self.candles[at].close;
        let pole_top = base * (1.0 + pole_pct / 100.0);

        for i in 0..8 {
            let close = base * (1.0 + pole_pct / 100.0 * (i + 1) as f64 / 8.0);
            self.set(at + i, close * 0.999, close * 1.0005, close * 0.997, close);
        }

        let flag_mid = pole_top * 0.99;
        let half = flag_range_pct / 200.0;
        let flag_high = flag_mid * (1.0 + half);
        let flag_low = flag_mid * (1.0 - half);
        for i in 0..12 {
            let (close, high, low) = if i % 2 == 0 {
                (flag_low * 1.001, flag_high, flag_low)
            } else {
                (flag_high * 0.999, flag_high * 0.9995, flag_low * 1.0005)
            };
            self.set(at + 8 + i, close, high, low, close);
        }

        for i in 0..4 {
            // Three of four closes clear the flag high
            let close = if i == 1 {
                flag_high * 0.999
            } else {
                flag_high * (1.004 + i as f64 * 0.002)
            };
            self.set(at + 20 + i, close * 0.999, close * 1.001, close * 0.997, close);
        }
        self
    }

    /// Rewrite 25 candles at `at` into the legacy retest shape:
    /// 8-candle downtrend, breakout, 6-candle continuation, 5-candle
    /// retest of the broken trend high, 5-candle bounce.
    pub fn embed_retest(mut self, at: usize) -> Self {
        assert!(at + 25 <= self.candles.len(), "series too short for shape");
        let base = self.candles[at].close;

        let mut trend_high = f64::MIN;
        for i in 0..8 {
            let close = base * (1.0 - 0.004 * (i + 1) as f64);
            let high = close * 1.002;
            trend_high = trend_high.max(high);
            self.set(at + i, close * 1.001, high, close * 0.998, close);
        }
        let trend_last_close = self.candles[at + 7].close;

        let breakout_close = trend_last_close * 1.025;
        self.set(
            at + 8,
            trend_last_close,
            trend_high * 1.012,
            trend_last_close * 0.999,
            breakout_close,
        );

        for i in 0..6 {
            let close = if i == 4 {
                breakout_close * 0.99
            } else {
                breakout_close * (1.002 + i as f64 * 0.001)
            };
            self.set(at + 9 + i, close, close * 1.002, close * 0.997, close);
        }

        let retest_low = trend_high * 0.995;
        for i in 0..5 {
            // Lows walk down onto the broken level
            let low = retest_low * (1.004 - 0.001 * (i + 1) as f64);
            let close = low * 1.004;
            self.set(at + 15 + i, close * 1.001, close * 1.002, low, close);
        }

        for i in 0..5 {
            let close = if i == 3 {
                retest_low * 1.002
            } else {
                retest_low * (1.008 + i as f64 * 0.002)
            };
            self.set(at + 20 + i, close * 0.999, close * 1.002, close * 0.997, close);
        }
        self
    }

    /// Rewrite candles at `at` into a strict-retest shape: a pivot high
    /// (5 bars each side), an ATR-confirmed breakout, a wick retest of the
    /// level, and a bounce close back above it. Spans 16 candles.
    pub fn embed_strict_retest(mut self, at: usize) -> Self {
        assert!(at >= 5 && at + 16 <= self.candles.len(), "series too short for shape");
        let base = self.candles[at].close;
        let level = base * 1.01;

        // Pivot candle with both flanks strictly below it
        self.set(at, base, level, base * 0.998, base * 1.002);
        for i in 1..=5 {
            for idx in [at - i, at + i] {
                let c = self.candles[idx];
                if c.high >= level {
                    let close = base * 0.999;
                    self.set(idx, close, close * 1.0005, close * 0.9995, close);
                }
            }
        }

        // Breakout: close well above level + 0.5*ATR
        let breakout_close = level * 1.012;
        self.set(
            at + 6,
            base * 1.002,
            breakout_close * 1.001,
            base * 1.001,
            breakout_close,
        );
        for i in 0..2 {
            let close = breakout_close * (1.0 - 0.002 * (i + 1) as f64);
            self.set(at + 7 + i, close * 1.001, close * 1.002, close * 0.998, close);
        }

        // Retest: wick tags the level, close holds above it
        let retest_low = level * 0.9995;
        self.set(
            at + 9,
            level * 1.004,
            level * 1.005,
            retest_low,
            level * 1.002,
        );

        // Bounce and follow-through
        for i in 0..6 {
            let close = level * (1.004 + i as f64 * 0.002);
            self.set(at + 10 + i, close * 0.999, close * 1.001, close * 0.998, close);
        }
        self
    }

    pub fn build(self) -> CandleSeries {
        CandleSeries::from_candles(self.candles).expect("synthetic series must be valid")
    }
}
