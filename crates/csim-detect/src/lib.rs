//! Structural chart-pattern detection over OHLCV candle series.
//!
//! Each detector is a staged recognizer: every stage encodes a necessary
//! structural condition and fails the scan outright when it does not hold.
//! Patterns are textbook shapes shown to end users, so false positives are
//! worse than misses — no fuzzy scoring, no fixing up near-misses.

pub mod analyzer;
pub mod breakout;
pub mod flag;
pub mod retest;
pub mod scheduler;
pub mod strict_retest;
pub mod synthetic;

pub use scheduler::detect_patterns;
pub use synthetic::SyntheticSeries;
