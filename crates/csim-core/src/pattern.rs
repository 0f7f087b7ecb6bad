use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PatternKind {
    Breakout,
    Retest,
    Flag,
}

impl PatternKind {
    pub fn label(&self) -> &'static str {
        match self {
            PatternKind::Breakout => "breakout",
            PatternKind::Retest => "retest",
            PatternKind::Flag => "bull flag",
        }
    }
}

/// A detected chart pattern with its suggested trade levels.
///
/// Created once at scheduling time and never mutated; the replay engine
/// reads it to generate hints and entry-quality scores.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pattern {
    pub kind: PatternKind,
    /// First candle index of the recognized structure (inclusive).
    pub start_index: usize,
    /// Last candle index of the recognized structure (inclusive).
    pub end_index: usize,
    pub expected_entry: f64,
    pub expected_exit: f64,
    pub stop_loss: f64,
    /// Structural quality score, 0..=100.
    pub quality: u8,
    pub description: String,
    pub hint: String,
}

impl Pattern {
    /// Whether a candle index falls inside the pattern's span.
    #[inline]
    pub fn contains(&self, index: usize) -> bool {
        index >= self.start_index && index <= self.end_index
    }

    /// Number of candles the pattern spans.
    #[inline]
    pub fn span(&self) -> usize {
        self.end_index - self.start_index + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn contains_is_inclusive() {
        let p = Pattern {
            kind: PatternKind::Breakout,
            start_index: 10,
            end_index: 20,
            expected_entry: 101.0,
            expected_exit: 103.0,
            stop_loss: 99.0,
            quality: 80,
            description: String::new(),
            hint: String::new(),
        };
        assert!(p.contains(10));
        assert!(p.contains(20));
        assert!(!p.contains(21));
        assert_eq!(p.span(), 11);
    }

    #[test]
    fn kind_serializes_snake_case() {
        let json = serde_json::to_string(&PatternKind::Breakout).unwrap();
        assert_eq!(json, "\"breakout\"");
    }
}
