use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Top-level simulator config, parsed from TOML.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimConfig {
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub paper: PaperConfig,
}

impl SimConfig {
    /// Load config from a TOML file path.
    pub fn from_toml(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| SimError::Io(e.to_string()))?;
        Self::from_toml_str(&content)
    }

    /// Parse config from a TOML string.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| SimError::Parse(e.to_string()))
    }

    /// Load and merge multiple TOML files (later files override earlier).
    pub fn from_toml_files(paths: &[&Path]) -> Result<Self> {
        if paths.is_empty() {
            return Err(SimError::Parse("no config files provided".into()));
        }
        let mut content =
            std::fs::read_to_string(paths[0]).map_err(|e| SimError::Io(e.to_string()))?;
        let mut base: toml::Value =
            toml::from_str(&content).map_err(|e| SimError::Parse(e.to_string()))?;

        for path in &paths[1..] {
            content = std::fs::read_to_string(path).map_err(|e| SimError::Io(e.to_string()))?;
            let overlay: toml::Value =
                toml::from_str(&content).map_err(|e| SimError::Parse(e.to_string()))?;
            merge_toml(&mut base, overlay);
        }

        let merged = toml::to_string(&base).map_err(|e| SimError::Parse(e.to_string()))?;
        Self::from_toml_str(&merged)
    }
}

fn merge_toml(base: &mut toml::Value, overlay: toml::Value) {
    if let (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) = (base, overlay) {
        for (key, value) in overlay_table {
            if let Some(base_value) = base_table.get_mut(&key) {
                if base_value.is_table() && value.is_table() {
                    merge_toml(base_value, value);
                    continue;
                }
            }
            base_table.insert(key, value);
        }
    }
}

/// Pattern-scheduler configuration (fixed at scheduling call time,
/// never toggled by editing detector code).
#[derive(Debug, Clone, Deserialize)]
pub struct DetectionConfig {
    /// Scan margin from both ends of the series.
    #[serde(default = "default_50")]
    pub margin: usize,
    /// Minimum index gap between accepted patterns.
    #[serde(default = "default_30")]
    pub min_gap: usize,
    /// Minimum quality score for acceptance.
    #[serde(default = "default_70_u8")]
    pub min_quality: u8,
    #[serde(default)]
    pub detectors: DetectorSet,
    #[serde(default)]
    pub strict_retest: StrictRetestConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            margin: 50,
            min_gap: 30,
            min_quality: 70,
            detectors: DetectorSet::default(),
            strict_retest: StrictRetestConfig::default(),
        }
    }
}

/// Which detectors the scheduler runs. The default deployment runs the
/// strict retest detector only, with the full target quota.
#[derive(Debug, Clone, Deserialize)]
pub struct DetectorSet {
    #[serde(default = "default_true")]
    pub strict_retest: bool,
    #[serde(default)]
    pub breakout: bool,
    #[serde(default)]
    pub flag: bool,
    /// Fixed-percentage legacy retest detector, kept as a fallback.
    #[serde(default)]
    pub retest: bool,
}

impl Default for DetectorSet {
    fn default() -> Self {
        Self {
            strict_retest: true,
            breakout: false,
            flag: false,
            retest: false,
        }
    }
}

impl DetectorSet {
    pub fn enabled_count(&self) -> usize {
        [self.strict_retest, self.breakout, self.flag, self.retest]
            .iter()
            .filter(|&&b| b)
            .count()
    }
}

/// How the strict retest detector matches the return to the broken level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetestMatchMode {
    /// Candle low touches the tolerance band.
    Wick,
    /// Candle close enters the tolerance band.
    Close,
    /// Either wick or close.
    Both,
}

/// Tunables for the pivot/ATR-based retest detector. All tolerances are
/// expressed as ATR multiples so the detector adapts to each asset's
/// volatility. These are hand-tuned starting values, not derived optima.
#[derive(Debug, Clone, Deserialize)]
pub struct StrictRetestConfig {
    #[serde(default = "default_5")]
    pub pivot_left: usize,
    #[serde(default = "default_5")]
    pub pivot_right: usize,
    #[serde(default = "default_14")]
    pub atr_period: usize,
    /// Close must exceed the level by this many ATRs to confirm a breakout.
    #[serde(default = "default_0_5")]
    pub breakout_atr_mult: f64,
    /// Retest counts when price comes within this many ATRs of the level.
    #[serde(default = "default_0_75")]
    pub retest_tol_atr_mult: f64,
    /// A close this many ATRs below the level invalidates the setup.
    #[serde(default = "default_1_5")]
    pub invalidation_atr_mult: f64,
    /// Maximum bars to wait for the retest leg after breakout.
    #[serde(default = "default_20")]
    pub max_wait_bars: usize,
    #[serde(default = "default_match_both")]
    pub match_mode: RetestMatchMode,
}

impl Default for StrictRetestConfig {
    fn default() -> Self {
        Self {
            pivot_left: 5,
            pivot_right: 5,
            atr_period: 14,
            breakout_atr_mult: 0.5,
            retest_tol_atr_mult: 0.75,
            invalidation_atr_mult: 1.5,
            max_wait_bars: 20,
            match_mode: RetestMatchMode::Both,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PaperConfig {
    #[serde(default = "default_10000")]
    pub initial_balance: f64,
}

impl Default for PaperConfig {
    fn default() -> Self {
        Self {
            initial_balance: 10_000.0,
        }
    }
}

// Default value helpers
fn default_true() -> bool { true }
fn default_5() -> usize { 5 }
fn default_14() -> usize { 14 }
fn default_20() -> usize { 20 }
fn default_30() -> usize { 30 }
fn default_50() -> usize { 50 }
fn default_70_u8() -> u8 { 70 }
fn default_0_5() -> f64 { 0.5 }
fn default_0_75() -> f64 { 0.75 }
fn default_1_5() -> f64 { 1.5 }
fn default_10000() -> f64 { 10_000.0 }
fn default_match_both() -> RetestMatchMode { RetestMatchMode::Both }
