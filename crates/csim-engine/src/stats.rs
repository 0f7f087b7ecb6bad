use serde::{Deserialize, Serialize};

use csim_core::{Account, ClosedPosition};

/// Running performance statistics, updated incrementally after every
/// position closure and equity change.
///
/// Sharpe/Sortino/Calmar are plain per-trade percent-return ratios with no
/// time annualization. That matches what the score displays expect; it is
/// an approximation, not a finance-grade convention.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Stats {
    pub total_trades: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    pub average_win: f64,
    pub average_loss: f64,
    pub profit_factor: f64,
    pub max_drawdown: f64,
    pub max_drawdown_pct: f64,
    pub sharpe_ratio: f64,
    pub sortino_ratio: f64,
    pub calmar_ratio: f64,
    pub pattern_recognition_score: f64,
    pub average_entry_quality: f64,
    /// Signed: positive counts consecutive wins, negative consecutive losses.
    pub current_streak: i32,
    pub max_win_streak: u32,
    pub max_loss_streak: u32,

    #[serde(skip)]
    returns: Vec<f64>,
    #[serde(skip)]
    equity_peak: f64,
    #[serde(skip)]
    pattern_closes: usize,
    #[serde(skip)]
    pattern_wins: usize,
    #[serde(skip)]
    entry_quality_sum: f64,
}

impl Stats {
    /// A trade counts from the moment the position opens.
    pub fn record_open(&mut self) {
        self.total_trades += 1;
        self.update_win_rate();
    }

    /// Fold a settled position into the running aggregates.
    pub fn record_close(&mut self, closed: &ClosedPosition) {
        let pnl = closed.exit_pnl;
        if pnl > 0.0 {
            self.winning_trades += 1;
            // Weighted running mean, not recomputed from scratch
            let n = self.winning_trades as f64;
            self.average_win += (pnl - self.average_win) / n;
            self.current_streak = if self.current_streak > 0 {
                self.current_streak + 1
            } else {
                1
            };
            self.max_win_streak = self.max_win_streak.max(self.current_streak as u32);
        } else if pnl < 0.0 {
            self.losing_trades += 1;
            let n = self.losing_trades as f64;
            self.average_loss += (pnl.abs() - self.average_loss) / n;
            self.current_streak = if self.current_streak < 0 {
                self.current_streak - 1
            } else {
                -1
            };
            self.max_loss_streak = self.max_loss_streak.max(self.current_streak.unsigned_abs());
        }
        // Breakeven closes touch neither streaks nor win/loss counters

        self.update_win_rate();
        self.profit_factor = if self.average_loss > 0.0 {
            self.average_win / self.average_loss
        } else {
            0.0
        };

        if let Some(entry) = closed.pattern_entry {
            self.pattern_closes += 1;
            if pnl > 0.0 {
                self.pattern_wins += 1;
            }
            self.entry_quality_sum += entry.entry_quality as f64;
            self.average_entry_quality = self.entry_quality_sum / self.pattern_closes as f64;
            let pattern_win_rate = self.pattern_wins as f64 / self.pattern_closes as f64;
            self.pattern_recognition_score = self.average_entry_quality * pattern_win_rate;
        }

        self.returns.push(closed.exit_pnl_pct);
    }

    /// Refresh drawdown and return ratios against the current account.
    /// Never fails; ratios degrade to 0 with insufficient data.
    pub fn refresh(&mut self, account: &Account) {
        if account.equity > self.equity_peak {
            self.equity_peak = account.equity;
        }
        let drawdown = self.equity_peak - account.equity;
        if drawdown > self.max_drawdown {
            self.max_drawdown = drawdown;
            self.max_drawdown_pct = if account.initial_balance > 0.0 {
                drawdown / account.initial_balance * 100.0
            } else {
                0.0
            };
        }

        if self.returns.len() < 2 {
            self.sharpe_ratio = 0.0;
            self.sortino_ratio = 0.0;
            self.calmar_ratio = 0.0;
            return;
        }

        let mean = self.returns.iter().sum::<f64>() / self.returns.len() as f64;
        let std = std_dev(&self.returns, mean);
        self.sharpe_ratio = if std > 0.0 { mean / std } else { 0.0 };

        let downside: Vec<f64> = self
            .returns
            .iter()
            .copied()
            .filter(|&r| r < mean)
            .collect();
        let downside_dev = if downside.is_empty() {
            0.0
        } else {
            let sq = downside.iter().map(|r| (r - mean).powi(2)).sum::<f64>();
            (sq / downside.len() as f64).sqrt()
        };
        self.sortino_ratio = if downside_dev > 0.0 {
            mean / downside_dev
        } else {
            0.0
        };

        let total_return_pct = if account.initial_balance > 0.0 {
            (account.equity - account.initial_balance) / account.initial_balance * 100.0
        } else {
            0.0
        };
        self.calmar_ratio = if self.max_drawdown_pct > 0.0 {
            total_return_pct / self.max_drawdown_pct
        } else {
            0.0
        };
    }

    fn update_win_rate(&mut self) {
        self.win_rate = if self.total_trades > 0 {
            self.winning_trades as f64 / self.total_trades as f64 * 100.0
        } else {
            0.0
        };
    }
}

/// Population standard deviation around a precomputed mean.
fn std_dev(values: &[f64], mean: f64) -> f64 {
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}
