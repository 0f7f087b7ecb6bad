use serde::{Deserialize, Serialize};

use crate::pattern::PatternKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderKind {
    BuyStop,
    BuyLimit,
    SellStop,
    SellLimit,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    StopLoss,
    TakeProfit,
    Manual,
}

/// Pattern context captured when a position is opened inside a pattern span.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternEntry {
    pub kind: PatternKind,
    /// 0..=100 score of how well the entry matched the pattern's setup.
    pub entry_quality: u8,
}

/// An open position. PnL fields are refreshed on every candle advance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub id: u64,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub entry_index: usize,
    pub quantity: f64,
    pub current_pnl: f64,
    pub current_pnl_pct: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub pattern_entry: Option<PatternEntry>,
}

impl Position {
    /// Signed PnL of this position at `price`.
    pub fn pnl_at(&self, price: f64) -> f64 {
        match self.side {
            Side::Long => (price - self.entry_price) * self.quantity,
            Side::Short => (self.entry_price - price) * self.quantity,
        }
    }

    /// PnL at `price` as a percentage of the entry notional.
    pub fn pnl_pct_at(&self, price: f64) -> f64 {
        let notional = self.entry_price * self.quantity;
        if notional == 0.0 {
            0.0
        } else {
            self.pnl_at(price) / notional * 100.0
        }
    }

    /// Capital committed at entry.
    #[inline]
    pub fn cost(&self) -> f64 {
        self.entry_price * self.quantity
    }
}

/// A settled position. Append-only history, never mutated after creation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClosedPosition {
    pub id: u64,
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: i64,
    pub entry_index: usize,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub pattern_entry: Option<PatternEntry>,
    pub exit_price: f64,
    pub exit_time: i64,
    pub exit_index: usize,
    pub exit_pnl: f64,
    pub exit_pnl_pct: f64,
    pub exit_reason: ExitReason,
}

impl ClosedPosition {
    pub fn from_position(
        p: Position,
        exit_price: f64,
        exit_time: i64,
        exit_index: usize,
        exit_reason: ExitReason,
    ) -> Self {
        let exit_pnl = p.pnl_at(exit_price);
        let exit_pnl_pct = p.pnl_pct_at(exit_price);
        Self {
            id: p.id,
            side: p.side,
            entry_price: p.entry_price,
            entry_time: p.entry_time,
            entry_index: p.entry_index,
            quantity: p.quantity,
            stop_loss: p.stop_loss,
            take_profit: p.take_profit,
            pattern_entry: p.pattern_entry,
            exit_price,
            exit_time,
            exit_index,
            exit_pnl,
            exit_pnl_pct,
            exit_reason,
        }
    }
}

/// An order waiting for price to cross its target level.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingOrder {
    pub id: u64,
    pub side: Side,
    pub kind: OrderKind,
    pub target_price: f64,
    pub quantity: f64,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub created_at_index: usize,
}

impl OrderKind {
    /// Derive the stop/limit variant from the target's relation to the
    /// current price. A target exactly at the current price resolves to
    /// the Stop variant.
    pub fn infer(side: Side, target_price: f64, current_price: f64) -> Self {
        match side {
            Side::Long => {
                if target_price >= current_price {
                    OrderKind::BuyStop
                } else {
                    OrderKind::BuyLimit
                }
            }
            Side::Short => {
                if target_price <= current_price {
                    OrderKind::SellStop
                } else {
                    OrderKind::SellLimit
                }
            }
        }
    }

    /// Whether a close-price move from `prev` to `current` crosses the
    /// target in this order kind's trigger direction.
    pub fn crossed(&self, target: f64, prev: f64, current: f64) -> bool {
        match self {
            // Up-crossing triggers
            OrderKind::BuyStop | OrderKind::SellLimit => prev < target && current >= target,
            // Down-crossing triggers
            OrderKind::BuyLimit | OrderKind::SellStop => prev > target && current <= target,
        }
    }
}

/// The simulated account ledger. Single instance per simulation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Uncommitted cash.
    pub balance: f64,
    /// balance + open-position cost + unrealized PnL.
    pub equity: f64,
    pub initial_balance: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
}

impl Account {
    pub fn new(initial_balance: f64) -> Self {
        Self {
            balance: initial_balance,
            equity: initial_balance,
            initial_balance,
            realized_pnl: 0.0,
            unrealized_pnl: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn position(side: Side, entry: f64, qty: f64) -> Position {
        Position {
            id: 1,
            side,
            entry_price: entry,
            entry_time: 0,
            entry_index: 0,
            quantity: qty,
            current_pnl: 0.0,
            current_pnl_pct: 0.0,
            stop_loss: None,
            take_profit: None,
            pattern_entry: None,
        }
    }

    #[test]
    fn long_pnl_sign() {
        let p = position(Side::Long, 100.0, 2.0);
        assert_eq!(p.pnl_at(110.0), 20.0);
        assert_eq!(p.pnl_at(95.0), -10.0);
    }

    #[test]
    fn short_pnl_sign() {
        let p = position(Side::Short, 100.0, 2.0);
        assert_eq!(p.pnl_at(90.0), 20.0);
        assert_eq!(p.pnl_at(105.0), -10.0);
    }

    #[test]
    fn pnl_pct_relative_to_notional() {
        let p = position(Side::Long, 100.0, 2.0);
        assert!((p.pnl_pct_at(103.0) - 3.0).abs() < 1e-12);
    }

    #[test]
    fn infer_order_kind_by_side_and_level() {
        assert_eq!(OrderKind::infer(Side::Long, 110.0, 100.0), OrderKind::BuyStop);
        assert_eq!(OrderKind::infer(Side::Long, 90.0, 100.0), OrderKind::BuyLimit);
        assert_eq!(OrderKind::infer(Side::Short, 90.0, 100.0), OrderKind::SellStop);
        assert_eq!(OrderKind::infer(Side::Short, 110.0, 100.0), OrderKind::SellLimit);
        // Tie resolves to the stop variant
        assert_eq!(OrderKind::infer(Side::Long, 100.0, 100.0), OrderKind::BuyStop);
    }

    #[test]
    fn crossing_directions() {
        assert!(OrderKind::BuyStop.crossed(110.0, 108.0, 112.0));
        assert!(!OrderKind::BuyStop.crossed(110.0, 112.0, 108.0));
        assert!(OrderKind::BuyLimit.crossed(90.0, 92.0, 88.0));
        assert!(OrderKind::SellStop.crossed(90.0, 92.0, 89.0));
        assert!(OrderKind::SellLimit.crossed(110.0, 109.0, 111.0));
        // Landing exactly on the level counts as a cross
        assert!(OrderKind::BuyStop.crossed(110.0, 108.0, 110.0));
    }

    #[test]
    fn closed_position_carries_exit_fields() {
        let p = position(Side::Long, 100.0, 1.0);
        let c = ClosedPosition::from_position(p, 94.0, 60, 5, ExitReason::StopLoss);
        assert_eq!(c.exit_pnl, -6.0);
        assert_eq!(c.exit_reason, ExitReason::StopLoss);
        assert_eq!(c.exit_index, 5);
    }
}
