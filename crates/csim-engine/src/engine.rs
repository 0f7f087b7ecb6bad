use std::collections::HashSet;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use csim_core::{
    Account, Candle, CandleSeries, ClosedPosition, ExitReason, OrderKind, Pattern, PatternEntry,
    PendingOrder, Position, Result, Side, SimError,
};

use crate::stats::Stats;

/// Minimum series length for a meaningful replay.
pub const MIN_CANDLES: usize = 100;

/// How many candles ahead of the cursor a pattern triggers a hint.
const HINT_LOOKAHEAD: usize = 5;

/// Entry-quality scoring: distance from the pattern's expected entry at
/// which the proximity score reaches zero, and the bonus for entering
/// early in the pattern's span.
const ENTRY_QUALITY_FALLOFF_PCT: f64 = 2.0;
const ENTRY_PROXIMITY_POINTS: f64 = 80.0;
const ENTRY_TIMING_BONUS: f64 = 20.0;
const ENTRY_TIMING_WINDOW: f64 = 0.3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GamePhase {
    Active,
    Complete,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Info,
    Warning,
    Hint,
}

/// One human-readable entry in the simulation's feedback log. Delivery to
/// the user is the presentation layer's job; the engine only appends.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub index: usize,
    pub kind: EventKind,
    pub message: String,
}

/// Requested changes to an open position's risk parameters.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditPosition {
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// Requested changes to a pending order.
#[derive(Debug, Clone, Copy, Default)]
pub struct EditOrder {
    pub target_price: Option<f64>,
    pub quantity: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
}

/// One simulation's aggregate state: candle cursor, ledger, open and
/// settled positions, pending orders, statistics, and the feedback log.
///
/// Single-writer: callers must serialize operations per simulation. Every
/// operation either completes fully or returns an error having mutated
/// nothing; `advance_candle` computes its whole settlement plan from a
/// snapshot before committing, so a fault cannot strand equity halfway.
#[derive(Debug, Clone)]
pub struct GameState {
    series: Arc<CandleSeries>,
    patterns: Vec<Pattern>,
    current_index: usize,
    phase: GamePhase,
    pub account: Account,
    pub open_positions: Vec<Position>,
    pub closed_positions: Vec<ClosedPosition>,
    pub pending_orders: Vec<PendingOrder>,
    pub stats: Stats,
    events: Vec<EventRecord>,
    next_id: u64,
    hinted: HashSet<usize>,
}

/// Settlement plan for one candle advance, computed before any mutation.
struct SettlementPlan {
    closes: Vec<(u64, ExitReason)>,
    fills: Vec<u64>,
    failed_fills: Vec<u64>,
}

impl GameState {
    pub fn new(
        series: Arc<CandleSeries>,
        initial_balance: f64,
        patterns: Vec<Pattern>,
    ) -> Result<Self> {
        if series.len() < MIN_CANDLES {
            return Err(SimError::InsufficientData {
                need: MIN_CANDLES,
                got: series.len(),
            });
        }
        if initial_balance <= 0.0 {
            return Err(SimError::InvalidParameter(
                "initial balance must be positive".into(),
            ));
        }
        Ok(Self {
            series,
            patterns,
            current_index: 0,
            phase: GamePhase::Active,
            account: Account::new(initial_balance),
            open_positions: Vec::new(),
            closed_positions: Vec::new(),
            pending_orders: Vec::new(),
            stats: Stats::default(),
            events: Vec::new(),
            next_id: 1,
            hinted: HashSet::new(),
        })
    }

    #[inline]
    pub fn phase(&self) -> GamePhase {
        self.phase
    }

    #[inline]
    pub fn current_index(&self) -> usize {
        self.current_index
    }

    #[inline]
    pub fn current_candle(&self) -> &Candle {
        &self.series[self.current_index]
    }

    pub fn patterns(&self) -> &[Pattern] {
        &self.patterns
    }

    pub fn events(&self) -> &[EventRecord] {
        &self.events
    }

    pub fn series(&self) -> &CandleSeries {
        &self.series
    }

    /// Advance the replay by one candle and settle everything it triggers,
    /// in order: SL/TP closes, pending-order fills, PnL refresh, account
    /// recompute, pattern hints. Positions freed in step one fund orders
    /// filled in step two.
    pub fn advance_candle(&mut self) -> Result<()> {
        if self.phase == GamePhase::Complete {
            return Err(SimError::InvalidState(
                "simulation is already complete".into(),
            ));
        }
        let next = self.current_index + 1;
        if next >= self.series.len() {
            self.phase = GamePhase::Complete;
            return Ok(());
        }

        let prev_close = self.series[self.current_index].close;
        let candle = self.series[next];
        let plan = self.plan_settlement(prev_close, &candle);
        self.commit(next, &candle, plan);

        if next == self.series.len() - 1 {
            self.phase = GamePhase::Complete;
            self.push_event(EventKind::Info, "replay complete".to_string());
        }
        Ok(())
    }

    /// Decide every close and fill against an immutable view of the state.
    fn plan_settlement(&self, prev_close: f64, candle: &Candle) -> SettlementPlan {
        let mut closes = Vec::new();
        let mut freed = 0.0;
        for p in &self.open_positions {
            let reason = match p.side {
                Side::Long => {
                    if p.stop_loss.is_some_and(|sl| candle.close <= sl) {
                        Some(ExitReason::StopLoss)
                    } else if p.take_profit.is_some_and(|tp| candle.close >= tp) {
                        Some(ExitReason::TakeProfit)
                    } else {
                        None
                    }
                }
                Side::Short => {
                    if p.stop_loss.is_some_and(|sl| candle.close >= sl) {
                        Some(ExitReason::StopLoss)
                    } else if p.take_profit.is_some_and(|tp| candle.close <= tp) {
                        Some(ExitReason::TakeProfit)
                    } else {
                        None
                    }
                }
            };
            if let Some(reason) = reason {
                freed += p.cost() + p.pnl_at(candle.close);
                closes.push((p.id, reason));
            }
        }

        // Fill checks run against the balance as it stands after the
        // closes above have credited back.
        let mut available = self.account.balance + freed;
        let mut fills = Vec::new();
        let mut failed_fills = Vec::new();
        for order in &self.pending_orders {
            if !order.kind.crossed(order.target_price, prev_close, candle.close) {
                continue;
            }
            let cost = order.target_price * order.quantity;
            if cost <= available {
                available -= cost;
                fills.push(order.id);
            } else {
                failed_fills.push(order.id);
            }
        }

        SettlementPlan {
            closes,
            fills,
            failed_fills,
        }
    }

    fn commit(&mut self, next: usize, candle: &Candle, plan: SettlementPlan) {
        self.current_index = next;

        for (id, reason) in &plan.closes {
            let Some(idx) = self.open_positions.iter().position(|p| p.id == *id) else {
                continue;
            };
            let position = self.open_positions.remove(idx);
            let credit = position.cost() + position.pnl_at(candle.close);
            let closed = ClosedPosition::from_position(
                position,
                candle.close,
                candle.time,
                next,
                *reason,
            );
            self.account.balance += credit;
            self.account.realized_pnl += closed.exit_pnl;
            self.push_event(
                EventKind::Info,
                format!(
                    "position {} closed by {} at {:.2} (pnl {:+.2})",
                    closed.id,
                    match reason {
                        ExitReason::StopLoss => "stop-loss",
                        ExitReason::TakeProfit => "take-profit",
                        ExitReason::Manual => "manual close",
                    },
                    closed.exit_price,
                    closed.exit_pnl
                ),
            );
            self.stats.record_close(&closed);
            self.closed_positions.push(closed);
        }

        for id in &plan.fills {
            let Some(idx) = self.pending_orders.iter().position(|o| o.id == *id) else {
                continue;
            };
            let order = self.pending_orders.remove(idx);
            let position = Position {
                id: order.id,
                side: order.side,
                entry_price: order.target_price,
                entry_time: candle.time,
                entry_index: next,
                quantity: order.quantity,
                current_pnl: 0.0,
                current_pnl_pct: 0.0,
                stop_loss: order.stop_loss,
                take_profit: order.take_profit,
                pattern_entry: self.pattern_entry_at(next, order.target_price),
            };
            self.account.balance -= position.cost();
            self.stats.record_open();
            self.push_event(
                EventKind::Info,
                format!(
                    "order {} filled at {:.2} (qty {})",
                    position.id, position.entry_price, position.quantity
                ),
            );
            self.open_positions.push(position);
        }

        for id in &plan.failed_fills {
            self.push_event(
                EventKind::Warning,
                format!("order {id} crossed its target but balance is insufficient; left pending"),
            );
        }

        for p in &mut self.open_positions {
            p.current_pnl = p.pnl_at(candle.close);
            p.current_pnl_pct = p.pnl_pct_at(candle.close);
        }
        self.recompute_account();
        self.stats.refresh(&self.account);
        self.emit_hints(next);
    }

    /// Open a position at the current candle's close.
    pub fn open_position(
        &mut self,
        side: Side,
        quantity: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
    ) -> Result<Position> {
        self.require_active()?;
        validate_quantity(quantity)?;
        let candle = *self.current_candle();
        validate_levels(side, candle.close, stop_loss, take_profit)?;
        let cost = candle.close * quantity;
        if cost > self.account.balance {
            return Err(SimError::InsufficientBalance {
                needed: cost,
                available: self.account.balance,
            });
        }

        let position = Position {
            id: self.take_id(),
            side,
            entry_price: candle.close,
            entry_time: candle.time,
            entry_index: self.current_index,
            quantity,
            current_pnl: 0.0,
            current_pnl_pct: 0.0,
            stop_loss,
            take_profit,
            pattern_entry: self.pattern_entry_at(self.current_index, candle.close),
        };
        self.account.balance -= cost;
        self.stats.record_open();
        self.push_event(
            EventKind::Info,
            format!(
                "opened {:?} position {} at {:.2} (qty {})",
                side, position.id, position.entry_price, quantity
            ),
        );
        self.open_positions.push(position.clone());
        self.recompute_account();
        self.stats.refresh(&self.account);
        Ok(position)
    }

    /// Manually close an open position at the current candle's close.
    pub fn close_position(&mut self, position_id: u64) -> Result<ClosedPosition> {
        let idx = self
            .open_positions
            .iter()
            .position(|p| p.id == position_id)
            .ok_or_else(|| SimError::NotFound {
                what: "position",
                id: position_id.to_string(),
            })?;
        let candle = *self.current_candle();
        let position = self.open_positions.remove(idx);
        let credit = position.cost() + position.pnl_at(candle.close);
        let closed = ClosedPosition::from_position(
            position,
            candle.close,
            candle.time,
            self.current_index,
            ExitReason::Manual,
        );
        self.account.balance += credit;
        self.account.realized_pnl += closed.exit_pnl;
        self.stats.record_close(&closed);
        self.closed_positions.push(closed.clone());
        self.recompute_account();
        self.stats.refresh(&self.account);
        self.push_event(
            EventKind::Info,
            format!(
                "position {} closed manually at {:.2} (pnl {:+.2})",
                closed.id, closed.exit_price, closed.exit_pnl
            ),
        );
        Ok(closed)
    }

    /// Place an order that fills when price crosses its target. The cost is
    /// checked against the balance now but only deducted on fill.
    pub fn place_pending_order(
        &mut self,
        side: Side,
        target_price: f64,
        quantity: f64,
        stop_loss: Option<f64>,
        take_profit: Option<f64>,
        kind: Option<OrderKind>,
    ) -> Result<PendingOrder> {
        self.require_active()?;
        validate_quantity(quantity)?;
        if target_price <= 0.0 {
            return Err(SimError::InvalidParameter(
                "target price must be positive".into(),
            ));
        }
        // Levels are judged against the price the order will fill at.
        validate_levels(side, target_price, stop_loss, take_profit)?;
        let cost = target_price * quantity;
        if cost > self.account.balance {
            return Err(SimError::InsufficientBalance {
                needed: cost,
                available: self.account.balance,
            });
        }

        let kind = kind.unwrap_or_else(|| {
            OrderKind::infer(side, target_price, self.current_candle().close)
        });
        let order = PendingOrder {
            id: self.take_id(),
            side,
            kind,
            target_price,
            quantity,
            stop_loss,
            take_profit,
            created_at_index: self.current_index,
        };
        self.push_event(
            EventKind::Info,
            format!(
                "placed {:?} order {} at {:.2} (qty {})",
                kind, order.id, target_price, quantity
            ),
        );
        self.pending_orders.push(order.clone());
        Ok(order)
    }

    pub fn cancel_pending_order(&mut self, order_id: u64) -> Result<()> {
        let idx = self
            .pending_orders
            .iter()
            .position(|o| o.id == order_id)
            .ok_or_else(|| SimError::NotFound {
                what: "order",
                id: order_id.to_string(),
            })?;
        self.pending_orders.remove(idx);
        self.push_event(EventKind::Info, format!("order {order_id} cancelled"));
        Ok(())
    }

    /// Adjust an open position's stop-loss/take-profit. Only positivity is
    /// enforced here; a stop moved past the current close simply triggers
    /// on the next advance.
    pub fn edit_position(&mut self, position_id: u64, edit: EditPosition) -> Result<&Position> {
        validate_level_signs(edit.stop_loss, edit.take_profit)?;
        let position = self
            .open_positions
            .iter_mut()
            .find(|p| p.id == position_id)
            .ok_or_else(|| SimError::NotFound {
                what: "position",
                id: position_id.to_string(),
            })?;
        if let Some(sl) = edit.stop_loss {
            position.stop_loss = Some(sl);
        }
        if let Some(tp) = edit.take_profit {
            position.take_profit = Some(tp);
        }
        Ok(position)
    }

    /// Adjust a pending order; a changed target re-derives its kind.
    pub fn edit_pending_order(&mut self, order_id: u64, edit: EditOrder) -> Result<&PendingOrder> {
        validate_level_signs(edit.stop_loss, edit.take_profit)?;
        if edit.target_price.is_some_and(|t| t <= 0.0) {
            return Err(SimError::InvalidParameter(
                "target price must be positive".into(),
            ));
        }
        if edit.quantity.is_some_and(|q| q <= 0.0) {
            return Err(SimError::InvalidParameter(
                "quantity must be positive".into(),
            ));
        }
        let current_close = self.current_candle().close;
        let order = self
            .pending_orders
            .iter_mut()
            .find(|o| o.id == order_id)
            .ok_or_else(|| SimError::NotFound {
                what: "order",
                id: order_id.to_string(),
            })?;
        if let Some(quantity) = edit.quantity {
            order.quantity = quantity;
        }
        if let Some(target) = edit.target_price {
            order.target_price = target;
            order.kind = OrderKind::infer(order.side, target, current_close);
        }
        if let Some(sl) = edit.stop_loss {
            order.stop_loss = Some(sl);
        }
        if let Some(tp) = edit.take_profit {
            order.take_profit = Some(tp);
        }
        Ok(order)
    }

    fn require_active(&self) -> Result<()> {
        if self.phase == GamePhase::Complete {
            return Err(SimError::InvalidState(
                "simulation is already complete".into(),
            ));
        }
        Ok(())
    }

    fn take_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn recompute_account(&mut self) {
        let committed: f64 = self.open_positions.iter().map(Position::cost).sum();
        let unrealized: f64 = self.open_positions.iter().map(|p| p.current_pnl).sum();
        self.account.unrealized_pnl = unrealized;
        self.account.equity = self.account.balance + committed + unrealized;
    }

    /// Score an entry made at `index`/`price` against the pattern covering
    /// that index, if any.
    fn pattern_entry_at(&self, index: usize, price: f64) -> Option<PatternEntry> {
        let pattern = self.patterns.iter().find(|p| p.contains(index))?;
        let distance_pct = (price - pattern.expected_entry).abs() / pattern.expected_entry * 100.0;
        let proximity = (1.0 - (distance_pct / ENTRY_QUALITY_FALLOFF_PCT).min(1.0))
            * ENTRY_PROXIMITY_POINTS;
        let progress = (index - pattern.start_index) as f64 / pattern.span() as f64;
        let bonus = if progress <= ENTRY_TIMING_WINDOW {
            ENTRY_TIMING_BONUS
        } else {
            0.0
        };
        Some(PatternEntry {
            kind: pattern.kind,
            entry_quality: (proximity + bonus).clamp(0.0, 100.0).round() as u8,
        })
    }

    fn emit_hints(&mut self, index: usize) {
        let mut messages = Vec::new();
        for (i, pattern) in self.patterns.iter().enumerate() {
            if self.hinted.contains(&i) {
                continue;
            }
            if pattern.start_index >= index && pattern.start_index - index <= HINT_LOOKAHEAD {
                self.hinted.insert(i);
                messages.push(format!(
                    "{} forming around candle {}: {}",
                    pattern.kind.label(),
                    pattern.start_index,
                    pattern.hint
                ));
            }
        }
        for message in messages {
            self.push_event(EventKind::Hint, message);
        }
    }

    fn push_event(&mut self, kind: EventKind, message: String) {
        self.events.push(EventRecord {
            index: self.current_index,
            kind,
            message,
        });
    }
}

fn validate_quantity(quantity: f64) -> Result<()> {
    if quantity <= 0.0 || !quantity.is_finite() {
        return Err(SimError::InvalidParameter(
            "quantity must be positive".into(),
        ));
    }
    Ok(())
}

fn validate_level_signs(stop_loss: Option<f64>, take_profit: Option<f64>) -> Result<()> {
    if stop_loss.is_some_and(|v| v <= 0.0) {
        return Err(SimError::InvalidParameter(
            "stop-loss must be positive".into(),
        ));
    }
    if take_profit.is_some_and(|v| v <= 0.0) {
        return Err(SimError::InvalidParameter(
            "take-profit must be positive".into(),
        ));
    }
    Ok(())
}

/// At entry, stops must sit on the losing side of the reference price and
/// take-profits on the winning side, otherwise they would trigger on the
/// very next advance.
fn validate_levels(
    side: Side,
    reference: f64,
    stop_loss: Option<f64>,
    take_profit: Option<f64>,
) -> Result<()> {
    validate_level_signs(stop_loss, take_profit)?;
    let (sl_ok, tp_ok) = match side {
        Side::Long => (
            stop_loss.is_none_or(|sl| sl < reference),
            take_profit.is_none_or(|tp| tp > reference),
        ),
        Side::Short => (
            stop_loss.is_none_or(|sl| sl > reference),
            take_profit.is_none_or(|tp| tp < reference),
        ),
    };
    if !sl_ok {
        return Err(SimError::InvalidParameter(format!(
            "stop-loss must be on the losing side of {reference}"
        )));
    }
    if !tp_ok {
        return Err(SimError::InvalidParameter(format!(
            "take-profit must be on the winning side of {reference}"
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use csim_core::PatternKind;

    /// Build a valid series whose closes follow `closes`, padded with a
    /// flat tail to satisfy the minimum length.
    fn series_from_closes(closes: &[f64]) -> Arc<CandleSeries> {
        let last = *closes.last().unwrap();
        let padded: Vec<f64> = closes
            .iter()
            .copied()
            .chain(std::iter::repeat(last).take(MIN_CANDLES.saturating_sub(closes.len()) + 20))
            .collect();
        let candles: Vec<Candle> = padded
            .iter()
            .enumerate()
            .map(|(i, &close)| Candle {
                time: 1_700_000_000 + i as i64 * 60,
                open: close,
                high: close + 1.0,
                low: (close - 1.0).max(0.01),
                close,
                volume: 1000.0,
            })
            .collect();
        Arc::new(CandleSeries::from_candles(candles).unwrap())
    }

    fn game(closes: &[f64], balance: f64) -> GameState {
        GameState::new(series_from_closes(closes), balance, Vec::new()).unwrap()
    }

    fn assert_equity_identity(state: &GameState) {
        let committed: f64 = state.open_positions.iter().map(Position::cost).sum();
        let expected = state.account.balance + committed + state.account.unrealized_pnl;
        assert!(
            (state.account.equity - expected).abs() < 1e-9,
            "equity {} != balance {} + committed {} + unrealized {}",
            state.account.equity,
            state.account.balance,
            committed,
            state.account.unrealized_pnl
        );
    }

    #[test]
    fn rejects_short_series() {
        let candles: Vec<Candle> = (0..50)
            .map(|i| Candle {
                time: i as i64 * 60 + 1,
                open: 100.0,
                high: 101.0,
                low: 99.0,
                close: 100.0,
                volume: 1.0,
            })
            .collect();
        let series = Arc::new(CandleSeries::from_candles(candles).unwrap());
        let result = GameState::new(series, 10_000.0, Vec::new());
        assert!(matches!(
            result,
            Err(SimError::InsufficientData { need: 100, got: 50 })
        ));
    }

    #[test]
    fn stop_loss_closes_at_trigger_candle_close() {
        // Long qty 1 at 100 with SL 95; series walks down to 94
        let mut state = game(&[100.0, 98.0, 96.0, 94.0], 10_000.0);
        state
            .open_position(Side::Long, 1.0, Some(95.0), None)
            .unwrap();
        for _ in 0..3 {
            state.advance_candle().unwrap();
            assert_equity_identity(&state);
        }
        assert!(state.open_positions.is_empty());
        let closed = &state.closed_positions[0];
        assert_eq!(closed.exit_reason, ExitReason::StopLoss);
        assert_eq!(closed.exit_price, 94.0);
        assert!((closed.exit_pnl - (-6.0)).abs() < 1e-9);
        assert!((state.account.balance - 9_994.0).abs() < 1e-9);
    }

    #[test]
    fn take_profit_closes_long() {
        let mut state = game(&[100.0, 103.0, 106.0], 10_000.0);
        state
            .open_position(Side::Long, 2.0, Some(90.0), Some(105.0))
            .unwrap();
        state.advance_candle().unwrap(); // 103, no trigger
        assert_eq!(state.open_positions.len(), 1);
        state.advance_candle().unwrap(); // 106 >= tp
        let closed = &state.closed_positions[0];
        assert_eq!(closed.exit_reason, ExitReason::TakeProfit);
        assert_eq!(closed.exit_price, 106.0);
        assert!((closed.exit_pnl - 12.0).abs() < 1e-9);
    }

    #[test]
    fn short_stop_loss_mirrored() {
        let mut state = game(&[100.0, 104.0, 108.0], 10_000.0);
        state
            .open_position(Side::Short, 1.0, Some(105.0), None)
            .unwrap();
        state.advance_candle().unwrap(); // 104 < 105, safe
        state.advance_candle().unwrap(); // 108 >= 105 triggers
        let closed = &state.closed_positions[0];
        assert_eq!(closed.exit_reason, ExitReason::StopLoss);
        assert!((closed.exit_pnl - (-8.0)).abs() < 1e-9);
    }

    #[test]
    fn buy_stop_fills_at_target_not_close() {
        // Close crosses 110 between 108 and 112; fill must be at 110
        let mut state = game(&[100.0, 104.0, 108.0, 112.0], 10_000.0);
        state
            .place_pending_order(Side::Long, 110.0, 1.0, None, None, None)
            .unwrap();
        assert_eq!(state.pending_orders[0].kind, OrderKind::BuyStop);
        for _ in 0..3 {
            state.advance_candle().unwrap();
            assert_equity_identity(&state);
        }
        assert!(state.pending_orders.is_empty());
        let position = &state.open_positions[0];
        assert_eq!(position.entry_price, 110.0);
        assert_eq!(position.entry_index, 3);
        // Unrealized PnL reflects the 112 close against the 110 entry
        assert!((position.current_pnl - 2.0).abs() < 1e-9);
    }

    #[test]
    fn buy_limit_fills_on_down_cross() {
        let mut state = game(&[100.0, 96.0, 92.0], 10_000.0);
        state
            .place_pending_order(Side::Long, 95.0, 1.0, None, None, None)
            .unwrap();
        assert_eq!(state.pending_orders[0].kind, OrderKind::BuyLimit);
        state.advance_candle().unwrap(); // 100 -> 96, no cross of 95
        assert_eq!(state.pending_orders.len(), 1);
        state.advance_candle().unwrap(); // 96 -> 92 crosses down
        assert!(state.pending_orders.is_empty());
        assert_eq!(state.open_positions[0].entry_price, 95.0);
    }

    #[test]
    fn sl_freed_balance_funds_same_candle_fill() {
        // Short A's stop-loss and the buy-stop's cross land on the same
        // candle; the fill can only succeed because the close settles
        // first and frees its entry cost.
        let mut state = game(&[100.0, 110.5], 310.0);
        state
            .open_position(Side::Short, 2.0, Some(101.0), None)
            .unwrap(); // balance 110
        state
            .place_pending_order(Side::Long, 110.0, 1.0, None, None, None)
            .unwrap();
        state.open_position(Side::Long, 1.0, None, None).unwrap(); // balance 10

        state.advance_candle().unwrap();
        assert_equity_identity(&state);

        // Short closed by SL at 110.5 (pnl -21, credit 179)
        let closed = &state.closed_positions[0];
        assert_eq!(closed.exit_reason, ExitReason::StopLoss);
        assert!((closed.exit_pnl - (-21.0)).abs() < 1e-9);

        // The freed 179 funded the 110 fill
        assert!(state.pending_orders.is_empty());
        let filled = state
            .open_positions
            .iter()
            .find(|p| p.entry_price == 110.0)
            .expect("order should have filled");
        assert_eq!(filled.side, Side::Long);
        assert!((state.account.balance - 79.0).abs() < 1e-9);
    }

    #[test]
    fn unfunded_fill_stays_pending_with_warning() {
        // Order is affordable at placement but the balance is drained by a
        // later open; when it crosses it must stay pending with a warning.
        let mut state = game(&[100.0, 112.0], 210.0);
        state
            .place_pending_order(Side::Long, 110.0, 1.0, None, None, None)
            .unwrap();
        state.open_position(Side::Long, 2.0, None, None).unwrap(); // balance 10
        state.advance_candle().unwrap();
        assert_eq!(state.pending_orders.len(), 1);
        assert!(state
            .events()
            .iter()
            .any(|e| matches!(e.kind, EventKind::Warning)));
    }

    #[test]
    fn scenario_three_closed_trades() {
        let closes = [1000.0, 1200.0, 1100.0, 1150.0];
        let mut state = game(&closes, 10_000.0);

        let a = state.open_position(Side::Long, 1.0, None, None).unwrap().id;
        state.advance_candle().unwrap(); // 1200
        state.close_position(a).unwrap(); // +200

        let b = state.open_position(Side::Long, 1.0, None, None).unwrap().id;
        state.advance_candle().unwrap(); // 1100
        state.close_position(b).unwrap(); // -100

        let c = state.open_position(Side::Long, 1.0, None, None).unwrap().id;
        state.advance_candle().unwrap(); // 1150
        state.close_position(c).unwrap(); // +50

        assert_equity_identity(&state);
        assert_eq!(state.stats.total_trades, 3);
        assert_eq!(state.stats.winning_trades, 2);
        assert!((state.stats.win_rate - 66.666_666_666_666_67).abs() < 1e-9);
        assert!((state.stats.profit_factor - 1.25).abs() < 1e-9);
        assert!((state.account.realized_pnl - 150.0).abs() < 1e-9);
        assert!((state.account.balance - 10_150.0).abs() < 1e-9);
    }

    #[test]
    fn open_position_rejects_insufficient_balance() {
        let mut state = game(&[100.0], 50.0);
        let err = state.open_position(Side::Long, 1.0, None, None);
        assert!(matches!(err, Err(SimError::InsufficientBalance { .. })));
        assert!(state.open_positions.is_empty());
        assert_eq!(state.stats.total_trades, 0);
    }

    #[test]
    fn close_unknown_position_is_not_found() {
        let mut state = game(&[100.0], 10_000.0);
        assert!(matches!(
            state.close_position(99),
            Err(SimError::NotFound { what: "position", .. })
        ));
    }

    #[test]
    fn advance_after_complete_is_invalid_state() {
        let mut state = game(&[100.0], 10_000.0);
        while state.phase() != GamePhase::Complete {
            state.advance_candle().unwrap();
        }
        assert!(matches!(
            state.advance_candle(),
            Err(SimError::InvalidState(_))
        ));
    }

    #[test]
    fn edit_position_sets_levels() {
        let mut state = game(&[100.0, 101.0], 10_000.0);
        let id = state.open_position(Side::Long, 1.0, None, None).unwrap().id;
        state
            .edit_position(
                id,
                EditPosition {
                    stop_loss: Some(95.0),
                    take_profit: Some(120.0),
                },
            )
            .unwrap();
        let p = &state.open_positions[0];
        assert_eq!(p.stop_loss, Some(95.0));
        assert_eq!(p.take_profit, Some(120.0));
    }

    #[test]
    fn edit_order_target_rederives_kind() {
        let mut state = game(&[100.0, 101.0], 10_000.0);
        let id = state
            .place_pending_order(Side::Long, 110.0, 1.0, None, None, None)
            .unwrap()
            .id;
        assert_eq!(state.pending_orders[0].kind, OrderKind::BuyStop);
        state
            .edit_pending_order(
                id,
                EditOrder {
                    target_price: Some(90.0),
                    ..EditOrder::default()
                },
            )
            .unwrap();
        assert_eq!(state.pending_orders[0].kind, OrderKind::BuyLimit);
        assert_eq!(state.pending_orders[0].target_price, 90.0);
    }

    #[test]
    fn cancel_removes_order() {
        let mut state = game(&[100.0], 10_000.0);
        let id = state
            .place_pending_order(Side::Short, 90.0, 1.0, None, None, None)
            .unwrap()
            .id;
        assert_eq!(state.pending_orders[0].kind, OrderKind::SellStop);
        state.cancel_pending_order(id).unwrap();
        assert!(state.pending_orders.is_empty());
        assert!(matches!(
            state.cancel_pending_order(id),
            Err(SimError::NotFound { what: "order", .. })
        ));
    }

    #[test]
    fn pattern_entry_scores_quality_and_timing() {
        let series = series_from_closes(&[100.0; 4]);
        let pattern = Pattern {
            kind: PatternKind::Breakout,
            start_index: 0,
            end_index: 19,
            expected_entry: 100.0,
            expected_exit: 104.0,
            stop_loss: 98.0,
            quality: 80,
            description: String::new(),
            hint: String::new(),
        };
        let mut state = GameState::new(series, 10_000.0, vec![pattern]).unwrap();
        let p = state.open_position(Side::Long, 1.0, None, None).unwrap();
        let entry = p.pattern_entry.expect("entry inside pattern span");
        assert_eq!(entry.kind, PatternKind::Breakout);
        // Exact price match + first-30% timing bonus = full score
        assert_eq!(entry.entry_quality, 100);
    }

    #[test]
    fn upcoming_pattern_hinted_once() {
        let series = series_from_closes(&[100.0; 4]);
        let pattern = Pattern {
            kind: PatternKind::Flag,
            start_index: 4,
            end_index: 27,
            expected_entry: 100.0,
            expected_exit: 104.0,
            stop_loss: 98.0,
            quality: 80,
            description: String::new(),
            hint: "watch the flag".into(),
        };
        let mut state = GameState::new(series, 10_000.0, vec![pattern]).unwrap();
        state.advance_candle().unwrap();
        state.advance_candle().unwrap();
        let hints = state
            .events()
            .iter()
            .filter(|e| matches!(e.kind, EventKind::Hint))
            .count();
        assert_eq!(hints, 1);
    }

    #[test]
    fn equity_identity_through_full_replay() {
        let closes: Vec<f64> = (0..30).map(|i| 100.0 + (i % 7) as f64).collect();
        let mut state = game(&closes, 10_000.0);
        state
            .open_position(Side::Long, 3.0, Some(95.0), Some(120.0))
            .unwrap();
        state
            .place_pending_order(Side::Short, 99.0, 1.0, None, None, None)
            .unwrap();
        while state.phase() == GamePhase::Active {
            state.advance_candle().unwrap();
            assert_equity_identity(&state);
        }
    }
}
