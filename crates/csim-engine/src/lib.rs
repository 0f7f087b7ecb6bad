//! Candle-by-candle replay engine: account ledger, position and
//! pending-order settlement, performance statistics, and a keyed store
//! for running many simulations side by side.

pub mod engine;
pub mod stats;
pub mod store;

pub use engine::{EditOrder, EditPosition, EventKind, EventRecord, GamePhase, GameState};
pub use stats::Stats;
pub use store::{InMemoryStore, SimStore};
