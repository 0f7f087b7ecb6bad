pub mod candle;
pub mod config;
pub mod error;
pub mod pattern;
pub mod trade;

pub use candle::{Candle, CandleSeries};
pub use config::{
    DetectionConfig, DetectorSet, PaperConfig, RetestMatchMode, SimConfig, StrictRetestConfig,
};
pub use error::{Result, SimError};
pub use pattern::{Pattern, PatternKind};
pub use trade::{
    Account, ClosedPosition, ExitReason, OrderKind, PatternEntry, PendingOrder, Position, Side,
};
