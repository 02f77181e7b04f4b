// Trading strategy module
pub mod breakout;
pub mod exits;

pub use breakout::{completed_window, BreakoutStrategy, RangeSnapshot, TradePlan};
pub use exits::{check_exit, ExitReason};
