// Bounded JSON history files used for reporting
pub mod history;
pub mod report;

pub use history::{
    BalanceHistory, HistoryLedger, LedgerError, ParallelSeries, TradeAction, TradeHistory,
};
pub use report::LedgerSummary;
