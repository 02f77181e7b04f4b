use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::models::Side;

#[derive(Error, Debug)]
pub enum LedgerError {
    /// Parallel arrays of one record type diverged; the file must not be
    /// rewritten from this state
    #[error("{kind} history at {path} is inconsistent: {detail}")]
    Inconsistent {
        kind: &'static str,
        path: PathBuf,
        detail: String,
    },

    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to decode {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Encode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl LedgerError {
    /// Only a consistency fault must stop the process
    pub fn is_fatal(&self) -> bool {
        matches!(self, LedgerError::Inconsistent { .. })
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Open,
    Close,
}

/// A record type stored as equal-length parallel arrays
pub trait ParallelSeries: Default + Serialize + DeserializeOwned {
    const KIND: &'static str;

    fn field_lengths(&self) -> Vec<(&'static str, usize)>;

    /// Remove the `n` oldest entries from every field
    fn drop_front(&mut self, n: usize);

    /// Common length of all fields, or a description of the mismatch
    fn checked_len(&self) -> Result<usize, String> {
        let lengths = self.field_lengths();
        let first = lengths.first().map(|(_, len)| *len).unwrap_or(0);
        if lengths.iter().all(|(_, len)| *len == first) {
            Ok(first)
        } else {
            Err(format!("mismatched field lengths {:?}", lengths))
        }
    }

    /// Keep only the most recent `cap` entries
    fn slice(&mut self, cap: usize) -> Result<(), String> {
        let len = self.checked_len()?;
        if len > cap {
            self.drop_front(len - cap);
        }
        Ok(())
    }
}

/// Balance curve: bar time, mid price, bot P/L including open risk
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BalanceHistory {
    #[serde(rename = "X", default)]
    pub x: Vec<i64>,
    #[serde(rename = "Y", default)]
    pub y: Vec<f64>,
    #[serde(rename = "TotalPL", default)]
    pub total_pl: Vec<f64>,
}

impl BalanceHistory {
    pub fn push(&mut self, time: i64, price: f64, balance: f64) {
        self.x.push(time);
        self.y.push(price);
        self.total_pl.push(balance);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

impl ParallelSeries for BalanceHistory {
    const KIND: &'static str = "balance";

    fn field_lengths(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("X", self.x.len()),
            ("Y", self.y.len()),
            ("TotalPL", self.total_pl.len()),
        ]
    }

    fn drop_front(&mut self, n: usize) {
        self.x.drain(..n);
        self.y.drain(..n);
        self.total_pl.drain(..n);
    }
}

/// Executed trades: bar time, mid price, order side, open/close
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TradeHistory {
    #[serde(rename = "X", default)]
    pub x: Vec<i64>,
    #[serde(rename = "Y", default)]
    pub y: Vec<f64>,
    #[serde(rename = "Side", default)]
    pub side: Vec<Side>,
    #[serde(rename = "Action", default)]
    pub action: Vec<TradeAction>,
}

impl TradeHistory {
    pub fn push(&mut self, time: i64, price: f64, side: Side, action: TradeAction) {
        self.x.push(time);
        self.y.push(price);
        self.side.push(side);
        self.action.push(action);
    }

    pub fn len(&self) -> usize {
        self.x.len()
    }

    pub fn is_empty(&self) -> bool {
        self.x.is_empty()
    }
}

impl ParallelSeries for TradeHistory {
    const KIND: &'static str = "trade";

    fn field_lengths(&self) -> Vec<(&'static str, usize)> {
        vec![
            ("X", self.x.len()),
            ("Y", self.y.len()),
            ("Side", self.side.len()),
            ("Action", self.action.len()),
        ]
    }

    fn drop_front(&mut self, n: usize) {
        self.x.drain(..n);
        self.y.drain(..n);
        self.side.drain(..n);
        self.action.drain(..n);
    }
}

/// File-backed, length-capped balance and trade histories
///
/// Every append is a whole-file read-modify-write. A missing file is an
/// empty history.
#[derive(Debug, Clone)]
pub struct HistoryLedger {
    balance_path: PathBuf,
    trade_path: PathBuf,
    capacity: usize,
}

impl HistoryLedger {
    pub fn new(balance_path: impl Into<PathBuf>, trade_path: impl Into<PathBuf>, capacity: usize) -> Self {
        Self {
            balance_path: balance_path.into(),
            trade_path: trade_path.into(),
            capacity: capacity.max(1),
        }
    }

    /// Returns the number of retained balance samples
    pub async fn append_balance_sample(
        &self,
        time: DateTime<Utc>,
        price: f64,
        balance: f64,
    ) -> Result<usize, LedgerError> {
        let history: BalanceHistory = update(&self.balance_path, self.capacity, |h: &mut BalanceHistory| {
            h.push(time.timestamp(), price, balance)
        })
        .await?;
        Ok(history.len())
    }

    /// Returns the number of retained trade samples
    pub async fn append_trade_sample(
        &self,
        time: DateTime<Utc>,
        price: f64,
        side: Side,
        action: TradeAction,
    ) -> Result<usize, LedgerError> {
        let history: TradeHistory = update(&self.trade_path, self.capacity, |h: &mut TradeHistory| {
            h.push(time.timestamp(), price, side, action)
        })
        .await?;
        Ok(history.len())
    }

    pub async fn load_balance(&self) -> Result<BalanceHistory, LedgerError> {
        load(&self.balance_path).await
    }

    pub async fn load_trades(&self) -> Result<TradeHistory, LedgerError> {
        load(&self.trade_path).await
    }
}

async fn update<T, F>(path: &Path, capacity: usize, append: F) -> Result<T, LedgerError>
where
    T: ParallelSeries,
    F: FnOnce(&mut T),
{
    let mut history: T = load(path).await?;
    append(&mut history);
    history.slice(capacity).map_err(|detail| inconsistent::<T>(path, detail))?;
    persist(path, &history).await?;
    Ok(history)
}

/// Read a history file; absence yields an empty history
pub async fn load<T: ParallelSeries>(path: &Path) -> Result<T, LedgerError> {
    let bytes = match tokio::fs::read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(T::default()),
        Err(source) => {
            return Err(LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    };

    let history: T = serde_json::from_slice(&bytes).map_err(|source| LedgerError::Decode {
        path: path.to_path_buf(),
        source,
    })?;

    history
        .checked_len()
        .map_err(|detail| inconsistent::<T>(path, detail))?;

    Ok(history)
}

/// Replace the file contents, retrying once
async fn persist<T: ParallelSeries>(path: &Path, history: &T) -> Result<(), LedgerError> {
    let bytes = serde_json::to_vec_pretty(history).map_err(|source| LedgerError::Encode {
        path: path.to_path_buf(),
        source,
    })?;

    match replace_file(path, &bytes).await {
        Ok(()) => Ok(()),
        Err(e) => {
            tracing::warn!("Writing {} failed ({}), retrying once", path.display(), e);
            replace_file(path, &bytes).await.map_err(|source| LedgerError::Io {
                path: path.to_path_buf(),
                source,
            })
        }
    }
}

async fn replace_file(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    let tmp = PathBuf::from(tmp);

    tokio::fs::write(&tmp, bytes).await?;
    tokio::fs::rename(&tmp, path).await
}

fn inconsistent<T: ParallelSeries>(path: &Path, detail: String) -> LedgerError {
    LedgerError::Inconsistent {
        kind: T::KIND,
        path: path.to_path_buf(),
        detail,
    }
}
