use thiserror::Error;

use crate::models::{PositionSide, PositionSnapshot, Side};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum PositionError {
    /// The account is expected to be non-hedging; both sides holding units
    /// means broker state cannot be mapped to a single position
    #[error("both sides hold units (long {long}, short {short}); refusing to pick one")]
    Hedged { long: i64, short: i64 },
}

/// Simplified single-sided view of the broker position
#[derive(Debug, Clone, PartialEq, Default)]
pub struct PositionView {
    pub side: PositionSide,
    pub units: u64,
    pub average_price: f64,
    pub trade_ids: Vec<String>,
    pub unrealized_pl: f64,
}

impl PositionView {
    pub fn reconcile(snapshot: &PositionSnapshot) -> Result<Self, PositionError> {
        let long = &snapshot.long;
        let short = &snapshot.short;

        if long.units != 0 && short.units != 0 {
            return Err(PositionError::Hedged {
                long: long.units,
                short: short.units,
            });
        }

        let (side, holding) = if long.units > 0 {
            (PositionSide::Long, long)
        } else if short.units < 0 {
            (PositionSide::Short, short)
        } else {
            return Ok(Self {
                unrealized_pl: snapshot.unrealized_pl,
                ..Default::default()
            });
        };

        Ok(Self {
            side,
            units: holding.units.unsigned_abs(),
            average_price: holding.average_price,
            trade_ids: holding.trade_ids.clone(),
            unrealized_pl: holding.unrealized_pl,
        })
    }

    pub fn has_position(&self) -> bool {
        self.side != PositionSide::Flat && self.units > 0
    }

    pub fn units(&self) -> u64 {
        if self.has_position() {
            self.units
        } else {
            0
        }
    }

    /// Trade ids of the held side joined by comma, empty when flat
    pub fn ids(&self) -> String {
        self.trade_ids.join(",")
    }

    /// Order side that would flatten the position
    pub fn closing_side(&self) -> Option<Side> {
        self.side.entry_side().map(Side::opposite)
    }
}
