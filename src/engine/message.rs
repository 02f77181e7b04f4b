use chrono::{DateTime, Utc};
use std::fmt;

use crate::models::PositionSide;

const BOT_NAME: &str = "fxbot";
const BOT_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Status post built once per frame
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationMessage {
    pub time: DateTime<Utc>,
    pub units: i64,
    pub side: PositionSide,
    /// Realized P/L of the position closed in this frame
    pub realized_pl: f64,
    pub unrealized_pl: f64,
    /// Account balance minus the starting balance
    pub total_pl: f64,
    pub tags: String,
    pub opened: bool,
    pub closed: bool,
}

impl NotificationMessage {
    pub fn new(instrument: &str, time: DateTime<Utc>) -> Self {
        Self {
            time,
            units: 0,
            side: PositionSide::Flat,
            realized_pl: 0.0,
            unrealized_pl: 0.0,
            total_pl: 0.0,
            tags: format!("#FX #{}", instrument),
            opened: false,
            closed: false,
        }
    }

    pub fn headline(&self) -> Option<&'static str> {
        match (self.opened, self.closed) {
            (true, true) => Some("Closed a position and opened a new one"),
            (false, true) => Some("Closed a position"),
            (true, false) => Some("Opened a position"),
            (false, false) => None,
        }
    }
}

impl fmt::Display for NotificationMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // P/L figures are shown as whole units of account currency
        writeln!(f, "[{}]", self.time.format("%Y-%m-%d %H:%M"))?;
        writeln!(f, "🤖 {}@v{} 🤖", BOT_NAME, BOT_VERSION)?;
        writeln!(f, "✅ Realized P/L  : {}", self.realized_pl as i64)?;
        writeln!(f, "📊 Unrealized P/L: {}", self.unrealized_pl as i64)?;
        writeln!(f, "📦 Units         : {} ({})", self.units, self.side)?;
        writeln!(f, "💰 Total P/L     : {}", self.total_pl as i64)?;
        if let Some(headline) = self.headline() {
            writeln!(f)?;
            writeln!(f, "{}", headline)?;
            writeln!(f)?;
        }
        write!(f, "{}", self.tags)
    }
}
