use crate::config::Parameters;
use crate::execution::position::PositionView;
use crate::models::{PriceBar, Side};

use super::exits::{check_exit, ExitReason};

/// High/low range of the recent completed bars
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RangeSnapshot {
    /// Extremes of the bar window alone; breakouts are measured against these
    pub high: f64,
    pub low: f64,
    /// Extremes widened with the live price
    pub wrapped_high: f64,
    pub wrapped_low: f64,
}

impl RangeSnapshot {
    /// Returns `None` for an empty window
    pub fn from_bars(bars: &[PriceBar], live: f64) -> Option<Self> {
        if bars.is_empty() {
            return None;
        }

        let high = bars.iter().map(|b| b.high).fold(f64::MIN, f64::max);
        let low = bars.iter().map(|b| b.low).fold(f64::MAX, f64::min);

        Some(Self {
            high,
            low,
            wrapped_high: high.max(live),
            wrapped_low: low.min(live),
        })
    }

    /// `1 - min/max` over the widened range, in `[0, 1]`
    pub fn width(&self) -> f64 {
        if self.wrapped_high <= 0.0 {
            return 0.0;
        }
        (1.0 - self.wrapped_low / self.wrapped_high).clamp(0.0, 1.0)
    }

    /// Buy above the window high, sell below the window low
    pub fn breakout(&self, live: f64) -> Option<Side> {
        if live > self.high {
            Some(Side::Buy)
        } else if live < self.low {
            Some(Side::Sell)
        } else {
            None
        }
    }
}

/// The last `span` completed bars, oldest first
///
/// The second value is false when fewer than `span` completed bars were
/// available.
pub fn completed_window(bars: &[PriceBar], span: usize) -> (Vec<PriceBar>, bool) {
    let complete: Vec<PriceBar> = bars.iter().filter(|b| b.complete).cloned().collect();
    let start = complete.len().saturating_sub(span);
    let window = complete[start..].to_vec();
    let full = window.len() == span;
    (window, full)
}

/// What a frame intends to do before anything is sent to the broker
#[derive(Debug, Clone, PartialEq)]
pub struct TradePlan {
    pub range: RangeSnapshot,
    pub breakout: Option<Side>,
    pub close: Option<ExitReason>,
}

impl TradePlan {
    /// Open in the breakout direction when flat, or once the held
    /// position has actually been closed in this frame
    pub fn should_open(&self, held: bool, closed: bool) -> Option<Side> {
        match self.breakout {
            Some(side) if !held || closed => Some(side),
            _ => None,
        }
    }
}

/// Range breakout with reversal, take-profit and loss-cut exits
#[derive(Debug, Clone)]
pub struct BreakoutStrategy {
    threshold: f64,
    profit_rate: f64,
    loss_rate: f64,
}

impl BreakoutStrategy {
    pub fn new(params: &Parameters) -> Self {
        Self {
            threshold: params.threshold,
            profit_rate: params.profit_rate,
            loss_rate: params.loss_rate,
        }
    }

    pub fn plan(&self, range: RangeSnapshot, live: f64, position: &PositionView) -> TradePlan {
        let breakout = range.breakout(live);
        let held = position.side.entry_side();

        // Reverse only when the range is wide enough to trust the breakout
        let mut close = match (breakout, held) {
            (Some(direction), Some(side)) if direction != side && range.width() > self.threshold => {
                Some(ExitReason::Reversal)
            }
            _ => None,
        };

        if close.is_none() {
            if let Some(side) = held {
                close = check_exit(
                    side,
                    position.average_price,
                    live,
                    self.profit_rate,
                    self.loss_rate,
                );
            }
        }

        TradePlan {
            range,
            breakout,
            close,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::PositionSide;
    use chrono::Utc;

    fn bar(high: f64, low: f64, complete: bool) -> PriceBar {
        PriceBar {
            open_time: Utc::now(),
            open: low,
            high,
            low,
            close: high,
            complete,
        }
    }

    fn window() -> Vec<PriceBar> {
        vec![
            bar(1.10, 1.05, true),
            bar(1.12, 1.04, true),
            bar(1.11, 1.06, true),
        ]
    }

    fn strategy(threshold: f64) -> BreakoutStrategy {
        BreakoutStrategy {
            threshold,
            profit_rate: 0.001,
            loss_rate: 0.001,
        }
    }

    fn held(side: PositionSide, average_price: f64) -> PositionView {
        PositionView {
            side,
            units: 100,
            average_price,
            trade_ids: vec!["42".to_string()],
            unrealized_pl: 0.0,
        }
    }

    #[test]
    fn test_breakout_buy_scenario() {
        let range = RangeSnapshot::from_bars(&window(), 1.13).unwrap();

        assert_eq!(range.breakout(1.13), Some(Side::Buy));
        assert!((range.width() - (1.0 - 1.04 / 1.13)).abs() < 1e-12);
        assert!((range.width() - 0.0796).abs() < 1e-4);
    }

    #[test]
    fn test_breakout_sell_and_none() {
        let range = RangeSnapshot::from_bars(&window(), 1.03).unwrap();
        assert_eq!(range.breakout(1.03), Some(Side::Sell));

        let range = RangeSnapshot::from_bars(&window(), 1.08).unwrap();
        assert_eq!(range.breakout(1.08), None);
        // Touching an extreme is not a breakout
        assert_eq!(range.breakout(1.12), None);
        assert_eq!(range.breakout(1.04), None);
    }

    #[test]
    fn test_width_independent_of_order_and_bounded() {
        let mut bars = window();
        let forward = RangeSnapshot::from_bars(&bars, 1.08).unwrap().width();
        bars.reverse();
        let backward = RangeSnapshot::from_bars(&bars, 1.08).unwrap().width();

        assert_eq!(forward, backward);
        assert!((0.0..=1.0).contains(&forward));

        let zero = RangeSnapshot::from_bars(&[bar(0.0, 0.0, true)], 0.0).unwrap();
        assert_eq!(zero.width(), 0.0);
    }

    #[test]
    fn test_empty_window_has_no_range() {
        assert!(RangeSnapshot::from_bars(&[], 1.0).is_none());
    }

    #[test]
    fn test_completed_window_drops_incomplete_and_trims() {
        let mut bars = window();
        bars.insert(0, bar(1.50, 1.00, true));
        bars.push(bar(2.00, 0.50, false));

        let (selected, full) = completed_window(&bars, 3);

        assert!(full);
        assert_eq!(selected.len(), 3);
        assert_eq!(selected[0].high, 1.10);
        assert!(selected.iter().all(|b| b.complete));
    }

    #[test]
    fn test_completed_window_reports_short_data() {
        let bars = vec![bar(1.10, 1.05, true), bar(1.12, 1.04, false)];
        let (selected, full) = completed_window(&bars, 3);

        assert!(!full);
        assert_eq!(selected.len(), 1);
    }

    #[test]
    fn test_reversal_requires_width_above_threshold() {
        let range = RangeSnapshot::from_bars(&window(), 1.03).unwrap();
        let long = held(PositionSide::Long, 1.03);

        let plan = strategy(0.05).plan(range, 1.03, &long);
        assert_eq!(plan.close, Some(ExitReason::Reversal));

        let plan = strategy(0.5).plan(range, 1.03, &long);
        assert_eq!(plan.close, None);
    }

    #[test]
    fn test_same_direction_breakout_keeps_position() {
        let range = RangeSnapshot::from_bars(&window(), 1.13).unwrap();
        let long = held(PositionSide::Long, 1.13);

        let plan = strategy(0.0).plan(range, 1.13, &long);

        assert_eq!(plan.breakout, Some(Side::Buy));
        assert_eq!(plan.close, None);
        assert_eq!(plan.should_open(true, false), None);
    }

    #[test]
    fn test_take_profit_closes_inside_range() {
        let range = RangeSnapshot::from_bars(&window(), 1.1012).unwrap();
        let long = held(PositionSide::Long, 1.1000);

        let plan = strategy(0.0).plan(range, 1.1012, &long);

        assert_eq!(plan.breakout, None);
        assert_eq!(plan.close, Some(ExitReason::TakeProfit));
    }

    #[test]
    fn test_flat_breakout_opens_without_width_gate() {
        let range = RangeSnapshot::from_bars(&window(), 1.13).unwrap();
        let plan = strategy(0.9).plan(range, 1.13, &PositionView::default());

        assert_eq!(plan.close, None);
        assert_eq!(plan.should_open(false, false), Some(Side::Buy));
    }

    #[test]
    fn test_open_after_close_only_when_closed() {
        let range = RangeSnapshot::from_bars(&window(), 1.03).unwrap();
        let plan = strategy(0.0).plan(range, 1.03, &held(PositionSide::Long, 1.10));

        assert_eq!(plan.should_open(true, true), Some(Side::Sell));
        assert_eq!(plan.should_open(true, false), None);
    }
}
