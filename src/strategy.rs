//! Two-EMA crossover signal generation.

use serde::Serialize;
use std::fmt;
use ta::indicators::ExponentialMovingAverage as Ema;
use ta::Next;
use tracing::debug;

use crate::config::StrategySettings;
use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Action {
    Buy,
    Sell,
    Hold,
}

impl Action {
    /// Brokerage spelling (`BUY`, `SELL`, `HOLD`).
    pub fn as_str(self) -> &'static str {
        match self {
            Action::Buy => "BUY",
            Action::Sell => "SELL",
            Action::Hold => "HOLD",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Output of one strategy evaluation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TradeSignal {
    pub symbol: String,
    pub action: Action,
    /// Last price of the series.
    pub price: f64,
    pub fast_ema: f64,
    pub slow_ema: f64,
    /// Requested number of shares.
    pub size: u32,
}

#[derive(Debug, Clone)]
pub struct EmaCrossover {
    fast_period: usize,
    slow_period: usize,
    last_action: Option<Action>,
}

impl EmaCrossover {
    pub fn new(fast_period: usize, slow_period: usize) -> Result<Self> {
        if fast_period == 0 || fast_period >= slow_period {
            return Err(Error::Strategy(format!(
                "EMA periods must satisfy 0 < fast ({}) < slow ({})",
                fast_period, slow_period
            )));
        }
        Ok(EmaCrossover {
            fast_period,
            slow_period,
            last_action: None,
        })
    }

    pub fn from_settings(settings: &StrategySettings) -> Result<Self> {
        Self::new(settings.fast_period, settings.slow_period)
    }

    pub fn name(&self) -> &'static str {
        "EmaCrossover"
    }

    /// The most recent `Buy` or `Sell` produced, if any.
    pub fn last_action(&self) -> Option<Action> {
        self.last_action
    }

    /// Evaluates a series of closing prices, oldest first.
    ///
    /// Returns `None` until at least `slow_period` prices are available.
    pub fn generate_signal(&mut self, symbol: &str, prices: &[f64], size: u32) -> Option<TradeSignal> {
        if prices.len() < self.slow_period {
            debug!(
                have = prices.len(),
                need = self.slow_period,
                "not enough data to compute EMAs"
            );
            return None;
        }

        let fast = ema_series(self.fast_period, prices)?;
        let slow = ema_series(self.slow_period, prices)?;
        let n = prices.len();
        let (fast_prev, fast_last) = (fast[n - 2], fast[n - 1]);
        let (slow_prev, slow_last) = (slow[n - 2], slow[n - 1]);

        let action = if fast_prev < slow_prev && fast_last > slow_last {
            // fast line just crossed above the slow line
            Action::Buy
        } else if fast_prev > slow_prev && fast_last < slow_last {
            Action::Sell
        } else {
            Action::Hold
        };

        if action != Action::Hold {
            self.last_action = Some(action);
        }

        Some(TradeSignal {
            symbol: symbol.to_string(),
            action,
            price: prices[n - 1],
            fast_ema: fast_last,
            slow_ema: slow_last,
            size,
        })
    }
}

/// EMA over the whole series, seeded with the first value, `k = 2 / (period + 1)`.
fn ema_series(period: usize, prices: &[f64]) -> Option<Vec<f64>> {
    let mut ema = Ema::new(period).ok()?;
    Some(prices.iter().map(|p| ema.next(*p)).collect())
}
