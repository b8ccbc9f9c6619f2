//! Static pre-trade checks.

use chrono::{Local, NaiveTime};
use tracing::{info, warn};

use crate::config::RiskSettings;
use crate::error::Result;
use crate::strategy::{Action, TradeSignal};

/// Why a signal was not allowed through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Veto {
    NoSignal,
    Hold,
    SymbolNotAllowed(String),
    MarketClosed,
    SizeTooLarge { size: u32, max: u32 },
}

/// Gates trade signals on symbol, market hours and size.
///
/// Checks run in order: missing signal, `Hold`, symbol allow list, market
/// hours (inclusive, local time), maximum position size.
#[derive(Debug, Clone)]
pub struct RiskManager {
    max_position_size: u32,
    allowed_symbols: Vec<String>,
    market_open: NaiveTime,
    market_close: NaiveTime,
}

impl RiskManager {
    pub fn new(settings: &RiskSettings) -> Result<Self> {
        let (market_open, market_close) = settings.market_window()?;
        Ok(RiskManager {
            max_position_size: settings.max_position_size,
            allowed_symbols: settings.allowed_symbols.clone(),
            market_open,
            market_close,
        })
    }

    pub fn name(&self) -> &'static str {
        "StaticRiskManager"
    }

    /// Evaluates a signal against the local wall clock.
    pub fn is_trade_allowed(&self, signal: Option<&TradeSignal>) -> bool {
        self.is_trade_allowed_at(signal, Local::now().time())
    }

    pub fn is_trade_allowed_at(&self, signal: Option<&TradeSignal>, now: NaiveTime) -> bool {
        match self.check(signal, now) {
            Ok(()) => {
                info!("risk check passed, trade allowed");
                true
            }
            Err(Veto::Hold) => false,
            Err(veto) => {
                warn!(?veto, "risk manager blocked the trade");
                false
            }
        }
    }

    /// Runs the checks and reports the first one that fails.
    pub fn check(&self, signal: Option<&TradeSignal>, now: NaiveTime) -> std::result::Result<(), Veto> {
        let signal = signal.ok_or(Veto::NoSignal)?;

        if signal.action == Action::Hold {
            return Err(Veto::Hold);
        }

        if !self.allowed_symbols.iter().any(|s| s == &signal.symbol) {
            return Err(Veto::SymbolNotAllowed(signal.symbol.clone()));
        }

        if now < self.market_open || now > self.market_close {
            return Err(Veto::MarketClosed);
        }

        if signal.size > self.max_position_size {
            return Err(Veto::SizeTooLarge {
                size: signal.size,
                max: self.max_position_size,
            });
        }

        Ok(())
    }
}
