//! The polling loop: prices → signal → risk gate → order.

use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};

use crate::config::BotSettings;
use crate::error::Result;
use crate::risk::RiskManager;
use crate::strategy::{EmaCrossover, TradeSignal};

/// Supplies the closing-price series the strategy runs on.
pub trait MarketData {
    /// Oldest first.
    fn latest_prices(&self, symbol: &str) -> impl Future<Output = Result<Vec<f64>>> + Send;
}

/// Turns an approved signal into an order at the brokerage.
pub trait OrderExecutor {
    fn execute(&self, signal: &TradeSignal) -> impl Future<Output = Result<Value>> + Send;
}

/// Counters reported when the loop exits.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunSummary {
    pub iterations: u64,
    pub empty_polls: u64,
    pub signals: u64,
    pub vetoed: u64,
    pub orders_placed: u64,
    pub orders_failed: u64,
}

pub struct Bot<M, E> {
    strategy: EmaCrossover,
    risk: RiskManager,
    market_data: M,
    executor: E,
    settings: BotSettings,
}

impl<M: MarketData, E: OrderExecutor> Bot<M, E> {
    pub fn new(
        strategy: EmaCrossover,
        risk: RiskManager,
        market_data: M,
        executor: E,
        settings: BotSettings,
    ) -> Self {
        Bot {
            strategy,
            risk,
            market_data,
            executor,
            settings,
        }
    }

    /// Runs until `shutdown` is set. Sleeps are cut short by the flag.
    pub async fn run(&mut self, shutdown: Arc<AtomicBool>) -> RunSummary {
        info!(
            symbol = %self.settings.symbol,
            strategy = self.strategy.name(),
            risk = self.risk.name(),
            "starting trading loop"
        );
        let mut summary = RunSummary::default();
        let poll = Duration::from_millis(self.settings.poll_interval_ms);
        let retry = Duration::from_millis(self.settings.retry_delay_ms);

        while !shutdown.load(Ordering::SeqCst) {
            summary.iterations += 1;

            let prices = match self.market_data.latest_prices(&self.settings.symbol).await {
                Ok(prices) if !prices.is_empty() => prices,
                Ok(_) => {
                    warn!("no market data available, retrying");
                    summary.empty_polls += 1;
                    pause(retry, &shutdown).await;
                    continue;
                }
                Err(e) => {
                    warn!(error = %e, "failed to fetch market data, retrying");
                    summary.empty_polls += 1;
                    pause(retry, &shutdown).await;
                    continue;
                }
            };

            let signal =
                self.strategy
                    .generate_signal(&self.settings.symbol, &prices, self.settings.order_size);

            if let Some(signal) = &signal {
                summary.signals += 1;
                info!(
                    action = %signal.action,
                    price = signal.price,
                    fast_ema = signal.fast_ema,
                    slow_ema = signal.slow_ema,
                    "strategy signal"
                );

                if self.risk.is_trade_allowed(Some(signal)) {
                    match self.executor.execute(signal).await {
                        Ok(_) => {
                            summary.orders_placed += 1;
                            info!(symbol = %signal.symbol, action = %signal.action, size = signal.size, "order placed");
                        }
                        Err(e) => {
                            summary.orders_failed += 1;
                            error!(symbol = %signal.symbol, error = %e, "failed to place order");
                        }
                    }
                } else {
                    summary.vetoed += 1;
                }
            }

            pause(poll, &shutdown).await;
        }

        info!(?summary, "shutting down trading loop gracefully");
        summary
    }
}

const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

async fn pause(duration: Duration, shutdown: &AtomicBool) {
    let deadline = Instant::now() + duration;
    while !shutdown.load(Ordering::SeqCst) {
        let now = Instant::now();
        if now >= deadline {
            break;
        }
        sleep((deadline - now).min(SHUTDOWN_POLL)).await;
    }
}
