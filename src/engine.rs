use chrono::{DateTime, Datelike, FixedOffset, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::{debug, warn};

use crate::balances::{BALANCE_EPSILON, Balances, is_flat};
use crate::hardfork::{HardForkRegistry, HardForkState};
use crate::ledger::TradeLedger;
use crate::model::{JPY, NormalizedTransaction, TxKind, hours_offset};
use crate::oracle::{FairValueOracle, FairValueQuery, OracleError};
use crate::report::YearReport;
use crate::rounding::RoundingTable;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("market `{market}` is not valid for a {kind} row")]
    MalformedMarket { kind: TxKind, market: String },

    #[error("fair value lookup failed: {0}")]
    Oracle(#[from] OracleError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}

/// An [`EngineError`] tagged with the row that raised it.
#[derive(Debug, Error)]
#[error("row {index} ({timestamp}, {kind}, {exchange}) failed: {source}")]
pub struct ReplayError {
    pub index: usize,
    pub timestamp: DateTime<Utc>,
    pub kind: TxKind,
    pub exchange: String,
    #[source]
    pub source: EngineError,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EngineState {
    pub balances: Balances,
    /// JPY per unit, one running average per asset across all wallets.
    pub acq_costs: BTreeMap<String, Decimal>,
    pub profit_by_year: BTreeMap<i32, Decimal>,
    pub total_fiat_deposited: Decimal,
    pub hard_forks: HardForkState,
}

impl EngineState {
    pub fn acq_cost(&self, asset: &str) -> Decimal {
        self.acq_costs.get(asset).copied().unwrap_or_default()
    }

    pub fn profit_for(&self, year: i32) -> Decimal {
        self.profit_by_year.get(&year).copied().unwrap_or_default()
    }

    pub fn total_profit(&self) -> Decimal {
        self.profit_by_year.values().copied().sum()
    }

    /// Σ total × acquisition cost over every non-JPY asset.
    pub fn holdings_value(&self) -> Decimal {
        self.balances
            .assets()
            .filter(|a| *a != JPY)
            .map(|a| self.balances.total(a) * self.acq_cost(a))
            .sum()
    }
}

#[derive(Debug)]
pub struct EngineSettings {
    pub rounding: RoundingTable,
    pub forks: HardForkRegistry,
    /// Offset whose calendar year a row's profit is booked to.
    pub tax_offset: FixedOffset,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            rounding: RoundingTable::default(),
            forks: HardForkRegistry::default(),
            tax_offset: hours_offset(9),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReplayOutcome {
    pub state: EngineState,
    /// Input rows in replay order, with `profit` and `total_profit` filled in.
    pub ledger: Vec<NormalizedTransaction>,
    pub years: Vec<YearReport>,
}

pub struct CostBasisEngine<O> {
    oracle: O,
    settings: EngineSettings,
    state: EngineState,
}

impl<O: FairValueOracle> CostBasisEngine<O> {
    pub fn new(oracle: O, settings: EngineSettings) -> Self {
        Self {
            oracle,
            settings,
            state: EngineState::default(),
        }
    }

    pub fn tax_year(&self, at: DateTime<Utc>) -> i32 {
        at.with_timezone(&self.settings.tax_offset).year()
    }

    pub fn replay(mut self, ledger: TradeLedger) -> Result<ReplayOutcome, ReplayError> {
        let mut rows = ledger.into_rows();
        let mut years = Vec::new();
        let mut open_year: Option<i32> = None;

        for (index, tx) in rows.iter_mut().enumerate() {
            let year = self.tax_year(tx.timestamp);
            match open_year {
                Some(prev) if prev != year => {
                    years.push(YearReport::snapshot(prev, &self.state));
                }
                _ => {}
            }
            open_year = Some(year);

            let before = self.state.profit_for(year);
            self.settings.forks.apply(
                tx.timestamp,
                &mut self.state.balances,
                &mut self.state.hard_forks,
            );
            self.process(tx, year).map_err(|source| ReplayError {
                index,
                timestamp: tx.timestamp,
                kind: tx.kind,
                exchange: tx.exchange.clone(),
                source,
            })?;
            tx.profit = self.state.profit_for(year) - before;
            tx.total_profit = self.state.total_profit();

            debug!(
                index,
                kind = %tx.kind,
                market = %tx.market,
                exchange = %tx.exchange,
                profit = %tx.profit,
                "row applied"
            );
        }

        if let Some(year) = open_year {
            years.push(YearReport::snapshot(year, &self.state));
        }

        Ok(ReplayOutcome {
            state: self.state,
            ledger: rows,
            years,
        })
    }

    fn process(&mut self, tx: &NormalizedTransaction, year: i32) -> Result<(), EngineError> {
        match tx.kind {
            TxKind::Ask => self.ask(tx),
            TxKind::Bid => self.bid(tx, year),
            TxKind::Purchase => self.purchase(tx),
            TxKind::Deposit | TxKind::Receive => self.deposit(tx),
            TxKind::Withdraw | TxKind::Send => self.withdraw(tx),
            TxKind::Fee => self.fee(tx),
            TxKind::Ico => self.ico(tx, year),
        }
    }

    fn ask(&mut self, tx: &NormalizedTransaction) -> Result<(), EngineError> {
        let quote = quote_of(tx)?;
        let asset = tx.market.base.as_str();
        let gross = tx.price * tx.amount;

        let unit_value = if quote == JPY {
            let jpy = self
                .settings
                .rounding
                .for_exchange(&tx.exchange)
                .round_debit(gross);
            self.debit(JPY, &tx.exchange, jpy);
            tx.price
        } else {
            let fair = self.fair_value(tx.timestamp, asset, &tx.exchange)?;
            self.debit(quote, &tx.exchange, gross);
            fair
        };

        self.absorb(asset, unit_value, tx.amount)?;
        self.credit(asset, &tx.exchange, tx.amount - tx.cost);
        Ok(())
    }

    fn bid(&mut self, tx: &NormalizedTransaction, year: i32) -> Result<(), EngineError> {
        let quote = quote_of(tx)?;
        let asset = tx.market.base.as_str();
        let proceeds = tx.price * tx.amount;

        let unit_value = if quote == JPY {
            let jpy = self
                .settings
                .rounding
                .for_exchange(&tx.exchange)
                .round_credit(proceeds);
            self.credit(JPY, &tx.exchange, jpy - tx.cost);
            tx.price
        } else {
            let fair = self.fair_value(tx.timestamp, asset, &tx.exchange)?;
            let quote_fair = self.fair_value(tx.timestamp, quote, &tx.exchange)?;
            self.absorb(quote, quote_fair, proceeds)?;
            self.credit(quote, &tx.exchange, proceeds - tx.cost);
            fair
        };

        let gain = (unit_value - self.state.acq_cost(asset)) * tx.amount;
        self.realize(year, gain);
        self.debit(asset, &tx.exchange, tx.amount);
        Ok(())
    }

    fn purchase(&mut self, tx: &NormalizedTransaction) -> Result<(), EngineError> {
        if tx.market.quote.as_deref().is_some_and(|q| q != JPY) {
            return Err(malformed(tx));
        }
        let asset = tx.market.base.as_str();
        let unit_value = if !tx.price.is_zero() {
            tx.price
        } else if !tx.amount.is_zero() {
            tx.cost / tx.amount
        } else {
            return Err(EngineError::InvariantViolation(format!(
                "purchase of {asset} with zero price and zero amount"
            )));
        };

        self.state.total_fiat_deposited += tx.cost;
        self.absorb(asset, unit_value, tx.amount)?;
        self.credit(asset, &tx.exchange, tx.amount);
        Ok(())
    }

    fn deposit(&mut self, tx: &NormalizedTransaction) -> Result<(), EngineError> {
        let asset = bare_asset(tx)?;
        let net = tx.amount - tx.cost;
        self.credit(asset, &tx.exchange, net);
        if asset == JPY {
            self.state.total_fiat_deposited += net;
        }
        Ok(())
    }

    fn withdraw(&mut self, tx: &NormalizedTransaction) -> Result<(), EngineError> {
        let asset = bare_asset(tx)?;
        let gross = tx.amount + tx.cost;
        self.debit(asset, &tx.exchange, gross);
        if asset == JPY {
            self.state.total_fiat_deposited -= gross;
        }
        Ok(())
    }

    fn fee(&mut self, tx: &NormalizedTransaction) -> Result<(), EngineError> {
        let asset = bare_asset(tx)?;
        self.debit(asset, &tx.exchange, tx.amount);
        Ok(())
    }

    /// Market is `target_source`; `price` is the source quantity spent and
    /// `amount` the target quantity allotted.
    fn ico(&mut self, tx: &NormalizedTransaction, year: i32) -> Result<(), EngineError> {
        let source = quote_of(tx)?;
        let target = tx.market.base.as_str();
        if tx.amount.is_zero() {
            return Err(EngineError::InvariantViolation(format!(
                "ico allotment of {target} is zero"
            )));
        }

        let source_fair = self.fair_value(tx.timestamp, source, &tx.exchange)?;
        self.debit(source, &tx.exchange, tx.price);
        self.state
            .acq_costs
            .insert(target.to_string(), source_fair * tx.price / tx.amount);

        let gain = (source_fair - self.state.acq_cost(source)) * tx.price;
        self.realize(year, gain);
        Ok(())
    }

    fn fair_value(
        &mut self,
        at: DateTime<Utc>,
        asset: &str,
        exchange: &str,
    ) -> Result<Decimal, EngineError> {
        if asset == JPY {
            return Ok(Decimal::ONE);
        }
        Ok(self.oracle.price(at, asset, exchange)?)
    }

    /// Folds `qty` units valued at `unit_value` into the asset's running
    /// average. Must run before the units are credited.
    fn absorb(&mut self, asset: &str, unit_value: Decimal, qty: Decimal) -> Result<(), EngineError> {
        let held = self.state.balances.total(asset);
        let cost = if is_flat(held) {
            unit_value
        } else {
            let divisor = held + qty;
            if divisor.is_zero() {
                return Err(EngineError::InvariantViolation(format!(
                    "weighted average of {asset} divides by zero (held {held}, adding {qty})"
                )));
            }
            (self.state.acq_cost(asset) * held + unit_value * qty) / divisor
        };
        self.state.acq_costs.insert(asset.to_string(), cost);
        Ok(())
    }

    fn realize(&mut self, year: i32, gain: Decimal) {
        *self.state.profit_by_year.entry(year).or_default() += gain;
    }

    fn credit(&mut self, asset: &str, wallet: &str, qty: Decimal) {
        self.state.balances.credit(asset, wallet, qty);
    }

    fn debit(&mut self, asset: &str, wallet: &str, qty: Decimal) {
        let left = self.state.balances.debit(asset, wallet, qty);
        if left < -BALANCE_EPSILON {
            warn!(asset, wallet, balance = %left, "balance went negative");
        }
    }
}

fn malformed(tx: &NormalizedTransaction) -> EngineError {
    EngineError::MalformedMarket {
        kind: tx.kind,
        market: tx.market.to_string(),
    }
}

fn quote_of(tx: &NormalizedTransaction) -> Result<&str, EngineError> {
    tx.market.quote.as_deref().ok_or_else(|| malformed(tx))
}

fn bare_asset(tx: &NormalizedTransaction) -> Result<&str, EngineError> {
    match tx.market.quote {
        None => Ok(tx.market.base.as_str()),
        Some(_) => Err(malformed(tx)),
    }
}

/// Every fair-value lookup a replay of `ledger` will make, in ledger order.
/// Resolving these up front lets the replay run against a read-only table.
pub fn fair_value_queries(ledger: &TradeLedger) -> Vec<FairValueQuery> {
    let mut out = Vec::new();
    for tx in ledger {
        let Some(quote) = tx.market.quote.as_deref() else {
            continue;
        };
        let mut push = |asset: &str| {
            if asset != JPY {
                out.push(FairValueQuery::new(tx.timestamp, asset, &tx.exchange));
            }
        };
        match tx.kind {
            TxKind::Ask if quote != JPY => push(&tx.market.base),
            TxKind::Bid if quote != JPY => {
                push(&tx.market.base);
                push(quote);
            }
            TxKind::Ico => push(quote),
            _ => {}
        }
    }
    out
}
