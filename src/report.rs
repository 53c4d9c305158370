use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

use crate::engine::EngineState;
use crate::model::{JPY, q2, q8};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AssetReport {
    pub asset: String,
    pub total: Decimal,
    pub wallets: BTreeMap<String, Decimal>,
    pub acquisition_cost: Decimal,
}

/// State as it stood after the last row of `year`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct YearReport {
    pub year: i32,
    pub assets: Vec<AssetReport>,
    pub profit: Decimal,
    /// Profit realized in this and every earlier year.
    pub cumulative_profit: Decimal,
    pub total_fiat_deposited: Decimal,
    pub holdings_value: Decimal,
}

impl YearReport {
    pub fn snapshot(year: i32, state: &EngineState) -> Self {
        let assets = state
            .balances
            .assets()
            .map(|asset| AssetReport {
                asset: asset.to_string(),
                total: state.balances.total(asset),
                wallets: state.balances.wallets(asset).cloned().unwrap_or_default(),
                acquisition_cost: state.acq_cost(asset),
            })
            .collect();

        YearReport {
            year,
            assets,
            profit: state.profit_for(year),
            cumulative_profit: state
                .profit_by_year
                .range(..=year)
                .map(|(_, p)| *p)
                .sum(),
            total_fiat_deposited: state.total_fiat_deposited,
            holdings_value: state.holdings_value(),
        }
    }
}

impl fmt::Display for YearReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== {} ===", self.year)?;
        for a in &self.assets {
            write!(f, "{}: {}", a.asset.to_uppercase(), q8(a.total))?;
            if a.asset != JPY {
                write!(f, ", acquisition cost(JPY/unit)={}", q8(a.acquisition_cost))?;
            }
            writeln!(f)?;
            for (wallet, qty) in &a.wallets {
                writeln!(f, "  {}: {}", wallet, q8(*qty))?;
            }
        }
        writeln!(f, "Profit (JPY): {}", q2(self.profit))?;
        writeln!(f, "Cumulative profit (JPY): {}", q2(self.cumulative_profit))?;
        writeln!(f, "Fiat deposited (JPY): {}", q2(self.total_fiat_deposited))?;
        write!(f, "Holdings at acquisition cost (JPY): {}", q2(self.holdings_value))
    }
}
