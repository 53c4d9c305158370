use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

use crate::balances::Balances;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardForkRule {
    pub asset: String,
    pub source: String,
    /// Epoch seconds; rows strictly after this instant trigger the fork.
    pub activation: i64,
    /// Wallets credited, in order. The correction is taken from the first.
    pub wallets: Vec<String>,
}

impl HardForkRule {
    pub fn activation_time(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.activation, 0).unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct HardForkState {
    applied: BTreeSet<String>,
}

impl HardForkState {
    pub fn is_applied(&self, asset: &str) -> bool {
        self.applied.contains(asset)
    }
}

#[derive(Debug, Clone, Default)]
pub struct HardForkRegistry {
    rules: Vec<HardForkRule>,
    corrections: BTreeMap<String, Decimal>,
}

impl HardForkRegistry {
    pub fn new(mut rules: Vec<HardForkRule>, corrections: BTreeMap<String, Decimal>) -> Self {
        for rule in &mut rules {
            rule.asset = rule.asset.to_lowercase();
            rule.source = rule.source.to_lowercase();
            for w in &mut rule.wallets {
                *w = w.to_lowercase();
            }
        }
        let corrections = corrections
            .into_iter()
            .map(|(asset, qty)| (asset.to_lowercase(), qty))
            .collect();
        Self { rules, corrections }
    }

    pub fn correction(&self, asset: &str) -> Decimal {
        self.corrections.get(asset).copied().unwrap_or_default()
    }

    /// Credits every fork whose activation lies before `at` and that has not
    /// been credited yet. Returns the assets credited by this call.
    pub fn apply(
        &self,
        at: DateTime<Utc>,
        balances: &mut Balances,
        state: &mut HardForkState,
    ) -> Vec<String> {
        let mut credited = Vec::new();
        for rule in &self.rules {
            if state.is_applied(&rule.asset) || at <= rule.activation_time() {
                continue;
            }

            for wallet in &rule.wallets {
                let qty = balances.get(&rule.source, wallet);
                balances.set(&rule.asset, wallet, qty);
            }
            let correction = self.correction(&rule.asset);
            if let Some(first) = rule.wallets.first() {
                balances.debit(&rule.asset, first, correction);
            }

            state.applied.insert(rule.asset.clone());
            info!(
                asset = %rule.asset,
                source = %rule.source,
                %correction,
                total = %balances.total(&rule.asset),
                "hard fork credited"
            );
            credited.push(rule.asset.clone());
        }
        credited
    }
}
