use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub trait ExchangeRoundingPolicy: Send + Sync + std::fmt::Debug {
    /// JPY actually debited when `jpy` is owed to the exchange.
    fn round_debit(&self, jpy: Decimal) -> Decimal;

    fn round_credit(&self, jpy: Decimal) -> Decimal;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RoundingMode {
    #[default]
    Exact,
    Ceil,
    Floor,
}

impl RoundingMode {
    pub fn apply(self, jpy: Decimal) -> Decimal {
        match self {
            RoundingMode::Exact => jpy,
            RoundingMode::Ceil => jpy.ceil(),
            RoundingMode::Floor => jpy.floor(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ExactRounding;

impl ExchangeRoundingPolicy for ExactRounding {
    fn round_debit(&self, jpy: Decimal) -> Decimal {
        jpy
    }

    fn round_credit(&self, jpy: Decimal) -> Decimal {
        jpy
    }
}

/// Whole-yen rounding with an independent mode for each direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct DirectionalRounding {
    #[serde(default)]
    pub debit: RoundingMode,
    #[serde(default)]
    pub credit: RoundingMode,
}

impl ExchangeRoundingPolicy for DirectionalRounding {
    fn round_debit(&self, jpy: Decimal) -> Decimal {
        self.debit.apply(jpy)
    }

    fn round_credit(&self, jpy: Decimal) -> Decimal {
        self.credit.apply(jpy)
    }
}

/// Exchange name -> settlement policy. Unlisted exchanges settle exactly.
#[derive(Debug, Default)]
pub struct RoundingTable {
    policies: HashMap<String, Box<dyn ExchangeRoundingPolicy>>,
    fallback: ExactRounding,
}

impl RoundingTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_policy<P>(mut self, exchange: &str, policy: P) -> Self
    where
        P: ExchangeRoundingPolicy + 'static,
    {
        self.insert(exchange, policy);
        self
    }

    pub fn insert<P>(&mut self, exchange: &str, policy: P)
    where
        P: ExchangeRoundingPolicy + 'static,
    {
        self.policies
            .insert(exchange.to_lowercase(), Box::new(policy));
    }

    pub fn for_exchange(&self, exchange: &str) -> &dyn ExchangeRoundingPolicy {
        match self.policies.get(&exchange.to_lowercase()) {
            Some(p) => p.as_ref(),
            None => &self.fallback,
        }
    }
}
