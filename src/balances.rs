use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

/// Totals within this distance of zero count as "no holdings".
pub const BALANCE_EPSILON: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

pub fn is_flat(total: Decimal) -> bool {
    total.abs() <= BALANCE_EPSILON
}

/// asset -> wallet -> quantity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Balances {
    coins: BTreeMap<String, BTreeMap<String, Decimal>>,
}

impl Balances {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, asset: &str, wallet: &str) -> Decimal {
        self.coins
            .get(asset)
            .and_then(|w| w.get(wallet))
            .copied()
            .unwrap_or_default()
    }

    pub fn total(&self, asset: &str) -> Decimal {
        self.coins
            .get(asset)
            .map(|w| w.values().copied().sum())
            .unwrap_or_default()
    }

    pub fn wallets(&self, asset: &str) -> Option<&BTreeMap<String, Decimal>> {
        self.coins.get(asset)
    }

    pub fn assets(&self) -> impl Iterator<Item = &str> {
        self.coins.keys().map(String::as_str)
    }

    /// Adds `qty` and returns the wallet's new balance.
    pub fn credit(&mut self, asset: &str, wallet: &str, qty: Decimal) -> Decimal {
        let slot = self
            .coins
            .entry(asset.to_string())
            .or_default()
            .entry(wallet.to_string())
            .or_default();
        *slot += qty;
        *slot
    }

    pub fn debit(&mut self, asset: &str, wallet: &str, qty: Decimal) -> Decimal {
        self.credit(asset, wallet, -qty)
    }

    pub fn set(&mut self, asset: &str, wallet: &str, qty: Decimal) {
        self.coins
            .entry(asset.to_string())
            .or_default()
            .insert(wallet.to_string(), qty);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn epsilon_is_one_satoshi() {
        assert_eq!(BALANCE_EPSILON, dec!(0.00000001));
        assert!(is_flat(dec!(0.000000001)));
        assert!(is_flat(dec!(-0.00000001)));
        assert!(!is_flat(dec!(0.00000002)));
    }

    #[test]
    fn totals_span_wallets() {
        let mut b = Balances::new();
        b.credit("btc", "zaif", dec!(1.5));
        b.credit("btc", "bitflyer", dec!(0.25));
        assert_eq!(b.debit("btc", "zaif", dec!(0.5)), dec!(1.0));
        assert_eq!(b.total("btc"), dec!(1.25));
        assert_eq!(b.get("btc", "coincheck"), dec!(0));
        assert_eq!(b.total("eth"), dec!(0));
    }
}
