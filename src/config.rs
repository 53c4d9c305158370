use chrono::FixedOffset;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;
use thiserror::Error;

use crate::engine::EngineSettings;
use crate::hardfork::{HardForkRegistry, HardForkRule};
use crate::model::{KindLabels, TxKind, hours_offset};
use crate::oracle::{
    DEFAULT_DAILY_URL, DEFAULT_POINT_URL, DailyBatchOracle, ExchangeRoutedOracle, OracleStrategy,
    PointQueryOracle,
};
use crate::rounding::{DirectionalRounding, RoundingTable};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OracleConfig {
    pub point_url: String,
    pub daily_url: String,
    pub default_strategy: OracleStrategy,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            point_url: DEFAULT_POINT_URL.to_string(),
            daily_url: DEFAULT_DAILY_URL.to_string(),
            default_strategy: OracleStrategy::Point,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExchangeProfile {
    pub rounding: DirectionalRounding,
    pub oracle: Option<OracleStrategy>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub input_utc_offset_hours: i32,
    pub tax_utc_offset_hours: i32,
    pub oracle: OracleConfig,
    pub exchanges: BTreeMap<String, ExchangeProfile>,
    pub hard_forks: Vec<HardForkRule>,
    pub fork_corrections: BTreeMap<String, Decimal>,
    pub kind_labels: BTreeMap<String, TxKind>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            input_utc_offset_hours: 9,
            tax_utc_offset_hours: 9,
            oracle: OracleConfig::default(),
            exchanges: BTreeMap::new(),
            hard_forks: Vec::new(),
            fork_corrections: BTreeMap::new(),
            kind_labels: BTreeMap::new(),
        }
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let mut cfg: Config = serde_json::from_str(text)?;
        cfg.normalize();
        cfg.validate()?;
        Ok(cfg)
    }

    fn normalize(&mut self) {
        self.exchanges = std::mem::take(&mut self.exchanges)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        for rule in &mut self.hard_forks {
            rule.asset = rule.asset.to_lowercase();
            rule.source = rule.source.to_lowercase();
            for w in &mut rule.wallets {
                *w = w.to_lowercase();
            }
        }
        self.fork_corrections = std::mem::take(&mut self.fork_corrections)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let valid = |h: i32| (-23..=23).contains(&h);
        if !valid(self.input_utc_offset_hours) || !valid(self.tax_utc_offset_hours) {
            return Err(ConfigError::Invalid(
                "utc offsets must lie within -23..=23 hours".to_string(),
            ));
        }

        let mut seen = BTreeSet::new();
        for rule in &self.hard_forks {
            if rule.asset == rule.source {
                return Err(ConfigError::Invalid(format!(
                    "hard fork {} duplicates itself",
                    rule.asset
                )));
            }
            if rule.wallets.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "hard fork {} lists no wallets",
                    rule.asset
                )));
            }
            if !seen.insert(rule.asset.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "hard fork {} declared twice",
                    rule.asset
                )));
            }
        }
        Ok(())
    }

    pub fn input_offset(&self) -> FixedOffset {
        hours_offset(self.input_utc_offset_hours)
    }

    pub fn tax_offset(&self) -> FixedOffset {
        hours_offset(self.tax_utc_offset_hours)
    }

    pub fn kind_labels(&self) -> KindLabels {
        KindLabels::with_overrides(self.kind_labels.iter().map(|(k, v)| (k.clone(), *v)))
    }

    pub fn rounding_table(&self) -> RoundingTable {
        let mut table = RoundingTable::new();
        for (exchange, profile) in &self.exchanges {
            table.insert(exchange, profile.rounding);
        }
        table
    }

    pub fn hard_fork_registry(&self) -> HardForkRegistry {
        HardForkRegistry::new(self.hard_forks.clone(), self.fork_corrections.clone())
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            rounding: self.rounding_table(),
            forks: self.hard_fork_registry(),
            tax_offset: self.tax_offset(),
        }
    }

    pub fn oracle(&self) -> ExchangeRoutedOracle {
        let routes: HashMap<String, OracleStrategy> = self
            .exchanges
            .iter()
            .filter_map(|(name, p)| p.oracle.map(|s| (name.clone(), s)))
            .collect();
        ExchangeRoutedOracle::new(
            PointQueryOracle::new_with_base_url(self.oracle.point_url.clone()),
            DailyBatchOracle::new_with_base_url(self.oracle.daily_url.clone()),
            routes,
            self.oracle.default_strategy,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const SAMPLE: &str = r#"{
        "exchanges": {
            "Zaif": {"rounding": {"debit": "ceil"}, "oracle": "point"},
            "bitbank": {"oracle": "daily"}
        },
        "hard_forks": [
            {"asset": "BCH", "source": "btc", "activation": 1501611180, "wallets": ["Zaif", "bitflyer"]}
        ],
        "fork_corrections": {"bch": "0.0123"},
        "kind_labels": {"ボーナス": "receive"}
    }"#;

    #[test]
    fn defaults_are_japan_time() {
        let cfg = Config::from_json("{}").unwrap();
        assert_eq!(cfg.input_utc_offset_hours, 9);
        assert_eq!(cfg.tax_offset().local_minus_utc(), 9 * 3600);
        assert_eq!(cfg.oracle.point_url, DEFAULT_POINT_URL);
        assert!(cfg.hard_forks.is_empty());
    }

    #[test]
    fn sample_builds_engine_inputs() {
        let cfg = Config::from_json(SAMPLE).unwrap();
        assert!(cfg.exchanges.contains_key("zaif"));
        assert_eq!(cfg.hard_forks[0].asset, "bch");
        assert_eq!(cfg.hard_forks[0].wallets, vec!["zaif", "bitflyer"]);

        let registry = cfg.hard_fork_registry();
        assert_eq!(registry.correction("bch"), dec!(0.0123));

        let rounding = cfg.rounding_table();
        assert_eq!(rounding.for_exchange("zaif").round_debit(dec!(1.1)), dec!(2));

        let oracle = cfg.oracle();
        assert_eq!(oracle.strategy_for("bitbank"), OracleStrategy::Daily);
        assert_eq!(oracle.strategy_for("bitflyer"), OracleStrategy::Point);

        assert_eq!(cfg.kind_labels().resolve("ボーナス").unwrap(), TxKind::Receive);
    }

    #[test]
    fn rejects_self_fork_and_empty_wallets() {
        let err = Config::from_json(
            r#"{"hard_forks": [{"asset": "btc", "source": "BTC", "activation": 0, "wallets": ["a"]}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));

        let err = Config::from_json(
            r#"{"hard_forks": [{"asset": "bch", "source": "btc", "activation": 0, "wallets": []}]}"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("no wallets"));
    }

    #[test]
    fn rejects_out_of_range_offset() {
        let err = Config::from_json(r#"{"tax_utc_offset_hours": 30}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }
}
