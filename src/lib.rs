//! Weighted-average JPY cost basis over a merged crypto ledger.

pub mod balances;
pub mod config;
pub mod engine;
pub mod hardfork;
pub mod ledger;
pub mod model;
pub mod oracle;
pub mod report;
pub mod rounding;

pub use balances::{BALANCE_EPSILON, Balances, is_flat};
pub use config::{Config, ConfigError};
pub use engine::{
    CostBasisEngine, EngineError, EngineSettings, EngineState, ReplayError, ReplayOutcome,
    fair_value_queries,
};
pub use hardfork::{HardForkRegistry, HardForkRule, HardForkState};
pub use ledger::{LedgerError, TradeLedger};
pub use model::{KindLabels, Market, NormalizedTransaction, TxKind, UnsupportedKind};
pub use oracle::{FairValueOracle, FairValueQuery, OracleError, PrefetchedOracle};
pub use report::{AssetReport, YearReport};
pub use rounding::{ExchangeRoundingPolicy, RoundingTable};
