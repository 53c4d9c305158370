use chrono::{DateTime, TimeZone, Utc};
use jpy_acb::{
    Config, CostBasisEngine, Market, NormalizedTransaction, PrefetchedOracle, TradeLedger, TxKind,
    fair_value_queries,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn at(m: u32, d: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2017, m, d, 1, 2, 33).unwrap()
}

fn row(
    market: &str,
    kind: TxKind,
    price: Decimal,
    cost: Decimal,
    amount: Decimal,
    when: DateTime<Utc>,
) -> NormalizedTransaction {
    NormalizedTransaction::new(Market::parse(market), kind, price, cost, amount, when, "zaif")
}

fn ledger() -> TradeLedger {
    TradeLedger::build(vec![
        row("jpy", TxKind::Deposit, dec!(0), dec!(0), dec!(3000000), at(1, 5)),
        row("btc_jpy", TxKind::Ask, dec!(110000), dec!(0.0001), dec!(3), at(1, 6)),
        row("btc_jpy", TxKind::Ask, dec!(123456.7), dec!(0), dec!(1.2345), at(2, 6)),
        row("eth_btc", TxKind::Ask, dec!(0.0123), dec!(0.01), dec!(7), at(3, 1)),
        row("btc_jpy", TxKind::Bid, dec!(260000), dec!(12), dec!(0.333), at(4, 1)),
        row("eth_btc", TxKind::Bid, dec!(0.08), dec!(0.0001), dec!(2.5), at(6, 1)),
        row("cms_eth", TxKind::Ico, dec!(1), dec!(0), dec!(3000), at(7, 1)),
        row("bch", TxKind::Send, dec!(0), dec!(0.001), dec!(1), at(9, 1)),
    ])
}

fn oracle() -> PrefetchedOracle {
    let mut o = PrefetchedOracle::new();
    o.insert(at(3, 1), "eth", "zaif", dec!(1850.25));
    o.insert(at(6, 1), "eth", "zaif", dec!(29500));
    o.insert(at(6, 1), "btc", "zaif", dec!(290000.5));
    o.insert(at(7, 1), "eth", "zaif", dec!(31000));
    o
}

const CONFIG: &str = r#"{
    "exchanges": {"zaif": {"rounding": {"debit": "ceil", "credit": "floor"}}},
    "hard_forks": [{"asset": "bch", "source": "btc", "activation": 1501611180, "wallets": ["zaif"]}],
    "fork_corrections": {"bch": "0.1"}
}"#;

#[test]
fn scenario_identical_ledgers_replay_identically() {
    let cfg = Config::from_json(CONFIG).unwrap();

    let first = CostBasisEngine::new(oracle(), cfg.engine_settings())
        .replay(ledger())
        .unwrap();
    let second = CostBasisEngine::new(oracle(), cfg.engine_settings())
        .replay(ledger())
        .unwrap();

    assert_eq!(first.state, second.state);
    assert_eq!(
        serde_json::to_string(&first.state).unwrap(),
        serde_json::to_string(&second.state).unwrap()
    );
    assert_eq!(first.ledger, second.ledger);
    assert_eq!(first.years, second.years);
    assert!(first.state.hard_forks.is_applied("bch"));
}

#[test]
fn scenario_prefetched_table_matches_live_lookups() {
    let cfg = Config::from_json(CONFIG).unwrap();
    let trades = ledger();

    let mut source = oracle();
    let table = PrefetchedOracle::prefetch(fair_value_queries(&trades), &mut source).unwrap();
    assert_eq!(table.len(), 4);

    let via_table = CostBasisEngine::new(table, cfg.engine_settings())
        .replay(trades.clone())
        .unwrap();
    let direct = CostBasisEngine::new(oracle(), cfg.engine_settings())
        .replay(trades)
        .unwrap();

    assert_eq!(via_table.state, direct.state);
}
