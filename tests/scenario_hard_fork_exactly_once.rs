use chrono::{DateTime, TimeZone, Utc};
use jpy_acb::{
    Config, CostBasisEngine, Market, NormalizedTransaction, PrefetchedOracle, TradeLedger, TxKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

const ACTIVATION: i64 = 1501611180;

const CONFIG: &str = r#"{
    "hard_forks": [
        {"asset": "bch", "source": "btc", "activation": 1501611180, "wallets": ["zaif", "bitflyer"]}
    ],
    "fork_corrections": {"bch": "0.02"}
}"#;

fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ACTIVATION + offset_secs, 0).unwrap()
}

fn transfer(
    kind: TxKind,
    asset: &str,
    amount: Decimal,
    when: DateTime<Utc>,
    wallet: &str,
) -> NormalizedTransaction {
    NormalizedTransaction::new(
        Market::asset(asset),
        kind,
        Decimal::ZERO,
        Decimal::ZERO,
        amount,
        when,
        wallet,
    )
}

#[test]
fn scenario_fork_credits_eligible_wallets_once() {
    let cfg = Config::from_json(CONFIG).unwrap();

    // GIVEN: B = 1.5 + 0.7 BTC across eligible wallets, plus an ineligible one
    let ledger = TradeLedger::build(vec![
        transfer(TxKind::Deposit, "btc", dec!(1.5), at(-86_400), "zaif"),
        transfer(TxKind::Deposit, "btc", dec!(0.7), at(-3_600), "bitflyer"),
        transfer(TxKind::Deposit, "btc", dec!(4), at(-60), "coincheck"),
        // a row exactly at activation does not trigger the fork
        transfer(TxKind::Deposit, "btc", dec!(0.3), at(0), "zaif"),
        // first row past activation
        transfer(TxKind::Deposit, "jpy", dec!(1000), at(1), "zaif"),
        // later rows also cross the activation instant
        transfer(TxKind::Deposit, "btc", dec!(10), at(60), "zaif"),
        transfer(TxKind::Deposit, "jpy", dec!(1000), at(120), "bitflyer"),
        transfer(TxKind::Withdraw, "bch", dec!(0.5), at(86_400), "zaif"),
    ]);

    let out = CostBasisEngine::new(PrefetchedOracle::new(), cfg.engine_settings())
        .replay(ledger)
        .unwrap();

    // THEN: bch = B - E, minus the later withdrawal; never re-credited
    let b = dec!(1.5) + dec!(0.3) + dec!(0.7);
    let e = dec!(0.02);
    assert_eq!(out.state.balances.total("bch"), b - e - dec!(0.5));
    assert_eq!(out.state.balances.get("bch", "zaif"), dec!(1.8) - e - dec!(0.5));
    assert_eq!(out.state.balances.get("bch", "bitflyer"), dec!(0.7));
    assert_eq!(out.state.balances.get("bch", "coincheck"), dec!(0));
    assert!(out.state.hard_forks.is_applied("bch"));
    assert_eq!(out.state.acq_cost("bch"), dec!(0));
    assert_eq!(out.state.total_profit(), dec!(0));
}

#[test]
fn scenario_ledger_ending_before_activation_never_forks() {
    let cfg = Config::from_json(CONFIG).unwrap();
    let ledger = TradeLedger::build(vec![transfer(
        TxKind::Deposit,
        "btc",
        dec!(1),
        at(-10),
        "zaif",
    )]);

    let out = CostBasisEngine::new(PrefetchedOracle::new(), cfg.engine_settings())
        .replay(ledger)
        .unwrap();

    assert!(!out.state.hard_forks.is_applied("bch"));
    assert_eq!(out.state.balances.total("bch"), dec!(0));
}
