use chrono::{DateTime, TimeZone, Utc};
use jpy_acb::{
    CostBasisEngine, EngineSettings, Market, NormalizedTransaction, PrefetchedOracle,
    ReplayOutcome, TradeLedger, TxKind,
};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;

fn t(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 3, day, 0, 0, 0).unwrap()
}

fn tx(
    market: &str,
    kind: TxKind,
    price: Decimal,
    amount: Decimal,
    day: u32,
    wallet: &str,
) -> NormalizedTransaction {
    NormalizedTransaction::new(
        Market::parse(market),
        kind,
        price,
        Decimal::ZERO,
        amount,
        t(day),
        wallet,
    )
}

fn replay(rows: Vec<NormalizedTransaction>) -> ReplayOutcome {
    CostBasisEngine::new(PrefetchedOracle::new(), EngineSettings::default())
        .replay(TradeLedger::build(rows))
        .expect("replay succeeds")
}

#[test]
fn scenario_zero_fee_transfers_net_exactly() {
    // GIVEN: deposits and withdrawals across two wallets, zero fee
    let rows = vec![
        tx("eth", TxKind::Deposit, dec!(0), dec!(3.25), 1, "zaif"),
        tx("eth", TxKind::Withdraw, dec!(0), dec!(1.1), 2, "zaif"),
        tx("eth", TxKind::Receive, dec!(0), dec!(1.1), 2, "bitflyer"),
        tx("eth", TxKind::Deposit, dec!(0), dec!(0.00000007), 3, "zaif"),
        tx("eth", TxKind::Send, dec!(0), dec!(0.6), 4, "bitflyer"),
    ];

    let out = replay(rows);

    // THEN: each wallet holds exactly its net inflow
    assert_eq!(out.state.balances.get("eth", "zaif"), dec!(2.15000007));
    assert_eq!(out.state.balances.get("eth", "bitflyer"), dec!(0.5));
    assert_eq!(out.state.total_profit(), dec!(0));
    assert!(out.state.acq_costs.is_empty());
}

#[test]
fn scenario_two_ask_fills_average_by_quantity() {
    // a1@p1 then a2@p2, zero fee, same wallet, JPY-quoted
    let (a1, p1) = (dec!(0.4), dec!(1000000));
    let (a2, p2) = (dec!(0.1), dec!(1500000));
    let out = replay(vec![
        tx("btc_jpy", TxKind::Ask, p1, a1, 1, "zaif"),
        tx("btc_jpy", TxKind::Ask, p2, a2, 2, "zaif"),
    ]);

    assert_eq!(out.state.acq_cost("btc"), (a1 * p1 + a2 * p2) / (a1 + a2));
    assert_eq!(out.state.acq_cost("btc"), dec!(1100000));
    assert_eq!(out.state.balances.get("btc", "zaif"), dec!(0.5));
    assert_eq!(out.state.balances.get("jpy", "zaif"), dec!(-550000));
}

#[test]
fn scenario_average_spans_wallets() {
    // Holdings in one wallet weigh into the cost paid in another.
    let out = replay(vec![
        tx("mona_jpy", TxKind::Ask, dec!(300), dec!(10), 1, "zaif"),
        tx("mona_jpy", TxKind::Ask, dec!(600), dec!(20), 2, "bitflyer"),
        tx("mona_jpy", TxKind::Bid, dec!(700), dec!(5), 3, "bitflyer"),
    ]);

    assert_eq!(out.state.acq_cost("mona"), dec!(500));
    assert_eq!(out.state.profit_for(2018), dec!(1000));
    assert_eq!(out.state.balances.total("mona"), dec!(25));
}

#[test]
fn scenario_dust_balance_restarts_average() {
    // A leftover below the tolerance counts as no holdings.
    let out = replay(vec![
        tx("xem_jpy", TxKind::Ask, dec!(100), dec!(1.000000005), 1, "zaif"),
        tx("xem_jpy", TxKind::Bid, dec!(100), dec!(1), 2, "zaif"),
        tx("xem_jpy", TxKind::Ask, dec!(40), dec!(2), 3, "zaif"),
    ]);

    assert_eq!(out.state.acq_cost("xem"), dec!(40));
}
