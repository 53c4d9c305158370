use chrono::{DateTime, FixedOffset, NaiveDateTime, Offset, TimeZone, Utc};
use rust_decimal::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

pub const JPY: &str = "jpy";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unsupported transaction kind `{label}`")]
pub struct UnsupportedKind {
    pub label: String,
}

/// Either a bare asset (`"btc"`) or a trading pair (`"eth_btc"`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Market {
    pub base: String,
    pub quote: Option<String>,
}

impl Market {
    pub fn parse(s: &str) -> Self {
        let s = s.trim().to_lowercase();
        match s.split_once('_') {
            Some((base, quote)) => Market {
                base: base.to_string(),
                quote: Some(quote.to_string()),
            },
            None => Market {
                base: s,
                quote: None,
            },
        }
    }

    pub fn asset(asset: &str) -> Self {
        Market {
            base: asset.to_lowercase(),
            quote: None,
        }
    }

    pub fn pair(base: &str, quote: &str) -> Self {
        Market {
            base: base.to_lowercase(),
            quote: Some(quote.to_lowercase()),
        }
    }

    pub fn is_jpy_quoted(&self) -> bool {
        self.quote.as_deref() == Some(JPY)
    }
}

impl fmt::Display for Market {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quote {
            Some(q) => write!(f, "{}_{}", self.base, q),
            None => write!(f, "{}", self.base),
        }
    }
}

impl Serialize for Market {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Market {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(Market::parse(&s))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TxKind {
    Bid,
    Ask,
    Deposit,
    Withdraw,
    Receive,
    Send,
    Fee,
    Purchase,
    Ico,
}

impl TxKind {
    pub const ALL: [TxKind; 9] = [
        TxKind::Bid,
        TxKind::Ask,
        TxKind::Deposit,
        TxKind::Withdraw,
        TxKind::Receive,
        TxKind::Send,
        TxKind::Fee,
        TxKind::Purchase,
        TxKind::Ico,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TxKind::Bid => "bid",
            TxKind::Ask => "ask",
            TxKind::Deposit => "deposit",
            TxKind::Withdraw => "withdraw",
            TxKind::Receive => "receive",
            TxKind::Send => "send",
            TxKind::Fee => "fee",
            TxKind::Purchase => "purchase",
            TxKind::Ico => "ico",
        }
    }
}

impl fmt::Display for TxKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone)]
pub struct KindLabels {
    labels: BTreeMap<String, TxKind>,
}

impl Default for KindLabels {
    fn default() -> Self {
        let mut labels = BTreeMap::new();
        for kind in TxKind::ALL {
            labels.insert(kind.as_str().to_string(), kind);
        }
        for (label, kind) in [
            ("売り", TxKind::Bid),
            ("買い", TxKind::Ask),
            ("預入", TxKind::Deposit),
            ("入金", TxKind::Deposit),
            ("受取", TxKind::Receive),
            ("受け取り", TxKind::Receive),
            ("出金", TxKind::Withdraw),
            ("外部送付", TxKind::Send),
            ("手数料", TxKind::Fee),
            ("購入", TxKind::Purchase),
            ("sell", TxKind::Bid),
            ("buy", TxKind::Ask),
        ] {
            labels.insert(label.to_string(), kind);
        }
        KindLabels { labels }
    }
}

impl KindLabels {
    pub fn with_overrides<I, S>(overrides: I) -> Self
    where
        I: IntoIterator<Item = (S, TxKind)>,
        S: Into<String>,
    {
        let mut table = KindLabels::default();
        for (label, kind) in overrides {
            table.labels.insert(label.into().trim().to_lowercase(), kind);
        }
        table
    }

    pub fn resolve(&self, label: &str) -> Result<TxKind, UnsupportedKind> {
        let key = label.trim().to_lowercase();
        self.labels
            .get(&key)
            .copied()
            .ok_or_else(|| UnsupportedKind {
                label: label.trim().to_string(),
            })
    }
}

/// `profit` and `total_profit` are written by the engine during replay and are
/// zero until then.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedTransaction {
    pub market: Market,
    #[serde(rename = "type")]
    pub kind: TxKind,
    pub price: Decimal,
    pub cost: Decimal,
    pub amount: Decimal,
    #[serde(rename = "time", serialize_with = "serialize_time")]
    pub timestamp: DateTime<Utc>,
    pub exchange: String,
    pub profit: Decimal,
    pub total_profit: Decimal,
}

impl NormalizedTransaction {
    pub fn new(
        market: Market,
        kind: TxKind,
        price: Decimal,
        cost: Decimal,
        amount: Decimal,
        timestamp: DateTime<Utc>,
        exchange: &str,
    ) -> Self {
        NormalizedTransaction {
            market,
            kind,
            price,
            cost,
            amount,
            timestamp,
            exchange: exchange.to_lowercase(),
            profit: Decimal::ZERO,
            total_profit: Decimal::ZERO,
        }
    }
}

fn serialize_time<S: serde::Serializer>(t: &DateTime<Utc>, s: S) -> Result<S::Ok, S::Error> {
    s.collect_str(&t.format("%Y-%m-%dT%H:%M:%S%.fZ"))
}

pub fn parse_decimal(s: &str) -> Result<Decimal, rust_decimal::Error> {
    let s = s.trim();
    if s.is_empty() {
        return Ok(Decimal::ZERO);
    }
    Decimal::from_str(s).or_else(|_| Decimal::from_scientific(s))
}

/// Parses an RFC 3339 timestamp, or a naive one interpreted at `offset`.
pub fn parse_time(s: &str, offset: FixedOffset) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(t) = DateTime::parse_from_rfc3339(s) {
        return Some(t.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y/%m/%d %H:%M:%S",
        "%Y/%m/%d %H:%M",
    ] {
        if let Ok(t) = NaiveDateTime::parse_from_str(s, fmt) {
            return offset
                .from_local_datetime(&t)
                .single()
                .map(|t| t.with_timezone(&Utc));
        }
    }
    None
}

pub fn hours_offset(hours: i32) -> FixedOffset {
    FixedOffset::east_opt(hours * 3600).unwrap_or_else(|| Utc.fix())
}

pub fn q2(x: Decimal) -> Decimal {
    x.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
}

pub fn q8(x: Decimal) -> Decimal {
    x.round_dp_with_strategy(8, RoundingStrategy::MidpointAwayFromZero)
}
