use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use thiserror::Error;
use tracing::debug;

use crate::model::JPY;

pub const DEFAULT_POINT_URL: &str = "https://zaif.jp/zaif_chart_api/v1/history";
pub const DEFAULT_DAILY_URL: &str = "https://public.bitbank.cc";

#[derive(Debug, Error)]
pub enum OracleError {
    #[error("no fair value for {symbol} at {minute}")]
    Unavailable {
        symbol: String,
        minute: DateTime<Utc>,
    },
    #[error("remote error: {0}")]
    Remote(String),
    #[error("decode error: {0}")]
    Decode(String),
}

pub trait FairValueOracle {
    fn price(&mut self, at: DateTime<Utc>, symbol: &str, exchange: &str)
    -> Result<Decimal, OracleError>;
}

impl<O: FairValueOracle + ?Sized> FairValueOracle for &mut O {
    fn price(
        &mut self,
        at: DateTime<Utc>,
        symbol: &str,
        exchange: &str,
    ) -> Result<Decimal, OracleError> {
        (**self).price(at, symbol, exchange)
    }
}

pub fn minute_bucket(at: DateTime<Utc>) -> DateTime<Utc> {
    let secs = at.timestamp();
    DateTime::from_timestamp(secs - secs.rem_euclid(60), 0).unwrap_or(at)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OracleStrategy {
    #[default]
    Point,
    Daily,
}

fn remote_err(e: reqwest::Error) -> OracleError {
    OracleError::Remote(e.to_string())
}

// ---------------------------------------------------------------------------
// Point query
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct PointResponse {
    data_count: u64,
    #[serde(default)]
    ohlc_data: Vec<PointCandle>,
}

#[derive(Debug, Deserialize)]
struct PointCandle {
    close: Decimal,
}

#[derive(Debug, Clone)]
pub struct PointQueryOracle {
    http: reqwest::blocking::Client,
    base_url: String,
    cache: HashMap<(String, i64), Decimal>,
}

impl Default for PointQueryOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl PointQueryOracle {
    pub fn new() -> Self {
        Self::new_with_base_url(DEFAULT_POINT_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url,
            cache: HashMap::new(),
        }
    }

    fn fetch(&self, symbol: &str, minute: DateTime<Utc>) -> Result<Decimal, OracleError> {
        let ts = minute.timestamp().to_string();
        debug!(symbol, %minute, "point query");
        let resp = self
            .http
            .get(&self.base_url)
            .query(&[
                ("symbol", symbol),
                ("resolution", "1"),
                ("from", ts.as_str()),
                ("to", ts.as_str()),
            ])
            .send()
            .map_err(remote_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Remote(format!(
                "return status code is {}",
                status.as_u16()
            )));
        }
        let body = resp.text().map_err(remote_err)?;
        let parsed = decode_point_body(&body)?;

        if parsed.data_count == 0 {
            return Err(OracleError::Unavailable {
                symbol: symbol.to_string(),
                minute,
            });
        }
        parsed
            .ohlc_data
            .first()
            .map(|c| c.close)
            .ok_or_else(|| OracleError::Unavailable {
                symbol: symbol.to_string(),
                minute,
            })
    }
}

/// The chart API answers with a JSON string that itself holds the JSON
/// document, so one extra decoding pass may be needed.
fn decode_point_body(body: &str) -> Result<PointResponse, OracleError> {
    let mut value: serde_json::Value =
        serde_json::from_str(body).map_err(|e| OracleError::Decode(e.to_string()))?;
    if let serde_json::Value::String(inner) = &value {
        value = serde_json::from_str(inner).map_err(|e| OracleError::Decode(e.to_string()))?;
    }
    serde_json::from_value(value).map_err(|e| OracleError::Decode(e.to_string()))
}

impl FairValueOracle for PointQueryOracle {
    fn price(
        &mut self,
        at: DateTime<Utc>,
        symbol: &str,
        _exchange: &str,
    ) -> Result<Decimal, OracleError> {
        let minute = minute_bucket(at);
        let pair = format!("{}_{}", symbol, JPY).to_uppercase();
        let key = (pair, minute.timestamp());
        if let Some(p) = self.cache.get(&key) {
            debug!(symbol = %key.0, %minute, "point cache hit");
            return Ok(*p);
        }
        let price = self.fetch(&key.0, minute)?;
        self.cache.insert(key, price);
        Ok(price)
    }
}

// ---------------------------------------------------------------------------
// Daily batch
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct BatchResponse {
    success: i64,
    data: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct BatchData {
    candlestick: Vec<CandleSet>,
}

/// `[open, high, low, close, volume, unix_ms]`
type OhlcvRow = (Decimal, Decimal, Decimal, Decimal, Decimal, i64);

#[derive(Debug, Deserialize)]
struct CandleSet {
    ohlcv: Vec<OhlcvRow>,
}

#[derive(Debug, Clone)]
pub struct DailyBatchOracle {
    http: reqwest::blocking::Client,
    base_url: String,
    days: HashMap<(String, NaiveDate), HashMap<i64, Decimal>>,
}

impl Default for DailyBatchOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl DailyBatchOracle {
    pub fn new() -> Self {
        Self::new_with_base_url(DEFAULT_DAILY_URL.to_string())
    }

    pub fn new_with_base_url(base_url: String) -> Self {
        Self {
            http: reqwest::blocking::Client::new(),
            base_url,
            days: HashMap::new(),
        }
    }

    pub fn cached_days(&self) -> usize {
        self.days.len()
    }

    fn build_day_url(&self, pair: &str, day: NaiveDate) -> String {
        format!(
            "{}/{}/candlestick/1min/{}",
            self.base_url.trim_end_matches('/'),
            pair,
            day.format("%Y%m%d")
        )
    }

    fn fetch_day(&self, pair: &str, day: NaiveDate) -> Result<HashMap<i64, Decimal>, OracleError> {
        let url = self.build_day_url(pair, day);
        debug!(pair, %day, "daily batch fetch");
        let resp = self.http.get(url).send().map_err(remote_err)?;

        let status = resp.status();
        if !status.is_success() {
            return Err(OracleError::Remote(format!(
                "return status code is {}",
                status.as_u16()
            )));
        }
        let body: BatchResponse = resp
            .json()
            .map_err(|e| OracleError::Decode(e.to_string()))?;
        if body.success != 1 {
            return Err(OracleError::Remote(format!(
                "batch api error for {pair} on {day}: {}",
                body.data
            )));
        }
        let data: BatchData =
            serde_json::from_value(body.data).map_err(|e| OracleError::Decode(e.to_string()))?;

        let mut index = HashMap::new();
        for set in data.candlestick {
            for (_open, _high, _low, close, _volume, ms) in set.ohlcv {
                index.insert(ms, close);
            }
        }
        Ok(index)
    }
}

impl FairValueOracle for DailyBatchOracle {
    fn price(
        &mut self,
        at: DateTime<Utc>,
        symbol: &str,
        _exchange: &str,
    ) -> Result<Decimal, OracleError> {
        let minute = minute_bucket(at);
        let pair = format!("{}_{}", symbol, JPY).to_lowercase();
        let key = (pair, minute.date_naive());
        if !self.days.contains_key(&key) {
            let index = self.fetch_day(&key.0, key.1)?;
            self.days.insert(key.clone(), index);
        } else {
            debug!(pair = %key.0, day = %key.1, "daily cache hit");
        }
        self.days
            .get(&key)
            .and_then(|index| index.get(&minute.timestamp_millis()))
            .copied()
            .ok_or_else(|| OracleError::Unavailable {
                symbol: key.0.clone(),
                minute,
            })
    }
}

// ---------------------------------------------------------------------------
// Routing
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ExchangeRoutedOracle {
    point: PointQueryOracle,
    daily: DailyBatchOracle,
    routes: HashMap<String, OracleStrategy>,
    default_strategy: OracleStrategy,
}

impl ExchangeRoutedOracle {
    pub fn new(
        point: PointQueryOracle,
        daily: DailyBatchOracle,
        routes: HashMap<String, OracleStrategy>,
        default_strategy: OracleStrategy,
    ) -> Self {
        let routes = routes
            .into_iter()
            .map(|(exchange, s)| (exchange.to_lowercase(), s))
            .collect();
        Self {
            point,
            daily,
            routes,
            default_strategy,
        }
    }

    pub fn strategy_for(&self, exchange: &str) -> OracleStrategy {
        self.routes
            .get(&exchange.to_lowercase())
            .copied()
            .unwrap_or(self.default_strategy)
    }
}

impl FairValueOracle for ExchangeRoutedOracle {
    fn price(
        &mut self,
        at: DateTime<Utc>,
        symbol: &str,
        exchange: &str,
    ) -> Result<Decimal, OracleError> {
        match self.strategy_for(exchange) {
            OracleStrategy::Point => self.point.price(at, symbol, exchange),
            OracleStrategy::Daily => self.daily.price(at, symbol, exchange),
        }
    }
}

// ---------------------------------------------------------------------------
// Prefetched table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FairValueQuery {
    pub symbol: String,
    pub minute: DateTime<Utc>,
    pub exchange: String,
}

impl FairValueQuery {
    pub fn new(at: DateTime<Utc>, symbol: &str, exchange: &str) -> Self {
        FairValueQuery {
            symbol: symbol.to_lowercase(),
            minute: minute_bucket(at),
            exchange: exchange.to_lowercase(),
        }
    }
}

/// Read-only price table; a miss is [`OracleError::Unavailable`].
#[derive(Debug, Clone, Default)]
pub struct PrefetchedOracle {
    prices: BTreeMap<FairValueQuery, Decimal>,
}

impl PrefetchedOracle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, at: DateTime<Utc>, symbol: &str, exchange: &str, price: Decimal) {
        self.prices
            .insert(FairValueQuery::new(at, symbol, exchange), price);
    }

    /// Resolves every query through `source` up front. Fails on the first
    /// lookup that fails, leaving nothing behind.
    pub fn prefetch<I, O>(queries: I, source: &mut O) -> Result<Self, OracleError>
    where
        I: IntoIterator<Item = FairValueQuery>,
        O: FairValueOracle + ?Sized,
    {
        let mut table = PrefetchedOracle::new();
        for q in queries {
            if table.prices.contains_key(&q) {
                continue;
            }
            let price = source.price(q.minute, &q.symbol, &q.exchange)?;
            table.prices.insert(q, price);
        }
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.prices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }
}

impl FairValueOracle for PrefetchedOracle {
    fn price(
        &mut self,
        at: DateTime<Utc>,
        symbol: &str,
        exchange: &str,
    ) -> Result<Decimal, OracleError> {
        let q = FairValueQuery::new(at, symbol, exchange);
        self.prices
            .get(&q)
            .copied()
            .ok_or(OracleError::Unavailable {
                symbol: q.symbol,
                minute: q.minute,
            })
    }
}
