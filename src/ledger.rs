use chrono::FixedOffset;
use csv::{ReaderBuilder, WriterBuilder};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use thiserror::Error;

use crate::model::{
    KindLabels, Market, NormalizedTransaction, UnsupportedKind, parse_decimal, parse_time,
};

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("row {row}: {source}")]
    UnsupportedTransactionKind {
        row: usize,
        #[source]
        source: UnsupportedKind,
    },

    #[error("row {row}: unsupported timestamp format `{value}`")]
    Timestamp { row: usize, value: String },

    #[error("row {row}: invalid decimal in `{field}`")]
    Decimal {
        row: usize,
        field: &'static str,
        #[source]
        source: rust_decimal::Error,
    },

    #[error("row {row}: `{field}` must not be negative")]
    Negative { row: usize, field: &'static str },
}

#[derive(Debug, Deserialize)]
struct CsvRow {
    market: String,
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    price: String,
    #[serde(default)]
    cost: String,
    amount: String,
    time: String,
    exchange: String,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TradeLedger {
    rows: Vec<NormalizedTransaction>,
}

impl TradeLedger {
    /// Merges every input and sorts ascending by timestamp. Rows sharing a
    /// timestamp keep their input order.
    pub fn build<I>(transactions: I) -> Self
    where
        I: IntoIterator<Item = NormalizedTransaction>,
    {
        let mut rows: Vec<_> = transactions.into_iter().collect();
        rows.sort_by_key(|t| t.timestamp);
        TradeLedger { rows }
    }

    /// Like [`TradeLedger::build`], with `key` ordering rows that share a
    /// timestamp. Still stable for rows whose keys are equal.
    pub fn build_by<I, K, F>(transactions: I, mut key: F) -> Self
    where
        I: IntoIterator<Item = NormalizedTransaction>,
        K: Ord,
        F: FnMut(&NormalizedTransaction) -> K,
    {
        let mut rows: Vec<_> = transactions.into_iter().collect();
        rows.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then_with(|| key(a).cmp(&key(b))));
        TradeLedger { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, NormalizedTransaction> {
        self.rows.iter()
    }

    pub fn rows(&self) -> &[NormalizedTransaction] {
        &self.rows
    }

    pub(crate) fn into_rows(self) -> Vec<NormalizedTransaction> {
        self.rows
    }
}

impl<'a> IntoIterator for &'a TradeLedger {
    type Item = &'a NormalizedTransaction;
    type IntoIter = std::slice::Iter<'a, NormalizedTransaction>;

    fn into_iter(self) -> Self::IntoIter {
        self.rows.iter()
    }
}

fn decimal_field(row: usize, field: &'static str, s: &str) -> Result<Decimal, LedgerError> {
    let value = parse_decimal(s).map_err(|source| LedgerError::Decimal { row, field, source })?;
    if value.is_sign_negative() && !value.is_zero() {
        return Err(LedgerError::Negative { row, field });
    }
    Ok(value)
}

/// Reads normalized rows (`market,type,price,cost,amount,time,exchange`).
pub fn read_csv<R: Read>(
    reader: R,
    labels: &KindLabels,
    offset: FixedOffset,
) -> Result<Vec<NormalizedTransaction>, LedgerError> {
    let mut rdr = ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut out = Vec::new();

    for (i, rec) in rdr.deserialize::<CsvRow>().enumerate() {
        let rec = rec?;
        let row = i + 1;
        let kind = labels
            .resolve(&rec.kind)
            .map_err(|source| LedgerError::UnsupportedTransactionKind { row, source })?;
        let timestamp = parse_time(&rec.time, offset).ok_or_else(|| LedgerError::Timestamp {
            row,
            value: rec.time.clone(),
        })?;

        out.push(NormalizedTransaction::new(
            Market::parse(&rec.market),
            kind,
            decimal_field(row, "price", &rec.price)?,
            decimal_field(row, "cost", &rec.cost)?,
            decimal_field(row, "amount", &rec.amount)?,
            timestamp,
            rec.exchange.trim(),
        ));
    }

    Ok(out)
}

pub fn load_csv(
    path: &Path,
    labels: &KindLabels,
    offset: FixedOffset,
) -> Result<Vec<NormalizedTransaction>, LedgerError> {
    read_csv(File::open(path)?, labels, offset)
}

pub fn write_annotated<W: Write>(
    rows: &[NormalizedTransaction],
    writer: W,
) -> Result<(), LedgerError> {
    let mut wtr = WriterBuilder::new().from_writer(writer);
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}
