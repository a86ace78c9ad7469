//! Quote annotation: join each fill with the prevailing NBBO quote at
//! order time and derive the signed price-improvement feature.
//!
//! The join is a backward as-of lookup per symbol: the most recent quote at
//! or before the order timestamp wins. Fills with no prevailing quote are
//! dropped. Both sides are restricted to the trading session first.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use chrono::{NaiveDateTime, Timelike};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::SessionConfig;
use crate::core::time::{from_epoch_ns, parse_transact_time};
use crate::core::{MatchedFill, Result, Side};
use crate::metrics::read_fills;

/// A fill annotated with the quote prevailing at order time.
/// This is the model-training input row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnnotatedFill {
    pub order_id: String,
    pub order_time: NaiveDateTime,
    pub execution_time: NaiveDateTime,
    pub symbol: String,
    pub side: String,
    pub order_qty: f64,
    pub limit_price: f64,
    pub execution_price: f64,
    pub exchange: String,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
    pub price_improvement: f64,
}

impl AnnotatedFill {
    pub const CSV_HEADER: [&'static str; 14] = [
        "order_id",
        "order_time",
        "execution_time",
        "symbol",
        "side",
        "order_qty",
        "limit_price",
        "execution_price",
        "exchange",
        "bid_price",
        "ask_price",
        "bid_size",
        "ask_size",
        "price_improvement",
    ];
}

/// One NBBO observation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Quote {
    pub ts: NaiveDateTime,
    pub bid_price: f64,
    pub ask_price: f64,
    pub bid_size: Option<f64>,
    pub ask_size: Option<f64>,
}

/// Quote feed row as it appears on disk. Size columns are optional.
#[derive(Debug, Deserialize)]
struct QuoteRecord {
    ticker: String,
    ask_price: f64,
    bid_price: f64,
    /// Nanoseconds since epoch
    sip_timestamp: i64,
    #[serde(default)]
    bid_size: Option<f64>,
    #[serde(default)]
    ask_size: Option<f64>,
}

/// Per-symbol time-sorted quote series supporting backward as-of lookup.
#[derive(Debug, Default)]
pub struct QuoteBook {
    by_symbol: HashMap<String, Vec<Quote>>,
}

impl QuoteBook {
    pub fn insert(&mut self, symbol: &str, quote: Quote) {
        self.by_symbol
            .entry(symbol.to_string())
            .or_default()
            .push(quote);
    }

    /// Sort every series by timestamp. Must run once after loading,
    /// before any `prevailing` call.
    pub fn sort(&mut self) {
        for series in self.by_symbol.values_mut() {
            series.sort_by_key(|q| q.ts);
        }
    }

    pub fn len(&self) -> usize {
        self.by_symbol.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Most recent quote for `symbol` at or before `at`. None when the
    /// symbol is unknown or every quote is later than `at`.
    pub fn prevailing(&self, symbol: &str, at: NaiveDateTime) -> Option<&Quote> {
        let series = self.by_symbol.get(symbol)?;
        let idx = series.partition_point(|q| q.ts <= at);
        if idx == 0 {
            None
        } else {
            Some(&series[idx - 1])
        }
    }
}

/// Session filter: open..=close compared on wall-clock hour and minute,
/// the close minute itself included.
pub fn in_session(t: NaiveDateTime, session: &SessionConfig) -> bool {
    let (h, m) = (t.hour(), t.minute());
    let after_open =
        h > session.open_hour || (h == session.open_hour && m >= session.open_minute);
    let before_close =
        h < session.close_hour || (h == session.close_hour && m <= session.close_minute);
    after_open && before_close
}

/// Signed price improvement versus the limit: positive when a buy executed
/// below its limit or a sell above it. Not floored; the models learn from
/// adverse executions too.
pub fn signed_improvement(limit_price: f64, execution_price: f64, side: Side) -> f64 {
    match side {
        Side::Buy => limit_price - execution_price,
        Side::Sell => execution_price - limit_price,
    }
}

/// A fill with parsed timestamps and numerics, ready for the join.
#[derive(Debug, Clone)]
struct Execution {
    order_id: String,
    order_time: NaiveDateTime,
    execution_time: NaiveDateTime,
    symbol: String,
    side: String,
    order_qty: f64,
    limit_price: f64,
    execution_price: f64,
    exchange: String,
}

/// Parse and session-filter fills. Rows with unparseable timestamps or
/// numerics are dropped, not fatal.
fn prepare_executions(fills: &[MatchedFill], session: &SessionConfig) -> Vec<Execution> {
    let mut executions: Vec<Execution> = fills
        .iter()
        .filter_map(|fill| {
            let order_time = parse_transact_time(&fill.order_transact_time)?;
            let execution_time = parse_transact_time(&fill.execution_transact_time)?;
            if !in_session(order_time, session) {
                return None;
            }
            Some(Execution {
                order_id: fill.order_id.clone(),
                order_time,
                execution_time,
                symbol: fill.symbol.clone(),
                side: fill.side.clone(),
                order_qty: fill.order_qty.parse().ok()?,
                limit_price: fill.limit_price.parse().ok()?,
                execution_price: fill.avg_px.parse().ok()?,
                exchange: fill.last_mkt.clone(),
            })
        })
        .collect();

    executions.sort_by(|a, b| {
        (a.order_time, a.symbol.as_str()).cmp(&(b.order_time, b.symbol.as_str()))
    });
    executions
}

/// Load a quote CSV into a sorted book, session-filtered. When `symbols`
/// is given, quotes for other symbols are not loaded.
pub fn load_quotes(
    path: &Path,
    session: &SessionConfig,
    symbols: Option<&HashSet<String>>,
) -> Result<QuoteBook> {
    if !path.is_file() {
        return Err(crate::core::Error::InputNotFound(path.to_path_buf()));
    }

    let mut book = QuoteBook::default();
    let mut reader = csv::Reader::from_path(path)?;
    for row in reader.deserialize() {
        let record: QuoteRecord = match row {
            Ok(r) => r,
            Err(e) => {
                debug!("skipping malformed quote row: {}", e);
                continue;
            }
        };
        if let Some(wanted) = symbols {
            if !wanted.contains(&record.ticker) {
                continue;
            }
        }
        let Some(ts) = from_epoch_ns(record.sip_timestamp) else {
            continue;
        };
        if !in_session(ts, session) {
            continue;
        }
        book.insert(
            &record.ticker,
            Quote {
                ts,
                bid_price: record.bid_price,
                ask_price: record.ask_price,
                bid_size: record.bid_size,
                ask_size: record.ask_size,
            },
        );
    }
    book.sort();
    Ok(book)
}

/// Join prepared executions against the book. Executions with no
/// prevailing quote are dropped.
fn annotate(executions: Vec<Execution>, book: &QuoteBook) -> Vec<AnnotatedFill> {
    executions
        .into_iter()
        .filter_map(|exec| {
            let quote = book.prevailing(&exec.symbol, exec.order_time)?;
            let improvement = signed_improvement(
                exec.limit_price,
                exec.execution_price,
                Side::from_order_entry(&exec.side),
            );
            Some(AnnotatedFill {
                order_id: exec.order_id,
                order_time: exec.order_time,
                execution_time: exec.execution_time,
                symbol: exec.symbol,
                side: exec.side,
                order_qty: exec.order_qty,
                limit_price: exec.limit_price,
                execution_price: exec.execution_price,
                exchange: exec.exchange,
                bid_price: quote.bid_price,
                ask_price: quote.ask_price,
                bid_size: quote.bid_size,
                ask_size: quote.ask_size,
                price_improvement: improvement,
            })
        })
        .collect()
}

/// Counters reported after an annotate run.
#[derive(Debug, Default, Clone, Copy)]
pub struct AnnotateStats {
    pub fills: usize,
    pub executions: usize,
    pub quotes: usize,
    pub annotated: usize,
}

/// File front end: fills CSV + quotes CSV in, annotated CSV out.
pub fn annotate_file(
    executions_path: &Path,
    quotes_path: &Path,
    output: &Path,
    session: &SessionConfig,
    filter_symbols: bool,
) -> Result<AnnotateStats> {
    let fills = read_fills(executions_path)?;
    let executions = prepare_executions(&fills, session);

    let symbols: Option<HashSet<String>> = filter_symbols.then(|| {
        executions
            .iter()
            .map(|e| e.symbol.clone())
            .collect()
    });
    let book = load_quotes(quotes_path, session, symbols.as_ref())?;

    let mut stats = AnnotateStats {
        fills: fills.len(),
        executions: executions.len(),
        quotes: book.len(),
        annotated: 0,
    };

    let annotated = annotate(executions, &book);
    stats.annotated = annotated.len();

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output)?;
    writer.write_record(AnnotatedFill::CSV_HEADER)?;
    for row in &annotated {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(
        fills = stats.fills,
        in_session = stats.executions,
        quotes = stats.quotes,
        annotated = stats.annotated,
        "annotate complete"
    );
    Ok(stats)
}

/// Read an annotated CSV back, for the training stage. Malformed rows are
/// dropped, not fatal.
pub fn read_annotated(path: &Path) -> Result<Vec<AnnotatedFill>> {
    if !path.is_file() {
        return Err(crate::core::Error::InputNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut rows = Vec::new();
    for row in reader.deserialize() {
        match row {
            Ok(r) => rows.push(r),
            Err(e) => debug!("skipping malformed annotated row: {}", e),
        }
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn t(h: u32, m: u32, s: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, 2)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn quote(ts: NaiveDateTime, bid: f64, ask: f64) -> Quote {
        Quote {
            ts,
            bid_price: bid,
            ask_price: ask,
            bid_size: None,
            ask_size: None,
        }
    }

    #[test]
    fn test_session_bounds() {
        let session = SessionConfig::default();
        assert!(in_session(t(9, 30, 0), &session));
        assert!(in_session(t(12, 0, 0), &session));
        assert!(in_session(t(16, 0, 59), &session));
        assert!(!in_session(t(9, 29, 59), &session));
        assert!(!in_session(t(16, 1, 0), &session));
        assert!(!in_session(t(4, 0, 0), &session));
    }

    #[test]
    fn test_prevailing_picks_most_recent_at_or_before() {
        let mut book = QuoteBook::default();
        book.insert("XYZ", quote(t(10, 0, 0), 10.0, 10.2));
        book.insert("XYZ", quote(t(10, 0, 5), 10.1, 10.3));
        book.insert("XYZ", quote(t(10, 0, 9), 10.2, 10.4));
        book.sort();

        // Exact match wins over the nearest-but-later quote
        assert_eq!(
            book.prevailing("XYZ", t(10, 0, 5)).unwrap().bid_price,
            10.1
        );
        // Between observations: the earlier one prevails even when the
        // later is closer in time
        assert_eq!(
            book.prevailing("XYZ", t(10, 0, 8)).unwrap().bid_price,
            10.1
        );
        assert_eq!(
            book.prevailing("XYZ", t(11, 0, 0)).unwrap().bid_price,
            10.2
        );
    }

    #[test]
    fn test_prevailing_none_before_first_quote() {
        let mut book = QuoteBook::default();
        book.insert("XYZ", quote(t(10, 0, 0), 10.0, 10.2));
        book.sort();
        assert!(book.prevailing("XYZ", t(9, 59, 59)).is_none());
        assert!(book.prevailing("ABC", t(10, 0, 1)).is_none());
    }

    #[test]
    fn test_signed_improvement_not_floored() {
        assert!((signed_improvement(10.50, 10.40, Side::Buy) - 0.10).abs() < 1e-9);
        assert!((signed_improvement(10.50, 10.60, Side::Buy) + 0.10).abs() < 1e-9);
        assert!((signed_improvement(10.50, 10.60, Side::Sell) - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_annotate_joins_and_drops() {
        let mut book = QuoteBook::default();
        book.insert("XYZ", quote(t(9, 45, 0), 10.45, 10.55));
        book.sort();

        let session = SessionConfig::default();
        let fills = vec![
            MatchedFill {
                order_id: "A1".into(),
                order_transact_time: "20240102-10:00:00.000".into(),
                execution_transact_time: "20240102-10:00:01.000".into(),
                symbol: "XYZ".into(),
                side: "1".into(),
                order_qty: "100".into(),
                limit_price: "10.50".into(),
                avg_px: "10.40".into(),
                last_mkt: "NASD".into(),
            },
            // Before any quote for its symbol: dropped
            MatchedFill {
                order_id: "A2".into(),
                order_transact_time: "20240102-09:40:00.000".into(),
                execution_transact_time: "20240102-09:40:01.000".into(),
                symbol: "XYZ".into(),
                side: "2".into(),
                order_qty: "50".into(),
                limit_price: "10.00".into(),
                avg_px: "10.10".into(),
                last_mkt: "ARCA".into(),
            },
            // Outside the session: dropped before the join
            MatchedFill {
                order_id: "A3".into(),
                order_transact_time: "20240102-08:00:00.000".into(),
                execution_transact_time: "20240102-08:00:01.000".into(),
                symbol: "XYZ".into(),
                side: "1".into(),
                order_qty: "10".into(),
                limit_price: "9.00".into(),
                avg_px: "9.00".into(),
                last_mkt: "NASD".into(),
            },
        ];

        let executions = prepare_executions(&fills, &session);
        assert_eq!(executions.len(), 2);

        let annotated = annotate(executions, &book);
        assert_eq!(annotated.len(), 1);
        let row = &annotated[0];
        assert_eq!(row.order_id, "A1");
        assert_eq!(row.bid_price, 10.45);
        assert_eq!(row.ask_price, 10.55);
        assert!((row.price_improvement - 0.10).abs() < 1e-9);
    }

    #[test]
    fn test_prepare_drops_unparseable_rows() {
        let session = SessionConfig::default();
        let fills = vec![MatchedFill {
            order_id: "A1".into(),
            order_transact_time: "20240102-10:00:00.000".into(),
            execution_transact_time: "20240102-10:00:01.000".into(),
            symbol: "XYZ".into(),
            side: "1".into(),
            order_qty: "".into(),
            limit_price: "10.50".into(),
            avg_px: "10.40".into(),
            last_mkt: "NASD".into(),
        }];
        assert!(prepare_executions(&fills, &session).is_empty());
    }
}
