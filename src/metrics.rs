//! Per-venue execution metrics over matched fills.
//!
//! Consumes the extract stage's CSV and reports, per venue (LastMkt), the
//! mean price improvement and mean order-to-execution speed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::Serialize;
use tracing::{debug, info};

use crate::core::time::parse_transact_time;
use crate::core::{Error, MatchedFill, Result, Side};

/// One output row per venue.
#[derive(Debug, Clone, Serialize)]
pub struct VenueMetrics {
    #[serde(rename = "LastMkt")]
    pub last_mkt: String,
    #[serde(rename = "AvgPriceImprovement")]
    pub avg_price_improvement: Option<f64>,
    #[serde(rename = "AvgExecSpeedSecs")]
    pub avg_exec_speed_secs: Option<f64>,
}

impl VenueMetrics {
    pub const CSV_HEADER: [&'static str; 3] =
        ["LastMkt", "AvgPriceImprovement", "AvgExecSpeedSecs"];
}

/// NaN-aware mean: missing values stay out of both sum and count.
#[derive(Debug, Default)]
struct MeanAcc {
    sum: f64,
    n: u64,
}

impl MeanAcc {
    fn push(&mut self, value: f64) {
        self.sum += value;
        self.n += 1;
    }

    fn mean(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

/// Price improvement relative to the limit, floored at zero: buys improve
/// by paying below the limit, sells by receiving above it.
pub fn price_improvement(limit_price: f64, avg_px: f64, side: Side) -> f64 {
    let improvement = match side {
        Side::Buy => limit_price - avg_px,
        Side::Sell => avg_px - limit_price,
    };
    improvement.max(0.0)
}

/// Seconds between order placement and execution. None when either
/// timestamp fails to parse; the row then stays out of the speed mean only.
pub fn exec_speed_secs(fill: &MatchedFill) -> Option<f64> {
    let placed = parse_transact_time(&fill.order_transact_time)?;
    let executed = parse_transact_time(&fill.execution_transact_time)?;
    let micros = executed.signed_duration_since(placed).num_microseconds()?;
    Some(micros as f64 / 1e6)
}

/// Group fills by venue and average the derived columns. Venues come out
/// in sorted order; fills without a venue are excluded.
pub fn compute_metrics(fills: &[MatchedFill]) -> Vec<VenueMetrics> {
    let mut groups: BTreeMap<&str, (MeanAcc, MeanAcc)> = BTreeMap::new();

    for fill in fills {
        if fill.last_mkt.is_empty() {
            continue;
        }
        let (improvement, speed) = groups.entry(&fill.last_mkt).or_default();

        // An unrecognized side contributes zero improvement; a recognized
        // side with unparseable prices contributes nothing.
        match Side::from_fix(&fill.side) {
            Some(side) => {
                if let (Ok(limit), Ok(avg)) =
                    (fill.limit_price.parse::<f64>(), fill.avg_px.parse::<f64>())
                {
                    improvement.push(price_improvement(limit, avg, side));
                }
            }
            None => improvement.push(0.0),
        }

        if let Some(secs) = exec_speed_secs(fill) {
            speed.push(secs);
        }
    }

    groups
        .into_iter()
        .map(|(venue, (improvement, speed))| VenueMetrics {
            last_mkt: venue.to_string(),
            avg_price_improvement: improvement.mean(),
            avg_exec_speed_secs: speed.mean(),
        })
        .collect()
}

/// Read a fills CSV produced by the extract stage. Rows that fail to
/// deserialize are dropped, not fatal.
pub fn read_fills(path: &Path) -> Result<Vec<MatchedFill>> {
    if !path.is_file() {
        return Err(Error::InputNotFound(path.to_path_buf()));
    }
    let mut reader = csv::Reader::from_path(path)?;
    let mut fills = Vec::new();
    for row in reader.deserialize() {
        match row {
            Ok(fill) => fills.push(fill),
            Err(e) => debug!("skipping malformed fills row: {}", e),
        }
    }
    Ok(fills)
}

/// File front end: fills CSV in, metrics CSV out.
pub fn metrics_file(input: &Path, output: &Path) -> Result<()> {
    let fills = read_fills(input)?;
    let metrics = compute_metrics(&fills);

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(output)?;
    writer.write_record(VenueMetrics::CSV_HEADER)?;
    for row in &metrics {
        writer.serialize(row)?;
    }
    writer.flush()?;

    info!(
        fills = fills.len(),
        venues = metrics.len(),
        "metrics complete"
    );
    Ok(())
}
