//! Core types - Strong typing for safety

use serde::{Deserialize, Serialize};

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Strict FIX tag 54 decoding: '1' = buy, '2' = sell.
    pub fn from_fix(s: &str) -> Option<Self> {
        match s {
            "1" => Some(Side::Buy),
            "2" => Some(Side::Sell),
            _ => None,
        }
    }

    /// Lenient order-entry decoding: 'B' or '1' = buy, anything else sell.
    pub fn from_order_entry(s: &str) -> Self {
        match s {
            "B" | "1" => Side::Buy,
            _ => Side::Sell,
        }
    }
}

impl std::fmt::Display for Side {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// A fully-joined order/execution pair, the unit the extract stage emits.
///
/// Cells are the verbatim strings captured from the source messages; absent
/// source fields are empty strings. Numeric and timestamp interpretation is
/// left to the consuming stages.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedFill {
    #[serde(rename = "OrderID")]
    pub order_id: String,
    #[serde(rename = "OrderTransactTime")]
    pub order_transact_time: String,
    #[serde(rename = "ExecutionTransactTime")]
    pub execution_transact_time: String,
    #[serde(rename = "Symbol")]
    pub symbol: String,
    #[serde(rename = "Side")]
    pub side: String,
    #[serde(rename = "OrderQty")]
    pub order_qty: String,
    #[serde(rename = "LimitPrice")]
    pub limit_price: String,
    #[serde(rename = "AvgPx")]
    pub avg_px: String,
    #[serde(rename = "LastMkt")]
    pub last_mkt: String,
}

impl MatchedFill {
    /// Output column names, in emission order.
    pub const CSV_HEADER: [&'static str; 9] = [
        "OrderID",
        "OrderTransactTime",
        "ExecutionTransactTime",
        "Symbol",
        "Side",
        "OrderQty",
        "LimitPrice",
        "AvgPx",
        "LastMkt",
    ];
}
