//! Decoded FIX messages and the tag contract this toolkit consumes.

use std::collections::HashMap;

use super::tokenizer::tokenize;

/// FIX tags consumed by the pipeline. Tags are opaque strings on the wire;
/// no numeric validation is performed.
pub mod tags {
    pub const AVG_PX: &str = "6";
    pub const CL_ORD_ID: &str = "11";
    pub const LAST_MKT: &str = "30";
    pub const MSG_TYPE: &str = "35";
    pub const ORDER_QTY: &str = "38";
    pub const ORD_STATUS: &str = "39";
    pub const ORD_TYPE: &str = "40";
    pub const PRICE: &str = "44";
    pub const SIDE: &str = "54";
    pub const SYMBOL: &str = "55";
    pub const TRANSACT_TIME: &str = "60";
    pub const EXEC_TYPE: &str = "150";
}

/// Tag values with meaning to the correlator.
pub mod values {
    pub const MSG_TYPE_NEW_ORDER_SINGLE: &str = "D";
    pub const MSG_TYPE_EXECUTION_REPORT: &str = "8";
    /// ExecType (150): trade
    pub const EXEC_TYPE_FILL: &str = "2";
    /// OrdStatus (39): filled
    pub const ORD_STATUS_FILLED: &str = "2";
    /// OrdType (40): limit
    pub const ORD_TYPE_LIMIT: &str = "2";
}

/// Message classification driving the correlator transitions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgType {
    NewOrderSingle,
    ExecutionReport,
    /// Anything else in the stream; ignored with no side effect.
    Other,
}

/// One decoded log line: a map from tag to value.
///
/// A repeated tag keeps the last value seen. Lookups go through [`get`]
/// and [`get_or_empty`] so every consumer shares one defaulting rule
/// instead of ad hoc fallbacks at call sites.
///
/// [`get`]: FixMessage::get
/// [`get_or_empty`]: FixMessage::get_or_empty
#[derive(Debug, Clone, Default)]
pub struct FixMessage {
    fields: HashMap<String, String>,
}

impl FixMessage {
    /// Decode a token sequence. Empty tokens and tokens without `=` are
    /// silently dropped; a value may itself contain `=` (first one splits).
    pub fn decode(tokens: &[&str]) -> Self {
        let mut fields = HashMap::new();
        for token in tokens {
            if token.is_empty() {
                continue;
            }
            let Some((tag, value)) = token.split_once('=') else {
                continue;
            };
            fields.insert(tag.to_string(), value.to_string());
        }
        Self { fields }
    }

    /// Tokenize and decode a raw line in one step.
    pub fn from_line(line: &str) -> Self {
        Self::decode(&tokenize(line))
    }

    /// Value of `tag`, present and non-empty. An empty value is reported as
    /// absent: a `11=` with nothing after it cannot correlate anything.
    pub fn get(&self, tag: &str) -> Option<&str> {
        self.fields
            .get(tag)
            .map(String::as_str)
            .filter(|v| !v.is_empty())
    }

    /// Value of `tag`, with the empty-string default the output contract
    /// assigns to missing fields.
    pub fn get_or_empty(&self, tag: &str) -> &str {
        self.get(tag).unwrap_or("")
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Classify by MsgType (35).
    pub fn msg_type(&self) -> MsgType {
        match self.get(tags::MSG_TYPE) {
            Some(values::MSG_TYPE_NEW_ORDER_SINGLE) => MsgType::NewOrderSingle,
            Some(values::MSG_TYPE_EXECUTION_REPORT) => MsgType::ExecutionReport,
            _ => MsgType::Other,
        }
    }
}
