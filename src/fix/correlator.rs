//! Order/execution correlation — the state machine at the heart of extract.

use std::collections::HashMap;

use crate::core::MatchedFill;

use super::message::{tags, values, FixMessage, MsgType};

/// Order fields captured from a NewOrderSingle, held until a fill arrives.
/// Missing source fields are captured as empty strings.
#[derive(Debug, Clone)]
struct PendingOrder {
    transact_time: String,
    symbol: String,
    side: String,
    order_qty: String,
    limit_price: String,
}

/// Correlates execution reports back to the NewOrderSingle that placed the
/// order, keyed by ClOrdID (11).
///
/// Per id the store knows two implicit states: pending (present) and absent;
/// consumed and never-seen are indistinguishable. A matched order is left in
/// the store, so a second qualifying execution for the same id matches
/// again, and a later NewOrderSingle under a known id overwrites the
/// pending entry. The store lives exactly as long as one input stream;
/// orders still pending at stream end are discarded without error.
#[derive(Debug, Default)]
pub struct FillCorrelator {
    pending: HashMap<String, PendingOrder>,
}

impl FillCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of orders currently pending.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Feed one decoded message. Returns a joined row when the message is a
    /// qualifying execution whose order was seen earlier in the stream.
    pub fn on_message(&mut self, msg: &FixMessage) -> Option<MatchedFill> {
        match msg.msg_type() {
            MsgType::NewOrderSingle => {
                self.on_new_order(msg);
                None
            }
            MsgType::ExecutionReport => self.on_execution_report(msg),
            MsgType::Other => None,
        }
    }

    fn on_new_order(&mut self, msg: &FixMessage) {
        // Without a ClOrdID the order can never be matched; drop it.
        let Some(cl_ord_id) = msg.get(tags::CL_ORD_ID) else {
            tracing::debug!("new order without ClOrdID dropped");
            return;
        };

        self.pending.insert(
            cl_ord_id.to_string(),
            PendingOrder {
                transact_time: msg.get_or_empty(tags::TRANSACT_TIME).to_string(),
                symbol: msg.get_or_empty(tags::SYMBOL).to_string(),
                side: msg.get_or_empty(tags::SIDE).to_string(),
                order_qty: msg.get_or_empty(tags::ORDER_QTY).to_string(),
                limit_price: msg.get_or_empty(tags::PRICE).to_string(),
            },
        );
    }

    fn on_execution_report(&mut self, msg: &FixMessage) -> Option<MatchedFill> {
        // Full fills of limit orders only; any failing sub-condition
        // silently disqualifies the report.
        if msg.get(tags::EXEC_TYPE) != Some(values::EXEC_TYPE_FILL)
            || msg.get(tags::ORD_STATUS) != Some(values::ORD_STATUS_FILLED)
            || msg.get(tags::ORD_TYPE) != Some(values::ORD_TYPE_LIMIT)
        {
            return None;
        }

        let cl_ord_id = msg.get(tags::CL_ORD_ID)?;
        let Some(order) = self.pending.get(cl_ord_id) else {
            // A fill whose originating order was never observed is omitted,
            // not an error: gaps in the stream are tolerated by omission.
            tracing::debug!(cl_ord_id, "fill without pending order dropped");
            return None;
        };

        Some(MatchedFill {
            order_id: cl_ord_id.to_string(),
            order_transact_time: order.transact_time.clone(),
            execution_transact_time: msg.get_or_empty(tags::TRANSACT_TIME).to_string(),
            symbol: prefer(&order.symbol, msg.get_or_empty(tags::SYMBOL)),
            side: prefer(&order.side, msg.get_or_empty(tags::SIDE)),
            order_qty: prefer(&order.order_qty, msg.get_or_empty(tags::ORDER_QTY)),
            limit_price: prefer(&order.limit_price, msg.get_or_empty(tags::PRICE)),
            avg_px: msg.get_or_empty(tags::AVG_PX).to_string(),
            last_mkt: msg.get_or_empty(tags::LAST_MKT).to_string(),
        })
    }
}

/// Order-side value wins when non-empty, execution-side value otherwise.
fn prefer(order_value: &str, execution_value: &str) -> String {
    if order_value.is_empty() {
        execution_value.to_string()
    } else {
        order_value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NEW_ORDER: &str = "35=D\x0111=A1\x0160=20240102-09:30:00.000\x0155=XYZ\x0154=1\x0138=100\x0144=10.50\x01";
    const FULL_FILL: &str = "35=8\x0111=A1\x0160=20240102-09:30:01.500\x01150=2\x0139=2\x0140=2\x016=10.40\x0130=NASD\x01";

    fn feed(correlator: &mut FillCorrelator, line: &str) -> Option<MatchedFill> {
        correlator.on_message(&FixMessage::from_line(line))
    }

    #[test]
    fn test_order_then_fill_matches() {
        let mut correlator = FillCorrelator::new();
        assert!(feed(&mut correlator, NEW_ORDER).is_none());

        let fill = feed(&mut correlator, FULL_FILL).expect("should match");
        assert_eq!(fill.order_id, "A1");
        assert_eq!(fill.order_transact_time, "20240102-09:30:00.000");
        assert_eq!(fill.execution_transact_time, "20240102-09:30:01.500");
        assert_eq!(fill.symbol, "XYZ");
        assert_eq!(fill.side, "1");
        assert_eq!(fill.order_qty, "100");
        assert_eq!(fill.limit_price, "10.50");
        assert_eq!(fill.avg_px, "10.40");
        assert_eq!(fill.last_mkt, "NASD");
    }

    #[test]
    fn test_non_fill_exec_type_disqualifies() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        // ExecType 0 (new), everything else qualifying
        let report = "35=8\x0111=A1\x0160=20240102-09:30:01.500\x01150=0\x0139=2\x0140=2\x016=10.40\x0130=NASD\x01";
        assert!(feed(&mut correlator, report).is_none());
    }

    #[test]
    fn test_partial_status_disqualifies() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        // OrdStatus 1 (partially filled)
        let report = "35=8\x0111=A1\x01150=2\x0139=1\x0140=2\x01";
        assert!(feed(&mut correlator, report).is_none());
    }

    #[test]
    fn test_market_order_disqualifies() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        // OrdType 1 (market)
        let report = "35=8\x0111=A1\x01150=2\x0139=2\x0140=1\x01";
        assert!(feed(&mut correlator, report).is_none());
    }

    #[test]
    fn test_fill_without_order_dropped() {
        let mut correlator = FillCorrelator::new();
        assert!(feed(&mut correlator, FULL_FILL).is_none());
    }

    #[test]
    fn test_fill_without_cl_ord_id_dropped() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        let report = "35=8\x0160=20240102-09:30:01.500\x01150=2\x0139=2\x0140=2\x01";
        assert!(feed(&mut correlator, report).is_none());
    }

    #[test]
    fn test_order_without_cl_ord_id_not_stored() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, "35=D\x0160=20240102-09:30:00.000\x0155=XYZ\x01");
        assert_eq!(correlator.pending_len(), 0);
    }

    #[test]
    fn test_duplicate_order_last_wins() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        feed(
            &mut correlator,
            "35=D\x0111=A1\x0160=20240102-09:31:00.000\x0155=ABC\x0154=2\x0138=200\x0144=11.00\x01",
        );
        assert_eq!(correlator.pending_len(), 1);

        let fill = feed(&mut correlator, FULL_FILL).expect("should match");
        assert_eq!(fill.symbol, "ABC");
        assert_eq!(fill.side, "2");
        assert_eq!(fill.order_qty, "200");
        assert_eq!(fill.limit_price, "11.00");
        assert_eq!(fill.order_transact_time, "20240102-09:31:00.000");
    }

    #[test]
    fn test_matched_order_stays_and_matches_again() {
        let mut correlator = FillCorrelator::new();
        feed(&mut correlator, NEW_ORDER);
        assert!(feed(&mut correlator, FULL_FILL).is_some());
        assert_eq!(correlator.pending_len(), 1);
        assert!(feed(&mut correlator, FULL_FILL).is_some());
    }

    #[test]
    fn test_execution_fields_fill_gaps() {
        let mut correlator = FillCorrelator::new();
        // Order carries no symbol/side/qty/price
        feed(&mut correlator, "35=D\x0111=B7\x0160=20240102-10:00:00.000\x01");
        let report = "35=8\x0111=B7\x0160=20240102-10:00:01.000\x01150=2\x0139=2\x0140=2\x0155=QQQ\x0154=2\x0138=50\x0144=99.00\x016=98.50\x0130=ARCA\x01";
        let fill = feed(&mut correlator, report).expect("should match");
        assert_eq!(fill.symbol, "QQQ");
        assert_eq!(fill.side, "2");
        assert_eq!(fill.order_qty, "50");
        assert_eq!(fill.limit_price, "99.00");
        // Order timestamp never falls back to the execution's
        assert_eq!(fill.order_transact_time, "20240102-10:00:00.000");
    }

    #[test]
    fn test_other_message_types_ignored() {
        let mut correlator = FillCorrelator::new();
        assert!(feed(&mut correlator, "35=A\x0111=A1\x01").is_none());
        assert!(feed(&mut correlator, "35=0\x01").is_none());
        assert_eq!(correlator.pending_len(), 0);
    }
}
