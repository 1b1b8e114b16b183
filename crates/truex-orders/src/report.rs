//! Execution report parsing.
//!
//! Extracts the order-lifecycle fields from a 35=8 message. Quantities and
//! prices stay as decimals; absent optional tags stay `None` so the manager
//! can fall back to computed values.

use crate::error::{OrderError, OrderResult};
use truex_core::{ClientOrderId, OrderSide, OrderStatus, Price, Size};
use truex_fix::{tags, FixMessage};

/// Parsed execution report (35=8).
#[derive(Debug, Clone, PartialEq)]
pub struct ExecReport {
    /// Tag 11. The order this report references.
    pub client_order_id: ClientOrderId,
    /// Tag 41, present on cancel-replace confirmations.
    pub orig_client_order_id: Option<ClientOrderId>,
    /// Tag 37, exchange-assigned order id.
    pub exchange_order_id: Option<String>,
    /// Tag 17, execution id; becomes the fill id.
    pub exec_id: Option<String>,
    /// Tag 39 mapped onto the domain status.
    pub status: Option<OrderStatus>,
    /// Tag 150 raw value.
    pub exec_type: Option<String>,
    /// Tag 14.
    pub cum_qty: Option<Size>,
    /// Tag 6.
    pub avg_px: Option<Price>,
    /// Tag 151.
    pub leaves_qty: Option<Size>,
    /// Tag 32.
    pub last_qty: Option<Size>,
    /// Tag 31.
    pub last_px: Option<Price>,
    /// Tag 54.
    pub side: Option<OrderSide>,
    /// Tag 55.
    pub symbol: Option<String>,
    /// Tag 58, reject or informational text.
    pub text: Option<String>,
    /// Tag 103, reject reason code.
    pub ord_rej_reason: Option<String>,
}

impl ExecReport {
    /// Parse from a decoded FIX message. Fails only when tag 11 is absent;
    /// everything else is optional on the wire.
    pub fn parse(msg: &FixMessage) -> OrderResult<Self> {
        let client_order_id = msg
            .get(tags::CL_ORD_ID)
            .map(ClientOrderId::from)
            .ok_or_else(|| OrderError::Invalid("execution report without ClOrdID".to_string()))?;

        Ok(Self {
            client_order_id,
            orig_client_order_id: msg.get(tags::ORIG_CL_ORD_ID).map(ClientOrderId::from),
            exchange_order_id: msg.get(tags::ORDER_ID).map(str::to_string),
            exec_id: msg.get(tags::EXEC_ID).map(str::to_string),
            status: msg.get(tags::ORD_STATUS).and_then(OrderStatus::from_ord_status),
            exec_type: msg.get(tags::EXEC_TYPE).map(str::to_string),
            cum_qty: parse_tag(msg, tags::CUM_QTY),
            avg_px: parse_tag(msg, tags::AVG_PX),
            leaves_qty: parse_tag(msg, tags::LEAVES_QTY),
            last_qty: parse_tag(msg, tags::LAST_QTY),
            last_px: parse_tag(msg, tags::LAST_PX),
            side: msg.get(tags::SIDE).and_then(OrderSide::from_fix),
            symbol: msg.get(tags::SYMBOL).map(str::to_string),
            text: msg.get(tags::TEXT).map(str::to_string),
            ord_rej_reason: msg.get(tags::ORD_REJ_REASON).map(str::to_string),
        })
    }

    /// True when this report is a reject (OrdStatus 8 or ExecType 8).
    pub fn is_reject(&self) -> bool {
        self.status == Some(OrderStatus::Rejected)
            || self.exec_type.as_deref() == Some("8")
            || self.ord_rej_reason.is_some()
    }

    /// True when the report carries a fill.
    pub fn has_fill(&self) -> bool {
        self.last_qty.is_some_and(|q| q.is_positive())
    }
}

fn parse_tag<T: std::str::FromStr>(msg: &FixMessage, tag: u32) -> Option<T> {
    msg.get(tag).and_then(|raw| raw.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use truex_fix::{decode, FrameBuilder, MsgType};

    fn report_frame(fields: &[(u32, &str)]) -> FixMessage {
        let mut builder = FrameBuilder::new(MsgType::ExecutionReport).header(
            "TRUEX_UAT_OE",
            "CLI",
            9,
            "20251006-14:30:00.000",
        );
        for (tag, value) in fields {
            builder = builder.field(*tag, *value);
        }
        decode(&builder.build()).unwrap()
    }

    #[test]
    fn test_parse_ack_report() {
        let msg = report_frame(&[
            (11, "ORDER_001"),
            (37, "EX-777"),
            (39, "0"),
            (150, "0"),
            (14, "0"),
            (151, "1.5"),
        ]);

        let report = ExecReport::parse(&msg).unwrap();
        assert_eq!(report.client_order_id.as_str(), "ORDER_001");
        assert_eq!(report.exchange_order_id.as_deref(), Some("EX-777"));
        assert_eq!(report.status, Some(OrderStatus::New));
        assert_eq!(report.leaves_qty.unwrap().inner(), dec!(1.5));
        assert!(!report.is_reject());
        assert!(!report.has_fill());
    }

    #[test]
    fn test_parse_fill_report() {
        let msg = report_frame(&[
            (11, "ORDER_001"),
            (17, "EXEC-1"),
            (37, "EX-777"),
            (39, "1"),
            (14, "0.5"),
            (6, "30000.5"),
            (151, "1.0"),
            (32, "0.5"),
            (31, "30000.5"),
        ]);

        let report = ExecReport::parse(&msg).unwrap();
        assert!(report.has_fill());
        assert_eq!(report.last_qty.unwrap().inner(), dec!(0.5));
        assert_eq!(report.last_px.unwrap().inner(), dec!(30000.5));
        assert_eq!(report.status, Some(OrderStatus::PartiallyFilled));
    }

    #[test]
    fn test_parse_reject_report() {
        let msg = report_frame(&[(11, "ORDER_001"), (39, "8"), (58, "Invalid client")]);

        let report = ExecReport::parse(&msg).unwrap();
        assert!(report.is_reject());
        assert_eq!(report.text.as_deref(), Some("Invalid client"));
    }

    #[test]
    fn test_missing_cl_ord_id_fails() {
        let msg = report_frame(&[(39, "0")]);
        assert!(ExecReport::parse(&msg).is_err());
    }
}
