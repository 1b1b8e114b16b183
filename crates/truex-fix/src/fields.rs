//! FIX tag numbers and message types used by the TrueX dialect.

use std::fmt;

/// Tag numbers. Non-exhaustive; unknown tags pass through the decoder.
pub mod tags {
    pub const BEGIN_STRING: u32 = 8;
    pub const BODY_LENGTH: u32 = 9;
    pub const CHECK_SUM: u32 = 10;
    pub const CL_ORD_ID: u32 = 11;
    pub const CUM_QTY: u32 = 14;
    pub const EXEC_ID: u32 = 17;
    pub const EXEC_INST: u32 = 18;
    pub const LAST_PX: u32 = 31;
    pub const LAST_QTY: u32 = 32;
    pub const MSG_SEQ_NUM: u32 = 34;
    pub const MSG_TYPE: u32 = 35;
    pub const ORDER_ID: u32 = 37;
    pub const ORDER_QTY: u32 = 38;
    pub const ORD_STATUS: u32 = 39;
    pub const ORD_TYPE: u32 = 40;
    pub const ORIG_CL_ORD_ID: u32 = 41;
    pub const PRICE: u32 = 44;
    pub const AVG_PX: u32 = 6;
    pub const SENDER_COMP_ID: u32 = 49;
    pub const SENDING_TIME: u32 = 52;
    pub const SIDE: u32 = 54;
    pub const SYMBOL: u32 = 55;
    pub const TARGET_COMP_ID: u32 = 56;
    pub const TEXT: u32 = 58;
    pub const TIME_IN_FORCE: u32 = 59;
    pub const ENCRYPT_METHOD: u32 = 98;
    pub const ORD_REJ_REASON: u32 = 103;
    pub const HEART_BT_INT: u32 = 108;
    pub const TEST_REQ_ID: u32 = 112;
    pub const RESET_SEQ_NUM_FLAG: u32 = 141;
    pub const NO_RELATED_SYM: u32 = 146;
    pub const EXEC_TYPE: u32 = 150;
    pub const LEAVES_QTY: u32 = 151;
    pub const MD_REQ_ID: u32 = 262;
    pub const SUBSCRIPTION_REQUEST_TYPE: u32 = 263;
    pub const MARKET_DEPTH: u32 = 264;
    pub const NO_MD_ENTRY_TYPES: u32 = 267;
    pub const NO_MD_ENTRIES: u32 = 268;
    pub const MD_ENTRY_TYPE: u32 = 269;
    pub const MD_ENTRY_PX: u32 = 270;
    pub const MD_ENTRY_SIZE: u32 = 271;
    pub const MD_ENTRY_TIME: u32 = 273;
    pub const MD_UPDATE_ACTION: u32 = 279;
    pub const PARTY_ID: u32 = 448;
    pub const PARTY_ROLE: u32 = 452;
    pub const NO_PARTY_IDS: u32 = 453;
    pub const USERNAME: u32 = 553;
    pub const PASSWORD: u32 = 554;
    pub const MD_PRICE_LEVEL: u32 = 1023;
    pub const DEFAULT_APPL_VER_ID: u32 = 1137;
    pub const AGGRESSOR_SIDE: u32 = 2446;

    /// Sequence gap handling.
    pub const BEGIN_SEQ_NO: u32 = 7;
    pub const END_SEQ_NO: u32 = 16;
    pub const NEW_SEQ_NO: u32 = 36;
    pub const GAP_FILL_FLAG: u32 = 123;
}

/// Message types consumed and produced by the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MsgType {
    Logon,
    Heartbeat,
    TestRequest,
    ResendRequest,
    SequenceReset,
    Logout,
    NewOrderSingle,
    OrderCancelReplaceRequest,
    ExecutionReport,
    MarketDataRequest,
    MarketDataSnapshot,
    MarketDataIncremental,
    MarketDataRequestReject,
}

impl MsgType {
    /// Tag 35 wire value.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Logon => "A",
            Self::Heartbeat => "0",
            Self::TestRequest => "1",
            Self::ResendRequest => "2",
            Self::SequenceReset => "4",
            Self::Logout => "5",
            Self::NewOrderSingle => "D",
            Self::OrderCancelReplaceRequest => "G",
            Self::ExecutionReport => "8",
            Self::MarketDataRequest => "V",
            Self::MarketDataSnapshot => "W",
            Self::MarketDataIncremental => "X",
            Self::MarketDataRequestReject => "Y",
        }
    }

    /// Parse a tag 35 value. Returns None for unknown types; the decoder is
    /// tolerant and the session decides whether to drop or reject.
    pub fn parse(v: &str) -> Option<Self> {
        match v {
            "A" => Some(Self::Logon),
            "0" => Some(Self::Heartbeat),
            "1" => Some(Self::TestRequest),
            "2" => Some(Self::ResendRequest),
            "4" => Some(Self::SequenceReset),
            "5" => Some(Self::Logout),
            "D" => Some(Self::NewOrderSingle),
            "G" => Some(Self::OrderCancelReplaceRequest),
            "8" => Some(Self::ExecutionReport),
            "V" => Some(Self::MarketDataRequest),
            "W" => Some(Self::MarketDataSnapshot),
            "X" => Some(Self::MarketDataIncremental),
            "Y" => Some(Self::MarketDataRequestReject),
            _ => None,
        }
    }

    /// Session-level messages are handled by the state machine itself;
    /// everything else is routed to the application demux.
    pub fn is_session_level(&self) -> bool {
        matches!(
            self,
            Self::Logon
                | Self::Heartbeat
                | Self::TestRequest
                | Self::ResendRequest
                | Self::SequenceReset
                | Self::Logout
        )
    }
}

impl fmt::Display for MsgType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_msg_type_round_trip() {
        for mt in [
            MsgType::Logon,
            MsgType::Heartbeat,
            MsgType::TestRequest,
            MsgType::ResendRequest,
            MsgType::SequenceReset,
            MsgType::Logout,
            MsgType::NewOrderSingle,
            MsgType::OrderCancelReplaceRequest,
            MsgType::ExecutionReport,
            MsgType::MarketDataRequest,
            MsgType::MarketDataSnapshot,
            MsgType::MarketDataIncremental,
            MsgType::MarketDataRequestReject,
        ] {
            assert_eq!(MsgType::parse(mt.as_str()), Some(mt));
        }
        assert_eq!(MsgType::parse("ZZ"), None);
    }

    #[test]
    fn test_session_level_routing() {
        assert!(MsgType::Logon.is_session_level());
        assert!(MsgType::Heartbeat.is_session_level());
        assert!(!MsgType::ExecutionReport.is_session_level());
        assert!(!MsgType::MarketDataSnapshot.is_session_level());
    }
}
