use std::fmt;

use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// 客服合约ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContractId(String);

/// 会话ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

macro_rules! string_id {
    ($name:ident) => {
        impl $name {
            pub fn new<S: Into<String>>(id: S) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(ContractId);
string_id!(ConversationId);

/// 合约值班时段，按UTC小时划分为三个8小时区间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContractSession {
    /// [0, 8)
    #[serde(rename = "NIGHT")]
    Night,
    /// [8, 16)
    #[serde(rename = "DAY")]
    Day,
    /// [16, 24)
    #[serde(rename = "EVENING")]
    Evening,
}

impl ContractSession {
    pub fn for_utc_hour(hour: u32) -> Self {
        match hour {
            0..=7 => ContractSession::Night,
            8..=15 => ContractSession::Day,
            _ => ContractSession::Evening,
        }
    }

    pub fn at(time: DateTime<Utc>) -> Self {
        Self::for_utc_hour(time.hour())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ContractSession::Night => "NIGHT",
            ContractSession::Day => "DAY",
            ContractSession::Evening => "EVENING",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_session_bucket_boundaries() {
        assert_eq!(ContractSession::for_utc_hour(0), ContractSession::Night);
        assert_eq!(ContractSession::for_utc_hour(7), ContractSession::Night);
        assert_eq!(ContractSession::for_utc_hour(8), ContractSession::Day);
        assert_eq!(ContractSession::for_utc_hour(15), ContractSession::Day);
        assert_eq!(ContractSession::for_utc_hour(16), ContractSession::Evening);
        assert_eq!(ContractSession::for_utc_hour(23), ContractSession::Evening);
    }

    #[test]
    fn test_session_at_time() {
        let time = Utc.with_ymd_and_hms(2024, 5, 1, 12, 30, 0).unwrap();
        assert_eq!(ContractSession::at(time), ContractSession::Day);
    }

    #[test]
    fn test_id_display_and_serde() {
        let id = ConversationId::new("conv-1");
        assert_eq!(id.to_string(), "conv-1");
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"conv-1\"");

        let contract: ContractId = "contract-a".into();
        assert_eq!(contract.as_str(), "contract-a");
    }
}
