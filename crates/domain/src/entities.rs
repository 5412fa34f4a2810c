use std::time::Duration;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value_objects::{ContractId, ContractSession, ConversationId};
use dispatch_errors::{DispatchError, DispatchResult};

/// 客服合约：一个客服的可用性记录
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Contract {
    pub id: ContractId,
    pub session: ContractSession,
    pub status: ContractStatus, // ACTIVE, INACTIVE
    pub miss_timeout_seconds: u32,
    #[serde(default)]
    pub color: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum ContractStatus {
    #[serde(rename = "ACTIVE")]
    Active,
    #[serde(rename = "INACTIVE")]
    Inactive,
}

impl Contract {
    pub fn is_active(&self) -> bool {
        matches!(self.status, ContractStatus::Active)
    }

    /// 未接超时时长，0表示不设置未接计时
    pub fn miss_timeout(&self) -> Option<Duration> {
        if self.miss_timeout_seconds == 0 {
            None
        } else {
            Some(Duration::from_secs(u64::from(self.miss_timeout_seconds)))
        }
    }
}

/// 后端返回的会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    pub id: ConversationId,
    pub contract_id: ContractId,
    pub status: ConversationStatus,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ConversationStatus {
    #[serde(rename = "CREATED")]
    Created,
    #[serde(rename = "STARTED")]
    Started,
    #[serde(rename = "MISSED")]
    Missed,
    #[serde(rename = "FAILED")]
    Failed,
}

impl ConversationStatus {
    /// 已经不可能再被接起
    pub fn is_lost(&self) -> bool {
        matches!(self, ConversationStatus::Missed | ConversationStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Created => "CREATED",
            ConversationStatus::Started => "STARTED",
            ConversationStatus::Missed => "MISSED",
            ConversationStatus::Failed => "FAILED",
        }
    }
}

/// 成功创建、等待客服接起的会话
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PendingConversation {
    pub id: ConversationId,
    pub contract_id: ContractId,
    pub status: ConversationStatus,
    pub missed: bool,
}

impl PendingConversation {
    pub fn mark_started(&mut self) {
        self.status = ConversationStatus::Started;
    }

    pub fn mark_missed(&mut self) {
        self.status = ConversationStatus::Missed;
        self.missed = true;
    }

    pub fn mark_failed(&mut self) {
        self.status = ConversationStatus::Failed;
    }

    pub fn is_lost(&self) -> bool {
        self.status.is_lost()
    }
}

impl From<Conversation> for PendingConversation {
    fn from(conversation: Conversation) -> Self {
        Self {
            id: conversation.id,
            contract_id: conversation.contract_id,
            status: ConversationStatus::Created,
            missed: false,
        }
    }
}

/// 访客提交的表单
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CustomerForm {
    pub customer_name: String,
    pub headline: String,
    pub ip_address: Option<String>,
}

impl CustomerForm {
    pub fn validate(&self) -> DispatchResult<()> {
        if self.customer_name.trim().is_empty() {
            return Err(DispatchError::validation_error("访客姓名不能为空"));
        }
        if self.headline.trim().is_empty() {
            return Err(DispatchError::validation_error("咨询标题不能为空"));
        }
        Ok(())
    }

    /// 校验表单并生成带新关联键的分发请求
    pub fn into_request(self) -> DispatchResult<DispatchRequest> {
        self.validate()?;
        Ok(DispatchRequest::new(
            self.customer_name.trim().to_string(),
            self.headline.trim().to_string(),
            self.ip_address,
        ))
    }
}

/// 一次提交对应的分发请求，同一次扇出的所有会话共享 correlation_key
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DispatchRequest {
    pub correlation_key: Uuid,
    pub customer_name: String,
    pub headline: String,
    pub ip_address: Option<String>,
}

impl DispatchRequest {
    pub fn new(customer_name: String, headline: String, ip_address: Option<String>) -> Self {
        Self {
            correlation_key: Uuid::new_v4(),
            customer_name,
            headline,
            ip_address,
        }
    }

    pub fn for_contract(&self, contract_id: &ContractId) -> NewConversation {
        NewConversation {
            customer_name: self.customer_name.clone(),
            headline: self.headline.clone(),
            contract_id: contract_id.clone(),
            correlation_key: self.correlation_key,
            ip_address: self.ip_address.clone(),
        }
    }
}

/// 创建会话调用的载荷
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewConversation {
    pub customer_name: String,
    pub headline: String,
    pub contract_id: ContractId,
    pub correlation_key: Uuid,
    pub ip_address: Option<String>,
}

/// 单个合约的会话创建失败记录
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationFailure {
    pub contract_id: ContractId,
    pub error: DispatchError,
}

/// 一次分发会话的最终结果，每个会话只产生一次
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    Connected(PendingConversation),
    AllFailed,
    AllMissed,
    TimedOut,
    Aborted(String),
}

impl DispatchOutcome {
    pub fn is_connected(&self) -> bool {
        matches!(self, DispatchOutcome::Connected(_))
    }

    pub fn winner(&self) -> Option<&PendingConversation> {
        match self {
            DispatchOutcome::Connected(conversation) => Some(conversation),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DispatchOutcome::Connected(_) => "connected",
            DispatchOutcome::AllFailed => "all_failed",
            DispatchOutcome::AllMissed => "all_missed",
            DispatchOutcome::TimedOut => "timed_out",
            DispatchOutcome::Aborted(_) => "aborted",
        }
    }

    pub fn user_message(&self) -> &str {
        match self {
            DispatchOutcome::Connected(_) => "客服已接入",
            DispatchOutcome::AllFailed => "会话发起失败，请稍后重试",
            DispatchOutcome::AllMissed => "客服暂时无人应答，请留言或稍后再试",
            DispatchOutcome::TimedOut => "等待超时，请稍后再试",
            DispatchOutcome::Aborted(reason) => reason,
        }
    }
}
