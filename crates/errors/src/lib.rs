use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DispatchError {
    #[error("合约池获取失败: {0}")]
    ContractPoolUnavailable(String),
    #[error("当前时段没有可用的客服合约")]
    NoEligibleContracts,
    #[error("会话未找到: {id}")]
    ConversationNotFound { id: String },
    #[error("会话创建失败: 合约 {contract_id} - {message}")]
    ConversationCreation { contract_id: String, message: String },
    #[error("会话已提交过，不能重复提交")]
    SessionAlreadySubmitted,
    #[error("状态订阅已关闭: {0}")]
    FeedClosed(String),
    #[error("认证被拒绝: {0}")]
    AuthRejected(String),
    #[error("网络错误: {0}")]
    Network(String),
    #[error("操作超时: {0}")]
    Timeout(String),
    #[error("序列化错误: {0}")]
    Serialization(String),
    #[error("配置错误: {0}")]
    Configuration(String),
    #[error("数据验证失败: {0}")]
    ValidationError(String),
    #[error("后端服务错误: {0}")]
    Backend(String),
    #[error("内部错误: {0}")]
    Internal(String),
}

pub type DispatchResult<T> = Result<T, DispatchError>;

impl DispatchError {
    pub fn conversation_not_found<S: Into<String>>(id: S) -> Self {
        Self::ConversationNotFound { id: id.into() }
    }
    pub fn creation_error<C: Into<String>, M: Into<String>>(contract_id: C, message: M) -> Self {
        Self::ConversationCreation {
            contract_id: contract_id.into(),
            message: message.into(),
        }
    }
    pub fn network_error<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }
    pub fn timeout_error<S: Into<String>>(msg: S) -> Self {
        Self::Timeout(msg.into())
    }
    pub fn auth_rejected<S: Into<String>>(msg: S) -> Self {
        Self::AuthRejected(msg.into())
    }
    pub fn backend_error<S: Into<String>>(msg: S) -> Self {
        Self::Backend(msg.into())
    }
    pub fn config_error<S: Into<String>>(msg: S) -> Self {
        Self::Configuration(msg.into())
    }
    pub fn validation_error<S: Into<String>>(msg: S) -> Self {
        Self::ValidationError(msg.into())
    }
    /// 传输层瞬时错误，状态订阅遇到这类错误会自动重连
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            DispatchError::Network(_) | DispatchError::Timeout(_) | DispatchError::FeedClosed(_)
        )
    }
    pub fn user_message(&self) -> &str {
        match self {
            DispatchError::ContractPoolUnavailable(_) => "暂时无法获取客服信息，请稍后重试",
            DispatchError::NoEligibleContracts => "当前没有在线的客服，请稍后再试",
            DispatchError::ConversationCreation { .. } => "会话发起失败，请稍后重试",
            DispatchError::SessionAlreadySubmitted => "请求已提交，请勿重复提交",
            DispatchError::AuthRejected(_) => "身份验证失败，请重新登录",
            DispatchError::ValidationError(_) => "输入数据验证失败",
            DispatchError::Timeout(_) => "操作超时，请稍后重试",
            _ => "系统繁忙，请稍后重试",
        }
    }
}

impl From<serde_json::Error> for DispatchError {
    fn from(err: serde_json::Error) -> Self {
        DispatchError::Serialization(err.to_string())
    }
}

impl From<anyhow::Error> for DispatchError {
    fn from(err: anyhow::Error) -> Self {
        DispatchError::Internal(err.to_string())
    }
}
