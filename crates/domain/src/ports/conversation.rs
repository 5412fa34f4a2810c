use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::entities::{Conversation, ConversationStatus, NewConversation};
use crate::value_objects::ConversationId;
use dispatch_errors::DispatchResult;

/// 单个会话的状态变更推送流
pub type StatusStream = BoxStream<'static, DispatchResult<ConversationStatus>>;

/// 会话后端服务接口
///
/// 所有方法都必须能对不同合约并发调用。
#[async_trait]
pub trait ConversationBackend: Send + Sync {
    /// 针对某个合约创建会话
    async fn create_conversation(&self, request: &NewConversation) -> DispatchResult<Conversation>;

    /// 读取会话当前状态
    async fn fetch_status(&self, conversation_id: &ConversationId)
        -> DispatchResult<ConversationStatus>;

    /// 订阅会话状态变更，至少一次投递
    async fn watch_status(&self, conversation_id: &ConversationId) -> DispatchResult<StatusStream>;

    /// 将会话标记为未接，后端需保证幂等
    async fn mark_missed(&self, conversation_id: &ConversationId) -> DispatchResult<()>;

    /// 写入会话开场消息
    async fn create_opening_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        author: &str,
    ) -> DispatchResult<()>;
}
