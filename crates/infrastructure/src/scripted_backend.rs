//! 内存版会话后端
//!
//! 每个合约按脚本响应：创建失败、若干秒后接起、若干秒后报告失败或始终无人应答。
//! 状态推送使用无界通道，订阅时不补发当前值，补发由状态订阅方自行完成。

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::channel::mpsc::{unbounded, UnboundedSender};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use uuid::Uuid;

use dispatch_domain::{
    ContractId, Conversation, ConversationBackend, ConversationId, ConversationStatus,
    NewConversation, StatusStream,
};
use dispatch_errors::{DispatchError, DispatchResult};

/// 单个合约的模拟行为
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "behavior", rename_all = "snake_case")]
pub enum ConversationScript {
    /// 会话创建后 `after_seconds` 秒客服接起
    Answer { after_seconds: u64 },
    /// 会话创建后 `after_seconds` 秒后端报告失败
    Fail { after_seconds: u64 },
    /// 创建会话直接失败
    RejectCreation { message: String },
    #[default]
    NeverAnswer,
}

type FeedSender = UnboundedSender<DispatchResult<ConversationStatus>>;

#[derive(Debug)]
struct ConversationRecord {
    contract_id: ContractId,
    status: ConversationStatus,
    feeds: Vec<FeedSender>,
}

#[derive(Debug, Default)]
struct BackendState {
    conversations: HashMap<ConversationId, ConversationRecord>,
    opening_messages: Vec<(ConversationId, String, String)>,
}

#[derive(Debug, Clone, Default)]
pub struct ScriptedConversationBackend {
    scripts: Arc<HashMap<ContractId, ConversationScript>>,
    state: Arc<RwLock<BackendState>>,
}

impl ScriptedConversationBackend {
    pub fn new(scripts: HashMap<ContractId, ConversationScript>) -> Self {
        Self {
            scripts: Arc::new(scripts),
            state: Arc::new(RwLock::new(BackendState::default())),
        }
    }

    pub fn script_for(&self, contract_id: &ContractId) -> ConversationScript {
        self.scripts.get(contract_id).cloned().unwrap_or_default()
    }

    pub async fn status(&self, conversation_id: &ConversationId) -> Option<ConversationStatus> {
        self.state
            .read()
            .await
            .conversations
            .get(conversation_id)
            .map(|record| record.status)
    }

    pub async fn conversation_count(&self) -> usize {
        self.state.read().await.conversations.len()
    }

    pub async fn count_with_status(&self, status: ConversationStatus) -> usize {
        self.state
            .read()
            .await
            .conversations
            .values()
            .filter(|record| record.status == status)
            .count()
    }

    pub async fn opening_messages(&self) -> Vec<(ConversationId, String, String)> {
        self.state.read().await.opening_messages.clone()
    }

    /// 只有仍处于 CREATED 的会话会迁移，返回是否发生了迁移
    async fn transition(&self, conversation_id: &ConversationId, status: ConversationStatus) -> bool {
        let mut state = self.state.write().await;
        let Some(record) = state.conversations.get_mut(conversation_id) else {
            return false;
        };

        if record.status != ConversationStatus::Created {
            return false;
        }

        record.status = status;
        record
            .feeds
            .retain(|feed| feed.unbounded_send(Ok(status)).is_ok());
        debug!(
            conversation_id = %conversation_id,
            contract_id = %record.contract_id,
            "会话状态变为 {}",
            status.as_str()
        );
        true
    }

    fn schedule(&self, conversation_id: ConversationId, delay: Duration, status: ConversationStatus) {
        let backend = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            backend.transition(&conversation_id, status).await;
        });
    }
}

#[async_trait]
impl ConversationBackend for ScriptedConversationBackend {
    async fn create_conversation(&self, request: &NewConversation) -> DispatchResult<Conversation> {
        let script = self.script_for(&request.contract_id);
        if let ConversationScript::RejectCreation { message } = &script {
            warn!(contract_id = %request.contract_id, "模拟会话创建失败: {}", message);
            return Err(DispatchError::creation_error(
                request.contract_id.as_str(),
                message.clone(),
            ));
        }

        let id = ConversationId::new(format!(
            "{}-{}",
            request.contract_id,
            Uuid::new_v4().simple()
        ));
        self.state.write().await.conversations.insert(
            id.clone(),
            ConversationRecord {
                contract_id: request.contract_id.clone(),
                status: ConversationStatus::Created,
                feeds: Vec::new(),
            },
        );
        info!(
            conversation_id = %id,
            contract_id = %request.contract_id,
            correlation_key = %request.correlation_key,
            "会话已创建"
        );

        match script {
            ConversationScript::Answer { after_seconds } => self.schedule(
                id.clone(),
                Duration::from_secs(after_seconds),
                ConversationStatus::Started,
            ),
            ConversationScript::Fail { after_seconds } => self.schedule(
                id.clone(),
                Duration::from_secs(after_seconds),
                ConversationStatus::Failed,
            ),
            ConversationScript::RejectCreation { .. } | ConversationScript::NeverAnswer => {}
        }

        Ok(Conversation {
            id,
            contract_id: request.contract_id.clone(),
            status: ConversationStatus::Created,
        })
    }

    async fn fetch_status(
        &self,
        conversation_id: &ConversationId,
    ) -> DispatchResult<ConversationStatus> {
        self.status(conversation_id)
            .await
            .ok_or_else(|| DispatchError::conversation_not_found(conversation_id.as_str()))
    }

    async fn watch_status(&self, conversation_id: &ConversationId) -> DispatchResult<StatusStream> {
        let mut state = self.state.write().await;
        let record = state
            .conversations
            .get_mut(conversation_id)
            .ok_or_else(|| DispatchError::conversation_not_found(conversation_id.as_str()))?;

        let (sender, receiver) = unbounded();
        record.feeds.push(sender);
        Ok(receiver.boxed())
    }

    async fn mark_missed(&self, conversation_id: &ConversationId) -> DispatchResult<()> {
        if !self.transition(conversation_id, ConversationStatus::Missed).await {
            debug!(conversation_id = %conversation_id, "会话已不在等待状态，忽略未接标记");
        }
        Ok(())
    }

    async fn create_opening_message(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        author: &str,
    ) -> DispatchResult<()> {
        let mut state = self.state.write().await;
        if !state.conversations.contains_key(conversation_id) {
            return Err(DispatchError::conversation_not_found(conversation_id.as_str()));
        }

        info!(conversation_id = %conversation_id, author = author, "写入开场消息: {}", text);
        state.opening_messages.push((
            conversation_id.clone(),
            text.to_string(),
            author.to_string(),
        ));
        Ok(())
    }
}
