use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use dispatch_domain::ConversationId;

/// 开场消息幂等保护
///
/// 事件由裁决器单消费者顺序处理，但开场消息失败后的回滚发生在独立任务里，
/// 所以集合用互斥锁保护，检查与标记在同一把锁内完成。
#[derive(Debug, Clone, Default)]
pub struct OpeningMessageGuard {
    triggered: Arc<Mutex<HashSet<ConversationId>>>,
}

impl OpeningMessageGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// 原子地检查并标记，首次标记返回 true
    pub fn try_mark(&self, conversation_id: &ConversationId) -> bool {
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(conversation_id.clone())
    }

    /// 副作用失败后撤销标记，使后续事件可以重试
    pub fn rollback(&self, conversation_id: &ConversationId) -> bool {
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(conversation_id)
    }

    pub fn contains(&self, conversation_id: &ConversationId) -> bool {
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(conversation_id)
    }

    pub fn len(&self) -> usize {
        self.triggered
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
