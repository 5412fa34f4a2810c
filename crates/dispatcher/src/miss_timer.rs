//! 未接计时器
//!
//! 状态机只有 `Armed -> Fired` 和 `Armed -> Cleared` 两条路径，两个终态都是幂等的。
//! 状态用原子变量做比较交换，触发和清除之间不会同时成功。

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use dispatch_domain::{ContractId, ConversationId};
use dispatch_errors::DispatchResult;

const ARMED: u8 = 0;
const FIRED: u8 = 1;
const CLEARED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissTimerState {
    Armed,
    Fired,
    Cleared,
}

impl MissTimerState {
    fn from_raw(raw: u8) -> Self {
        match raw {
            ARMED => MissTimerState::Armed,
            FIRED => MissTimerState::Fired,
            _ => MissTimerState::Cleared,
        }
    }
}

pub struct MissTimer {
    conversation_id: ConversationId,
    contract_id: ContractId,
    state: Arc<AtomicU8>,
    handle: JoinHandle<()>,
}

impl MissTimer {
    /// 启动计时，到期后恰好调用一次 `on_fire`
    ///
    /// 回调返回错误只记录日志，计时器照样进入 `Fired` 终态。
    pub fn arm<F>(
        conversation_id: ConversationId,
        contract_id: ContractId,
        duration: Duration,
        on_fire: F,
    ) -> Self
    where
        F: FnOnce(ConversationId, ContractId) -> DispatchResult<()> + Send + 'static,
    {
        let state = Arc::new(AtomicU8::new(ARMED));
        let task_state = Arc::clone(&state);
        let task_conversation_id = conversation_id.clone();
        let task_contract_id = contract_id.clone();

        let handle = tokio::spawn(async move {
            tokio::time::sleep(duration).await;

            if task_state
                .compare_exchange(ARMED, FIRED, Ordering::AcqRel, Ordering::Acquire)
                .is_err()
            {
                return;
            }

            debug!(
                conversation_id = %task_conversation_id,
                contract_id = %task_contract_id,
                "未接计时器到期"
            );

            let conversation_id = task_conversation_id.clone();
            if let Err(e) = on_fire(task_conversation_id, task_contract_id) {
                warn!(conversation_id = %conversation_id, "未接回调执行失败: {}", e);
            }
        });

        Self {
            conversation_id,
            contract_id,
            state,
            handle,
        }
    }

    /// 取消计时，返回本次调用是否真正取消了一个仍在计时的定时器
    pub fn clear(&self) -> bool {
        let cleared = self
            .state
            .compare_exchange(ARMED, CLEARED, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();

        if cleared {
            self.handle.abort();
            debug!(conversation_id = %self.conversation_id, "未接计时器已清除");
        }

        cleared
    }

    pub fn state(&self) -> MissTimerState {
        MissTimerState::from_raw(self.state.load(Ordering::Acquire))
    }

    pub fn is_released(&self) -> bool {
        self.state() != MissTimerState::Armed
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }

    pub fn contract_id(&self) -> &ContractId {
        &self.contract_id
    }
}

impl Drop for MissTimer {
    fn drop(&mut self) {
        self.clear();
    }
}

impl std::fmt::Debug for MissTimer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MissTimer")
            .field("conversation_id", &self.conversation_id)
            .field("contract_id", &self.contract_id)
            .field("state", &self.state())
            .finish()
    }
}
