use tokio::sync::mpsc;

use dispatch_domain::{ContractId, ConversationId, ConversationStatus};
use dispatch_errors::DispatchError;

/// 竞速裁决器消费的事件，所有计时器和状态订阅都汇入同一个队列，按到达顺序逐个处理
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RaceEvent {
    StatusChanged {
        conversation_id: ConversationId,
        status: ConversationStatus,
    },
    MissTimerFired {
        conversation_id: ConversationId,
        contract_id: ContractId,
    },
    WatchFailed {
        conversation_id: ConversationId,
        error: DispatchError,
    },
}

impl RaceEvent {
    pub fn conversation_id(&self) -> &ConversationId {
        match self {
            RaceEvent::StatusChanged { conversation_id, .. }
            | RaceEvent::MissTimerFired { conversation_id, .. }
            | RaceEvent::WatchFailed { conversation_id, .. } => conversation_id,
        }
    }
}

pub type RaceEventSender = mpsc::UnboundedSender<RaceEvent>;
pub type RaceEventReceiver = mpsc::UnboundedReceiver<RaceEvent>;

pub fn race_channel() -> (RaceEventSender, RaceEventReceiver) {
    mpsc::unbounded_channel()
}
