//! 竞速裁决
//!
//! 裁决器独占待接会话集合、开场消息幂等保护以及批次资源。状态订阅和未接计时器的事件
//! 都汇入同一个队列，由裁决器逐个处理：第一个到达的 `STARTED` 获胜，
//! 任何终态都会无条件释放批次内全部计时器和订阅。

use std::collections::BTreeMap;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use dispatch_core::DispatchConfig;
use dispatch_domain::{
    ContractId, ConversationBackend, ConversationId, ConversationStatus, DispatchOutcome,
    DispatchRequest, PendingConversation,
};
use dispatch_errors::DispatchError;

use crate::engine::{BatchHandles, DispatchBatch};
use crate::events::{RaceEvent, RaceEventReceiver};
use crate::opening_guard::OpeningMessageGuard;

pub const CANCELLED_REASON: &str = "cancelled";
pub const UNMOUNTED_REASON: &str = "unmounted";

pub struct RaceResolver {
    backend: Arc<dyn ConversationBackend>,
    request: DispatchRequest,
    config: DispatchConfig,
    pending: BTreeMap<ConversationId, PendingConversation>,
    handles: BatchHandles,
    guard: OpeningMessageGuard,
    outcome: Option<DispatchOutcome>,
}

impl RaceResolver {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        request: DispatchRequest,
        config: DispatchConfig,
        batch: DispatchBatch,
    ) -> Self {
        let DispatchBatch { result, handles } = batch;
        let pending = result
            .succeeded
            .into_iter()
            .map(|conversation| (conversation.id.clone(), conversation))
            .collect();

        Self {
            backend,
            request,
            config,
            pending,
            handles,
            guard: OpeningMessageGuard::new(),
            outcome: None,
        }
    }

    pub fn guard(&self) -> &OpeningMessageGuard {
        &self.guard
    }

    pub fn handles(&self) -> &BatchHandles {
        &self.handles
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn conversation(&self, conversation_id: &ConversationId) -> Option<&PendingConversation> {
        self.pending.get(conversation_id)
    }

    pub fn outcome(&self) -> Option<&DispatchOutcome> {
        self.outcome.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.outcome.is_some()
    }

    /// 处理单个事件，产生终态时返回结果；终态之后的事件全部忽略
    pub fn handle_event(&mut self, event: RaceEvent) -> Option<DispatchOutcome> {
        if self.is_finished() {
            debug!(
                conversation_id = %event.conversation_id(),
                "分发会话已结束，忽略事件"
            );
            return None;
        }

        match event {
            RaceEvent::StatusChanged {
                conversation_id,
                status,
            } => self.on_status_changed(conversation_id, status),
            RaceEvent::MissTimerFired {
                conversation_id,
                contract_id,
            } => self.on_miss_timer_fired(conversation_id, contract_id),
            RaceEvent::WatchFailed {
                conversation_id,
                error,
            } => self.on_watch_failed(conversation_id, error),
        }
    }

    /// 外部取消，已结束时为空操作
    pub fn cancel(&mut self, reason: &str) -> Option<DispatchOutcome> {
        if self.is_finished() {
            return None;
        }
        info!("分发会话被取消: {}", reason);
        Some(self.finish(DispatchOutcome::Aborted(reason.to_string())))
    }

    /// 会话级等待超时
    pub fn time_out(&mut self) -> Option<DispatchOutcome> {
        if self.is_finished() {
            return None;
        }
        warn!(
            "等待 {} 秒后仍无客服接起，会话超时",
            self.config.waiting_timeout_seconds
        );
        Some(self.finish(DispatchOutcome::TimedOut))
    }

    /// 事件循环：逐个消费事件，直到产生终态、被取消或等待超时
    pub async fn run(
        mut self,
        mut events: RaceEventReceiver,
        mut cancel: watch::Receiver<bool>,
    ) -> DispatchOutcome {
        if *cancel.borrow_and_update() {
            return self.abort(CANCELLED_REASON);
        }

        if self.pending.is_empty() {
            return self.finish(DispatchOutcome::AllFailed);
        }

        let timeout = tokio::time::sleep(self.config.waiting_timeout());
        tokio::pin!(timeout);
        let mut events_open = true;

        loop {
            tokio::select! {
                biased;

                changed = cancel.changed() => {
                    match changed {
                        Ok(()) => {
                            if *cancel.borrow_and_update() {
                                return self.abort(CANCELLED_REASON);
                            }
                        }
                        Err(_) => return self.abort(UNMOUNTED_REASON),
                    }
                }

                event = events.recv(), if events_open => {
                    match event {
                        Some(event) => {
                            if let Some(outcome) = self.handle_event(event) {
                                return outcome;
                            }
                        }
                        None => {
                            debug!("所有事件源已关闭，等待会话超时");
                            events_open = false;
                        }
                    }
                }

                _ = &mut timeout => {
                    if let Some(outcome) = self.time_out() {
                        return outcome;
                    }
                }
            }
        }
    }

    fn abort(&mut self, reason: &str) -> DispatchOutcome {
        match self.cancel(reason) {
            Some(outcome) => outcome,
            None => self
                .outcome
                .clone()
                .unwrap_or_else(|| DispatchOutcome::Aborted(reason.to_string())),
        }
    }

    fn on_status_changed(
        &mut self,
        conversation_id: ConversationId,
        status: ConversationStatus,
    ) -> Option<DispatchOutcome> {
        debug!(
            conversation_id = %conversation_id,
            status = status.as_str(),
            "收到会话状态"
        );

        match status {
            ConversationStatus::Created => None,
            ConversationStatus::Started => self.on_started(conversation_id),
            ConversationStatus::Missed | ConversationStatus::Failed => {
                self.handles.release_timer(&conversation_id);
                let pending = self.pending.get_mut(&conversation_id)?;
                if pending.status != ConversationStatus::Created {
                    return None;
                }

                if status == ConversationStatus::Missed {
                    pending.mark_missed();
                } else {
                    pending.mark_failed();
                }
                info!(
                    conversation_id = %conversation_id,
                    contract_id = %pending.contract_id,
                    "后端报告会话已{}",
                    status.as_str()
                );
                self.check_all_lost()
            }
        }
    }

    fn on_started(&mut self, conversation_id: ConversationId) -> Option<DispatchOutcome> {
        let Some(pending) = self.pending.get_mut(&conversation_id) else {
            debug!(conversation_id = %conversation_id, "忽略未知会话的接起事件");
            return None;
        };

        if pending.is_lost() {
            warn!(
                conversation_id = %conversation_id,
                "会话已是 {} 状态，忽略迟到的接起事件",
                pending.status.as_str()
            );
            return None;
        }

        if !self.guard.try_mark(&conversation_id) {
            debug!(conversation_id = %conversation_id, "开场消息已触发过，忽略重复的接起事件");
            return None;
        }

        pending.mark_started();
        let winner = pending.clone();
        info!(
            conversation_id = %winner.id,
            contract_id = %winner.contract_id,
            "客服已接起会话"
        );

        self.spawn_opening_message(winner.id.clone());
        Some(self.finish(DispatchOutcome::Connected(winner)))
    }

    fn on_miss_timer_fired(
        &mut self,
        conversation_id: ConversationId,
        contract_id: ContractId,
    ) -> Option<DispatchOutcome> {
        // 已触发的计时器不再保留引用
        self.handles.release_timer(&conversation_id);

        let Some(pending) = self.pending.get_mut(&conversation_id) else {
            warn!(conversation_id = %conversation_id, "未接计时器指向未知会话");
            return None;
        };

        if pending.status != ConversationStatus::Created {
            debug!(
                conversation_id = %conversation_id,
                "会话已是 {} 状态，忽略未接计时器",
                pending.status.as_str()
            );
            return None;
        }

        pending.mark_missed();
        info!(
            conversation_id = %conversation_id,
            contract_id = %contract_id,
            "客服未在规定时间内接起，会话标记为未接"
        );
        self.spawn_mark_missed(conversation_id);
        self.check_all_lost()
    }

    fn on_watch_failed(
        &mut self,
        conversation_id: ConversationId,
        error: DispatchError,
    ) -> Option<DispatchOutcome> {
        let still_waiting = self
            .pending
            .get(&conversation_id)
            .is_some_and(|pending| pending.status == ConversationStatus::Created);

        if !still_waiting {
            debug!(
                conversation_id = %conversation_id,
                "已结束会话的状态订阅失败，忽略: {}", error
            );
            return None;
        }

        error!(
            conversation_id = %conversation_id,
            "状态订阅无法恢复，终止分发会话: {}", error
        );
        Some(self.finish(DispatchOutcome::Aborted(format!(
            "会话 {conversation_id} 状态订阅失败: {error}"
        ))))
    }

    fn check_all_lost(&mut self) -> Option<DispatchOutcome> {
        if !self.pending.is_empty() && self.pending.values().all(PendingConversation::is_lost) {
            info!("所有 {} 个会话均未被接起", self.pending.len());
            return Some(self.finish(DispatchOutcome::AllMissed));
        }
        None
    }

    fn finish(&mut self, outcome: DispatchOutcome) -> DispatchOutcome {
        let (timers, watches) = self.handles.release_all();
        self.retire_unanswered();

        info!(
            outcome = outcome.as_str(),
            correlation_key = %self.request.correlation_key,
            released_timers = timers,
            released_watches = watches,
            "分发会话结束"
        );

        self.outcome = Some(outcome.clone());
        outcome
    }

    /// 未被接起的会话在后端保留为未接状态，作为审计记录
    fn retire_unanswered(&mut self) {
        let unanswered: Vec<ConversationId> = self
            .pending
            .values_mut()
            .filter(|pending| pending.status == ConversationStatus::Created)
            .map(|pending| {
                pending.mark_missed();
                pending.id.clone()
            })
            .collect();

        for conversation_id in unanswered {
            self.spawn_mark_missed(conversation_id);
        }
    }

    fn spawn_mark_missed(&self, conversation_id: ConversationId) {
        let backend = Arc::clone(&self.backend);
        tokio::spawn(async move {
            match backend.mark_missed(&conversation_id).await {
                Ok(()) => debug!(conversation_id = %conversation_id, "会话已标记为未接"),
                Err(e) => warn!(conversation_id = %conversation_id, "标记会话未接失败: {}", e),
            }
        });
    }

    fn spawn_opening_message(&self, conversation_id: ConversationId) {
        let backend = Arc::clone(&self.backend);
        let guard = self.guard.clone();
        let text = self.request.headline.clone();
        let author = self
            .config
            .opening_message_author
            .clone()
            .unwrap_or_else(|| self.request.customer_name.clone());
        let max_attempts = self.config.opening_message_max_attempts.max(1);
        let retry_delay = self.config.opening_message_retry_delay();

        tokio::spawn(async move {
            for attempt in 1..=max_attempts {
                match backend
                    .create_opening_message(&conversation_id, &text, &author)
                    .await
                {
                    Ok(()) => {
                        debug!(conversation_id = %conversation_id, "开场消息已写入");
                        return;
                    }
                    Err(e) if attempt < max_attempts => {
                        warn!(
                            conversation_id = %conversation_id,
                            "开场消息写入失败 (第 {}/{} 次): {}", attempt, max_attempts, e
                        );
                        tokio::time::sleep(retry_delay).await;
                    }
                    Err(e) => {
                        // 会话已结束，不会再有事件触发重写，这里的重试循环是唯一的重试途径
                        guard.rollback(&conversation_id);
                        error!(
                            conversation_id = %conversation_id,
                            "开场消息写入失败，已放弃: {}", e
                        );
                    }
                }
            }
        });
    }
}
