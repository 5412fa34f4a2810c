use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, instrument, warn};

use dispatch_core::StatusWatchConfig;
use dispatch_domain::{
    Contract, ContractId, Conversation, ConversationBackend, ConversationId, CreationFailure,
    DispatchRequest, PendingConversation,
};
use dispatch_errors::{DispatchError, DispatchResult};

use crate::events::{RaceEvent, RaceEventSender};
use crate::miss_timer::MissTimer;
use crate::status_watch::StatusWatch;

/// 一次扇出的创建结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchBatchResult {
    pub succeeded: Vec<PendingConversation>,
    pub failed: Vec<CreationFailure>,
}

/// 一个批次内所有计时器和状态订阅的唯一持有者
///
/// 只能通过裁决器的清理路径或会话取消路径整体释放；Drop 时兜底释放。
#[derive(Debug, Default)]
pub struct BatchHandles {
    timers: HashMap<ConversationId, MissTimer>,
    watches: HashMap<ConversationId, StatusWatch>,
}

impl BatchHandles {
    pub fn timer_count(&self) -> usize {
        self.timers.len()
    }

    pub fn watch_count(&self) -> usize {
        self.watches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timers.is_empty() && self.watches.is_empty()
    }

    pub fn has_timer(&self, conversation_id: &ConversationId) -> bool {
        self.timers.contains_key(conversation_id)
    }

    pub fn has_watch(&self, conversation_id: &ConversationId) -> bool {
        self.watches.contains_key(conversation_id)
    }

    /// 移除并清除单个计时器，已触发的计时器清除是空操作
    pub fn release_timer(&mut self, conversation_id: &ConversationId) -> bool {
        match self.timers.remove(conversation_id) {
            Some(timer) => {
                timer.clear();
                true
            }
            None => false,
        }
    }

    /// 释放全部计时器和订阅，返回 (计时器数, 订阅数)
    pub fn release_all(&mut self) -> (usize, usize) {
        let timers = self.timers.len();
        let watches = self.watches.len();

        for (_, timer) in self.timers.drain() {
            timer.clear();
        }
        for (_, watch) in self.watches.drain() {
            watch.unsubscribe();
        }

        if timers > 0 || watches > 0 {
            debug!("释放了 {} 个未接计时器和 {} 个状态订阅", timers, watches);
        }

        (timers, watches)
    }
}

impl Drop for BatchHandles {
    fn drop(&mut self) {
        self.release_all();
    }
}

/// 分发结果及其持有的资源
#[derive(Debug)]
pub struct DispatchBatch {
    pub result: DispatchBatchResult,
    pub handles: BatchHandles,
}

impl DispatchBatch {
    pub fn has_pending(&self) -> bool {
        !self.result.succeeded.is_empty()
    }
}

/// 会话扇出引擎
pub struct DispatchEngine {
    backend: Arc<dyn ConversationBackend>,
    watch_config: StatusWatchConfig,
}

impl DispatchEngine {
    pub fn new(backend: Arc<dyn ConversationBackend>, watch_config: StatusWatchConfig) -> Self {
        Self {
            backend,
            watch_config,
        }
    }

    /// 向所有合约并发创建会话，等待全部结束后为成功的会话注册计时器和状态订阅
    ///
    /// 单个合约创建失败不影响整个批次；全部失败时不创建任何计时器和订阅。
    #[instrument(
        skip_all,
        fields(correlation_key = %request.correlation_key, contracts = contracts.len())
    )]
    pub async fn dispatch(
        &self,
        contracts: &[Contract],
        request: &DispatchRequest,
        events: RaceEventSender,
    ) -> DispatchResult<DispatchBatch> {
        if contracts.is_empty() {
            return Err(DispatchError::NoEligibleContracts);
        }

        let result = self.create_conversations(contracts, request).await;

        for failure in &result.failed {
            warn!(
                contract_id = %failure.contract_id,
                "合约会话创建失败: {}", failure.error
            );
        }

        let handles = if result.succeeded.is_empty() {
            warn!("所有 {} 个合约的会话创建均失败", contracts.len());
            BatchHandles::default()
        } else {
            info!(
                "会话创建完成: 成功 {} 个, 失败 {} 个",
                result.succeeded.len(),
                result.failed.len()
            );
            self.register_handles(contracts, &result.succeeded, &events)
        };

        Ok(DispatchBatch { result, handles })
    }

    /// 等待全部创建调用结束，不会在第一个成功时提前返回
    pub async fn create_conversations(
        &self,
        contracts: &[Contract],
        request: &DispatchRequest,
    ) -> DispatchBatchResult {
        let settled: Vec<(ContractId, DispatchResult<Conversation>)> =
            join_all(contracts.iter().map(|contract| async move {
                (contract.id.clone(), self.create_one(contract, request).await)
            }))
            .await;

        let mut result = DispatchBatchResult::default();
        for (contract_id, outcome) in settled {
            match outcome {
                Ok(conversation) => {
                    debug!(
                        contract_id = %contract_id,
                        conversation_id = %conversation.id,
                        "会话创建成功"
                    );
                    result.succeeded.push(PendingConversation::from(conversation));
                }
                Err(error) => result.failed.push(CreationFailure { contract_id, error }),
            }
        }

        result
    }

    async fn create_one(
        &self,
        contract: &Contract,
        request: &DispatchRequest,
    ) -> DispatchResult<Conversation> {
        let payload = request.for_contract(&contract.id);
        self.backend
            .create_conversation(&payload)
            .await
            .map_err(|e| match e {
                DispatchError::ConversationCreation { .. } => e,
                other => DispatchError::creation_error(contract.id.as_str(), other.to_string()),
            })
    }

    fn register_handles(
        &self,
        contracts: &[Contract],
        succeeded: &[PendingConversation],
        events: &RaceEventSender,
    ) -> BatchHandles {
        let mut handles = BatchHandles::default();

        for pending in succeeded {
            let miss_timeout = contracts
                .iter()
                .find(|contract| contract.id == pending.contract_id)
                .and_then(Contract::miss_timeout);

            match miss_timeout {
                Some(duration) => {
                    let sender = events.clone();
                    let timer = MissTimer::arm(
                        pending.id.clone(),
                        pending.contract_id.clone(),
                        duration,
                        move |conversation_id, contract_id| {
                            sender
                                .send(RaceEvent::MissTimerFired {
                                    conversation_id,
                                    contract_id,
                                })
                                .map_err(|_| DispatchError::Internal("竞速裁决器已退出".to_string()))
                        },
                    );
                    handles.timers.insert(pending.id.clone(), timer);
                }
                None => {
                    debug!(
                        conversation_id = %pending.id,
                        contract_id = %pending.contract_id,
                        "合约未设置未接超时，跳过未接计时器"
                    );
                }
            }

            let status_sender = events.clone();
            let error_sender = events.clone();
            let status_conversation_id = pending.id.clone();
            let error_conversation_id = pending.id.clone();
            let watch = StatusWatch::open(
                Arc::clone(&self.backend),
                pending.id.clone(),
                self.watch_config.clone(),
                move |status| {
                    let _ = status_sender.send(RaceEvent::StatusChanged {
                        conversation_id: status_conversation_id.clone(),
                        status,
                    });
                },
                move |error| {
                    let _ = error_sender.send(RaceEvent::WatchFailed {
                        conversation_id: error_conversation_id,
                        error,
                    });
                },
            );
            handles.watches.insert(pending.id.clone(), watch);
        }

        handles
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::race_channel;
    use dispatch_domain::ConversationStatus;
    use dispatch_testing_utils::{ContractBuilder, MockConversationBackend};
    use std::time::Duration;

    fn request() -> DispatchRequest {
        DispatchRequest::new("张三".to_string(), "退款问题".to_string(), None)
    }

    fn engine(backend: &Arc<MockConversationBackend>) -> DispatchEngine {
        DispatchEngine::new(backend.clone(), StatusWatchConfig::default())
    }

    #[tokio::test]
    async fn test_empty_contracts_rejected() {
        let backend = Arc::new(MockConversationBackend::new());
        let (tx, _rx) = race_channel();
        let result = engine(&backend).dispatch(&[], &request(), tx).await;
        assert!(matches!(result, Err(DispatchError::NoEligibleContracts)));
        assert_eq!(backend.creation_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_creation_calls_are_concurrent() {
        let backend = Arc::new(MockConversationBackend::new());
        let contracts = vec![
            ContractBuilder::new().with_id("a").build(),
            ContractBuilder::new().with_id("b").build(),
            ContractBuilder::new().with_id("c").build(),
        ];
        for contract in &contracts {
            backend.set_creation_delay(&contract.id, Duration::from_secs(2));
        }

        let started = tokio::time::Instant::now();
        let result = engine(&backend)
            .create_conversations(&contracts, &request())
            .await;

        assert_eq!(result.succeeded.len(), 3);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_shares_correlation_key() {
        let backend = Arc::new(MockConversationBackend::new());
        let contracts = vec![
            ContractBuilder::new().with_id("a").build(),
            ContractBuilder::new().with_id("b").build(),
        ];
        let request = request();
        engine(&backend).create_conversations(&contracts, &request).await;

        let created = backend.created_requests();
        assert_eq!(created.len(), 2);
        assert!(created
            .iter()
            .all(|payload| payload.correlation_key == request.correlation_key));
    }

    #[tokio::test]
    async fn test_single_and_multi_paths_have_same_shape() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.fail_creation(&ContractId::new("bad"), DispatchError::backend_error("503"));

        let single = engine(&backend)
            .create_conversations(&[ContractBuilder::new().with_id("bad").build()], &request())
            .await;
        assert!(single.succeeded.is_empty());
        assert_eq!(single.failed.len(), 1);
        assert!(matches!(
            single.failed[0].error,
            DispatchError::ConversationCreation { .. }
        ));

        let multi = engine(&backend)
            .create_conversations(
                &[
                    ContractBuilder::new().with_id("bad").build(),
                    ContractBuilder::new().with_id("good").build(),
                ],
                &request(),
            )
            .await;
        assert_eq!(multi.succeeded.len(), 1);
        assert_eq!(multi.failed.len(), 1);
        assert_eq!(multi.succeeded[0].status, ConversationStatus::Created);
    }

    #[tokio::test(start_paused = true)]
    async fn test_registers_one_timer_and_watch_per_success() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.fail_creation(&ContractId::new("c"), DispatchError::network_error("timeout"));
        let contracts = vec![
            ContractBuilder::new().with_id("a").with_miss_timeout(30).build(),
            ContractBuilder::new().with_id("b").with_miss_timeout(0).build(),
            ContractBuilder::new().with_id("c").with_miss_timeout(30).build(),
        ];

        let (tx, _rx) = race_channel();
        let batch = engine(&backend)
            .dispatch(&contracts, &request(), tx)
            .await
            .unwrap();

        assert_eq!(batch.result.succeeded.len(), 2);
        assert_eq!(batch.result.failed.len(), 1);
        // b 的未接超时为0，不创建计时器
        assert_eq!(batch.handles.timer_count(), 1);
        assert_eq!(batch.handles.watch_count(), 2);
    }

    #[tokio::test]
    async fn test_all_failed_creates_no_handles() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.fail_creation(&ContractId::new("a"), DispatchError::backend_error("500"));
        backend.fail_creation(&ContractId::new("b"), DispatchError::backend_error("500"));
        let contracts = vec![
            ContractBuilder::new().with_id("a").build(),
            ContractBuilder::new().with_id("b").build(),
        ];

        let (tx, _rx) = race_channel();
        let batch = engine(&backend)
            .dispatch(&contracts, &request(), tx)
            .await
            .unwrap();

        assert!(!batch.has_pending());
        assert!(batch.handles.is_empty());
        assert_eq!(backend.total_subscription_attempts(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_all_is_idempotent() {
        let backend = Arc::new(MockConversationBackend::new());
        let contracts = vec![ContractBuilder::new().with_id("a").build()];
        let (tx, _rx) = race_channel();
        let mut batch = engine(&backend)
            .dispatch(&contracts, &request(), tx)
            .await
            .unwrap();

        assert_eq!(batch.handles.release_all(), (1, 1));
        assert_eq!(batch.handles.release_all(), (0, 0));
        assert!(batch.handles.is_empty());
    }
}
