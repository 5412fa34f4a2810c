//! 分发会话
//!
//! 一次访客提交对应一个会话：拉取合约池、筛选、扇出、等待竞速裁决，
//! 并通过 watch 通道把状态变化推给视图层。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{info, instrument, warn};

use dispatch_core::{DispatchConfig, StatusWatchConfig};
use dispatch_domain::{
    ContractRepository, ConversationBackend, CustomerForm, DispatchOutcome, TimeSource,
};
use dispatch_errors::{DispatchError, DispatchResult};

use crate::engine::DispatchEngine;
use crate::events::race_channel;
use crate::race_resolver::{RaceResolver, CANCELLED_REASON, UNMOUNTED_REASON};
use crate::selector::ContractSelector;

/// 视图层可以观察到的会话状态
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Dispatching,
    Waiting { pending_count: usize },
    Finished(DispatchOutcome),
    Rejected { reason: String },
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished(_) | SessionState::Rejected { .. })
    }
}

pub struct DispatchSession {
    backend: Arc<dyn ConversationBackend>,
    contracts: Arc<dyn ContractRepository>,
    selector: ContractSelector,
    engine: DispatchEngine,
    config: DispatchConfig,
    state: watch::Sender<SessionState>,
    cancel: watch::Sender<bool>,
    submitted: AtomicBool,
}

impl DispatchSession {
    pub fn new(
        backend: Arc<dyn ConversationBackend>,
        contracts: Arc<dyn ContractRepository>,
        time_source: Arc<dyn TimeSource>,
        config: DispatchConfig,
        watch_config: StatusWatchConfig,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Idle);
        let (cancel, _) = watch::channel(false);

        Self {
            engine: DispatchEngine::new(Arc::clone(&backend), watch_config),
            selector: ContractSelector::new(time_source),
            backend,
            contracts,
            config,
            state,
            cancel,
            submitted: AtomicBool::new(false),
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// 请求取消，会话已结束时为空操作；返回是否真正发出了取消
    pub fn cancel(&self) -> bool {
        let current = self.state();
        if current.is_terminal() {
            return false;
        }

        info!("收到取消请求");
        self.cancel.send_replace(true);

        // 尚未提交的会话直接结束，提交时不再发起分发
        if current == SessionState::Idle {
            self.state.send_replace(SessionState::Finished(DispatchOutcome::Aborted(
                CANCELLED_REASON.to_string(),
            )));
        }
        true
    }

    /// 提交访客表单并等待最终结果
    ///
    /// 合约池不可用、没有可用合约等提交前的错误以 `Err` 返回；
    /// 四种终态以 `Ok` 返回。每个会话只能提交一次。
    #[instrument(skip_all, fields(customer = %form.customer_name))]
    pub async fn submit(&self, form: CustomerForm) -> DispatchResult<DispatchOutcome> {
        if self.submitted.swap(true, Ordering::AcqRel) {
            return Err(DispatchError::SessionAlreadySubmitted);
        }

        if *self.cancel.borrow() {
            info!("会话在提交前已被取消");
            return Ok(self.finish(DispatchOutcome::Aborted(CANCELLED_REASON.to_string())));
        }

        let request = form.into_request().map_err(|e| self.reject(e))?;
        self.state.send_replace(SessionState::Dispatching);

        let pool = self
            .contracts
            .list_contracts()
            .await
            .map_err(|e| self.reject(DispatchError::ContractPoolUnavailable(e.to_string())))?;

        let eligible = self.selector.select(&pool).await;
        if eligible.is_empty() {
            return Err(self.reject(DispatchError::NoEligibleContracts));
        }

        if *self.cancel.borrow() {
            return Ok(self.finish(DispatchOutcome::Aborted(CANCELLED_REASON.to_string())));
        }

        info!(
            correlation_key = %request.correlation_key,
            "向 {} 个合约发起会话",
            eligible.len()
        );

        let (events_tx, events_rx) = race_channel();
        let batch = self
            .engine
            .dispatch(&eligible, &request, events_tx)
            .await
            .map_err(|e| self.reject(e))?;

        if !batch.has_pending() {
            return Ok(self.finish(DispatchOutcome::AllFailed));
        }

        let pending_count = batch.result.succeeded.len();
        self.state
            .send_replace(SessionState::Waiting { pending_count });

        let resolver = RaceResolver::new(
            Arc::clone(&self.backend),
            request,
            self.config.clone(),
            batch,
        );
        let outcome = resolver.run(events_rx, self.cancel.subscribe()).await;

        Ok(self.finish(outcome))
    }

    fn finish(&self, outcome: DispatchOutcome) -> DispatchOutcome {
        self.state
            .send_replace(SessionState::Finished(outcome.clone()));
        outcome
    }

    fn reject(&self, error: DispatchError) -> DispatchError {
        warn!("提交被拒绝: {}", error);
        self.state.send_replace(SessionState::Rejected {
            reason: error.to_string(),
        });
        error
    }
}

impl Drop for DispatchSession {
    fn drop(&mut self) {
        if self.state.borrow().is_terminal() {
            return;
        }

        self.cancel.send_replace(true);
        self.state.send_replace(SessionState::Finished(DispatchOutcome::Aborted(
            UNMOUNTED_REASON.to_string(),
        )));
    }
}
