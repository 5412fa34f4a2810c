#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use tokio::time::Instant;

    use dispatch_core::{DispatchConfig, StatusWatchConfig};
    use dispatch_domain::{
        Contract, ContractSession, ConversationId, ConversationStatus, DispatchOutcome, TimeSource,
    };
    use dispatch_engine::{DispatchSession, SessionState};
    use dispatch_errors::DispatchError;
    use dispatch_testing_utils::{
        ContractBuilder, CustomerFormBuilder, FailingTimeSource, FixedTimeSource,
        MockContractRepository, MockConversationBackend, TestEnv,
    };

    fn contract(id: &str, miss_timeout_seconds: u32) -> Contract {
        ContractBuilder::new()
            .with_id(id)
            .with_session(ContractSession::Evening)
            .with_miss_timeout(miss_timeout_seconds)
            .build()
    }

    fn conv(contract_id: &str) -> ConversationId {
        ConversationId::new(format!("conv-{contract_id}"))
    }

    fn evening() -> Arc<dyn TimeSource> {
        Arc::new(FixedTimeSource::new(
            Utc.with_ymd_and_hms(2024, 5, 1, 19, 0, 0).unwrap(),
        ))
    }

    fn fast_watch() -> StatusWatchConfig {
        StatusWatchConfig {
            max_reconnect_attempts: 3,
            reconnect_base_delay_ms: 100,
            reconnect_max_delay_ms: 1000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.0,
        }
    }

    fn new_session(
        backend: &Arc<MockConversationBackend>,
        contracts: Vec<Contract>,
        config: DispatchConfig,
    ) -> Arc<DispatchSession> {
        Arc::new(DispatchSession::new(
            backend.clone(),
            Arc::new(MockContractRepository::with_contracts(contracts)),
            evening(),
            config,
            fast_watch(),
        ))
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_timeout() {
        let backend = Arc::new(MockConversationBackend::new());
        let config = DispatchConfig {
            waiting_timeout_seconds: 60,
            ..DispatchConfig::default()
        };
        // 未接超时为0，只有会话级超时会生效
        let session = new_session(&backend, vec![contract("a", 0), contract("b", 0)], config);

        let started = Instant::now();
        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(60));
        assert!(TestEnv::wait_for(|| backend.open_feed_count() == 0, Duration::from_secs(1)).await);

        // 超时后未接起的会话保留为未接
        TestEnv::settle().await;
        let mut marks = backend.missed_marks();
        marks.sort();
        assert_eq!(marks, vec![conv("a"), conv("b")]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_default_waiting_timeout_is_five_minutes() {
        let backend = Arc::new(MockConversationBackend::new());
        let session = new_session(&backend, vec![contract("a", 0)], DispatchConfig::default());

        let started = Instant::now();
        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(started.elapsed(), Duration::from_secs(300));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auth_rejection_aborts_session() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.reject_watch(&conv("a"), DispatchError::auth_rejected("token expired"));
        let session = new_session(
            &backend,
            vec![contract("a", 30), contract("b", 30)],
            DispatchConfig::default(),
        );

        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();

        match outcome {
            DispatchOutcome::Aborted(reason) => assert!(reason.contains("conv-a")),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(backend.subscription_attempts(&conv("a")), 1);
        assert!(TestEnv::wait_for(|| backend.open_feed_count() == 0, Duration::from_secs(1)).await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_feed_error_is_invisible() {
        let backend = Arc::new(MockConversationBackend::new());
        let session = new_session(&backend, vec![contract("a", 30)], DispatchConfig::default());

        let handle = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit(CustomerFormBuilder::new().build()).await })
        };
        assert!(TestEnv::wait_for(|| backend.open_feed_count() == 1, Duration::from_secs(1)).await);

        backend.push_feed_error(&conv("a"), DispatchError::network_error("connection reset"));
        // 断线期间接起，重连后的补发送达
        backend.set_status(&conv("a"), ConversationStatus::Started);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome.winner().unwrap().id, conv("a"));
        assert_eq!(backend.subscription_count(&conv("a")), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_feed_blips_still_reach_timeout() {
        let backend = Arc::new(MockConversationBackend::new());
        let session = new_session(&backend, vec![contract("a", 0)], DispatchConfig::default());

        let started = Instant::now();
        let handle = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit(CustomerFormBuilder::new().build()).await })
        };
        assert!(TestEnv::wait_for(|| backend.open_feed_count() == 1, Duration::from_secs(1)).await);

        // 每30秒断线一次，总次数超过重连预算
        for _ in 0..8 {
            tokio::time::sleep(Duration::from_secs(30)).await;
            backend.push_feed_error(&conv("a"), DispatchError::network_error("connection reset"));
        }

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert!(started.elapsed() >= Duration::from_secs(300));
        assert_eq!(backend.subscription_count(&conv("a")), 9);
    }

    #[tokio::test(start_paused = true)]
    async fn test_opening_message_failure_does_not_fail_race() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.fail_opening_messages(100);
        backend.set_status(&conv("a"), ConversationStatus::Started);
        let session = new_session(&backend, vec![contract("a", 30)], DispatchConfig::default());

        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();
        assert!(outcome.is_connected());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            backend.opening_message_attempts(),
            DispatchConfig::default().opening_message_max_attempts as usize
        );
        assert!(backend.opening_messages().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_feed_reported_failures_resolve_all_missed() {
        let backend = Arc::new(MockConversationBackend::new());
        let session = new_session(
            &backend,
            vec![contract("a", 30), contract("b", 0)],
            DispatchConfig::default(),
        );

        let handle = {
            let session = Arc::clone(&session);
            tokio::spawn(async move { session.submit(CustomerFormBuilder::new().build()).await })
        };
        assert!(TestEnv::wait_for(|| backend.open_feed_count() == 2, Duration::from_secs(1)).await);

        backend.push_status(&conv("a"), ConversationStatus::Failed);
        backend.push_status(&conv("b"), ConversationStatus::Missed);

        let outcome = handle.await.unwrap().unwrap();
        assert_eq!(outcome, DispatchOutcome::AllMissed);
    }

    #[tokio::test(start_paused = true)]
    async fn test_session_state_reaches_finished() {
        let backend = Arc::new(MockConversationBackend::new());
        backend.set_status(&conv("a"), ConversationStatus::Started);
        let session = new_session(&backend, vec![contract("a", 30)], DispatchConfig::default());
        let states = session.subscribe();
        assert_eq!(*states.borrow(), SessionState::Idle);

        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();

        assert_eq!(*states.borrow(), SessionState::Finished(outcome));
        assert!(session.state().is_terminal());
    }

    #[tokio::test(start_paused = true)]
    async fn test_time_service_failure_falls_back_to_local_clock() {
        let backend = Arc::new(MockConversationBackend::new());
        let time_source = Arc::new(FailingTimeSource::new());
        let contracts = [ContractSession::Night, ContractSession::Day, ContractSession::Evening]
            .into_iter()
            .enumerate()
            .map(|(i, session)| {
                ContractBuilder::new()
                    .with_id(&format!("c{i}"))
                    .with_session(session)
                    .build()
            })
            .collect();
        let config = DispatchConfig {
            waiting_timeout_seconds: 1,
            ..DispatchConfig::default()
        };
        let session = DispatchSession::new(
            backend.clone(),
            Arc::new(MockContractRepository::with_contracts(contracts)),
            time_source.clone(),
            config,
            fast_watch(),
        );

        // 每个时段都有合约，本地时钟下一定能选出一个
        let outcome = session.submit(CustomerFormBuilder::new().build()).await.unwrap();
        assert_eq!(outcome, DispatchOutcome::TimedOut);
        assert_eq!(time_source.call_count(), 1);
        assert_eq!(backend.creation_count(), 1);
    }
}
