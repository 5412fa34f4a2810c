use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use dispatch_domain::{Contract, ContractSession, TimeSource};

/// 合约筛选器：按当前UTC时段挑出可以接单的合约
pub struct ContractSelector {
    time_source: Arc<dyn TimeSource>,
}

impl ContractSelector {
    pub fn new(time_source: Arc<dyn TimeSource>) -> Self {
        Self { time_source }
    }

    /// 时间服务不可用时退回本地时钟，不会让调用失败
    pub async fn select(&self, contracts: &[Contract]) -> Vec<Contract> {
        let now = match self.time_source.current_time().await {
            Ok(now) => now,
            Err(e) => {
                warn!("时间服务不可用，使用本地时钟: {}", e);
                Utc::now()
            }
        };

        Self::select_at(contracts, now)
    }

    /// 保持输入顺序
    pub fn select_at(contracts: &[Contract], now: DateTime<Utc>) -> Vec<Contract> {
        let session = ContractSession::at(now);
        let eligible: Vec<Contract> = contracts
            .iter()
            .filter(|contract| contract.is_active() && contract.session == session)
            .cloned()
            .collect();

        debug!(
            "当前时段 {}，{} 个合约中有 {} 个可用",
            session.as_str(),
            contracts.len(),
            eligible.len()
        );

        eligible
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use dispatch_domain::ContractId;
    use dispatch_testing_utils::{ContractBuilder, FailingTimeSource, FixedTimeSource};

    fn at_hour(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, hour, 30, 0).unwrap()
    }

    fn pool() -> Vec<Contract> {
        vec![
            ContractBuilder::new().with_id("night").with_session(ContractSession::Night).build(),
            ContractBuilder::new().with_id("day-1").with_session(ContractSession::Day).build(),
            ContractBuilder::new()
                .with_id("day-off")
                .with_session(ContractSession::Day)
                .inactive()
                .build(),
            ContractBuilder::new().with_id("day-2").with_session(ContractSession::Day).build(),
            ContractBuilder::new()
                .with_id("evening")
                .with_session(ContractSession::Evening)
                .build(),
        ]
    }

    fn ids(contracts: &[Contract]) -> Vec<&str> {
        contracts.iter().map(|c| c.id.as_str()).collect()
    }

    #[test]
    fn test_filters_by_status_and_session_keeping_order() {
        assert_eq!(ids(&ContractSelector::select_at(&pool(), at_hour(9))), vec!["day-1", "day-2"]);
        assert_eq!(ids(&ContractSelector::select_at(&pool(), at_hour(3))), vec!["night"]);
        assert_eq!(ids(&ContractSelector::select_at(&pool(), at_hour(23))), vec!["evening"]);
    }

    #[test]
    fn test_bucket_boundaries() {
        assert_eq!(ContractSession::at(at_hour(7)), ContractSession::Night);
        assert_eq!(ContractSession::at(at_hour(8)), ContractSession::Day);
        assert_eq!(ContractSession::at(at_hour(15)), ContractSession::Day);
        assert_eq!(ContractSession::at(at_hour(16)), ContractSession::Evening);
    }

    #[test]
    fn test_empty_when_nothing_matches() {
        let contracts = vec![ContractBuilder::new()
            .with_id("day-off")
            .with_session(ContractSession::Day)
            .inactive()
            .build()];
        assert!(ContractSelector::select_at(&contracts, at_hour(10)).is_empty());
    }

    #[tokio::test]
    async fn test_uses_time_source() {
        let selector = ContractSelector::new(Arc::new(FixedTimeSource::new(at_hour(17))));
        let selected = selector.select(&pool()).await;
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, ContractId::new("evening"));
    }

    #[tokio::test]
    async fn test_falls_back_to_local_clock() {
        let time_source = Arc::new(FailingTimeSource::new());
        let selector = ContractSelector::new(time_source.clone());

        let selected = selector.select(&pool()).await;

        // 每个时段都至少有一个在线合约，回退到本地时钟后结果不会为空
        assert_eq!(time_source.call_count(), 1);
        assert!(!selected.is_empty());
        assert!(selected.iter().all(|c| c.is_active() && c.session == selected[0].session));
    }
}
