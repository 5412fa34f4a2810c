use async_trait::async_trait;
use tracing::debug;

use dispatch_domain::{Contract, ContractRepository};
use dispatch_errors::DispatchResult;

/// 固定合约池，合约在启动时从场景文件或配置中装载
#[derive(Debug, Clone, Default)]
pub struct StaticContractRepository {
    contracts: Vec<Contract>,
}

impl StaticContractRepository {
    pub fn new(contracts: Vec<Contract>) -> Self {
        Self { contracts }
    }

    pub fn len(&self) -> usize {
        self.contracts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contracts.is_empty()
    }
}

#[async_trait]
impl ContractRepository for StaticContractRepository {
    async fn list_contracts(&self) -> DispatchResult<Vec<Contract>> {
        debug!("返回 {} 个合约", self.contracts.len());
        Ok(self.contracts.clone())
    }
}
