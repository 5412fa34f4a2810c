//! 领域仓储抽象
//!
//! 定义数据访问的抽象接口，遵循依赖倒置原则

use async_trait::async_trait;

use crate::entities::Contract;
use dispatch_errors::DispatchResult;

/// 合约池仓储抽象
#[async_trait]
pub trait ContractRepository: Send + Sync {
    async fn list_contracts(&self) -> DispatchResult<Vec<Contract>>;
}
