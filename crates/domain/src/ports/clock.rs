use async_trait::async_trait;
use chrono::{DateTime, Utc};

use dispatch_errors::DispatchResult;

/// 外部时间服务
#[async_trait]
pub trait TimeSource: Send + Sync {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>>;
}
