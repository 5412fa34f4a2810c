use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::{debug, info};

use dispatch_core::TimeServiceConfig;
use dispatch_domain::TimeSource;
use dispatch_errors::{DispatchError, DispatchResult};

/// 本地时钟
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalClock;

#[async_trait]
impl TimeSource for LocalClock {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>> {
        Ok(Utc::now())
    }
}

/// 固定时钟，模拟场景用来复现某个时段
#[derive(Debug, Clone, Copy)]
pub struct FixedClock {
    now: DateTime<Utc>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self { now }
    }
}

#[async_trait]
impl TimeSource for FixedClock {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>> {
        Ok(self.now)
    }
}

#[derive(Debug, Deserialize)]
struct TimeResponse {
    utc_datetime: DateTime<Utc>,
}

/// HTTP时间服务客户端，响应体形如 `{"utc_datetime": "2024-05-01T10:00:00Z"}`
pub struct HttpTimeSource {
    url: String,
    http_client: reqwest::Client,
}

impl HttpTimeSource {
    pub fn new(url: String, request_timeout: Duration) -> DispatchResult<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()
            .map_err(|e| DispatchError::config_error(format!("创建HTTP客户端失败: {e}")))?;

        Ok(Self { url, http_client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl TimeSource for HttpTimeSource {
    async fn current_time(&self) -> DispatchResult<DateTime<Utc>> {
        let response = self
            .http_client
            .get(&self.url)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    DispatchError::timeout_error(format!("时间服务请求超时: {e}"))
                } else {
                    DispatchError::network_error(format!("时间服务连接失败: {e}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DispatchError::backend_error(format!(
                "时间服务返回错误: HTTP {status}"
            )));
        }

        let body: TimeResponse = response
            .json()
            .await
            .map_err(|e| DispatchError::Serialization(format!("时间服务响应解析失败: {e}")))?;

        debug!("时间服务返回: {}", body.utc_datetime);
        Ok(body.utc_datetime)
    }
}

/// 按配置选择时间来源，未配置地址时使用本地时钟
pub fn build_time_source(config: &TimeServiceConfig) -> DispatchResult<Arc<dyn TimeSource>> {
    match &config.url {
        Some(url) => {
            info!("使用HTTP时间服务: {}", url);
            Ok(Arc::new(HttpTimeSource::new(
                url.clone(),
                config.request_timeout(),
            )?))
        }
        None => {
            info!("未配置时间服务，使用本地时钟");
            Ok(Arc::new(LocalClock))
        }
    }
}
