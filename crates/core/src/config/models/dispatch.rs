use std::time::Duration;

use serde::{Deserialize, Serialize};

/// 分发会话配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DispatchConfig {
    /// 会话级等待超时（秒），与单个合约的未接超时相互独立
    pub waiting_timeout_seconds: u64,
    /// 开场消息最多尝试次数
    pub opening_message_max_attempts: u32,
    /// 开场消息重试间隔（毫秒）
    pub opening_message_retry_delay_ms: u64,
    /// 开场消息署名，为空时使用访客姓名
    pub opening_message_author: Option<String>,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            waiting_timeout_seconds: 300, // 5分钟
            opening_message_max_attempts: 3,
            opening_message_retry_delay_ms: 500,
            opening_message_author: None,
        }
    }
}

impl DispatchConfig {
    pub fn waiting_timeout(&self) -> Duration {
        Duration::from_secs(self.waiting_timeout_seconds)
    }

    pub fn opening_message_retry_delay(&self) -> Duration {
        Duration::from_millis(self.opening_message_retry_delay_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.waiting_timeout_seconds == 0 {
            return Err(anyhow::anyhow!("等待超时时间必须大于0"));
        }

        if self.opening_message_max_attempts == 0 {
            return Err(anyhow::anyhow!("开场消息尝试次数必须大于0"));
        }

        if let Some(author) = &self.opening_message_author {
            if author.trim().is_empty() {
                return Err(anyhow::anyhow!("开场消息署名不能为空字符串"));
            }
        }

        Ok(())
    }
}

/// 状态订阅重连配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StatusWatchConfig {
    /// 连续重连的最大次数，超过后视为无法恢复
    pub max_reconnect_attempts: u32,
    /// 基础重连间隔（毫秒）
    pub reconnect_base_delay_ms: u64,
    /// 最大重连间隔（毫秒）
    pub reconnect_max_delay_ms: u64,
    /// 指数退避倍数
    pub backoff_multiplier: f64,
    /// 重连间隔的随机抖动范围（0.0-1.0）
    pub jitter_factor: f64,
}

impl Default for StatusWatchConfig {
    fn default() -> Self {
        Self {
            max_reconnect_attempts: 5,
            reconnect_base_delay_ms: 500,
            reconnect_max_delay_ms: 10_000,
            backoff_multiplier: 2.0,
            jitter_factor: 0.1,
        }
    }
}

impl StatusWatchConfig {
    /// 第 attempt 次重连前的等待时间（attempt 从0开始）
    pub fn reconnect_delay(&self, attempt: u32) -> Duration {
        let base = self.reconnect_base_delay_ms as f64;
        let exponential = base * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.reconnect_max_delay_ms as f64);

        // 添加随机抖动以避免雷群效应
        let jitter = capped * self.jitter_factor * (rand::random::<f64>() - 0.5) * 2.0;
        let final_delay = (capped + jitter).max(0.0);

        Duration::from_millis(final_delay as u64)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.reconnect_base_delay_ms == 0 {
            return Err(anyhow::anyhow!("基础重连间隔必须大于0"));
        }

        if self.reconnect_max_delay_ms < self.reconnect_base_delay_ms {
            return Err(anyhow::anyhow!("最大重连间隔不能小于基础重连间隔"));
        }

        if self.backoff_multiplier < 1.0 {
            return Err(anyhow::anyhow!("指数退避倍数不能小于1.0"));
        }

        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(anyhow::anyhow!(
                "抖动范围必须在0.0到1.0之间: {}",
                self.jitter_factor
            ));
        }

        Ok(())
    }
}

/// 时间服务配置
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeServiceConfig {
    /// 时间服务地址，未配置时使用本地时钟
    pub url: Option<String>,
    /// 请求超时（毫秒）
    pub request_timeout_ms: u64,
}

impl Default for TimeServiceConfig {
    fn default() -> Self {
        Self {
            url: None,
            request_timeout_ms: 3000,
        }
    }
}

impl TimeServiceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if let Some(url) = &self.url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(anyhow::anyhow!("时间服务地址格式无效: {}", url));
            }
        }

        if self.request_timeout_ms == 0 {
            return Err(anyhow::anyhow!("时间服务请求超时必须大于0"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dispatch_config_default() {
        let config = DispatchConfig::default();
        assert_eq!(config.waiting_timeout(), Duration::from_secs(300));
        assert_eq!(config.opening_message_max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_dispatch_config_validation() {
        let config = DispatchConfig {
            waiting_timeout_seconds: 0,
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = DispatchConfig {
            opening_message_author: Some("  ".to_string()),
            ..DispatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_reconnect_delay_is_capped() {
        let config = StatusWatchConfig {
            jitter_factor: 0.0,
            ..StatusWatchConfig::default()
        };
        assert_eq!(config.reconnect_delay(0), Duration::from_millis(500));
        assert_eq!(config.reconnect_delay(1), Duration::from_millis(1000));
        assert_eq!(config.reconnect_delay(10), Duration::from_millis(10_000));
    }

    #[test]
    fn test_reconnect_delay_with_jitter_stays_in_range() {
        let config = StatusWatchConfig::default();
        for _ in 0..20 {
            let delay = config.reconnect_delay(0).as_millis();
            assert!((450..=550).contains(&delay), "delay out of range: {delay}");
        }
    }

    #[test]
    fn test_status_watch_config_validation() {
        assert!(StatusWatchConfig::default().validate().is_ok());

        let config = StatusWatchConfig {
            jitter_factor: 1.5,
            ..StatusWatchConfig::default()
        };
        assert!(config.validate().is_err());

        let config = StatusWatchConfig {
            reconnect_max_delay_ms: 100,
            ..StatusWatchConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_time_service_config_validation() {
        assert!(TimeServiceConfig::default().validate().is_ok());

        let config = TimeServiceConfig {
            url: Some("ftp://time.example.com".to_string()),
            ..TimeServiceConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
