use anyhow::{Context, Result};
use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{
    dispatch::{DispatchConfig, StatusWatchConfig, TimeServiceConfig},
    logging::LoggingConfig,
};

/// 环境变量前缀，例如 CHAT_DISPATCH__DISPATCH__WAITING_TIMEOUT_SECONDS=120
pub const ENV_PREFIX: &str = "CHAT_DISPATCH";

const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "config/chat-dispatch.toml",
    "chat-dispatch.toml",
    "/etc/chat-dispatch/config.toml",
];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct AppConfig {
    pub dispatch: DispatchConfig,
    pub status_watch: StatusWatchConfig,
    pub time_service: TimeServiceConfig,
    pub logging: LoggingConfig,
}

impl AppConfig {
    pub fn load(config_path: Option<&str>) -> Result<Self> {
        let mut builder = ConfigBuilder::builder();

        if let Some(path) = config_path {
            if Path::new(path).exists() {
                builder = builder.add_source(File::new(path, FileFormat::Toml));
            } else {
                return Err(anyhow::anyhow!("配置文件不存在: {}", path));
            }
        } else if let Some(path) = DEFAULT_CONFIG_PATHS
            .iter()
            .find(|path| Path::new(path).exists())
        {
            builder = builder.add_source(File::new(path, FileFormat::Toml));
        }

        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        );

        let config: AppConfig = builder
            .build()
            .context("构建配置失败")?
            .try_deserialize()
            .context("反序列化配置失败")?;

        config.validate()?;

        Ok(config)
    }

    pub fn from_toml(toml_str: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(toml_str).context("解析TOML配置失败")?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("序列化配置为TOML失败")
    }

    pub fn validate(&self) -> Result<()> {
        self.dispatch.validate().context("dispatch 配置无效")?;
        self.status_watch
            .validate()
            .context("status_watch 配置无效")?;
        self.time_service
            .validate()
            .context("time_service 配置无效")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::models::{LogLevel, OutputFormat};
    use std::io::Write;

    #[test]
    fn test_app_config_default() {
        let config = AppConfig::default();
        assert_eq!(config.dispatch.waiting_timeout_seconds, 300);
        assert_eq!(config.status_watch.max_reconnect_attempts, 5);
        assert!(config.time_service.url.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_app_config_from_toml() {
        let toml_str = r#"
[dispatch]
waiting_timeout_seconds = 120
opening_message_author = "访客"

[status_watch]
max_reconnect_attempts = 2

[logging]
level = "debug"
format = "json"
"#;
        let config = AppConfig::from_toml(toml_str).unwrap();
        assert_eq!(config.dispatch.waiting_timeout_seconds, 120);
        assert_eq!(config.dispatch.opening_message_max_attempts, 3);
        assert_eq!(
            config.dispatch.opening_message_author.as_deref(),
            Some("访客")
        );
        assert_eq!(config.status_watch.max_reconnect_attempts, 2);
        assert_eq!(config.logging.level, LogLevel::Debug);
        assert_eq!(config.logging.format, OutputFormat::Json);
    }

    #[test]
    fn test_app_config_from_invalid_toml() {
        let toml_str = r#"
[dispatch]
waiting_timeout_seconds = 0
"#;
        assert!(AppConfig::from_toml(toml_str).is_err());
    }

    #[test]
    fn test_app_config_toml_roundtrip() {
        let config = AppConfig::default();
        let serialized = config.to_toml().unwrap();
        let parsed = AppConfig::from_toml(&serialized).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[dispatch]\nwaiting_timeout_seconds = 60\n\n[time_service]\nurl = \"https://time.example.com/now\""
        )
        .unwrap();

        let path = file.path().to_str().unwrap().to_string();
        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.dispatch.waiting_timeout_seconds, 60);
        assert_eq!(
            config.time_service.url.as_deref(),
            Some("https://time.example.com/now")
        );
    }

    #[test]
    fn test_load_missing_file() {
        let result = AppConfig::load(Some("/nonexistent/chat-dispatch.toml"));
        assert!(result.is_err());
    }
}
