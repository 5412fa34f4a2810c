//! 配置管理
//!
//! 配置来源按优先级从低到高：内置默认值、TOML 配置文件、`CHAT_DISPATCH__` 前缀的环境变量。
//! 加载完成后统一执行校验，校验失败时拒绝启动。

pub mod models;

pub use models::*;
