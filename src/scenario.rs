//! 模拟场景文件
//!
//! ```toml
//! now = "2024-05-01T10:00:00Z"
//!
//! [customer]
//! customer_name = "张三"
//! headline = "退款问题"
//!
//! [[contracts]]
//! id = "alice"
//! session = "DAY"
//! status = "ACTIVE"
//! miss_timeout_seconds = 10
//! script = { behavior = "answer", after_seconds = 3 }
//! ```

use std::collections::HashMap;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Deserialize;

use dispatch_domain::{Contract, ContractId, CustomerForm};
use dispatch_infrastructure::ConversationScript;

#[derive(Debug, Clone, Deserialize)]
pub struct Scenario {
    /// 固定的当前时间，未设置时使用配置的时间服务
    #[serde(default)]
    pub now: Option<DateTime<Utc>>,
    pub customer: CustomerForm,
    #[serde(default)]
    pub contracts: Vec<ScenarioContract>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ScenarioContract {
    #[serde(flatten)]
    pub contract: Contract,
    #[serde(default)]
    pub script: ConversationScript,
}

impl Scenario {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("读取场景文件失败: {}", path.display()))?;
        Self::from_toml(&content).with_context(|| format!("解析场景文件失败: {}", path.display()))
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        Ok(toml::from_str(content)?)
    }

    pub fn contracts(&self) -> Vec<Contract> {
        self.contracts.iter().map(|c| c.contract.clone()).collect()
    }

    pub fn scripts(&self) -> HashMap<ContractId, ConversationScript> {
        self.contracts
            .iter()
            .map(|c| (c.contract.id.clone(), c.script.clone()))
            .collect()
    }
}
