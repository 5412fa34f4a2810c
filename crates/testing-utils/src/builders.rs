//! Test data builders for creating test entities
//!
//! Builder patterns with sensible defaults and easy customization.

use dispatch_domain::{Contract, ContractId, ContractSession, ContractStatus, CustomerForm};

/// Builder for creating test Contract entities
pub struct ContractBuilder {
    contract: Contract,
}

impl ContractBuilder {
    pub fn new() -> Self {
        Self {
            contract: Contract {
                id: ContractId::new("contract-1"),
                session: ContractSession::Day,
                status: ContractStatus::Active,
                miss_timeout_seconds: 30,
                color: "#4a90d9".to_string(),
            },
        }
    }

    pub fn with_id(mut self, id: &str) -> Self {
        self.contract.id = ContractId::new(id);
        self
    }

    pub fn with_session(mut self, session: ContractSession) -> Self {
        self.contract.session = session;
        self
    }

    pub fn with_status(mut self, status: ContractStatus) -> Self {
        self.contract.status = status;
        self
    }

    pub fn inactive(self) -> Self {
        self.with_status(ContractStatus::Inactive)
    }

    /// 0 disables the miss timer
    pub fn with_miss_timeout(mut self, seconds: u32) -> Self {
        self.contract.miss_timeout_seconds = seconds;
        self
    }

    pub fn with_color(mut self, color: &str) -> Self {
        self.contract.color = color.to_string();
        self
    }

    pub fn build(self) -> Contract {
        self.contract
    }
}

impl Default for ContractBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for creating test CustomerForm values
pub struct CustomerFormBuilder {
    form: CustomerForm,
}

impl CustomerFormBuilder {
    pub fn new() -> Self {
        Self {
            form: CustomerForm {
                customer_name: "张三".to_string(),
                headline: "退款问题".to_string(),
                ip_address: None,
            },
        }
    }

    pub fn with_customer_name(mut self, name: &str) -> Self {
        self.form.customer_name = name.to_string();
        self
    }

    pub fn with_headline(mut self, headline: &str) -> Self {
        self.form.headline = headline.to_string();
        self
    }

    pub fn with_ip_address(mut self, ip_address: &str) -> Self {
        self.form.ip_address = Some(ip_address.to_string());
        self
    }

    pub fn build(self) -> CustomerForm {
        self.form
    }
}

impl Default for CustomerFormBuilder {
    fn default() -> Self {
        Self::new()
    }
}
