//! 外部协作方的适配器实现
//!
//! 内存版会话后端用于本地模拟和嵌入式演示，时间服务支持本地时钟和HTTP两种来源。

pub mod clock;
pub mod contract_pool;
pub mod scripted_backend;

pub use clock::{build_time_source, FixedClock, HttpTimeSource, LocalClock};
pub use contract_pool::StaticContractRepository;
pub use scripted_backend::{ConversationScript, ScriptedConversationBackend};
