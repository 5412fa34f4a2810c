//! 多合约会话分发引擎
//!
//! 访客提交一次，向当前时段所有可用客服合约并发发起会话，
//! 第一个接起的会话获胜，其余会话的计时器和状态订阅全部释放。

pub mod engine;
pub mod events;
pub mod miss_timer;
pub mod opening_guard;
pub mod race_resolver;
pub mod selector;
pub mod session;
pub mod status_watch;

pub use engine::{BatchHandles, DispatchBatch, DispatchBatchResult, DispatchEngine};
pub use events::{race_channel, RaceEvent, RaceEventReceiver, RaceEventSender};
pub use miss_timer::{MissTimer, MissTimerState};
pub use opening_guard::OpeningMessageGuard;
pub use race_resolver::{RaceResolver, CANCELLED_REASON, UNMOUNTED_REASON};
pub use selector::ContractSelector;
pub use session::{DispatchSession, SessionState};
pub use status_watch::StatusWatch;
