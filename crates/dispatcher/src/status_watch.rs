//! 会话状态订阅
//!
//! 每个待接会话一个后台任务：订阅状态流，补发订阅时刻的当前状态，
//! 网络瞬时故障时按退避策略自动重连。重连后会再次补发当前状态，
//! 因此消费方必须自行保证幂等。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use futures::StreamExt;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use dispatch_core::StatusWatchConfig;
use dispatch_domain::{ConversationBackend, ConversationId, ConversationStatus, StatusStream};
use dispatch_errors::{DispatchError, DispatchResult};

pub struct StatusWatch {
    conversation_id: ConversationId,
    released: AtomicBool,
    handle: JoinHandle<()>,
}

impl StatusWatch {
    /// 打开状态订阅
    ///
    /// `on_status` 可能收到重复状态；`on_error` 只在无法恢复时调用一次，之后订阅停止。
    pub fn open<S, E>(
        backend: Arc<dyn ConversationBackend>,
        conversation_id: ConversationId,
        config: StatusWatchConfig,
        on_status: S,
        on_error: E,
    ) -> Self
    where
        S: Fn(ConversationStatus) + Send + 'static,
        E: FnOnce(DispatchError) + Send + 'static,
    {
        let task_conversation_id = conversation_id.clone();
        let handle = tokio::spawn(async move {
            run_feed(backend, task_conversation_id, config, on_status, on_error).await;
        });

        Self {
            conversation_id,
            released: AtomicBool::new(false),
            handle,
        }
    }

    /// 取消订阅，幂等；底层流已经关闭时调用也是安全的
    ///
    /// 返回本次调用是否真正执行了释放。
    pub fn unsubscribe(&self) -> bool {
        if self.released.swap(true, Ordering::AcqRel) {
            return false;
        }

        self.handle.abort();
        debug!(conversation_id = %self.conversation_id, "状态订阅已释放");
        true
    }

    pub fn is_released(&self) -> bool {
        self.released.load(Ordering::Acquire)
    }

    pub fn conversation_id(&self) -> &ConversationId {
        &self.conversation_id
    }
}

impl Drop for StatusWatch {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

impl std::fmt::Debug for StatusWatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StatusWatch")
            .field("conversation_id", &self.conversation_id)
            .field("released", &self.is_released())
            .finish()
    }
}

/// 先订阅再读当前状态，避免两步之间发生的状态变更丢失
async fn connect(
    backend: &Arc<dyn ConversationBackend>,
    conversation_id: &ConversationId,
) -> DispatchResult<(ConversationStatus, StatusStream)> {
    let stream = backend.watch_status(conversation_id).await?;
    let current = backend.fetch_status(conversation_id).await?;
    Ok((current, stream))
}

async fn run_feed<S, E>(
    backend: Arc<dyn ConversationBackend>,
    conversation_id: ConversationId,
    config: StatusWatchConfig,
    on_status: S,
    on_error: E,
) where
    S: Fn(ConversationStatus),
    E: FnOnce(DispatchError),
{
    let mut attempt: u32 = 0;

    loop {
        match connect(&backend, &conversation_id).await {
            Ok((current, mut stream)) => {
                if attempt > 0 {
                    info!(
                        conversation_id = %conversation_id,
                        "状态订阅在 {} 次重连后恢复", attempt
                    );
                }
                debug!(
                    conversation_id = %conversation_id,
                    status = current.as_str(),
                    "补发订阅时刻的会话状态"
                );
                on_status(current);
                // 预算只约束连续失败的连接，连接成功即清零
                attempt = 0;

                loop {
                    match stream.next().await {
                        Some(Ok(status)) => on_status(status),
                        Some(Err(e)) if e.is_retryable() => {
                            warn!(conversation_id = %conversation_id, "状态订阅中断: {}", e);
                            break;
                        }
                        Some(Err(e)) => {
                            error!(conversation_id = %conversation_id, "状态订阅不可恢复: {}", e);
                            on_error(e);
                            return;
                        }
                        None => {
                            debug!(conversation_id = %conversation_id, "状态流已结束，准备重连");
                            break;
                        }
                    }
                }
            }
            Err(e) if e.is_retryable() => {
                warn!(conversation_id = %conversation_id, "状态订阅连接失败: {}", e);
            }
            Err(e) => {
                error!(conversation_id = %conversation_id, "状态订阅被拒绝: {}", e);
                on_error(e);
                return;
            }
        }

        if attempt >= config.max_reconnect_attempts {
            let message = format!("会话 {conversation_id} 重连 {attempt} 次后仍未恢复");
            error!("{}", message);
            on_error(DispatchError::FeedClosed(message));
            return;
        }

        let delay = config.reconnect_delay(attempt);
        attempt += 1;
        debug!(
            conversation_id = %conversation_id,
            "第 {} 次重连将在 {:?} 后进行", attempt, delay
        );
        tokio::time::sleep(delay).await;
    }
}
