//! 调用上下文
//!
//! 提供取消和截止时间，所有接受上下文的操作在调用存储层前后都会检查一次

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::Instant;

use crate::error::{QuickDbError, QuickDbResult};

#[derive(Debug, Default)]
struct CancelState {
    cancelled: AtomicBool,
    notify: Notify,
}

/// 调用上下文
///
/// 克隆后共享同一个取消状态
#[derive(Debug, Clone, Default)]
pub struct Context {
    state: Arc<CancelState>,
    deadline: Option<Instant>,
}

impl Context {
    /// 创建不带截止时间的上下文
    pub fn background() -> Self {
        Self::default()
    }

    /// 创建带超时的上下文
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            state: Arc::new(CancelState::default()),
            deadline: Some(Instant::now() + timeout),
        }
    }

    /// 派生一个共享取消状态、截止时间更早者优先的子上下文
    pub fn child_with_timeout(&self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        let deadline = match self.deadline {
            Some(current) if current < candidate => current,
            _ => candidate,
        };
        Self {
            state: self.state.clone(),
            deadline: Some(deadline),
        }
    }

    /// 取消上下文
    pub fn cancel(&self) {
        self.state.cancelled.store(true, Ordering::SeqCst);
        self.state.notify.notify_waiters();
    }

    pub fn is_cancelled(&self) -> bool {
        self.state.cancelled.load(Ordering::SeqCst)
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// 距离截止时间的剩余时长
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|d| d.saturating_duration_since(Instant::now()))
    }

    /// 检查上下文是否仍然有效
    pub fn err(&self) -> QuickDbResult<()> {
        if self.is_cancelled() {
            return Err(QuickDbError::Cancelled {
                message: "context canceled".to_string(),
            });
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(QuickDbError::Cancelled {
                    message: "context deadline exceeded".to_string(),
                });
            }
        }
        Ok(())
    }

    /// 睡眠指定时长，取消或到达截止时间时提前返回错误
    pub async fn sleep(&self, duration: Duration) -> QuickDbResult<()> {
        self.err()?;
        let duration = match self.remaining() {
            Some(remaining) if remaining < duration => remaining,
            _ => duration,
        };
        let notified = self.state.notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        self.err()?;
        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = notified => {}
        }
        self.err()
    }

    /// 执行 future，上下文先被取消或到期时放弃执行并返回取消错误
    pub async fn run<T, Fut>(&self, fut: Fut) -> QuickDbResult<T>
    where
        Fut: Future<Output = QuickDbResult<T>>,
    {
        self.err()?;
        tokio::select! {
            result = fut => result,
            _ = self.done() => {
                self.err()?;
                Err(QuickDbError::Cancelled {
                    message: "context canceled".to_string(),
                })
            }
        }
    }

    /// 等待上下文被取消或到达截止时间
    pub async fn done(&self) {
        loop {
            let notified = self.state.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.err().is_err() {
                return;
            }
            match self.remaining() {
                Some(remaining) => {
                    tokio::select! {
                        _ = tokio::time::sleep(remaining) => {}
                        _ = notified => {}
                    }
                }
                None => notified.await,
            }
        }
    }
}
