//! 调用上下文：取消令牌与截止时间。
//!
//! `dial`/`listen` 均接收 [`CallContext`]，机制实现应在等待原生建连 Future 时同时观察
//! [`Cancellation`] 与 [`Deadline`]，并分别以 [`ConduitError::Cancelled`]、
//! [`ConduitError::Timeout`] 结束。
//!
//! [`ConduitError::Cancelled`]: crate::ConduitError::Cancelled
//! [`ConduitError::Timeout`]: crate::ConduitError::Timeout

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

/// 取消原语，统一表达跨模块的可中断性契约。
///
/// # 逻辑解析（How）
/// - 内部使用 [`AtomicBool`] 表达取消状态，并通过 [`Arc`] 支持多方共享；
/// - `cancel` 在首次成功设置取消位时返回 `true`，重复调用返回 `false`；
/// - 克隆得到的实例共享同一原子位。
///
/// # 设计取舍与风险（Trade-offs）
/// - 未提供回调注册接口；等待方需轮询 `is_cancelled`，取消响应存在毫秒级延迟。
#[derive(Clone, Debug, Default)]
pub struct Cancellation {
    flag: Arc<AtomicBool>,
}

impl Cancellation {
    /// 创建处于“未取消”状态的取消令牌。
    pub fn new() -> Self {
        Self::default()
    }

    /// 查询当前是否已被标记取消。
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// 将当前令牌标记为取消；返回 `true` 表示本次调用首次触发取消。
    pub fn cancel(&self) -> bool {
        self.flag
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }
}

/// 截止原语，描述操作的最迟完成时间；为空表示不设硬超时。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Deadline {
    instant: Option<Instant>,
}

impl Deadline {
    /// 创建未设置截止时间的实例。
    pub const fn none() -> Self {
        Self { instant: None }
    }

    /// 根据绝对时间点构造截止时间。
    pub fn at(instant: Instant) -> Self {
        Self {
            instant: Some(instant),
        }
    }

    /// 以当前时刻加持续时间生成截止时间。
    pub fn after(timeout: Duration) -> Self {
        Self::at(Instant::now() + timeout)
    }

    /// 返回内部时间点。
    pub fn instant(&self) -> Option<Instant> {
        self.instant
    }

    /// 判断是否已经超时。
    pub fn is_expired(&self) -> bool {
        self.instant.is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// 取两者中更早的截止时间。
    pub fn min(self, other: Deadline) -> Deadline {
        match (self.instant, other.instant) {
            (Some(a), Some(b)) => Deadline::at(a.min(b)),
            (Some(_), None) => self,
            _ => other,
        }
    }
}

/// 建连调用的上下文。
#[derive(Clone, Debug, Default)]
pub struct CallContext {
    cancellation: Cancellation,
    deadline: Deadline,
}

impl CallContext {
    pub fn builder() -> CallContextBuilder {
        CallContextBuilder::default()
    }

    pub fn cancellation(&self) -> &Cancellation {
        &self.cancellation
    }

    pub fn deadline(&self) -> Deadline {
        self.deadline
    }

    /// 派生一个共享取消令牌、但截止时间收紧到 `deadline` 的上下文。
    pub fn with_tighter_deadline(&self, deadline: Deadline) -> CallContext {
        CallContext {
            cancellation: self.cancellation.clone(),
            deadline: self.deadline.min(deadline),
        }
    }
}

impl fmt::Display for CallContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CallContext(cancelled={}, deadline={:?})",
            self.cancellation.is_cancelled(),
            self.deadline.instant()
        )
    }
}

/// [`CallContext`] 的建造器。
#[derive(Debug, Default)]
pub struct CallContextBuilder {
    cancellation: Option<Cancellation>,
    deadline: Deadline,
}

impl CallContextBuilder {
    pub fn with_cancellation(mut self, cancellation: Cancellation) -> Self {
        self.cancellation = Some(cancellation);
        self
    }

    pub fn with_deadline(mut self, deadline: Deadline) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn build(self) -> CallContext {
        CallContext {
            cancellation: self.cancellation.unwrap_or_default(),
            deadline: self.deadline,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_reports_first_trigger_only() {
        let token = Cancellation::new();
        let shared = token.clone();
        assert!(!shared.is_cancelled());
        assert!(token.cancel());
        assert!(!token.cancel());
        assert!(shared.is_cancelled());
    }

    #[test]
    fn tighter_deadline_keeps_the_earliest() {
        let early = Deadline::after(Duration::from_millis(10));
        let late = Deadline::after(Duration::from_secs(60));
        let ctx = CallContext::builder().with_deadline(late).build();

        assert_eq!(ctx.with_tighter_deadline(early).deadline(), early);
        assert_eq!(ctx.with_tighter_deadline(Deadline::none()).deadline(), late);
        assert_eq!(
            CallContext::default()
                .with_tighter_deadline(early)
                .deadline(),
            early
        );
    }

    #[test]
    fn expired_deadline() {
        assert!(Deadline::at(Instant::now()).is_expired());
        assert!(!Deadline::none().is_expired());
    }
}
