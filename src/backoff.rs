use std::fmt;
use std::time::{Duration, Instant};

/// 默认重置窗口：距上次调用超过该时间则重新从第 0 次开始
pub const DEFAULT_RESET_AFTER: Duration = Duration::from_secs(30);
/// 默认最大等待时间
pub const DEFAULT_CAP: Duration = Duration::from_secs(30);

/// 退避函数：尝试次数 -> 等待时间
pub type BackoffMethod = Box<dyn Fn(u32) -> Duration + Send + Sync>;

/// 平方退避：第 0 次不等待，之后为 `min(attempt², cap)` 秒
pub fn squared_with_cap(attempt: u32, cap: Duration) -> Duration {
    if attempt == 0 {
        return Duration::ZERO;
    }
    let secs = u64::from(attempt).saturating_mul(u64::from(attempt));
    Duration::from_secs(secs).min(cap)
}

/// 重试退避策略
///
/// 连续失败时等待时间逐步增加；距离上次调用超过 `reset_after` 时尝试次数归零，
/// 偶发的失败不会累积惩罚。
pub struct Backoff {
    method: BackoffMethod,
    reset_after: Duration,
    last_attempt: Option<Instant>,
    attempt: u32,
}

impl Backoff {
    /// 使用默认平方退避与默认重置窗口
    pub fn new() -> Self {
        Self {
            method: Box::new(|attempt| squared_with_cap(attempt, DEFAULT_CAP)),
            reset_after: DEFAULT_RESET_AFTER,
            last_attempt: None,
            attempt: 0,
        }
    }

    /// 默认平方退避，自定义上限
    pub fn with_cap(self, cap: Duration) -> Self {
        self.with_method(move |attempt| squared_with_cap(attempt, cap))
    }

    /// 自定义退避函数
    pub fn with_method<F>(mut self, method: F) -> Self
    where
        F: Fn(u32) -> Duration + Send + Sync + 'static,
    {
        self.method = Box::new(method);
        self
    }

    /// 自定义重置窗口
    pub fn with_reset_after(mut self, reset_after: Duration) -> Self {
        self.reset_after = reset_after;
        self
    }

    /// 当前尝试次数
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// 计算下一次等待时间并记录本次尝试
    pub fn next(&mut self) -> Duration {
        self.next_at(Instant::now())
    }

    /// 以给定时刻计算下一次等待时间
    pub fn next_at(&mut self, now: Instant) -> Duration {
        let expired = self
            .last_attempt
            .is_none_or(|last| now.saturating_duration_since(last) > self.reset_after);
        if expired {
            self.attempt = 0;
        }

        let delay = (self.method)(self.attempt);
        self.attempt = self.attempt.saturating_add(1);
        self.last_attempt = Some(now);
        delay
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Backoff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backoff")
            .field("reset_after", &self.reset_after)
            .field("last_attempt", &self.last_attempt)
            .field("attempt", &self.attempt)
            .finish()
    }
}
