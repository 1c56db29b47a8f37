use std::time::Duration;

#[cfg(target_arch = "wasm32")]
use web_sys::js_sys::Date;

/// 搜索使用的单调时钟。wasm32 上没有 `std::time::Instant`，改用 JS `Date`。
#[derive(Debug, Clone, Copy)]
pub struct SearchInstant {
    #[cfg(target_arch = "wasm32")]
    timestamp: f64,
    #[cfg(not(target_arch = "wasm32"))]
    instant: std::time::Instant,
}

impl SearchInstant {
    #[cfg(target_arch = "wasm32")]
    pub fn now() -> Self {
        Self {
            timestamp: Date::now(),
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn now() -> Self {
        Self {
            instant: std::time::Instant::now(),
        }
    }

    #[cfg(target_arch = "wasm32")]
    pub fn elapsed(&self) -> Duration {
        let elapsed_ms = (Date::now() - self.timestamp).max(0.0);
        Duration::from_micros((elapsed_ms * 1000.0) as u64)
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn elapsed(&self) -> Duration {
        self.instant.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed().as_millis() as u64
    }
}

/// 起点加时长构成的截止时间。
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    start: SearchInstant,
    budget: Duration,
}

impl Deadline {
    pub fn new(start: SearchInstant, budget: Duration) -> Self {
        Self { start, budget }
    }

    pub fn budget(&self) -> Duration {
        self.budget
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn expired(&self) -> bool {
        self.start.elapsed() >= self.budget
    }

    /// 已用时间占预算的比例，零预算视为已经用完。
    pub fn fraction_used(&self) -> f64 {
        if self.budget.is_zero() {
            return 1.0;
        }
        self.start.elapsed().as_secs_f64() / self.budget.as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_budget_is_immediately_expired() {
        let deadline = Deadline::new(SearchInstant::now(), Duration::ZERO);
        assert!(deadline.expired());
        assert_eq!(deadline.fraction_used(), 1.0);
    }

    #[test]
    fn generous_budget_is_not_expired() {
        let deadline = Deadline::new(SearchInstant::now(), Duration::from_secs(60));
        assert!(!deadline.expired());
        assert!(deadline.fraction_used() < 0.5);
    }
}
