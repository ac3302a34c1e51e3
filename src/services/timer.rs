use std::time::{Duration, Instant};

const MIN_PERIOD: Duration = Duration::from_millis(1);

/// 周期定时器，由事件循环主动查询
#[derive(Debug, Clone)]
pub struct Timer {
    period: Duration,
    next: Instant,
}

impl Timer {
    /// 第一次到期时间为 `now + period`。周期至少为 1ms。
    pub fn new(period: Duration, now: Instant) -> Self {
        let period = period.max(MIN_PERIOD);
        Self {
            period,
            next: now + period,
        }
    }

    /// 到期返回 true 并推进到下一个周期。
    ///
    /// 落后多个周期时（例如循环被阻塞），只触发一次，并跳过错过的周期。
    pub fn timeout(&mut self, now: Instant) -> bool {
        if now < self.next {
            return false;
        }
        // 保持原有相位
        let behind = (now - self.next).as_nanos() % self.period.as_nanos();
        self.next = now + self.period - Duration::from_nanos(behind as u64);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fires_once_per_period() {
        let t0 = Instant::now();
        let mut timer = Timer::new(Duration::from_millis(100), t0);

        assert!(!timer.timeout(t0));
        assert!(!timer.timeout(t0 + Duration::from_millis(99)));
        assert!(timer.timeout(t0 + Duration::from_millis(100)));
        assert!(!timer.timeout(t0 + Duration::from_millis(150)));
        assert!(timer.timeout(t0 + Duration::from_millis(200)));
    }

    #[test]
    fn test_skips_missed_periods() {
        let t0 = Instant::now();
        let mut timer = Timer::new(Duration::from_millis(100), t0);

        assert!(timer.timeout(t0 + Duration::from_millis(1050)));
        assert!(!timer.timeout(t0 + Duration::from_millis(1060)));
        assert!(timer.timeout(t0 + Duration::from_millis(1100)));
    }

    #[test]
    fn test_zero_period_is_raised_to_minimum() {
        let t0 = Instant::now();
        let mut timer = Timer::new(Duration::ZERO, t0);

        assert!(!timer.timeout(t0));
        assert!(timer.timeout(t0 + Duration::from_millis(1)));
        assert!(!timer.timeout(t0 + Duration::from_micros(1500)));
        assert!(timer.timeout(t0 + Duration::from_secs(3600)));
    }
}
