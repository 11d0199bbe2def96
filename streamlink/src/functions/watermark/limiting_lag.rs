use crate::core::watermark::WatermarkPolicy;

/// Bounds event-time lag: the watermark trails the top observed timestamp by
/// a fixed amount. Stays at the minimum until the first event is reported.
#[derive(Debug)]
pub struct LimitingLagPolicy {
    lag: i64,
    top_timestamp: i64,
}

impl LimitingLagPolicy {
    pub fn new(lag: i64) -> Self {
        assert!(lag >= 0, "lag must not be negative");
        LimitingLagPolicy {
            lag,
            top_timestamp: i64::MIN,
        }
    }
}

impl WatermarkPolicy for LimitingLagPolicy {
    fn report_event(&mut self, timestamp: i64) {
        if timestamp > self.top_timestamp {
            self.top_timestamp = timestamp;
        }
    }

    fn current_watermark(&self) -> i64 {
        if self.top_timestamp == i64::MIN {
            i64::MIN
        } else {
            self.top_timestamp - self.lag
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::core::watermark::WatermarkPolicy;
    use crate::functions::watermark::LimitingLagPolicy;

    #[test]
    pub fn limiting_lag_test() {
        let mut policy = LimitingLagPolicy::new(5);
        assert_eq!(policy.current_watermark(), i64::MIN);

        policy.report_event(100);
        assert_eq!(policy.current_watermark(), 95);

        // stale events never move the watermark backwards
        policy.report_event(50);
        assert_eq!(policy.current_watermark(), 95);

        policy.report_event(107);
        assert_eq!(policy.current_watermark(), 102);
    }
}
