use crate::core::watermark::WatermarkEmissionPolicy;
use crate::core::window::WindowDefinition;

/// Releases every advancing watermark.
#[derive(Debug, Default)]
struct EmitAll;

impl WatermarkEmissionPolicy for EmitAll {
    fn should_emit(&self, candidate: i64, last_emitted: i64) -> bool {
        candidate > last_emitted
    }
}

pub fn emit_all() -> Box<dyn WatermarkEmissionPolicy> {
    Box::new(EmitAll)
}

/// Suppresses advances smaller than `min_step`.
#[derive(Debug)]
struct EmitByMinStep {
    min_step: i64,
}

impl WatermarkEmissionPolicy for EmitByMinStep {
    fn should_emit(&self, candidate: i64, last_emitted: i64) -> bool {
        if last_emitted == i64::MIN {
            return candidate > last_emitted;
        }
        candidate - last_emitted >= self.min_step
    }
}

pub fn emit_by_min_step(min_step: i64) -> Box<dyn WatermarkEmissionPolicy> {
    assert!(min_step > 0, "min step must be positive");
    Box::new(EmitByMinStep { min_step })
}

/// Releases a watermark only when it crosses into a new frame of `window`;
/// finer advances cannot close a window and are noise downstream.
#[derive(Debug)]
struct EmitByFrame {
    window: WindowDefinition,
}

impl WatermarkEmissionPolicy for EmitByFrame {
    fn should_emit(&self, candidate: i64, last_emitted: i64) -> bool {
        if last_emitted == i64::MIN {
            return candidate > last_emitted;
        }
        candidate >= self.window.higher_frame_ts(last_emitted)
    }
}

pub fn emit_by_frame(window: WindowDefinition) -> Box<dyn WatermarkEmissionPolicy> {
    Box::new(EmitByFrame { window })
}

#[cfg(test)]
mod tests {
    use crate::core::window::WindowDefinition;
    use crate::functions::watermark::{emit_all, emit_by_frame, emit_by_min_step};

    #[test]
    pub fn emit_all_test() {
        let policy = emit_all();
        assert!(policy.should_emit(10, i64::MIN));
        assert!(policy.should_emit(11, 10));
        assert!(!policy.should_emit(10, 10));
        assert!(!policy.should_emit(9, 10));
    }

    #[test]
    pub fn emit_by_min_step_test() {
        let policy = emit_by_min_step(10);
        assert!(policy.should_emit(0, i64::MIN));
        assert!(!policy.should_emit(9, 0));
        assert!(policy.should_emit(10, 0));
    }

    #[test]
    pub fn emit_by_frame_test() {
        let policy = emit_by_frame(WindowDefinition::tumbling(10));
        assert!(policy.should_emit(3, i64::MIN));
        assert!(!policy.should_emit(9, 3));
        assert!(policy.should_emit(10, 3));
        assert!(policy.should_emit(25, 10));
    }
}
