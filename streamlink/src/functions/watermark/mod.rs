mod emission;
mod limiting_lag;
mod record_timestamp_assigner;
mod source_tracker;

pub use emission::{emit_all, emit_by_frame, emit_by_min_step};
pub use limiting_lag::LimitingLagPolicy;
pub use record_timestamp_assigner::RecordTimestampAssigner;
pub use source_tracker::SourceWatermarkTracker;
