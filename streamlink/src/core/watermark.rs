use std::fmt::Debug;
use std::sync::Arc;
use std::time::Duration;

use crate::core::element::Record;

pub const MAX_WATERMARK: Watermark = Watermark {
    timestamp: i64::MAX,
};
pub const MIN_WATERMARK: Watermark = Watermark {
    timestamp: i64::MIN,
};

/// A value `W` meaning "no further events with timestamp < `W` are expected
/// on this stream". Emitted by sources, coalesced downstream per inbound
/// ordinal.
#[derive(Clone, Copy, Serialize, Deserialize, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Watermark {
    pub(crate) timestamp: i64,
}

impl Watermark {
    pub fn new(timestamp: i64) -> Self {
        Watermark { timestamp }
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }
}

impl std::fmt::Display for Watermark {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Watermark({})", crate::utils::date_time::timestamp_str(self.timestamp))
    }
}

/// Extracts the event timestamp from a record.
pub trait TimestampAssigner: Debug + Send + Sync {
    fn extract_timestamp(&self, record: &Record) -> i64;
}

/// Tracks event time of one logical partition.
///
/// `current_watermark` must be non-decreasing across successive calls and
/// must not mutate state. Nothing else is assumed about the implementation.
pub trait WatermarkPolicy: Debug + Send {
    /// Informs the policy of a just-observed event timestamp.
    fn report_event(&mut self, timestamp: i64);

    /// The partition's current watermark estimate.
    fn current_watermark(&self) -> i64;
}

/// Decides whether a newly computed candidate watermark is worth releasing
/// downstream.
///
/// The policy must return `true` infinitely often while `candidate >
/// last_emitted`, otherwise monotone progress stalls.
pub trait WatermarkEmissionPolicy: Debug + Send + Sync {
    fn should_emit(&self, candidate: i64, last_emitted: i64) -> bool;
}

pub type WatermarkPolicySupplier = Arc<dyn Fn() -> Box<dyn WatermarkPolicy> + Send + Sync>;

/// Bundle of the per-source watermark generation parameters.
pub struct WatermarkGenerationParams {
    pub(crate) timestamp_assigner: Arc<dyn TimestampAssigner>,
    pub(crate) policy_supplier: WatermarkPolicySupplier,
    pub(crate) emission_policy: Box<dyn WatermarkEmissionPolicy>,
    /// Zero disables idle detection.
    pub(crate) idle_timeout: Duration,
}

impl WatermarkGenerationParams {
    pub fn new(
        timestamp_assigner: Arc<dyn TimestampAssigner>,
        policy_supplier: WatermarkPolicySupplier,
        emission_policy: Box<dyn WatermarkEmissionPolicy>,
        idle_timeout: Duration,
    ) -> Self {
        WatermarkGenerationParams {
            timestamp_assigner,
            policy_supplier,
            emission_policy,
            idle_timeout,
        }
    }

    pub fn timestamp_assigner(&self) -> &Arc<dyn TimestampAssigner> {
        &self.timestamp_assigner
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }
}

impl Debug for WatermarkGenerationParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WatermarkGenerationParams")
            .field("timestamp_assigner", &self.timestamp_assigner)
            .field("emission_policy", &self.emission_policy)
            .field("idle_timeout", &self.idle_timeout)
            .finish()
    }
}
