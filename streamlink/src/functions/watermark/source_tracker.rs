use std::collections::VecDeque;
use std::fmt::Debug;
use std::sync::Arc;

use crate::core::checkpoint::{broadcast_key, BroadcastKey};
use crate::core::element::{Element, IdleMessage, Record};
use crate::core::watermark::{
    TimestampAssigner, Watermark, WatermarkEmissionPolicy, WatermarkGenerationParams,
    WatermarkPolicy, WatermarkPolicySupplier,
};
use crate::utils::date_time::monotonic_nanos;

/// Wraps a source record, given its extracted event timestamp, into the item
/// emitted after any watermark. The default stamps the timestamp on the
/// record.
pub type WrapFn = Arc<dyn Fn(Record, i64) -> Record + Send + Sync>;

/// Coalesces per-partition watermarks of one source processor into a single
/// monotone watermark stream, with idle-partition handling.
///
/// A source reading multiple external partitions cannot emit watermarks per
/// event: a recent event on one partition must not advance time past the
/// unread backlog of another. This utility tracks a [`WatermarkPolicy`] per
/// partition and emits the minimum over the non-idle ones. Partitions that
/// stay silent past the idle timeout stop holding the minimum back; once all
/// of them are silent a single [`IdleMessage`] tells downstream coalescers to
/// exclude this processor until events resume.
///
/// Owned by a single processor instance; all operations are synchronous and
/// complete in time proportional to the partition count.
///
/// The partition count starts at 0; call
/// [`increase_partition_count`](Self::increase_partition_count) to set it.
pub struct SourceWatermarkTracker {
    idle_timeout_nanos: u64,
    timestamp_assigner: Arc<dyn TimestampAssigner>,
    policy_supplier: WatermarkPolicySupplier,
    emission_policy: Box<dyn WatermarkEmissionPolicy>,
    wrap_fn: Option<WrapFn>,

    // parallel arrays, one slot per external partition
    wm_policies: Vec<Box<dyn WatermarkPolicy>>,
    watermarks: Vec<i64>,
    mark_idle_at: Vec<u64>,

    last_emitted_wm: i64,
    all_are_idle: bool,

    // at most one watermark and one wrapped item per call
    queue: VecDeque<Element>,
}

impl SourceWatermarkTracker {
    pub fn new(params: WatermarkGenerationParams) -> Self {
        let idle_timeout_nanos = params.idle_timeout.as_nanos().min(u64::MAX as u128) as u64;
        SourceWatermarkTracker {
            idle_timeout_nanos,
            timestamp_assigner: params.timestamp_assigner,
            policy_supplier: params.policy_supplier,
            emission_policy: params.emission_policy,
            wrap_fn: None,
            wm_policies: Vec::new(),
            watermarks: Vec::new(),
            mark_idle_at: Vec::new(),
            last_emitted_wm: i64::MIN,
            all_are_idle: false,
            queue: VecDeque::with_capacity(2),
        }
    }

    /// Like [`new`](Self::new), with a custom item wrapper applied after the
    /// event timestamp is extracted. Lets the caller attach bookkeeping (an
    /// offset to store once the item is emitted, say) to outgoing records.
    pub fn with_wrap_fn(params: WatermarkGenerationParams, wrap_fn: WrapFn) -> Self {
        let mut tracker = SourceWatermarkTracker::new(params);
        tracker.wrap_fn = Some(wrap_fn);
        tracker
    }

    /// Handles one record read from `partition_index` and returns the
    /// elements to emit: a watermark, if one is due, followed by the wrapped
    /// record.
    ///
    /// The returned iterator borrows the tracker's single output slot: drain
    /// it fully before the next call. Debug builds assert this; release
    /// builds leave a violation's behavior unspecified.
    pub fn handle_event(&mut self, record: Record, partition_index: usize) -> OutputDrain<'_> {
        self.handle_event_at(monotonic_nanos(), record, partition_index)
    }

    /// Call when a poll returned no events; may still yield a watermark or an
    /// idle message.
    pub fn handle_no_event(&mut self) -> OutputDrain<'_> {
        self.handle_no_event_at(monotonic_nanos())
    }

    // clock-injected entry points, visible for tests
    pub(crate) fn handle_event_at(
        &mut self,
        now: u64,
        mut record: Record,
        partition_index: usize,
    ) -> OutputDrain<'_> {
        debug_assert!(
            self.queue.is_empty(),
            "the output returned previously was not fully drained"
        );

        let timestamp = self.timestamp_assigner.extract_timestamp(&record);
        self.wm_policies[partition_index].report_event(timestamp);
        self.mark_idle_at[partition_index] = now.saturating_add(self.idle_timeout_nanos);
        self.all_are_idle = false;

        if let Some(watermark) = self.next_watermark(now) {
            self.queue.push_back(watermark);
        }
        let wrapped = match &self.wrap_fn {
            Some(wrap_fn) => wrap_fn(record, timestamp),
            None => {
                record.set_timestamp(timestamp);
                record
            }
        };
        self.queue.push_back(wrapped.into());

        OutputDrain { queue: &mut self.queue }
    }

    pub(crate) fn handle_no_event_at(&mut self, now: u64) -> OutputDrain<'_> {
        debug_assert!(
            self.queue.is_empty(),
            "the output returned previously was not fully drained"
        );

        if let Some(watermark) = self.next_watermark(now) {
            self.queue.push_back(watermark);
        }
        OutputDrain { queue: &mut self.queue }
    }

    fn next_watermark(&mut self, now: u64) -> Option<Element> {
        let mut min = i64::MAX;
        for i in 0..self.watermarks.len() {
            if self.idle_timeout_nanos > 0 && self.mark_idle_at[i] <= now {
                continue;
            }
            self.watermarks[i] = self.wm_policies[i].current_watermark();
            min = min.min(self.watermarks[i]);
        }

        if min == i64::MAX {
            // every partition is idle, or there are none
            if self.all_are_idle {
                return None;
            }
            self.all_are_idle = true;
            return Some(IdleMessage.into());
        }

        if !self.emission_policy.should_emit(min, self.last_emitted_wm) {
            return None;
        }
        self.all_are_idle = false;
        self.last_emitted_wm = min;
        Some(Watermark::new(min).into())
    }

    /// Sets the partition count initially or whenever the external system
    /// grows. The count never shrinks.
    ///
    /// New partitions start out active: their idle deadline lies a full
    /// timeout ahead, so a just-discovered partition cannot be skipped over
    /// before it had a chance to report events.
    pub fn increase_partition_count(&mut self, new_partition_count: usize) -> crate::core::Result<()> {
        self.increase_partition_count_at(monotonic_nanos(), new_partition_count)
    }

    pub(crate) fn increase_partition_count_at(
        &mut self,
        now: u64,
        new_partition_count: usize,
    ) -> crate::core::Result<()> {
        let old_partition_count = self.wm_policies.len();
        if new_partition_count < old_partition_count {
            return Err(crate::core::Error::msg(format!(
                "partition count must increase. Old count={}, new count={}",
                old_partition_count, new_partition_count
            )));
        }

        for _ in old_partition_count..new_partition_count {
            self.wm_policies.push((self.policy_supplier)());
            self.watermarks.push(i64::MIN);
            self.mark_idle_at
                .push(now.saturating_add(self.idle_timeout_nanos));
        }
        debug!(
            "partition count increased {} -> {}",
            old_partition_count, new_partition_count
        );
        Ok(())
    }

    pub fn partition_count(&self) -> usize {
        self.wm_policies.len()
    }

    /// Watermark value to save to the state snapshot for `partition_index`.
    pub fn watermark(&self, partition_index: usize) -> i64 {
        self.watermarks[partition_index]
    }

    /// Restores a watermark value from a state snapshot.
    ///
    /// Value-only: the watermark policy of the partition starts fresh, so the
    /// emitted stream stays conservative until new events arrive. Changing
    /// the window or policy configuration across a restore is not validated
    /// here; the restoring runtime decides whether to reject it.
    pub fn restore_watermark(&mut self, partition_index: usize, watermark: i64) {
        self.watermarks[partition_index] = watermark;
    }

    /// Snapshot entries under this instance's external partition keys,
    /// broadcast-wrapped: at restore every instance sees every entry and
    /// keeps only the partitions it owns.
    pub fn snapshot_state<K: Clone>(&self, partition_keys: &[K]) -> Vec<(BroadcastKey<K>, i64)> {
        assert_eq!(partition_keys.len(), self.watermarks.len());
        partition_keys
            .iter()
            .zip(&self.watermarks)
            .map(|(key, watermark)| (broadcast_key(key.clone()), *watermark))
            .collect()
    }

    /// Applies one broadcast snapshot entry, ignoring keys of partitions this
    /// instance does not own.
    pub fn restore_state<K: PartialEq>(
        &mut self,
        partition_keys: &[K],
        key: &BroadcastKey<K>,
        watermark: i64,
    ) {
        if let Some(partition_index) = partition_keys.iter().position(|k| k == key.key()) {
            self.restore_watermark(partition_index, watermark);
        }
    }
}

impl Debug for SourceWatermarkTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SourceWatermarkTracker")
            .field("idle_timeout_nanos", &self.idle_timeout_nanos)
            .field("partition_count", &self.wm_policies.len())
            .field("watermarks", &self.watermarks)
            .field("last_emitted_wm", &self.last_emitted_wm)
            .field("all_are_idle", &self.all_are_idle)
            .finish()
    }
}

/// Drains the tracker's pending output; items not consumed stay queued, which
/// the next call treats as a contract violation.
pub struct OutputDrain<'a> {
    queue: &'a mut VecDeque<Element>,
}

impl<'a> Iterator for OutputDrain<'a> {
    type Item = Element;

    fn next(&mut self) -> Option<Element> {
        self.queue.pop_front()
    }
}
