use std::fmt::Debug;

use crate::core::element::Record;

/// Interface of an N-ary aggregate operation. Concrete algebras (sum, count,
/// linear trend, ...) are supplied by the caller; the planner and the system
/// processors only rely on this contract.
///
/// The accumulator is an opaque record owned by the operation.
pub trait AggregateOperation: Debug + Send + Sync {
    /// Number of inbound ordinals this operation accepts.
    fn arity(&self) -> usize;

    fn create_accumulator(&self) -> Record;

    /// Folds `item`, arriving on `ordinal`, into the accumulator.
    fn accumulate(&self, ordinal: usize, accumulator: &mut Record, item: &Record);

    /// Merges a partial accumulator produced by another instance.
    fn combine(&self, accumulator: &mut Record, other: &Record);

    /// Retracts a previously combined partial accumulator. Optional; only
    /// needed when sliding-window results are derived by deduction.
    fn deduct(&self, _accumulator: &mut Record, _other: &Record) {}

    fn finish(&self, accumulator: Record) -> Record;
}
