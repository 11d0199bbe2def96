use crate::core::element::Record;
use crate::core::watermark::TimestampAssigner;

/// Reads the event time already stamped on the record by the source.
#[derive(Debug, Default)]
pub struct RecordTimestampAssigner;

impl TimestampAssigner for RecordTimestampAssigner {
    fn extract_timestamp(&self, record: &Record) -> i64 {
        record.timestamp()
    }
}
