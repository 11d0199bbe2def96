use std::sync::Arc;

use streamlink::core::aggregate::AggregateOperation;
use streamlink::core::element::{Element, Record};
use streamlink::core::function::{FlatMapFunction, KeySelectorFunction, NamedFunction};
use streamlink::core::processor::{
    FnSupplier, FromSupplier, Processor, ProcessorMetaSupplier,
};

/// Emits a fixed set of lines when drained; stands in for a real connector.
#[derive(Debug)]
struct StaticLinesProcessor {
    lines: Vec<(&'static str, i64)>,
}

impl Processor for StaticLinesProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        _element: Element,
        _output: &mut Vec<Element>,
    ) -> streamlink::core::Result<()> {
        Ok(())
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> streamlink::core::Result<()> {
        for (line, timestamp) in self.lines.drain(..) {
            let mut record = Record::from_slice(line.as_bytes());
            record.set_timestamp(timestamp);
            output.push(record.into());
        }
        Ok(())
    }
}

pub fn static_lines_supplier() -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("static-lines", || {
        Box::new(StaticLinesProcessor {
            lines: vec![
                ("the quick brown fox", 1_000),
                ("jumps over the lazy dog", 1_900),
            ],
        })
    }))
}

/// Splits a whitespace-separated line into one record per word.
#[derive(Debug)]
pub struct SplitWords;

impl NamedFunction for SplitWords {
    fn name(&self) -> &str {
        "split-words"
    }
}

impl FlatMapFunction for SplitWords {
    fn flat_map(&self, record: Record) -> Vec<Record> {
        let timestamp = record.timestamp();
        String::from_utf8_lossy(record.as_slice())
            .split_whitespace()
            .map(|word| {
                let mut word_record = Record::from_slice(word.as_bytes());
                word_record.set_timestamp(timestamp);
                word_record
            })
            .collect()
    }
}

/// The whole word is the grouping key.
#[derive(Debug)]
pub struct WordKey;

impl NamedFunction for WordKey {
    fn name(&self) -> &str {
        "word-key"
    }
}

impl KeySelectorFunction for WordKey {
    fn get_key(&self, record: &Record) -> Record {
        Record::with_values(record.values().clone())
    }
}

/// Counts records; the accumulator is a little-endian u64.
#[derive(Debug)]
pub struct CountOp;

impl CountOp {
    pub fn value(record: &Record) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(record.as_slice());
        u64::from_le_bytes(buf)
    }

    fn record(value: u64) -> Record {
        Record::from_slice(&value.to_le_bytes())
    }
}

impl AggregateOperation for CountOp {
    fn arity(&self) -> usize {
        1
    }

    fn create_accumulator(&self) -> Record {
        CountOp::record(0)
    }

    fn accumulate(&self, _ordinal: usize, accumulator: &mut Record, _item: &Record) {
        *accumulator = CountOp::record(CountOp::value(accumulator) + 1);
    }

    fn combine(&self, accumulator: &mut Record, other: &Record) {
        *accumulator = CountOp::record(CountOp::value(accumulator) + CountOp::value(other));
    }

    fn finish(&self, accumulator: Record) -> Record {
        accumulator
    }
}
