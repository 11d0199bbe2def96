//! System processors placed on planned vertices. The execution runtime
//! instantiates them through the supplier chain; they are also directly
//! drivable, which is how the tests exercise lowered vertices.

use std::any::Any;
use std::collections::{BTreeMap, HashMap};
use std::fmt::Debug;
use std::sync::Arc;

use bytes::{Buf, BufMut, BytesMut};

use crate::core::aggregate::AggregateOperation;
use crate::core::element::{Element, Record};
use crate::core::function::{
    AsyncMapWithContextFunction, ContextFactory, FilterFunction, FlatMapFunction,
    KeySelectorFunction, MapFunction, MapWithContextFunction, NamedFunction, PeekFunction,
};
use crate::core::processor::{
    FnSupplier, FromSupplier, Processor, ProcessorMetaSupplier, ProcessorSupplier,
};
use crate::core::watermark::WatermarkGenerationParams;
use crate::core::window::WindowDefinition;
use crate::pipeline::JoinClause;

/// Wire format between the two stages of a windowed aggregation and of all
/// keyed aggregation outputs: `[key_len: u32][key][payload]`.
pub fn encode_keyed(key: &Record, payload: &Record) -> Record {
    let mut values = BytesMut::with_capacity(4 + key.len() + payload.len());
    values.put_u32(key.len() as u32);
    values.put_slice(key.as_slice());
    values.put_slice(payload.as_slice());
    Record::with_values(values.freeze())
}

pub fn decode_keyed(record: &Record) -> (Record, Record) {
    let mut buf = record.values().clone();
    let key_len = buf.get_u32() as usize;
    let key = buf.split_to(key_len);
    (Record::with_values(key), Record::with_values(buf))
}

/// Extracts the key part of a `[key_len][key][payload]` record; routes the
/// inter-stage edge of windowed aggregations.
#[derive(Debug)]
pub struct AccumulatedKeySelector;

impl NamedFunction for AccumulatedKeySelector {
    fn name(&self) -> &str {
        "accumulated-key"
    }
}

impl KeySelectorFunction for AccumulatedKeySelector {
    fn get_key(&self, record: &Record) -> Record {
        decode_keyed(record).0
    }
}

/// Carries the watermark generation parameters next to the user's source
/// supplier so the runtime can wire the source processors for event time.
#[derive(Debug)]
pub struct SourceMetaSupplier {
    inner: Arc<dyn ProcessorMetaSupplier>,
    wm_params: Arc<WatermarkGenerationParams>,
}

impl SourceMetaSupplier {
    pub fn wm_params(&self) -> &Arc<WatermarkGenerationParams> {
        &self.wm_params
    }
}

impl ProcessorMetaSupplier for SourceMetaSupplier {
    fn supplier(&self, node_index: usize) -> Arc<dyn ProcessorSupplier> {
        self.inner.supplier(node_index)
    }
}

pub fn source_supplier(
    inner: Arc<dyn ProcessorMetaSupplier>,
    wm_params: Arc<WatermarkGenerationParams>,
) -> Arc<dyn ProcessorMetaSupplier> {
    Arc::new(SourceMetaSupplier { inner, wm_params })
}

#[derive(Debug)]
struct MapProcessor {
    map_fn: Arc<dyn MapFunction>,
}

impl Processor for MapProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => output.push(self.map_fn.map(record).into()),
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn map_supplier(map_fn: Arc<dyn MapFunction>) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("map", move || {
        Box::new(MapProcessor {
            map_fn: map_fn.clone(),
        })
    }))
}

#[derive(Debug)]
struct FilterProcessor {
    filter_fn: Arc<dyn FilterFunction>,
}

impl Processor for FilterProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                if self.filter_fn.filter(&record) {
                    output.push(record.into());
                }
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn filter_supplier(filter_fn: Arc<dyn FilterFunction>) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("filter", move || {
        Box::new(FilterProcessor {
            filter_fn: filter_fn.clone(),
        })
    }))
}

#[derive(Debug)]
struct FlatMapProcessor {
    flat_map_fn: Arc<dyn FlatMapFunction>,
}

impl Processor for FlatMapProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                for record in self.flat_map_fn.flat_map(record) {
                    output.push(record.into());
                }
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn flat_map_supplier(
    flat_map_fn: Arc<dyn FlatMapFunction>,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("flat-map", move || {
        Box::new(FlatMapProcessor {
            flat_map_fn: flat_map_fn.clone(),
        })
    }))
}

struct MapWithContextProcessor {
    context: Box<dyn Any + Send>,
    map_fn: Arc<dyn MapWithContextFunction>,
}

impl Debug for MapWithContextProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapWithContextProcessor")
            .field("map_fn", &self.map_fn)
            .finish()
    }
}

impl Processor for MapWithContextProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                if let Some(record) = self.map_fn.map(self.context.as_mut(), record) {
                    output.push(record.into());
                }
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn map_with_context_supplier(
    context_factory: Arc<dyn ContextFactory>,
    map_fn: Arc<dyn MapWithContextFunction>,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("map-with-context", move || {
        Box::new(MapWithContextProcessor {
            context: context_factory.create_context(),
            map_fn: map_fn.clone(),
        })
    }))
}

struct AsyncMapWithContextProcessor {
    context: Box<dyn Any + Send>,
    map_fn: Arc<dyn AsyncMapWithContextFunction>,
    /// in-flight budget, enforced by the driving runtime
    max_concurrent_ops: usize,
}

impl Debug for AsyncMapWithContextProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AsyncMapWithContextProcessor")
            .field("map_fn", &self.map_fn)
            .field("max_concurrent_ops", &self.max_concurrent_ops)
            .finish()
    }
}

impl Processor for AsyncMapWithContextProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let mapped =
                    futures::executor::block_on(self.map_fn.map(self.context.as_mut(), record));
                if let Some(record) = mapped {
                    output.push(record.into());
                }
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn async_map_with_context_supplier(
    context_factory: Arc<dyn ContextFactory>,
    map_fn: Arc<dyn AsyncMapWithContextFunction>,
    max_concurrent_ops: usize,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("async-map-with-context", move || {
        Box::new(AsyncMapWithContextProcessor {
            context: context_factory.create_context(),
            map_fn: map_fn.clone(),
            max_concurrent_ops,
        })
    }))
}

/// Rolling keyed aggregation: emits the refreshed result on every input.
#[derive(Debug)]
struct AggregateByKeyProcessor {
    key_fn: Arc<dyn KeySelectorFunction>,
    aggr_op: Arc<dyn AggregateOperation>,
    state: HashMap<Record, Record>,
}

impl Processor for AggregateByKeyProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let key = self.key_fn.get_key(&record);
                let aggr_op = &self.aggr_op;
                let accumulator = self
                    .state
                    .entry(key.clone())
                    .or_insert_with(|| aggr_op.create_accumulator());
                self.aggr_op.accumulate(0, accumulator, &record);

                let mut result = encode_keyed(&key, &self.aggr_op.finish(accumulator.clone()));
                result.set_timestamp(record.timestamp());
                output.push(result.into());
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn aggregate_by_key_supplier(
    key_fn: Arc<dyn KeySelectorFunction>,
    aggr_op: Arc<dyn AggregateOperation>,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("aggregate-by-key", move || {
        Box::new(AggregateByKeyProcessor {
            key_fn: key_fn.clone(),
            aggr_op: aggr_op.clone(),
            state: HashMap::new(),
        })
    }))
}

/// Stage 1 of a windowed aggregation: accumulates records into
/// `(frame, key)` buckets, flushing frames closed by the watermark.
#[derive(Debug)]
struct AccumulateByFrameProcessor {
    key_fn: Arc<dyn KeySelectorFunction>,
    aggr_op: Arc<dyn AggregateOperation>,
    window: WindowDefinition,
    frames: BTreeMap<i64, HashMap<Record, Record>>,
}

impl AccumulateByFrameProcessor {
    fn flush_closed(&mut self, watermark_ts: i64, output: &mut Vec<Element>) {
        let closed: Vec<i64> = self
            .frames
            .keys()
            .take_while(|frame_ts| **frame_ts + self.window.frame_length() <= watermark_ts)
            .cloned()
            .collect();
        for frame_ts in closed {
            let bucket = self.frames.remove(&frame_ts).expect("frame key just seen");
            let frame_end = frame_ts + self.window.frame_length();
            for (key, accumulator) in bucket {
                let mut partial = encode_keyed(&key, &accumulator);
                partial.set_timestamp(frame_end);
                output.push(partial.into());
            }
        }
    }
}

impl Processor for AccumulateByFrameProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let frame_ts = self.window.floor_frame_ts(record.timestamp());
                let key = self.key_fn.get_key(&record);
                let aggr_op = &self.aggr_op;
                let accumulator = self
                    .frames
                    .entry(frame_ts)
                    .or_insert_with(HashMap::new)
                    .entry(key)
                    .or_insert_with(|| aggr_op.create_accumulator());
                self.aggr_op.accumulate(0, accumulator, &record);
            }
            Element::Watermark(watermark) => {
                self.flush_closed(watermark.timestamp(), output);
                output.push(watermark.into());
            }
            other => output.push(other),
        }
        Ok(())
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> crate::core::Result<()> {
        self.flush_closed(i64::MAX, output);
        Ok(())
    }
}

pub fn accumulate_by_frame_supplier(
    key_fn: Arc<dyn KeySelectorFunction>,
    aggr_op: Arc<dyn AggregateOperation>,
    window: WindowDefinition,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("accumulate-by-frame", move || {
        Box::new(AccumulateByFrameProcessor {
            key_fn: key_fn.clone(),
            aggr_op: aggr_op.clone(),
            window,
            frames: BTreeMap::new(),
        })
    }))
}

/// Stage 2 of a windowed aggregation: combines partial frame accumulators
/// across stage-1 instances and emits finished, timestamped window results,
/// one per slide point the watermark has passed.
#[derive(Debug)]
struct CombineFramesProcessor {
    aggr_op: Arc<dyn AggregateOperation>,
    window: WindowDefinition,
    /// partial accumulators keyed by frame end timestamp
    frames: BTreeMap<i64, HashMap<Record, Record>>,
    next_window_end: Option<i64>,
}

impl CombineFramesProcessor {
    fn flush_closed(&mut self, watermark_ts: i64, output: &mut Vec<Element>) {
        loop {
            let first_frame_end = match self.frames.keys().next() {
                Some(first) => *first,
                None => return,
            };
            // windows ending before the earliest frame cover no data
            let window_end = self.next_window_end.unwrap_or(i64::MIN).max(first_frame_end);
            if window_end > watermark_ts {
                self.next_window_end = Some(window_end);
                return;
            }

            let window_start = window_end - self.window.window_length();
            let mut results: HashMap<Record, Record> = HashMap::new();
            for (_, bucket) in self.frames.range(window_start + 1..=window_end) {
                for (key, partial) in bucket {
                    match results.get_mut(key) {
                        Some(accumulator) => self.aggr_op.combine(accumulator, partial),
                        None => {
                            let mut accumulator = self.aggr_op.create_accumulator();
                            self.aggr_op.combine(&mut accumulator, partial);
                            results.insert(key.clone(), accumulator);
                        }
                    }
                }
            }
            for (key, accumulator) in results {
                let mut result = encode_keyed(&key, &self.aggr_op.finish(accumulator));
                result.set_timestamp(window_end);
                output.push(result.into());
            }

            // a frame is done once its last covering window has been emitted
            let expired = window_end - self.window.window_length() + self.window.frame_length();
            let retained = self.frames.split_off(&(expired + 1));
            self.frames = retained;
            self.next_window_end = Some(window_end + self.window.frame_length());
        }
    }

    fn last_emission_point(&self) -> Option<i64> {
        self.frames
            .keys()
            .last()
            .map(|last| *last + self.window.window_length() - self.window.frame_length())
    }
}

impl Processor for CombineFramesProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let (key, partial) = decode_keyed(&record);
                let frame_end = record.timestamp();
                let bucket = self.frames.entry(frame_end).or_insert_with(HashMap::new);
                match bucket.get_mut(&key) {
                    Some(accumulator) => self.aggr_op.combine(accumulator, &partial),
                    None => {
                        let mut accumulator = self.aggr_op.create_accumulator();
                        self.aggr_op.combine(&mut accumulator, &partial);
                        bucket.insert(key, accumulator);
                    }
                }
            }
            Element::Watermark(watermark) => {
                self.flush_closed(watermark.timestamp(), output);
                output.push(watermark.into());
            }
            other => output.push(other),
        }
        Ok(())
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> crate::core::Result<()> {
        if let Some(last) = self.last_emission_point() {
            self.flush_closed(last, output);
        }
        Ok(())
    }
}

pub fn combine_frames_supplier(
    aggr_op: Arc<dyn AggregateOperation>,
    window: WindowDefinition,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("combine-frames", move || {
        Box::new(CombineFramesProcessor {
            aggr_op: aggr_op.clone(),
            window,
            frames: BTreeMap::new(),
            next_window_end: None,
        })
    }))
}

/// Keyed co-aggregation over M ordinals.
#[derive(Debug)]
struct CoGroupProcessor {
    key_fns: Vec<Arc<dyn KeySelectorFunction>>,
    aggr_op: Arc<dyn AggregateOperation>,
    window: Option<WindowDefinition>,
    frames: BTreeMap<i64, HashMap<Record, Record>>,
}

impl CoGroupProcessor {
    // single global frame for the non-windowed case
    const GLOBAL_FRAME: i64 = i64::MAX;

    fn frame_ts(&self, record_ts: i64) -> i64 {
        match &self.window {
            Some(window) => window.floor_frame_ts(record_ts),
            None => CoGroupProcessor::GLOBAL_FRAME,
        }
    }

    fn flush(&mut self, up_to: i64, output: &mut Vec<Element>) {
        let frame_length = match &self.window {
            Some(window) => window.frame_length(),
            None => 0,
        };
        let closed: Vec<i64> = self
            .frames
            .keys()
            .take_while(|frame_ts| {
                **frame_ts != CoGroupProcessor::GLOBAL_FRAME && **frame_ts + frame_length <= up_to
            })
            .cloned()
            .collect();
        for frame_ts in closed {
            let bucket = self.frames.remove(&frame_ts).expect("frame key just seen");
            let frame_end = frame_ts + frame_length;
            for (key, accumulator) in bucket {
                let mut result = encode_keyed(&key, &self.aggr_op.finish(accumulator));
                result.set_timestamp(frame_end);
                output.push(result.into());
            }
        }
    }
}

impl Processor for CoGroupProcessor {
    fn process(
        &mut self,
        ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let frame_ts = self.frame_ts(record.timestamp());
                let key = self.key_fns[ordinal].get_key(&record);
                let aggr_op = &self.aggr_op;
                let accumulator = self
                    .frames
                    .entry(frame_ts)
                    .or_insert_with(HashMap::new)
                    .entry(key)
                    .or_insert_with(|| aggr_op.create_accumulator());
                self.aggr_op.accumulate(ordinal, accumulator, &record);
            }
            Element::Watermark(watermark) => {
                if self.window.is_some() {
                    self.flush(watermark.timestamp(), output);
                }
                output.push(watermark.into());
            }
            other => output.push(other),
        }
        Ok(())
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> crate::core::Result<()> {
        if self.window.is_some() {
            self.flush(i64::MAX, output);
        }
        if let Some(bucket) = self.frames.remove(&CoGroupProcessor::GLOBAL_FRAME) {
            for (key, accumulator) in bucket {
                let result = encode_keyed(&key, &self.aggr_op.finish(accumulator));
                output.push(result.into());
            }
        }
        Ok(())
    }
}

pub fn co_group_supplier(
    key_fns: Vec<Arc<dyn KeySelectorFunction>>,
    aggr_op: Arc<dyn AggregateOperation>,
    window: Option<WindowDefinition>,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("co-group", move || {
        Box::new(CoGroupProcessor {
            key_fns: key_fns.clone(),
            aggr_op: aggr_op.clone(),
            window,
            frames: BTreeMap::new(),
        })
    }))
}

/// Non-keyed co-aggregation: one accumulator per frame, or a single global
/// one when unwindowed.
#[derive(Debug)]
struct CoAggregateProcessor {
    aggr_op: Arc<dyn AggregateOperation>,
    window: Option<WindowDefinition>,
    frames: BTreeMap<i64, Record>,
}

impl CoAggregateProcessor {
    const GLOBAL_FRAME: i64 = i64::MAX;

    fn flush(&mut self, up_to: i64, output: &mut Vec<Element>) {
        let frame_length = match &self.window {
            Some(window) => window.frame_length(),
            None => 0,
        };
        let closed: Vec<i64> = self
            .frames
            .keys()
            .take_while(|frame_ts| {
                **frame_ts != CoAggregateProcessor::GLOBAL_FRAME
                    && **frame_ts + frame_length <= up_to
            })
            .cloned()
            .collect();
        for frame_ts in closed {
            let accumulator = self.frames.remove(&frame_ts).expect("frame key just seen");
            let mut result = self.aggr_op.finish(accumulator);
            result.set_timestamp(frame_ts + frame_length);
            output.push(result.into());
        }
    }
}

impl Processor for CoAggregateProcessor {
    fn process(
        &mut self,
        ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                let frame_ts = match &self.window {
                    Some(window) => window.floor_frame_ts(record.timestamp()),
                    None => CoAggregateProcessor::GLOBAL_FRAME,
                };
                let aggr_op = &self.aggr_op;
                let accumulator = self
                    .frames
                    .entry(frame_ts)
                    .or_insert_with(|| aggr_op.create_accumulator());
                self.aggr_op.accumulate(ordinal, accumulator, &record);
            }
            Element::Watermark(watermark) => {
                if self.window.is_some() {
                    self.flush(watermark.timestamp(), output);
                }
                output.push(watermark.into());
            }
            other => output.push(other),
        }
        Ok(())
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> crate::core::Result<()> {
        if self.window.is_some() {
            self.flush(i64::MAX, output);
        }
        if let Some(accumulator) = self.frames.remove(&CoAggregateProcessor::GLOBAL_FRAME) {
            output.push(self.aggr_op.finish(accumulator).into());
        }
        Ok(())
    }
}

pub fn co_aggregate_supplier(
    aggr_op: Arc<dyn AggregateOperation>,
    window: Option<WindowDefinition>,
) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("co-aggregate", move || {
        Box::new(CoAggregateProcessor {
            aggr_op: aggr_op.clone(),
            window,
            frames: BTreeMap::new(),
        })
    }))
}

/// Inner hash join: side ordinals (>= 1) build hash tables, the primary
/// ordinal streams through them. The planner gives side edges a lower
/// priority so the tables are complete before the primary is drained.
#[derive(Debug)]
struct HashJoinProcessor {
    clauses: Vec<JoinClause>,
    tables: Vec<HashMap<Record, Vec<Record>>>,
}

impl Processor for HashJoinProcessor {
    fn process(
        &mut self,
        ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        match element {
            Element::Record(record) => {
                if ordinal == 0 {
                    let mut joined = record.clone();
                    for (clause, table) in self.clauses.iter().zip(&self.tables) {
                        let key = clause.left_key_fn().get_key(&record);
                        match table.get(&key).and_then(|matches| matches.first()) {
                            Some(matched) => {
                                joined.extend(&clause.project_fn().map(matched.clone()))
                            }
                            None => return Ok(()),
                        }
                    }
                    output.push(joined.into());
                } else {
                    let clause = &self.clauses[ordinal - 1];
                    let key = clause.right_key_fn().get_key(&record);
                    self.tables[ordinal - 1]
                        .entry(key)
                        .or_insert_with(Vec::new)
                        .push(record);
                }
            }
            other => output.push(other),
        }
        Ok(())
    }
}

pub fn hash_join_supplier(clauses: Vec<JoinClause>) -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("hash-join", move || {
        let tables = clauses.iter().map(|_| HashMap::new()).collect();
        Box::new(HashJoinProcessor {
            clauses: clauses.clone(),
            tables,
        })
    }))
}

/// Union by concatenation; inbound ordinals are forwarded untouched.
#[derive(Debug)]
struct MergeProcessor;

impl Processor for MergeProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        output.push(element);
        Ok(())
    }
}

pub fn merge_supplier() -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("merge", || Box::new(MergeProcessor)))
}

/// Logging tap installed by peeked transforms; forwards unchanged.
#[derive(Debug)]
struct PeekProcessor {
    inner: Box<dyn Processor>,
    peek_fn: Arc<dyn PeekFunction>,
}

impl Processor for PeekProcessor {
    fn process(
        &mut self,
        ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        info!("peek: {}", self.peek_fn.format(&element));
        self.inner.process(ordinal, element, output)
    }

    fn complete(&mut self, output: &mut Vec<Element>) -> crate::core::Result<()> {
        self.inner.complete(output)
    }
}

#[derive(Debug)]
struct PeekSupplier {
    inner: Arc<dyn ProcessorSupplier>,
    peek_fn: Arc<dyn PeekFunction>,
}

impl ProcessorSupplier for PeekSupplier {
    fn create(&self, count: usize) -> Vec<Box<dyn Processor>> {
        self.inner
            .create(count)
            .into_iter()
            .map(|inner| {
                Box::new(PeekProcessor {
                    inner,
                    peek_fn: self.peek_fn.clone(),
                }) as Box<dyn Processor>
            })
            .collect()
    }
}

#[derive(Debug)]
struct PeekMetaSupplier {
    inner: Arc<dyn ProcessorMetaSupplier>,
    peek_fn: Arc<dyn PeekFunction>,
}

impl ProcessorMetaSupplier for PeekMetaSupplier {
    fn supplier(&self, node_index: usize) -> Arc<dyn ProcessorSupplier> {
        Arc::new(PeekSupplier {
            inner: self.inner.supplier(node_index),
            peek_fn: self.peek_fn.clone(),
        })
    }
}

pub fn peek_wrapped(
    inner: Arc<dyn ProcessorMetaSupplier>,
    peek_fn: Arc<dyn PeekFunction>,
) -> Arc<dyn ProcessorMetaSupplier> {
    Arc::new(PeekMetaSupplier { inner, peek_fn })
}

/// Terminal processor logging whatever reaches it; handy default sink.
#[derive(Debug)]
struct LogSinkProcessor;

impl Processor for LogSinkProcessor {
    fn process(
        &mut self,
        _ordinal: usize,
        element: Element,
        _output: &mut Vec<Element>,
    ) -> crate::core::Result<()> {
        info!("sink: {:?}", element);
        Ok(())
    }
}

pub fn log_sink_supplier() -> Arc<dyn ProcessorMetaSupplier> {
    FromSupplier::of(FnSupplier::new("log-sink", || Box::new(LogSinkProcessor)))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use crate::core::aggregate::AggregateOperation;
    use crate::core::element::{Element, Record};
    use crate::core::function::{KeySelectorFunction, NamedFunction};
    use crate::core::watermark::Watermark;
    use crate::core::window::WindowDefinition;
    use crate::functions::system::{
        accumulate_by_frame_supplier, combine_frames_supplier, decode_keyed, encode_keyed,
    };

    #[derive(Debug)]
    pub(crate) struct IdentityKey;

    impl NamedFunction for IdentityKey {
        fn name(&self) -> &str {
            "identity-key"
        }
    }

    impl KeySelectorFunction for IdentityKey {
        fn get_key(&self, record: &Record) -> Record {
            Record::with_values(record.values().clone())
        }
    }

    /// Unary count; accumulator is a little-endian u64.
    #[derive(Debug)]
    pub(crate) struct CountOp;

    impl CountOp {
        fn value(record: &Record) -> u64 {
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

    fn record(values: &[u8], timestamp: i64) -> Element {
        let mut record = Record::from_slice(values);
        record.set_timestamp(timestamp);
        record.into()
    }

    #[test]
    pub fn keyed_frame_codec_test() {
        let key = Record::from_slice(b"key");
        let payload = Record::from_slice(b"payload");
        let (key_de, payload_de) = decode_keyed(&encode_keyed(&key, &payload));
        assert_eq!(key, key_de);
        assert_eq!(payload, payload_de);
    }

    #[test]
    pub fn two_stage_window_count_test() {
        let window = WindowDefinition::tumbling(10);
        let mut accumulate = accumulate_by_frame_supplier(
            Arc::new(IdentityKey),
            Arc::new(CountOp),
            window,
        )
        .supplier(0)
        .create(1)
        .remove(0);
        let mut combine = combine_frames_supplier(Arc::new(CountOp), window)
            .supplier(0)
            .create(1)
            .remove(0);

        let mut stage1_out = Vec::new();
        accumulate.process(0, record(b"a", 1), &mut stage1_out).unwrap();
        accumulate.process(0, record(b"a", 5), &mut stage1_out).unwrap();
        accumulate.process(0, record(b"b", 7), &mut stage1_out).unwrap();
        assert!(stage1_out.is_empty());

        accumulate
            .process(0, Watermark::new(10).into(), &mut stage1_out)
            .unwrap();
        // two partial accumulators and the forwarded watermark
        assert_eq!(stage1_out.len(), 3);

        let mut stage2_out = Vec::new();
        for element in stage1_out {
            combine.process(0, element, &mut stage2_out).unwrap();
        }

        let mut counts: Vec<(Vec<u8>, u64)> = stage2_out
            .iter()
            .filter(|e| e.is_record())
            .map(|e| {
                let (key, value) = decode_keyed(e.as_record());
                assert_eq!(e.as_record().timestamp(), 10);
                (key.as_slice().to_vec(), CountOp::value(&value))
            })
            .collect();
        counts.sort();
        assert_eq!(counts, vec![(b"a".to_vec(), 2), (b"b".to_vec(), 1)]);
    }

    #[test]
    pub fn sliding_window_combine_test() {
        let window = WindowDefinition::sliding(20, 10);
        let mut combine = combine_frames_supplier(Arc::new(CountOp), window)
            .supplier(0)
            .create(1)
            .remove(0);

        let mut out = Vec::new();
        // partials for frames ending at 10 and 20, same key
        let mut partial = encode_keyed(&Record::from_slice(b"k"), &CountOp::record(2));
        partial.set_timestamp(10);
        combine.process(0, partial.into(), &mut out).unwrap();
        let mut partial = encode_keyed(&Record::from_slice(b"k"), &CountOp::record(3));
        partial.set_timestamp(20);
        combine.process(0, partial.into(), &mut out).unwrap();

        let results = |out: &[Element]| -> Vec<(i64, u64)> {
            out.iter()
                .filter(|e| e.is_record())
                .map(|e| {
                    let record = e.as_record();
                    (record.timestamp(), CountOp::value(&decode_keyed(record).1))
                })
                .collect()
        };

        combine.process(0, Watermark::new(20).into(), &mut out).unwrap();
        // window ending 10 sees the first frame, window ending 20 sees both
        assert_eq!(results(&out), vec![(10, 2), (20, 5)]);

        out.clear();
        combine.process(0, Watermark::new(30).into(), &mut out).unwrap();
        // the last window only covers the second frame
        assert_eq!(results(&out), vec![(30, 3)]);
    }

    #[test]
    pub fn hash_join_test() {
        use crate::core::function::MapFunction;
        use crate::functions::system::hash_join_supplier;
        use crate::pipeline::JoinClause;

        #[derive(Debug)]
        struct IdentityMap;

        impl NamedFunction for IdentityMap {
            fn name(&self) -> &str {
                "identity-map"
            }
        }

        impl MapFunction for IdentityMap {
            fn map(&self, record: Record) -> Record {
                record
            }
        }

        let clauses = vec![JoinClause::new(
            Arc::new(IdentityKey),
            Arc::new(IdentityKey),
            Arc::new(IdentityMap),
        )];
        let mut join = hash_join_supplier(clauses).supplier(0).create(1).remove(0);

        let mut out = Vec::new();
        // side input first, as the edge priorities arrange
        join.process(1, Record::from_slice(b"k").into(), &mut out).unwrap();
        assert!(out.is_empty());

        join.process(0, Record::from_slice(b"k").into(), &mut out).unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].as_record().as_slice(), b"kk");

        // no match: the record is dropped
        join.process(0, Record::from_slice(b"x").into(), &mut out).unwrap();
        assert_eq!(out.len(), 1);
    }

    #[test]
    pub fn async_map_with_context_test() {
        use std::any::Any;

        use async_trait::async_trait;

        use crate::core::function::{AsyncMapWithContextFunction, ContextFactory};
        use crate::functions::system::async_map_with_context_supplier;

        #[derive(Debug)]
        struct CounterFactory;

        impl ContextFactory for CounterFactory {
            fn create_context(&self) -> Box<dyn Any + Send> {
                Box::new(0u64)
            }
        }

        /// stamps the running per-processor call count into the record
        #[derive(Debug)]
        struct StampCount;

        impl NamedFunction for StampCount {
            fn name(&self) -> &str {
                "stamp-count"
            }
        }

        #[async_trait]
        impl AsyncMapWithContextFunction for StampCount {
            async fn map(&self, context: &mut (dyn Any + Send), _record: Record) -> Option<Record> {
                let count = context.downcast_mut::<u64>().unwrap();
                *count += 1;
                Some(Record::from_slice(&count.to_le_bytes()))
            }
        }

        let mut processor =
            async_map_with_context_supplier(Arc::new(CounterFactory), Arc::new(StampCount), 4)
                .supplier(0)
                .create(1)
                .remove(0);

        let mut out = Vec::new();
        processor.process(0, Record::new().into(), &mut out).unwrap();
        processor.process(0, Record::new().into(), &mut out).unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[1].as_record().as_slice(), &2u64.to_le_bytes()[..]);
    }
}
