#[macro_use]
extern crate log;

mod functions;

use std::sync::Arc;
use std::time::Duration;

use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;

use streamlink::core::element::{Element, Record};
use streamlink::core::watermark::{WatermarkGenerationParams, WatermarkPolicy};
use streamlink::core::window::WindowDefinition;
use streamlink::functions::system;
use streamlink::functions::watermark::{
    emit_all, LimitingLagPolicy, RecordTimestampAssigner, SourceWatermarkTracker,
};
use streamlink::pipeline::{Pipeline, Transform};

use crate::functions::{static_lines_supplier, CountOp, SplitWords, WordKey};

fn init_log() {
    let encoder =
        PatternEncoder::new("{d(%Y-%m-%d %H:%M:%S%.3f)} {level} [{thread}] {target} - {m}{n}");
    let stdout = ConsoleAppender::builder()
        .target(Target::Stdout)
        .encoder(Box::new(encoder))
        .build();

    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(stdout)))
        .build(Root::builder().appender("console").build(LevelFilter::Info))
        .unwrap();
    log4rs::init_config(config).unwrap();
}

fn wm_params() -> WatermarkGenerationParams {
    WatermarkGenerationParams::new(
        Arc::new(RecordTimestampAssigner),
        Arc::new(|| Box::new(LimitingLagPolicy::new(100)) as Box<dyn WatermarkPolicy>),
        emit_all(),
        Duration::from_millis(500),
    )
}

/// Plans a windowed word-count pipeline and prints the DAG.
fn plan_word_count() {
    let mut pipeline = Pipeline::new();

    let lines = pipeline
        .attach(Transform::source(
            "lines",
            static_lines_supplier(),
            wm_params(),
        ))
        .unwrap();
    let words = pipeline
        .attach(Transform::flat_map("words", lines, Arc::new(SplitWords)))
        .unwrap();
    let counts = pipeline
        .attach(Transform::group(
            "word-count",
            words,
            Arc::new(WordKey),
            Arc::new(CountOp),
            Some(WindowDefinition::tumbling(1_000)),
        ))
        .unwrap();
    pipeline
        .attach(Transform::sink("print", counts, system::log_sink_supplier()))
        .unwrap();

    let dag = pipeline.create_dag().unwrap();
    info!(
        "word-count plan: {} vertices, {} edges",
        dag.vertex_count(),
        dag.edge_count()
    );
    info!("{}", dag.to_json());
}

/// Feeds synthetic events from two partitions through the source-side
/// watermark tracker.
fn drive_watermarks() {
    let mut tracker = SourceWatermarkTracker::new(wm_params());
    tracker.increase_partition_count(2).unwrap();

    let line = |text: &str, timestamp: i64| {
        let mut record = Record::from_slice(text.as_bytes());
        record.set_timestamp(timestamp);
        record
    };

    let batches: Vec<(Record, usize)> = vec![
        (line("the quick brown fox", 1_000), 0),
        (line("jumps over", 1_150), 1),
        (line("the lazy dog", 1_400), 0),
        (line("and naps", 2_300), 1),
    ];

    for (record, partition) in batches {
        let out: Vec<Element> = tracker.handle_event(record, partition).collect();
        for element in &out {
            info!("partition {} -> {:?}", partition, element);
        }
    }
    for element in tracker.handle_no_event() {
        info!("tick -> {:?}", element);
    }
}

pub fn main() {
    init_log();
    plan_word_count();
    drive_watermarks();
}
