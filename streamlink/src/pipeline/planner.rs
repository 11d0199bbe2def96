use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use daggy::NodeIndex;

use crate::core::function::PeekFunction;
use crate::core::processor::ProcessorMetaSupplier;
use crate::dag::{Dag, Edge, PlanError};
use crate::functions::system;
use crate::pipeline::topological_sorter::topological_sort;
use crate::pipeline::{Pipeline, TransformId};

/// First-vs-rest split of an upstream list.
pub(crate) fn tail_list<T>(list: &[T]) -> &[T] {
    &list[1..]
}

/// The mutation surface a transform lowering works against. Kept narrow so
/// lowerings stay decoupled from the planner internals and can be exercised
/// against fakes.
pub(crate) trait PlannerOps {
    /// Returns `base + suffix`, de-duplicated with a `-N` infix (N >= 2).
    fn vertex_name(&mut self, base: &str, suffix: &str) -> String;

    /// Allocates a vertex and registers it as the transform's output vertex,
    /// the one downstream transforms connect to.
    fn add_vertex(
        &mut self,
        transform_id: TransformId,
        name: String,
        local_parallelism: i32,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Result<NodeIndex, PlanError>;

    /// Allocates a vertex internal to a multi-vertex lowering; not visible to
    /// downstream transforms.
    fn add_internal_vertex(
        &mut self,
        name: String,
        local_parallelism: i32,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Result<NodeIndex, PlanError>;

    /// Draws one edge per upstream of `transform_id` into `to`, in upstream
    /// order: destination ordinals count 0, 1, ...; source ordinals are taken
    /// from each upstream vertex's next free ordinal.
    fn add_edges(
        &mut self,
        transform_id: TransformId,
        to: NodeIndex,
        configure: &mut dyn FnMut(Edge, usize) -> Edge,
    ) -> Result<(), PlanError>;

    /// Draws an edge between two vertices of the same lowering.
    fn add_internal_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: Edge,
    ) -> Result<(), PlanError>;

    /// Installs a logging tap around the registered output vertex's supplier.
    fn wrap_output_meta(
        &mut self,
        transform_id: TransformId,
        peek_fn: Arc<dyn PeekFunction>,
    ) -> Result<(), PlanError>;
}

/// Per-transform planning record.
pub(crate) struct PlannerVertex {
    pub(crate) node: NodeIndex,
    /// next free outbound ordinal of this vertex
    pub(crate) available_ordinal: usize,
}

/// Lowers a [`Pipeline`] into a [`Dag`], one transform at a time in
/// topological order.
pub(crate) struct Planner<'a> {
    pipeline: &'a Pipeline,
    dag: Dag,
    xform2vertex: HashMap<TransformId, PlannerVertex>,
    vertex_names: HashSet<String>,
}

impl<'a> Planner<'a> {
    pub fn new(pipeline: &'a Pipeline) -> Self {
        Planner {
            pipeline,
            dag: Dag::new(),
            xform2vertex: HashMap::new(),
            vertex_names: HashSet::new(),
        }
    }

    pub fn create_dag(mut self) -> Result<Dag, PlanError> {
        let pipeline = self.pipeline;
        let adjacency_map = pipeline.adjacency_map();

        Planner::validate_no_leakage(pipeline, &adjacency_map)?;

        let sorted = topological_sort(&adjacency_map, |id| pipeline.transform(*id).to_string())?;
        for id in sorted {
            let transform = pipeline.transform(id);
            debug!("lowering transform {}", transform);
            transform.add_to_dag(id, &mut self)?;
        }

        info!(
            "planned DAG: {} vertices, {} edges",
            self.dag.vertex_count(),
            self.dag.edge_count()
        );
        Ok(self.dag)
    }

    fn validate_no_leakage(
        pipeline: &Pipeline,
        adjacency_map: &std::collections::BTreeMap<TransformId, Vec<TransformId>>,
    ) -> Result<(), PlanError> {
        let leakages: Vec<String> = adjacency_map
            .iter()
            .filter(|(_, downstream)| downstream.is_empty())
            .map(|(id, _)| pipeline.transform(*id))
            .filter(|transform| !transform.is_terminal())
            .map(|transform| transform.to_string())
            .collect();
        if !leakages.is_empty() {
            return Err(PlanError::UnattachedTransforms(leakages));
        }
        Ok(())
    }
}

impl<'a> PlannerOps for Planner<'a> {
    fn vertex_name(&mut self, base: &str, suffix: &str) -> String {
        let mut index = 1;
        loop {
            let candidate = format!(
                "{}{}{}",
                base,
                if index == 1 {
                    "".to_string()
                } else {
                    format!("-{}", index)
                },
                suffix
            );
            if self.vertex_names.insert(candidate.clone()) {
                return candidate;
            }
            index += 1;
        }
    }

    fn add_vertex(
        &mut self,
        transform_id: TransformId,
        name: String,
        local_parallelism: i32,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Result<NodeIndex, PlanError> {
        let node = self.dag.new_vertex(name, local_parallelism, meta_supplier)?;
        let registered = self.xform2vertex.insert(
            transform_id,
            PlannerVertex {
                node,
                available_ordinal: 0,
            },
        );
        if registered.is_some() {
            return Err(PlanError::Internal(format!(
                "transform {} registered two output vertices",
                self.pipeline.transform(transform_id)
            )));
        }
        Ok(node)
    }

    fn add_internal_vertex(
        &mut self,
        name: String,
        local_parallelism: i32,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Result<NodeIndex, PlanError> {
        self.dag.new_vertex(name, local_parallelism, meta_supplier)
    }

    fn add_edges(
        &mut self,
        transform_id: TransformId,
        to: NodeIndex,
        configure: &mut dyn FnMut(Edge, usize) -> Edge,
    ) -> Result<(), PlanError> {
        let upstream = self.pipeline.transform(transform_id).upstream();
        for (dest_ordinal, from_transform) in upstream.iter().enumerate() {
            let from_pv = self.xform2vertex.get_mut(from_transform).ok_or_else(|| {
                PlanError::Internal(format!(
                    "upstream transform {:?} has no vertex; topological order broken",
                    from_transform
                ))
            })?;

            let edge = configure(Edge::new(from_pv.available_ordinal, dest_ordinal), dest_ordinal);
            from_pv.available_ordinal += 1;
            let from_node = from_pv.node;

            self.dag.edge(from_node, to, edge)?;
        }
        Ok(())
    }

    fn add_internal_edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: Edge,
    ) -> Result<(), PlanError> {
        self.dag.edge(from, to, edge)?;
        Ok(())
    }

    fn wrap_output_meta(
        &mut self,
        transform_id: TransformId,
        peek_fn: Arc<dyn PeekFunction>,
    ) -> Result<(), PlanError> {
        let pv = self.xform2vertex.get(&transform_id).ok_or_else(|| {
            PlanError::Internal(format!(
                "transform {:?} has no output vertex to peek",
                transform_id
            ))
        })?;
        let wrapped = system::peek_wrapped(
            self.dag.vertex(pv.node).meta_supplier().clone(),
            peek_fn,
        );
        self.dag.replace_meta_supplier(pv.node, wrapped);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, HashSet};
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;

    use crate::core::aggregate::AggregateOperation;
    use crate::core::element::{Element, Record};
    use crate::core::function::{
        DebugPeek, FilterFunction, KeySelectorFunction, MapFunction, NamedFunction,
    };
    use crate::core::processor::{FnSupplier, FromSupplier, Processor, ProcessorMetaSupplier};
    use crate::core::watermark::{WatermarkGenerationParams, WatermarkPolicy};
    use crate::core::window::WindowDefinition;
    use crate::dag::{Dag, PlanError, Routing};
    use crate::functions::watermark::{emit_all, LimitingLagPolicy, RecordTimestampAssigner};
    use crate::pipeline::planner::Planner;
    use crate::pipeline::{JoinClause, Pipeline, Transform};

    #[derive(Debug)]
    struct NoopProcessor;

    impl Processor for NoopProcessor {
        fn process(
            &mut self,
            _ordinal: usize,
            _element: Element,
            _output: &mut Vec<Element>,
        ) -> crate::core::Result<()> {
            Ok(())
        }
    }

    fn noop_supplier(name: &'static str) -> Arc<dyn ProcessorMetaSupplier> {
        FromSupplier::of(FnSupplier::new(name, || Box::new(NoopProcessor)))
    }

    #[derive(Debug)]
    struct IdentityKey;

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

    #[derive(Debug)]
    struct AcceptAll;

    impl NamedFunction for AcceptAll {
        fn name(&self) -> &str {
            "accept-all"
        }
    }

    impl FilterFunction for AcceptAll {
        fn filter(&self, _record: &Record) -> bool {
            true
        }
    }

    #[derive(Debug)]
    struct NaryOp(usize);

    impl AggregateOperation for NaryOp {
        fn arity(&self) -> usize {
            self.0
        }

        fn create_accumulator(&self) -> Record {
            Record::new()
        }

        fn accumulate(&self, _ordinal: usize, _accumulator: &mut Record, _item: &Record) {}

        fn combine(&self, _accumulator: &mut Record, _other: &Record) {}

        fn finish(&self, accumulator: Record) -> Record {
            accumulator
        }
    }

    fn wm_params() -> WatermarkGenerationParams {
        WatermarkGenerationParams::new(
            Arc::new(RecordTimestampAssigner),
            Arc::new(|| Box::new(LimitingLagPolicy::new(0)) as Box<dyn WatermarkPolicy>),
            emit_all(),
            Duration::ZERO,
        )
    }

    fn source(pipeline: &mut Pipeline, name: &str) -> crate::pipeline::TransformId {
        pipeline
            .attach(Transform::source(name, noop_supplier("test-source"), wm_params()))
            .unwrap()
    }

    /// ordinal sets at every endpoint must be exactly 0..k
    fn assert_contiguous_ordinals(dag: &Dag) {
        let mut out_ordinals: HashMap<usize, Vec<usize>> = HashMap::new();
        let mut in_ordinals: HashMap<usize, Vec<usize>> = HashMap::new();
        for (from, to, edge) in dag.edges() {
            out_ordinals
                .entry(from.index())
                .or_insert_with(Vec::new)
                .push(edge.source_ordinal());
            in_ordinals
                .entry(to.index())
                .or_insert_with(Vec::new)
                .push(edge.dest_ordinal());
        }
        for ordinals in out_ordinals.values_mut().chain(in_ordinals.values_mut()) {
            ordinals.sort_unstable();
            let expected: Vec<usize> = (0..ordinals.len()).collect();
            assert_eq!(*ordinals, expected, "ordinals not contiguous or reused");
        }
    }

    fn assert_unique_names(dag: &Dag) {
        let mut names = HashSet::new();
        for (_, vertex) in dag.vertices() {
            assert!(names.insert(vertex.name().to_string()), "duplicate vertex name");
        }
    }

    #[test]
    pub fn vertex_name_test() {
        let pipeline = Pipeline::new();
        let mut planner = Planner::new(&pipeline);

        use crate::pipeline::planner::PlannerOps;
        assert_eq!(planner.vertex_name("foo", ""), "foo");
        assert_eq!(planner.vertex_name("foo", ""), "foo-2");
        assert_eq!(planner.vertex_name("foo", ""), "foo-3");
        assert_eq!(planner.vertex_name("bar", "-accumulate"), "bar-accumulate");
        assert_eq!(planner.vertex_name("bar", "-accumulate"), "bar-2-accumulate");
    }

    #[test]
    pub fn map_chain_plan_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        let map = pipeline
            .attach(Transform::map("double", src, Arc::new(IdentityMap)))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", map, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        assert_eq!(dag.vertex_count(), 3);
        assert_eq!(dag.edge_count(), 2);

        let names: Vec<&str> = dag.vertices().map(|(_, v)| v.name()).collect();
        assert_eq!(names, vec!["numbers", "double", "store"]);
        assert_unique_names(&dag);
        assert_contiguous_ordinals(&dag);
    }

    #[test]
    pub fn leakage_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        pipeline
            .attach(Transform::map("dangling", src, Arc::new(IdentityMap)))
            .unwrap();

        match pipeline.create_dag() {
            Err(PlanError::UnattachedTransforms(names)) => {
                assert_eq!(names, vec!["dangling".to_string()])
            }
            other => panic!("expected leakage error, got {:?}", other),
        }
    }

    #[test]
    pub fn fan_out_source_ordinals_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        pipeline
            .attach(Transform::sink("left", src, noop_supplier("test-sink")))
            .unwrap();
        pipeline
            .attach(Transform::sink("right", src, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (src_node, _) = dag.vertex_by_name("numbers").unwrap();
        let mut ordinals: Vec<usize> = dag
            .edges()
            .filter(|(from, _, _)| *from == src_node)
            .map(|(_, _, e)| e.source_ordinal())
            .collect();
        ordinals.sort_unstable();
        assert_eq!(ordinals, vec![0, 1]);
    }

    #[test]
    pub fn co_group_ordinals_test() {
        let mut pipeline = Pipeline::new();
        let a = source(&mut pipeline, "a");
        let b = source(&mut pipeline, "b");
        let c = source(&mut pipeline, "c");
        let key_fns: Vec<Arc<dyn KeySelectorFunction>> = vec![
            Arc::new(IdentityKey),
            Arc::new(IdentityKey),
            Arc::new(IdentityKey),
        ];
        let co_group = pipeline
            .attach(Transform::co_group(
                "3-way co-group",
                vec![a, b, c],
                key_fns,
                Arc::new(NaryOp(3)),
                None,
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", co_group, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (dest, _) = dag.vertex_by_name("3-way co-group").unwrap();

        let mut inbound: Vec<(String, usize, usize)> = dag
            .edges()
            .filter(|(_, to, _)| *to == dest)
            .map(|(from, _, e)| {
                (
                    dag.vertex(from).name().to_string(),
                    e.source_ordinal(),
                    e.dest_ordinal(),
                )
            })
            .collect();
        inbound.sort_by_key(|(_, _, dest_ordinal)| *dest_ordinal);
        assert_eq!(
            inbound,
            vec![
                ("a".to_string(), 0, 0),
                ("b".to_string(), 0, 1),
                ("c".to_string(), 0, 2),
            ]
        );
        for (_, to, edge) in dag.edges() {
            if to == dest {
                assert!(edge.routing().is_partitioned());
                assert!(edge.is_distributed());
            }
        }
    }

    #[test]
    pub fn windowed_group_two_stage_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "trades");
        let group = pipeline
            .attach(Transform::group(
                "volume",
                src,
                Arc::new(IdentityKey),
                Arc::new(NaryOp(1)),
                Some(WindowDefinition::sliding(60, 20)),
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", group, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let names: Vec<&str> = dag.vertices().map(|(_, v)| v.name()).collect();
        assert_eq!(names, vec!["trades", "volume-accumulate", "volume", "store"]);

        // downstream attaches to the combining stage
        let (combine, _) = dag.vertex_by_name("volume").unwrap();
        let (accumulate, _) = dag.vertex_by_name("volume-accumulate").unwrap();
        let (store, _) = dag.vertex_by_name("store").unwrap();

        let stage_edge = dag
            .edges()
            .find(|(from, to, _)| *from == accumulate && *to == combine)
            .expect("two-stage edge missing");
        assert!(stage_edge.2.routing().is_partitioned());
        assert!(stage_edge.2.is_distributed());

        assert!(dag.edges().any(|(from, to, _)| from == combine && to == store));
        assert_contiguous_ordinals(&dag);
    }

    #[test]
    pub fn rolling_group_single_stage_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "trades");
        let group = pipeline
            .attach(Transform::group(
                "running-volume",
                src,
                Arc::new(IdentityKey),
                Arc::new(NaryOp(1)),
                None,
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", group, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        assert_eq!(dag.vertex_count(), 3);
        let (group_node, _) = dag.vertex_by_name("running-volume").unwrap();
        let inbound = dag
            .edges()
            .find(|(_, to, _)| *to == group_node)
            .expect("group inbound edge");
        assert!(inbound.2.routing().is_partitioned());
        assert!(inbound.2.is_distributed());
    }

    #[test]
    pub fn hash_join_edges_test() {
        let mut pipeline = Pipeline::new();
        let primary = source(&mut pipeline, "orders");
        let side_a = source(&mut pipeline, "customers");
        let side_b = source(&mut pipeline, "products");
        let clauses = vec![
            JoinClause::new(Arc::new(IdentityKey), Arc::new(IdentityKey), Arc::new(IdentityMap)),
            JoinClause::new(Arc::new(IdentityKey), Arc::new(IdentityKey), Arc::new(IdentityMap)),
        ];
        let join = pipeline
            .attach(Transform::hash_join(
                "enrich",
                vec![primary, side_a, side_b],
                clauses,
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", join, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (join_node, _) = dag.vertex_by_name("enrich").unwrap();

        for (from, to, edge) in dag.edges() {
            if to != join_node {
                continue;
            }
            let from_name = dag.vertex(from).name();
            if edge.dest_ordinal() == 0 {
                assert_eq!(from_name, "orders");
                assert_eq!(edge.get_priority(), 0);
            } else {
                assert!(matches!(edge.routing(), Routing::Broadcast));
                assert!(edge.is_distributed());
                assert_eq!(edge.get_priority(), -1);
            }
        }
        assert_contiguous_ordinals(&dag);
    }

    #[test]
    pub fn co_aggregate_broadcast_test() {
        let mut pipeline = Pipeline::new();
        let a = source(&mut pipeline, "a");
        let b = source(&mut pipeline, "b");
        let agg = pipeline
            .attach(Transform::co_aggregate(
                "2-way co-aggregate",
                vec![a, b],
                Arc::new(NaryOp(2)),
                None,
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", agg, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (agg_node, vertex) = dag.vertex_by_name("2-way co-aggregate").unwrap();
        assert_eq!(vertex.local_parallelism(), 1);
        for (_, to, edge) in dag.edges() {
            if to == agg_node {
                assert!(matches!(edge.routing(), Routing::Broadcast));
                assert!(edge.is_distributed());
            }
        }
    }

    #[test]
    pub fn merge_unicast_test() {
        let mut pipeline = Pipeline::new();
        let a = source(&mut pipeline, "a");
        let b = source(&mut pipeline, "b");
        let merge = pipeline
            .attach(Transform::merge("union", vec![a, b]))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", merge, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (merge_node, _) = dag.vertex_by_name("union").unwrap();
        let mut dest_ordinals = Vec::new();
        for (_, to, edge) in dag.edges() {
            if to == merge_node {
                assert!(matches!(edge.routing(), Routing::Unicast));
                dest_ordinals.push(edge.dest_ordinal());
            }
        }
        dest_ordinals.sort_unstable();
        assert_eq!(dest_ordinals, vec![0, 1]);
    }

    #[test]
    pub fn peeked_transform_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        let peeked = pipeline
            .attach(Transform::peeked(
                Transform::map("double", src, Arc::new(IdentityMap)),
                Arc::new(DebugPeek),
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", peeked, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        // the peek decorator wraps the supplier; the graph shape is unchanged
        assert_eq!(dag.vertex_count(), 3);
        let (_, vertex) = dag.vertex_by_name("double").unwrap();
        assert!(format!("{:?}", vertex.meta_supplier()).contains("Peek"));
    }

    #[test]
    pub fn peeked_sink_is_terminal_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        pipeline
            .attach(Transform::peeked(
                Transform::sink("store", src, noop_supplier("test-sink")),
                Arc::new(DebugPeek),
            ))
            .unwrap();

        assert!(pipeline.create_dag().is_ok());
    }

    #[test]
    pub fn invalid_parallelism_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        let map = pipeline
            .attach(
                Transform::map("double", src, Arc::new(IdentityMap)).local_parallelism(-3),
            )
            .unwrap();
        pipeline
            .attach(Transform::sink("store", map, noop_supplier("test-sink")))
            .unwrap();

        match pipeline.create_dag() {
            Err(PlanError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {:?}", other),
        }
    }

    #[test]
    pub fn arity_mismatch_test() {
        let mut pipeline = Pipeline::new();
        let a = source(&mut pipeline, "a");

        match pipeline.attach(Transform::merge("union", vec![a])) {
            Err(PlanError::ArityMismatch { .. }) => {}
            other => panic!("expected arity mismatch, got {:?}", other),
        }

        let b = source(&mut pipeline, "b");
        // aggregate arity disagrees with the upstream count
        match pipeline.attach(Transform::co_aggregate(
            "2-way co-aggregate",
            vec![a, b],
            Arc::new(NaryOp(3)),
            None,
        )) {
            Err(PlanError::ArityMismatch { .. }) => {}
            other => panic!("expected arity mismatch, got {:?}", other),
        }

        // key function count disagrees with the upstream count
        match pipeline.attach(Transform::co_group(
            "2-way co-group",
            vec![a, b],
            vec![Arc::new(IdentityKey) as Arc<dyn KeySelectorFunction>],
            Arc::new(NaryOp(2)),
            None,
        )) {
            Err(PlanError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {:?}", other),
        }
    }

    #[test]
    pub fn map_using_context_plan_test() {
        use std::any::Any;

        use crate::core::function::{ContextFactory, MapWithContextFunction};

        #[derive(Debug)]
        struct UnitFactory;

        impl ContextFactory for UnitFactory {
            fn create_context(&self) -> Box<dyn Any + Send> {
                Box::new(())
            }
        }

        #[derive(Debug)]
        struct PassThrough;

        impl NamedFunction for PassThrough {
            fn name(&self) -> &str {
                "pass-through"
            }
        }

        impl MapWithContextFunction for PassThrough {
            fn map(&self, _context: &mut (dyn Any + Send), record: Record) -> Option<Record> {
                Some(record)
            }
        }

        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        let lookup = pipeline
            .attach(Transform::map_using_context(
                "lookup",
                src,
                Arc::new(UnitFactory),
                Arc::new(PassThrough),
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", lookup, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        assert_eq!(dag.vertex_count(), 3);
        assert!(dag.vertex_by_name("lookup").is_some());
    }

    #[test]
    pub fn async_map_concurrency_budget_test() {
        use std::any::Any;

        use async_trait::async_trait;

        use crate::core::function::{AsyncMapWithContextFunction, ContextFactory};

        #[derive(Debug)]
        struct UnitFactory;

        impl ContextFactory for UnitFactory {
            fn create_context(&self) -> Box<dyn Any + Send> {
                Box::new(())
            }
        }

        #[derive(Debug)]
        struct PassThrough;

        impl NamedFunction for PassThrough {
            fn name(&self) -> &str {
                "pass-through"
            }
        }

        #[async_trait]
        impl AsyncMapWithContextFunction for PassThrough {
            async fn map(&self, _context: &mut (dyn Any + Send), record: Record) -> Option<Record> {
                Some(record)
            }
        }

        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");

        // a zero budget is rejected up front
        match pipeline.attach(Transform::map_using_context_async(
            "lookup",
            src,
            Arc::new(UnitFactory),
            Arc::new(PassThrough),
            0,
        )) {
            Err(PlanError::InvalidArgument(_)) => {}
            other => panic!("expected invalid argument, got {:?}", other),
        }

        let lookup = pipeline
            .attach(Transform::map_using_context_async(
                "lookup",
                src,
                Arc::new(UnitFactory),
                Arc::new(PassThrough),
                16,
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", lookup, noop_supplier("test-sink")))
            .unwrap();
        assert!(pipeline.create_dag().is_ok());
    }

    #[test]
    pub fn custom_transform_test() {
        let mut pipeline = Pipeline::new();
        let src = source(&mut pipeline, "numbers");
        let tap = pipeline
            .attach(Transform::custom(
                "tap",
                vec![src],
                noop_supplier("custom-tap"),
            ))
            .unwrap();
        pipeline
            .attach(Transform::sink("store", tap, noop_supplier("test-sink")))
            .unwrap();

        let dag = pipeline.create_dag().unwrap();
        let (_, vertex) = dag.vertex_by_name("tap").unwrap();
        assert!(format!("{:?}", vertex.meta_supplier()).contains("custom-tap"));
    }

    #[test]
    pub fn deterministic_plan_test() {
        fn build() -> String {
            let mut pipeline = Pipeline::new();
            let a = source(&mut pipeline, "a");
            let b = source(&mut pipeline, "b");
            let merge = pipeline
                .attach(Transform::merge("union", vec![a, b]))
                .unwrap();
            let map = pipeline
                .attach(Transform::map("shape", merge, Arc::new(IdentityMap)))
                .unwrap();
            pipeline
                .attach(Transform::sink("store", map, noop_supplier("test-sink")))
                .unwrap();
            pipeline.create_dag().unwrap().to_json()
        }

        assert_eq!(build(), build());
    }

    proptest! {
        /// random transform trees keep names unique, ordinals contiguous and
        /// vertex creation in topological order
        #[test]
        fn planner_invariants_prop(
            kinds in proptest::collection::vec(0u8..5, 0..10),
            picks in proptest::collection::vec(any::<u16>(), 10),
        ) {
            let mut pipeline = Pipeline::new();
            let mut ids = vec![
                source(&mut pipeline, "left"),
                source(&mut pipeline, "right"),
            ];

            for (i, kind) in kinds.iter().enumerate() {
                let up0 = ids[(picks[i % picks.len()] as usize) % ids.len()];
                let up1 = ids[(picks[(i + 1) % picks.len()] as usize) % ids.len()];
                let name = format!("t{}", i);
                let transform = match kind {
                    0 => Transform::map(name, up0, Arc::new(IdentityMap)),
                    1 => Transform::filter(name, up0, Arc::new(AcceptAll)),
                    2 => Transform::group(
                        name,
                        up0,
                        Arc::new(IdentityKey),
                        Arc::new(NaryOp(1)),
                        Some(WindowDefinition::tumbling(10)),
                    ),
                    3 => Transform::group(
                        name,
                        up0,
                        Arc::new(IdentityKey),
                        Arc::new(NaryOp(1)),
                        None,
                    ),
                    _ => Transform::merge(name, vec![up0, up1]),
                };
                ids.push(pipeline.attach(transform).unwrap());
            }

            // close every leak with a sink
            let mut has_downstream = vec![false; pipeline.transform_count()];
            for id in ids.iter() {
                for upstream in pipeline.transform(*id).upstream() {
                    has_downstream[upstream.0 as usize] = true;
                }
            }
            for (index, covered) in has_downstream.clone().into_iter().enumerate() {
                if !covered {
                    let id = crate::pipeline::TransformId(index as u32);
                    pipeline
                        .attach(Transform::sink(
                            format!("sink{}", index),
                            id,
                            noop_supplier("test-sink"),
                        ))
                        .unwrap();
                }
            }

            let dag = pipeline.create_dag().unwrap();

            assert_unique_names(&dag);
            assert_contiguous_ordinals(&dag);
            for (from, to, _) in dag.edges() {
                prop_assert!(from.index() < to.index(), "edge against creation order");
            }
        }
    }
}
