use std::sync::Arc;

use crate::core::aggregate::AggregateOperation;
use crate::core::function::{
    AsyncMapWithContextFunction, ContextFactory, FilterFunction, FlatMapFunction,
    KeySelectorFunction, MapFunction, MapWithContextFunction, PeekFunction,
};
use crate::core::processor::ProcessorMetaSupplier;
use crate::core::watermark::WatermarkGenerationParams;
use crate::core::window::WindowDefinition;
use crate::dag::{Edge, PlanError, DEFAULT_LOCAL_PARALLELISM};
use crate::functions::system;
use crate::pipeline::planner::{tail_list, PlannerOps};
use crate::pipeline::TransformId;

/// One side-input of a hash join: how to key the primary stream, how to key
/// the side stream, and what to project out of the matched side item.
#[derive(Clone, Debug)]
pub struct JoinClause {
    left_key_fn: Arc<dyn KeySelectorFunction>,
    right_key_fn: Arc<dyn KeySelectorFunction>,
    project_fn: Arc<dyn MapFunction>,
}

impl JoinClause {
    pub fn new(
        left_key_fn: Arc<dyn KeySelectorFunction>,
        right_key_fn: Arc<dyn KeySelectorFunction>,
        project_fn: Arc<dyn MapFunction>,
    ) -> Self {
        JoinClause {
            left_key_fn,
            right_key_fn,
            project_fn,
        }
    }

    pub fn left_key_fn(&self) -> &Arc<dyn KeySelectorFunction> {
        &self.left_key_fn
    }

    pub fn right_key_fn(&self) -> &Arc<dyn KeySelectorFunction> {
        &self.right_key_fn
    }

    pub fn project_fn(&self) -> &Arc<dyn MapFunction> {
        &self.project_fn
    }
}

/// Variant payload of a transform.
#[derive(Debug)]
pub enum TransformKind {
    Source {
        supplier: Arc<dyn ProcessorMetaSupplier>,
        wm_params: Arc<WatermarkGenerationParams>,
    },
    Map {
        map_fn: Arc<dyn MapFunction>,
    },
    Filter {
        filter_fn: Arc<dyn FilterFunction>,
    },
    FlatMap {
        flat_map_fn: Arc<dyn FlatMapFunction>,
    },
    MapUsingContext {
        context_factory: Arc<dyn ContextFactory>,
        map_fn: Arc<dyn MapWithContextFunction>,
    },
    MapUsingContextAsync {
        context_factory: Arc<dyn ContextFactory>,
        map_fn: Arc<dyn AsyncMapWithContextFunction>,
        max_concurrent_ops: usize,
    },
    Group {
        key_fn: Arc<dyn KeySelectorFunction>,
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    },
    CoGroup {
        key_fns: Vec<Arc<dyn KeySelectorFunction>>,
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    },
    CoAggregate {
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    },
    HashJoin {
        clauses: Vec<JoinClause>,
    },
    Merge,
    Peeked {
        inner: Box<TransformKind>,
        peek_fn: Arc<dyn PeekFunction>,
    },
    Sink {
        supplier: Arc<dyn ProcessorMetaSupplier>,
    },
    Custom {
        supplier: Arc<dyn ProcessorMetaSupplier>,
    },
}

/// A node of the pipeline graph: common header plus a variant payload.
#[derive(Debug)]
pub struct Transform {
    pub(crate) name: String,
    pub(crate) upstream: Vec<TransformId>,
    pub(crate) local_parallelism: i32,
    pub(crate) kind: TransformKind,
}

impl Transform {
    fn new(name: impl Into<String>, upstream: Vec<TransformId>, kind: TransformKind) -> Self {
        Transform {
            name: name.into(),
            upstream,
            local_parallelism: DEFAULT_LOCAL_PARALLELISM,
            kind,
        }
    }

    pub fn source(
        name: impl Into<String>,
        supplier: Arc<dyn ProcessorMetaSupplier>,
        wm_params: WatermarkGenerationParams,
    ) -> Self {
        Transform::new(
            name,
            vec![],
            TransformKind::Source {
                supplier,
                wm_params: Arc::new(wm_params),
            },
        )
    }

    pub fn map(name: impl Into<String>, upstream: TransformId, map_fn: Arc<dyn MapFunction>) -> Self {
        Transform::new(name, vec![upstream], TransformKind::Map { map_fn })
    }

    pub fn filter(
        name: impl Into<String>,
        upstream: TransformId,
        filter_fn: Arc<dyn FilterFunction>,
    ) -> Self {
        Transform::new(name, vec![upstream], TransformKind::Filter { filter_fn })
    }

    pub fn flat_map(
        name: impl Into<String>,
        upstream: TransformId,
        flat_map_fn: Arc<dyn FlatMapFunction>,
    ) -> Self {
        Transform::new(name, vec![upstream], TransformKind::FlatMap { flat_map_fn })
    }

    pub fn map_using_context(
        name: impl Into<String>,
        upstream: TransformId,
        context_factory: Arc<dyn ContextFactory>,
        map_fn: Arc<dyn MapWithContextFunction>,
    ) -> Self {
        Transform::new(
            name,
            vec![upstream],
            TransformKind::MapUsingContext {
                context_factory,
                map_fn,
            },
        )
    }

    pub fn map_using_context_async(
        name: impl Into<String>,
        upstream: TransformId,
        context_factory: Arc<dyn ContextFactory>,
        map_fn: Arc<dyn AsyncMapWithContextFunction>,
        max_concurrent_ops: usize,
    ) -> Self {
        Transform::new(
            name,
            vec![upstream],
            TransformKind::MapUsingContextAsync {
                context_factory,
                map_fn,
                max_concurrent_ops,
            },
        )
    }

    /// Keyed aggregation; windowed when `window` is given, rolling otherwise.
    pub fn group(
        name: impl Into<String>,
        upstream: TransformId,
        key_fn: Arc<dyn KeySelectorFunction>,
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    ) -> Self {
        Transform::new(
            name,
            vec![upstream],
            TransformKind::Group {
                key_fn,
                aggr_op,
                window,
            },
        )
    }

    pub fn co_group(
        name: impl Into<String>,
        upstream: Vec<TransformId>,
        key_fns: Vec<Arc<dyn KeySelectorFunction>>,
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    ) -> Self {
        Transform::new(
            name,
            upstream,
            TransformKind::CoGroup {
                key_fns,
                aggr_op,
                window,
            },
        )
    }

    pub fn co_aggregate(
        name: impl Into<String>,
        upstream: Vec<TransformId>,
        aggr_op: Arc<dyn AggregateOperation>,
        window: Option<WindowDefinition>,
    ) -> Self {
        Transform::new(name, upstream, TransformKind::CoAggregate { aggr_op, window })
    }

    /// `upstream[0]` is the primary stream; `upstream[1..]` are the side
    /// inputs, one per clause.
    pub fn hash_join(
        name: impl Into<String>,
        upstream: Vec<TransformId>,
        clauses: Vec<JoinClause>,
    ) -> Self {
        Transform::new(name, upstream, TransformKind::HashJoin { clauses })
    }

    /// Union by concatenation. The upstreams must carry assignment-compatible
    /// element payloads; this is not verifiable over opaque records and is
    /// the caller's contract.
    pub fn merge(name: impl Into<String>, upstream: Vec<TransformId>) -> Self {
        Transform::new(name, upstream, TransformKind::Merge)
    }

    /// Wraps `inner`, adding a logging tap on its output vertex without
    /// changing semantics.
    pub fn peeked(inner: Transform, peek_fn: Arc<dyn PeekFunction>) -> Self {
        Transform {
            name: inner.name,
            upstream: inner.upstream,
            local_parallelism: inner.local_parallelism,
            kind: TransformKind::Peeked {
                inner: Box::new(inner.kind),
                peek_fn,
            },
        }
    }

    pub fn sink(
        name: impl Into<String>,
        upstream: TransformId,
        supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Self {
        Transform::new(name, vec![upstream], TransformKind::Sink { supplier })
    }

    pub fn custom(
        name: impl Into<String>,
        upstream: Vec<TransformId>,
        supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Self {
        Transform::new(name, upstream, TransformKind::Custom { supplier })
    }

    pub fn local_parallelism(mut self, local_parallelism: i32) -> Self {
        self.local_parallelism = local_parallelism;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn upstream(&self) -> &[TransformId] {
        &self.upstream
    }

    pub fn kind(&self) -> &TransformKind {
        &self.kind
    }

    /// A transform with no downstream is legal only if this returns true.
    pub(crate) fn is_terminal(&self) -> bool {
        fn terminal(kind: &TransformKind) -> bool {
            match kind {
                TransformKind::Sink { .. } => true,
                TransformKind::Peeked { inner, .. } => terminal(inner),
                _ => false,
            }
        }
        terminal(&self.kind)
    }

    /// Variant arity must match the upstream list exactly.
    pub(crate) fn check_arity(&self) -> Result<(), PlanError> {
        fn check(t: &Transform, kind: &TransformKind) -> Result<(), PlanError> {
            let n = t.upstream.len();
            let fail = |expected: &str| {
                Err(PlanError::ArityMismatch {
                    transform: t.to_string(),
                    expected: expected.to_string(),
                    actual: n,
                })
            };
            match kind {
                TransformKind::Source { .. } => {
                    if n != 0 {
                        return fail("0");
                    }
                }
                TransformKind::Map { .. }
                | TransformKind::Filter { .. }
                | TransformKind::FlatMap { .. }
                | TransformKind::MapUsingContext { .. }
                | TransformKind::Group { .. }
                | TransformKind::Sink { .. } => {
                    if n != 1 {
                        return fail("1");
                    }
                }
                TransformKind::MapUsingContextAsync {
                    max_concurrent_ops, ..
                } => {
                    if n != 1 {
                        return fail("1");
                    }
                    if *max_concurrent_ops == 0 {
                        return Err(PlanError::InvalidArgument(format!(
                            "{}: max concurrent operations must be at least 1",
                            t
                        )));
                    }
                }
                TransformKind::CoGroup {
                    key_fns, aggr_op, ..
                } => {
                    if n < 2 {
                        return fail("at least 2");
                    }
                    if key_fns.len() != n {
                        return Err(PlanError::InvalidArgument(format!(
                            "{}: {} key functions for {} upstreams",
                            t,
                            key_fns.len(),
                            n
                        )));
                    }
                    if aggr_op.arity() != n {
                        return fail(&format!("{} (aggregate arity)", aggr_op.arity()));
                    }
                }
                TransformKind::CoAggregate { aggr_op, .. } => {
                    if n < 2 {
                        return fail("at least 2");
                    }
                    if aggr_op.arity() != n {
                        return fail(&format!("{} (aggregate arity)", aggr_op.arity()));
                    }
                }
                TransformKind::HashJoin { clauses } => {
                    if n < 2 {
                        return fail("at least 2");
                    }
                    if clauses.len() != tail_list(&t.upstream).len() {
                        return Err(PlanError::InvalidArgument(format!(
                            "{}: {} join clauses for {} side inputs",
                            t,
                            clauses.len(),
                            n - 1
                        )));
                    }
                }
                TransformKind::Merge => {
                    if n < 2 {
                        return fail("at least 2");
                    }
                }
                TransformKind::Peeked { inner, .. } => return check(t, inner),
                TransformKind::Custom { .. } => {}
            }
            Ok(())
        }
        check(self, &self.kind)
    }

    /// Materializes this transform into DAG vertices and edges, registering
    /// its output vertex with the planner.
    pub(crate) fn add_to_dag(
        &self,
        id: TransformId,
        planner: &mut dyn PlannerOps,
    ) -> Result<(), PlanError> {
        self.lower(&self.kind, id, planner)
    }

    fn lower(
        &self,
        kind: &TransformKind,
        id: TransformId,
        planner: &mut dyn PlannerOps,
    ) -> Result<(), PlanError> {
        let p = self.local_parallelism;
        match kind {
            TransformKind::Source { supplier, wm_params } => {
                let name = planner.vertex_name(&self.name, "");
                planner.add_vertex(
                    id,
                    name,
                    p,
                    system::source_supplier(supplier.clone(), wm_params.clone()),
                )?;
            }
            TransformKind::Map { map_fn } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(id, name, p, system::map_supplier(map_fn.clone()))?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::Filter { filter_fn } => {
                let name = planner.vertex_name(&self.name, "");
                let v =
                    planner.add_vertex(id, name, p, system::filter_supplier(filter_fn.clone()))?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::FlatMap { flat_map_fn } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(
                    id,
                    name,
                    p,
                    system::flat_map_supplier(flat_map_fn.clone()),
                )?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::MapUsingContext {
                context_factory,
                map_fn,
            } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(
                    id,
                    name,
                    p,
                    system::map_with_context_supplier(context_factory.clone(), map_fn.clone()),
                )?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::MapUsingContextAsync {
                context_factory,
                map_fn,
                max_concurrent_ops,
            } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(
                    id,
                    name,
                    p,
                    system::async_map_with_context_supplier(
                        context_factory.clone(),
                        map_fn.clone(),
                        *max_concurrent_ops,
                    ),
                )?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::Group {
                key_fn,
                aggr_op,
                window,
            } => match window {
                Some(window) => {
                    // two stages: partition-local accumulation by frame, then
                    // a distributed combine keyed the same way
                    let accumulate_name = planner.vertex_name(&self.name, "-accumulate");
                    let accumulate = planner.add_internal_vertex(
                        accumulate_name,
                        p,
                        system::accumulate_by_frame_supplier(
                            key_fn.clone(),
                            aggr_op.clone(),
                            *window,
                        ),
                    )?;
                    {
                        let key_fn = key_fn.clone();
                        planner.add_edges(id, accumulate, &mut |e, _| {
                            e.partitioned(key_fn.clone())
                        })?;
                    }

                    let combine_name = planner.vertex_name(&self.name, "");
                    let combine = planner.add_vertex(
                        id,
                        combine_name,
                        p,
                        system::combine_frames_supplier(aggr_op.clone(), *window),
                    )?;
                    // stage-1 output is `[key_len][key][partial]`; route on
                    // the encoded key
                    planner.add_internal_edge(
                        accumulate,
                        combine,
                        Edge::new(0, 0)
                            .partitioned(Arc::new(system::AccumulatedKeySelector))
                            .distributed(),
                    )?;
                }
                None => {
                    let name = planner.vertex_name(&self.name, "");
                    let v = planner.add_vertex(
                        id,
                        name,
                        p,
                        system::aggregate_by_key_supplier(key_fn.clone(), aggr_op.clone()),
                    )?;
                    let key_fn = key_fn.clone();
                    planner.add_edges(id, v, &mut |e, _| {
                        e.partitioned(key_fn.clone()).distributed()
                    })?;
                }
            },
            TransformKind::CoGroup {
                key_fns,
                aggr_op,
                window,
            } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(
                    id,
                    name,
                    p,
                    system::co_group_supplier(key_fns.clone(), aggr_op.clone(), *window),
                )?;
                planner.add_edges(id, v, &mut |e, ordinal| {
                    e.partitioned(key_fns[ordinal].clone()).distributed()
                })?;
            }
            TransformKind::CoAggregate { aggr_op, window } => {
                // non-keyed: every input reaches the single aggregating
                // instance over broadcast edges
                let p = if p == DEFAULT_LOCAL_PARALLELISM { 1 } else { p };
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(
                    id,
                    name,
                    p,
                    system::co_aggregate_supplier(aggr_op.clone(), *window),
                )?;
                planner.add_edges(id, v, &mut |e, _| e.broadcast().distributed())?;
            }
            TransformKind::HashJoin { clauses } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(id, name, p, system::hash_join_supplier(clauses.clone()))?;
                // side tables must be fully built before the primary stream
                // is drained
                planner.add_edges(id, v, &mut |e, ordinal| {
                    if ordinal == 0 {
                        e
                    } else {
                        e.broadcast().distributed().priority(-1)
                    }
                })?;
            }
            TransformKind::Merge => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(id, name, p, system::merge_supplier())?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::Peeked { inner, peek_fn } => {
                self.lower(inner, id, planner)?;
                planner.wrap_output_meta(id, peek_fn.clone())?;
            }
            TransformKind::Sink { supplier } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(id, name, p, supplier.clone())?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
            TransformKind::Custom { supplier } => {
                let name = planner.vertex_name(&self.name, "");
                let v = planner.add_vertex(id, name, p, supplier.clone())?;
                planner.add_edges(id, v, &mut |e, _| e)?;
            }
        }
        Ok(())
    }
}

impl std::fmt::Display for Transform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name)
    }
}
