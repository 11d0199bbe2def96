//! Execution-layer graph lowered from pipeline transforms.

use std::collections::HashMap;
use std::error::Error;
use std::ops::Index;
use std::sync::Arc;

use daggy::{Dag as Graph, EdgeIndex, NodeIndex};

use crate::core::function::KeySelectorFunction;
use crate::core::processor::ProcessorMetaSupplier;

pub(crate) mod utils;

pub use utils::{JsonDag, JsonNode};

/// Engine picks the parallelism.
pub const DEFAULT_LOCAL_PARALLELISM: i32 = -1;

#[derive(Debug)]
pub enum PlanError {
    /// Non-sink transforms with nothing attached to them.
    UnattachedTransforms(Vec<String>),
    CycleDetected,
    ArityMismatch {
        transform: String,
        expected: String,
        actual: usize,
    },
    InvalidArgument(String),
    DuplicateVertexName(String),
    NonContiguousOrdinal {
        vertex: String,
        expected: usize,
        actual: usize,
        inbound: bool,
    },
    /// A planner contract was violated; indicates a transform-variant bug.
    Internal(String),
}

impl Error for PlanError {}

impl std::fmt::Display for PlanError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PlanError::UnattachedTransforms(names) => {
                write!(f, "these transforms have nothing attached to them: {}", names.join(", "))
            }
            PlanError::CycleDetected => write!(f, "the pipeline contains a cycle"),
            PlanError::ArityMismatch {
                transform,
                expected,
                actual,
            } => write!(
                f,
                "{}: expected {} upstream transform(s), got {}",
                transform, expected, actual
            ),
            PlanError::InvalidArgument(msg) => write!(f, "{}", msg),
            PlanError::DuplicateVertexName(name) => write!(f, "duplicate vertex name: {}", name),
            PlanError::NonContiguousOrdinal {
                vertex,
                expected,
                actual,
                inbound,
            } => write!(
                f,
                "{} ordinal {} at vertex {} out of order, expected {}",
                if *inbound { "inbound" } else { "outbound" },
                actual,
                vertex,
                expected
            ),
            PlanError::Internal(msg) => write!(f, "planner contract violated: {}", msg),
        }
    }
}

pub(crate) trait Label {
    fn get_label(&self) -> String;
}

/// Edge routing policy.
#[derive(Clone)]
pub enum Routing {
    /// Each item goes to one arbitrary receiver.
    Unicast,
    /// Like unicast, but the sender-receiver pairing is pinned.
    Isolated,
    /// Items with equal keys go to the same receiver; per-key order holds.
    Partitioned(Arc<dyn KeySelectorFunction>),
    /// Each item goes to all receivers.
    Broadcast,
    /// All items go to the single receiver owning the whole key space.
    AllToOne,
}

impl Routing {
    fn label(&self) -> &'static str {
        match self {
            Routing::Unicast => "unicast",
            Routing::Isolated => "isolated",
            Routing::Partitioned(_) => "partitioned",
            Routing::Broadcast => "broadcast",
            Routing::AllToOne => "all-to-one",
        }
    }

    pub fn is_partitioned(&self) -> bool {
        match self {
            Routing::Partitioned(_) => true,
            _ => false,
        }
    }
}

impl std::fmt::Debug for Routing {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.label())
    }
}

#[derive(Clone, Debug)]
pub struct Vertex {
    name: String,
    local_parallelism: i32,
    meta_supplier: Arc<dyn ProcessorMetaSupplier>,
}

impl Vertex {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn local_parallelism(&self) -> i32 {
        self.local_parallelism
    }

    pub fn meta_supplier(&self) -> &Arc<dyn ProcessorMetaSupplier> {
        &self.meta_supplier
    }
}

impl Label for Vertex {
    fn get_label(&self) -> String {
        if self.local_parallelism == DEFAULT_LOCAL_PARALLELISM {
            self.name.clone()
        } else {
            format!("{}(p={})", self.name, self.local_parallelism)
        }
    }
}

#[derive(Clone, Debug)]
pub struct Edge {
    source_ordinal: usize,
    dest_ordinal: usize,
    routing: Routing,
    distributed: bool,
    priority: i32,
}

impl Edge {
    pub(crate) fn new(source_ordinal: usize, dest_ordinal: usize) -> Self {
        Edge {
            source_ordinal,
            dest_ordinal,
            routing: Routing::Unicast,
            distributed: false,
            priority: 0,
        }
    }

    pub fn partitioned(mut self, key_fn: Arc<dyn KeySelectorFunction>) -> Self {
        self.routing = Routing::Partitioned(key_fn);
        self
    }

    pub fn broadcast(mut self) -> Self {
        self.routing = Routing::Broadcast;
        self
    }

    pub fn all_to_one(mut self) -> Self {
        self.routing = Routing::AllToOne;
        self
    }

    pub fn isolated(mut self) -> Self {
        self.routing = Routing::Isolated;
        self
    }

    /// Items may cross worker nodes; default is node-local delivery.
    pub fn distributed(mut self) -> Self {
        self.distributed = true;
        self
    }

    /// Lower priority values are drained first by the receiving vertex.
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    pub fn source_ordinal(&self) -> usize {
        self.source_ordinal
    }

    pub fn dest_ordinal(&self) -> usize {
        self.dest_ordinal
    }

    pub fn routing(&self) -> &Routing {
        &self.routing
    }

    pub fn is_distributed(&self) -> bool {
        self.distributed
    }

    pub fn get_priority(&self) -> i32 {
        self.priority
    }
}

impl Label for Edge {
    fn get_label(&self) -> String {
        format!(
            "{}[{}->{}]{}",
            self.routing.label(),
            self.source_ordinal,
            self.dest_ordinal,
            if self.distributed { "(distributed)" } else { "" }
        )
    }
}

/// The planned DAG: uniquely named vertices and ordinal-contiguous edges.
#[derive(Debug)]
pub struct Dag {
    graph: Graph<Vertex, Edge>,
    name_index: HashMap<String, NodeIndex>,
    // next free ordinal per endpoint, used to enforce contiguity
    out_ordinals: HashMap<NodeIndex, usize>,
    in_ordinals: HashMap<NodeIndex, usize>,
}

impl Dag {
    pub(crate) fn new() -> Self {
        Dag {
            graph: Graph::new(),
            name_index: HashMap::new(),
            out_ordinals: HashMap::new(),
            in_ordinals: HashMap::new(),
        }
    }

    pub(crate) fn new_vertex(
        &mut self,
        name: String,
        local_parallelism: i32,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) -> Result<NodeIndex, PlanError> {
        if local_parallelism < DEFAULT_LOCAL_PARALLELISM || local_parallelism == 0 {
            return Err(PlanError::InvalidArgument(format!(
                "vertex {}: local parallelism must be positive or -1, got {}",
                name, local_parallelism
            )));
        }
        if self.name_index.contains_key(&name) {
            return Err(PlanError::DuplicateVertexName(name));
        }

        let node_index = self.graph.add_node(Vertex {
            name: name.clone(),
            local_parallelism,
            meta_supplier,
        });
        self.name_index.insert(name, node_index);

        Ok(node_index)
    }

    pub(crate) fn edge(
        &mut self,
        from: NodeIndex,
        to: NodeIndex,
        edge: Edge,
    ) -> Result<EdgeIndex, PlanError> {
        let next_out = self.out_ordinals.entry(from).or_insert(0);
        if edge.source_ordinal != *next_out {
            return Err(PlanError::NonContiguousOrdinal {
                vertex: self.graph.index(from).name.clone(),
                expected: *next_out,
                actual: edge.source_ordinal,
                inbound: false,
            });
        }
        *next_out += 1;

        let next_in = self.in_ordinals.entry(to).or_insert(0);
        if edge.dest_ordinal != *next_in {
            return Err(PlanError::NonContiguousOrdinal {
                vertex: self.graph.index(to).name.clone(),
                expected: *next_in,
                actual: edge.dest_ordinal,
                inbound: true,
            });
        }
        *next_in += 1;

        self.graph
            .add_edge(from, to, edge)
            .map_err(|_| PlanError::CycleDetected)
    }

    pub(crate) fn replace_meta_supplier(
        &mut self,
        node: NodeIndex,
        meta_supplier: Arc<dyn ProcessorMetaSupplier>,
    ) {
        if let Some(vertex) = self.graph.node_weight_mut(node) {
            vertex.meta_supplier = meta_supplier;
        }
    }

    pub fn vertex(&self, node: NodeIndex) -> &Vertex {
        self.graph.index(node)
    }

    pub fn vertex_by_name(&self, name: &str) -> Option<(NodeIndex, &Vertex)> {
        self.name_index
            .get(name)
            .map(|node| (*node, self.graph.index(*node)))
    }

    /// Vertices in creation order.
    pub fn vertices(&self) -> impl Iterator<Item = (NodeIndex, &Vertex)> {
        self.graph
            .raw_nodes()
            .iter()
            .enumerate()
            .map(|(i, node)| (NodeIndex::new(i), &node.weight))
    }

    pub fn edges(&self) -> impl Iterator<Item = (NodeIndex, NodeIndex, &Edge)> {
        self.graph
            .raw_edges()
            .iter()
            .map(|edge| (edge.source(), edge.target(), &edge.weight))
    }

    pub fn vertex_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    pub(crate) fn graph(&self) -> &Graph<Vertex, Edge> {
        &self.graph
    }

    /// Debug rendering of the plan.
    pub fn to_json(&self) -> String {
        JsonDag::from(self).to_string()
    }
}
