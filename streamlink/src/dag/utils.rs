use std::collections::HashMap;

use daggy::{NodeIndex, Walker};

use crate::dag::{Dag, Label};

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct JsonNode {
    id: String,
    label: String,
    #[serde(rename = "type")]
    ty: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct JsonEdge {
    /// source JsonNode id
    source: String,
    /// target JsonNode id
    target: String,
    label: String,
}

#[derive(Clone, Serialize, Deserialize, Debug)]
pub struct JsonDag {
    nodes: Vec<JsonNode>,
    edges: Vec<JsonEdge>,
}

impl<'a> From<&'a Dag> for JsonDag {
    fn from(dag: &'a Dag) -> Self {
        let graph = dag.graph();

        let mut node_map = HashMap::new();
        let mut edges = Vec::new();

        for edge in graph.raw_edges() {
            let source_json_node = JsonDag::create_json_node(dag, edge.source());
            let target_json_node = JsonDag::create_json_node(dag, edge.target());

            let json_edge = JsonEdge {
                source: source_json_node.id.clone(),
                target: target_json_node.id.clone(),
                label: edge.weight.get_label(),
            };

            node_map.insert(source_json_node.id.clone(), source_json_node);
            node_map.insert(target_json_node.id.clone(), target_json_node);

            edges.push(json_edge);
        }

        // a one-vertex plan has no edges to discover it through
        for (node_index, _) in dag.vertices() {
            let json_node = JsonDag::create_json_node(dag, node_index);
            node_map.entry(json_node.id.clone()).or_insert(json_node);
        }

        let mut nodes: Vec<JsonNode> = node_map.into_iter().map(|(_, node)| node).collect();
        nodes.sort_by_key(|node| node.id.parse::<usize>().unwrap_or(usize::MAX));

        JsonDag { nodes, edges }
    }
}

impl JsonDag {
    fn get_node_type(dag: &Dag, node_index: NodeIndex) -> &'static str {
        let graph = dag.graph();
        let parent_count = graph.parents(node_index).iter(graph).count();
        if parent_count == 0 {
            "begin"
        } else {
            let child_count = graph.children(node_index).iter(graph).count();
            if child_count == 0 {
                "end"
            } else {
                ""
            }
        }
    }

    fn create_json_node(dag: &Dag, node_index: NodeIndex) -> JsonNode {
        let label = dag.vertex(node_index).get_label();
        let id = node_index.index().to_string();
        let ty = JsonDag::get_node_type(dag, node_index);

        JsonNode {
            id,
            label,
            ty: ty.to_string(),
        }
    }

    pub fn nodes(&self) -> &Vec<JsonNode> {
        &self.nodes
    }

    pub fn to_string(&self) -> String {
        serde_json::to_string(self).unwrap_or("".to_string())
    }
}
