//! Pipeline-level transform graph and its lowering to the execution DAG.

use std::collections::BTreeMap;

use crate::dag::{Dag, PlanError};

pub(crate) mod planner;
pub(crate) mod topological_sorter;
pub mod transform;

pub use transform::{JoinClause, Transform, TransformKind};

/// Handle of a transform inside its [`Pipeline`].
#[derive(Copy, Clone, Serialize, Deserialize, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct TransformId(pub(crate) u32);

/// The declarative transform graph produced by the user-facing builder.
///
/// Transforms live in an arena and reference their upstreams by id, so the
/// graph is acyclic by construction: a transform can only name upstreams that
/// were attached before it.
#[derive(Debug, Default)]
pub struct Pipeline {
    transforms: Vec<Transform>,
}

impl Pipeline {
    pub fn new() -> Self {
        Pipeline {
            transforms: Vec::new(),
        }
    }

    /// Adds a transform, validating upstream references and variant arity.
    pub fn attach(&mut self, transform: Transform) -> Result<TransformId, PlanError> {
        for upstream in transform.upstream() {
            if upstream.0 as usize >= self.transforms.len() {
                return Err(PlanError::InvalidArgument(format!(
                    "{}: unknown upstream transform {:?}",
                    transform, upstream
                )));
            }
        }
        transform.check_arity()?;

        let id = TransformId(self.transforms.len() as u32);
        self.transforms.push(transform);
        Ok(id)
    }

    pub fn transform(&self, id: TransformId) -> &Transform {
        &self.transforms[id.0 as usize]
    }

    pub fn transform_count(&self) -> usize {
        self.transforms.len()
    }

    pub(crate) fn transform_ids(&self) -> impl Iterator<Item = TransformId> {
        (0..self.transforms.len() as u32).map(TransformId)
    }

    /// Transform to list-of-downstream-transforms, every transform present.
    pub(crate) fn adjacency_map(&self) -> BTreeMap<TransformId, Vec<TransformId>> {
        let mut adjacency: BTreeMap<TransformId, Vec<TransformId>> =
            self.transform_ids().map(|id| (id, Vec::new())).collect();
        for id in self.transform_ids() {
            for upstream in self.transform(id).upstream() {
                adjacency
                    .get_mut(upstream)
                    .expect("upstream validated at attach")
                    .push(id);
            }
        }
        adjacency
    }

    /// Lowers the pipeline into an executable DAG.
    pub fn create_dag(&self) -> Result<Dag, PlanError> {
        planner::Planner::new(self).create_dag()
    }
}
