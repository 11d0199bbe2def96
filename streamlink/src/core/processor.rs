use std::fmt::Debug;
use std::sync::Arc;

use crate::core::element::Element;

/// One parallel worker of a vertex. Instantiated by the execution runtime;
/// the planner only places suppliers on vertices.
pub trait Processor: Debug + Send {
    /// Processes one inbound element from `ordinal`, appending any outputs.
    fn process(
        &mut self,
        ordinal: usize,
        element: Element,
        output: &mut Vec<Element>,
    ) -> crate::core::Result<()>;

    /// Flushes remaining state at end of input.
    fn complete(&mut self, _output: &mut Vec<Element>) -> crate::core::Result<()> {
        Ok(())
    }
}

/// Creates the processor instances of one worker node.
pub trait ProcessorSupplier: Debug + Send + Sync {
    fn create(&self, count: usize) -> Vec<Box<dyn Processor>>;
}

/// Produces per-node [`ProcessorSupplier`]s; one meta supplier lives on every
/// vertex of the planned DAG.
pub trait ProcessorMetaSupplier: Debug + Send + Sync {
    fn supplier(&self, node_index: usize) -> Arc<dyn ProcessorSupplier>;
}

/// Adapts a plain supplier into a meta supplier that hands the same supplier
/// to every node.
#[derive(Debug)]
pub struct FromSupplier {
    supplier: Arc<dyn ProcessorSupplier>,
}

impl FromSupplier {
    pub fn of(supplier: Arc<dyn ProcessorSupplier>) -> Arc<dyn ProcessorMetaSupplier> {
        Arc::new(FromSupplier { supplier })
    }
}

impl ProcessorMetaSupplier for FromSupplier {
    fn supplier(&self, _node_index: usize) -> Arc<dyn ProcessorSupplier> {
        self.supplier.clone()
    }
}

/// Supplier cloning processors out of a factory closure.
pub struct FnSupplier {
    name: String,
    new_fn: Box<dyn Fn() -> Box<dyn Processor> + Send + Sync>,
}

impl FnSupplier {
    pub fn new<F>(name: impl Into<String>, new_fn: F) -> Arc<dyn ProcessorSupplier>
    where
        F: Fn() -> Box<dyn Processor> + Send + Sync + 'static,
    {
        Arc::new(FnSupplier {
            name: name.into(),
            new_fn: Box::new(new_fn),
        })
    }
}

impl ProcessorSupplier for FnSupplier {
    fn create(&self, count: usize) -> Vec<Box<dyn Processor>> {
        (0..count).map(|_| (self.new_fn)()).collect()
    }
}

impl Debug for FnSupplier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSupplier").field("name", &self.name).finish()
    }
}
