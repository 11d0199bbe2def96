use std::any::Any;
use std::fmt::Debug;

use async_trait::async_trait;

use crate::core::element::{Element, Record};

/// Base trait of all user functions.
pub trait NamedFunction {
    fn name(&self) -> &str;
}

pub trait MapFunction: NamedFunction + Debug + Send + Sync {
    fn map(&self, record: Record) -> Record;
}

pub trait FilterFunction: NamedFunction + Debug + Send + Sync {
    fn filter(&self, record: &Record) -> bool;
}

pub trait FlatMapFunction: NamedFunction + Debug + Send + Sync {
    fn flat_map(&self, record: Record) -> Vec<Record>;
}

/// Extracts the grouping key of a record. The key is itself a record so that
/// partitioned edges can route on it without knowing the payload layout.
pub trait KeySelectorFunction: NamedFunction + Debug + Send + Sync {
    fn get_key(&self, record: &Record) -> Record;
}

/// Creates the per-processor context object a context-mapping function works
/// against (a connection pool, a model handle, ...).
pub trait ContextFactory: Debug + Send + Sync {
    fn create_context(&self) -> Box<dyn Any + Send>;
}

pub trait MapWithContextFunction: NamedFunction + Debug + Send + Sync {
    /// Maps `record` against the context; `None` filters the record out.
    fn map(&self, context: &mut (dyn Any + Send), record: Record) -> Option<Record>;
}

/// Async variant of [`MapWithContextFunction`]. The enclosing transform
/// carries the bounded concurrency budget; the function itself is free of it.
#[async_trait]
pub trait AsyncMapWithContextFunction: NamedFunction + Debug + Send + Sync {
    async fn map(&self, context: &mut (dyn Any + Send), record: Record) -> Option<Record>;
}

/// Formats an element for the logging tap installed by a peeked transform.
pub trait PeekFunction: Debug + Send + Sync {
    fn format(&self, element: &Element) -> String;
}

/// Default peek rendering: `Debug` of the element.
#[derive(Debug, Default)]
pub struct DebugPeek;

impl PeekFunction for DebugPeek {
    fn format(&self, element: &Element) -> String {
        format!("{:?}", element)
    }
}
