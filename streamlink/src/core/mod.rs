pub mod aggregate;
pub mod checkpoint;
pub mod element;
pub mod error;
pub mod function;
pub mod processor;
pub mod watermark;
pub mod window;

pub use error::*;
