#[macro_use]
extern crate serde_derive;
#[macro_use]
extern crate log;
#[macro_use]
extern crate lazy_static;
#[macro_use]
extern crate anyhow;

pub mod core;
pub mod dag;
pub mod functions;
pub mod pipeline;
pub mod utils;
