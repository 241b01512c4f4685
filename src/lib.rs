extern crate alloc;

pub mod agent;
pub mod config;
pub(crate) mod constants;
pub mod error;
pub mod knowledge;
pub mod model;
pub mod report;
pub mod storage;
pub mod training;
pub mod utils;
pub mod value;
pub mod vector_store;
pub mod workflow;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, Result};
pub use workflow::Pipeline;
