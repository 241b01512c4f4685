mod cancel;
mod orchestrator;
mod pipeline;
mod pool;
mod run;
mod service;
mod validation;

pub use cancel::*;
pub use orchestrator::Orchestrator;
pub use pipeline::Pipeline;
pub use pool::{WorkerPermit, WorkerPool};
pub use run::*;
pub use service::*;
pub use validation::validate;
