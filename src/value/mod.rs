pub(crate) mod agent_io;
pub(crate) mod chunk;
pub(crate) mod embedding;
pub(crate) mod patient;
pub(crate) mod report_type;

pub use agent_io::*;
pub use chunk::*;
pub use embedding::*;
pub use patient::*;
pub use report_type::*;
