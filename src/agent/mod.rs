mod agent;
mod parser;
mod prompt;
mod schema;

pub use agent::Agent;
pub use parser::{ParsedOutput, parse_output};
pub use prompt::PromptBuilder;
pub(crate) use prompt::collapse_blank_lines;
pub use schema::{FieldSpec, StageSchema};
