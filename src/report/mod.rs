mod assembler;
mod evaluator;

pub use assembler::*;
pub use evaluator::*;
