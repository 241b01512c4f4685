mod flat;

pub use flat::*;
