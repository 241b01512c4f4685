pub(crate) mod backoff;
pub(crate) mod ellipsis;
pub(crate) mod maybe_sync;
pub(crate) mod normalize;
pub(crate) mod random;
pub(crate) mod sleep;
#[cfg(test)]
pub(crate) mod test;

pub(crate) use backoff::*;
pub(crate) use ellipsis::*;
pub use maybe_sync::*;
pub(crate) use normalize::{Normalize, cosine_similarity};
pub(crate) use random::*;
pub(crate) use sleep::*;
