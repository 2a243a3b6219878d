//! Data models for the Thing registry.
//!
//! Descriptions are opaque to the registry apart from identity and addressing;
//! every other field is carried through verbatim.

mod description;
mod thing;

pub use description::*;
pub use thing::*;
