//! Bounded traversal engine: tree rendering, script classification,
//! snapshot manifests, manifest integrity.

pub mod classifier;
pub mod integrity;
pub mod listing;
pub mod snapshot;
pub mod syntax;
pub mod tree;
