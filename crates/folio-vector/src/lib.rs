//! Exact vector index over embedded chunks, its LanceDB persistence, and a
//! snapshot handle for swapping in rebuilt indexes.

pub mod handle;
pub mod index;
pub mod schema;
pub mod table;

pub use handle::IndexHandle;
pub use index::{IndexSchema, VectorIndex};
