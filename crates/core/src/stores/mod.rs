pub mod memory;
pub mod qdrant;

pub use memory::{InMemoryVectorStore, MemoryStoreProvider};
pub use qdrant::{QdrantStore, QdrantStoreProvider};
