mod store;

pub use store::VectorStore;
