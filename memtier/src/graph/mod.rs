mod store;

pub use store::GraphStore;
