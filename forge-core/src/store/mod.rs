pub mod connection;
pub mod engine;
pub mod repo;
pub mod schema;

pub use engine::{MoveToWire, Store};
pub use repo::LoopFilter;
