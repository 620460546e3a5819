//! Loop state engine, queue engine, and durable store for the forge
//! control plane. This crate owns every entity named in the data model:
//! loops, queue items, per-loop memory, work context, and the audit log.
//! It knows nothing about how a loop's iteration is actually run — see
//! `forge-runtime` for that — and nothing about where a runner process is
//! spawned — see `forge-supervisor`.

pub mod error;
pub mod ids;
pub mod model;
pub mod queue;
pub mod state_machine;
pub mod store;

pub use error::{ForgeError, Result};
pub use model::*;
pub use store::Store;
