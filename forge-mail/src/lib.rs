//! Inter-loop mail and advisory file locks: a per-project mailbox with
//! read/ack tracking, selecting a local SQLite backend or a remote
//! JSON-RPC backend as a function of configuration.

pub mod client;
pub mod local;
pub mod model;
pub mod remote;

pub use client::{LockClient, MailClient, MailConfig};
pub use model::{FileLock, Importance, InboxQuery, LockConflictInfo, MailMessage};
