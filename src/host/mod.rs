//! Read-only host queries: memory information and process identity.

mod identity;
mod meminfo;

pub use identity::{current_uid, HostIdentity};
pub use meminfo::MemInfo;
