mod access;
mod store;

pub use access::MemoryAccessControl;
pub use store::{AlertRow, MemoryRuleStore};
