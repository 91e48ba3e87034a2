//! Maintenance CLIs: operate directly on the index and state store outside
//! the normal pipeline flow.

pub mod cleanup;
pub mod reset;
