//! Test support for the agora feed cache: an in-memory server, a static
//! identity, and record fixtures.

mod auth;
pub mod fixtures;
mod memory;

pub use auth::StaticAuth;
pub use memory::MemoryService;
