//! Repositorios
//!
//! Acceso al estado canónico de seguimiento, en memoria o en PostgreSQL.

pub mod memory_store;
pub mod pg_store;
pub mod tracking_store;

pub use memory_store::{MemorySeed, MemoryStore};
pub use pg_store::PgTrackingStore;
pub use tracking_store::{PingWrite, SessionQuery, TrackingStore};
