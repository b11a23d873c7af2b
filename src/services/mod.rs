//! Services module
//!
//! Este módulo contiene la lógica de negocio del seguimiento de equipos:
//! ingesta de posiciones, máquina de estados de sesiones, resolución del
//! trabajo actual, difusión en vivo y agregación de fin de día.

pub mod broadcaster;
pub mod crew_job_resolver;
pub mod crew_locks;
pub mod eod_aggregator;
pub mod ingestion_gateway;
pub mod live_feed;
pub mod session_machine;

pub use broadcaster::Broadcaster;
pub use crew_job_resolver::{CrewJobResolver, JobResolution};
pub use eod_aggregator::{EodAggregator, EodRequest};
pub use ingestion_gateway::{IngestOutcome, IngestionGateway, PingStatus, PositionPing};
pub use live_feed::{FeedMode, FeedUpdate, LiveFeed, PushSource, SnapshotSource};
