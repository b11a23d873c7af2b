//! Modelos del sistema
//!
//! Este módulo contiene los modelos de datos del núcleo de seguimiento
//! y las filas de los colaboradores que el núcleo solo lee.

pub mod crew;
pub mod eod_report;
pub mod job;
pub mod session;
pub mod sign_off;

pub use crew::{Crew, CrewStatus, LatLng};
pub use eod_report::{CrewEodInput, EodJobEntry, EodReport, EodSummary, Expense, ReadinessFlags};
pub use job::{Job, JobRef, JobStatus, JobType};
pub use session::{Checkpoint, TrackingSession, TrackingStatus};
pub use sign_off::{Incident, SignOff, DAMAGE_ISSUE_TYPE};
