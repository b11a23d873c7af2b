//! Máquina de estados de las sesiones de seguimiento
//!
//! `not_started → en_route → arrived → in_progress → completed`, con
//! `cancelled` alcanzable desde cualquier estado no terminal. Un checkpoint
//! con el estado actual, uno posterior o `cancelled` se acepta; uno
//! anterior se descarta y la sesión queda igual.

use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Checkpoint, Job, TrackingSession, TrackingStatus};

/// Motivo por el que un checkpoint no se aplicó
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("session is already {status}, no further checkpoints accepted")]
    Terminal { status: TrackingStatus },

    #[error("backward transition {from} -> {to} rejected")]
    Backward {
        from: TrackingStatus,
        to: TrackingStatus,
    },

    #[error("checkpoint at {got} is older than the last checkpoint at {last}")]
    OutOfOrder {
        last: DateTime<Utc>,
        got: DateTime<Utc>,
    },
}

/// Resultado de aplicar un checkpoint aceptado
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: TrackingStatus,
    pub to: TrackingStatus,
}

impl Transition {
    pub fn is_status_change(&self) -> bool {
        self.from != self.to
    }

    pub fn reached_terminal(&self) -> bool {
        self.to.is_terminal()
    }
}

/// Comprobar si `from → to` es una transición válida
pub fn check_transition(from: TrackingStatus, to: TrackingStatus) -> Result<(), TransitionError> {
    if from.is_terminal() {
        return Err(TransitionError::Terminal { status: from });
    }
    if to == TrackingStatus::Cancelled {
        return Ok(());
    }
    match (from.rank(), to.rank()) {
        (Some(current), Some(next)) if next >= current => Ok(()),
        _ => Err(TransitionError::Backward { from, to }),
    }
}

/// Crear la sesión de un equipo para un trabajo
pub fn start_session(job: &Job, team_id: Uuid, started_at: DateTime<Utc>) -> TrackingSession {
    TrackingSession {
        id: Uuid::new_v4(),
        job_id: job.id,
        job_type: job.job_type,
        team_id,
        status: TrackingStatus::NotStarted,
        started_at,
        completed_at: None,
        checkpoints: Vec::new(),
        updated_at: started_at,
    }
}

impl TrackingSession {
    /// Validar y añadir un checkpoint. Si se rechaza, la sesión no cambia.
    pub fn apply_checkpoint(&mut self, checkpoint: Checkpoint) -> Result<Transition, TransitionError> {
        check_transition(self.status, checkpoint.status)?;

        if let Some(last) = self.last_checkpoint() {
            if checkpoint.timestamp < last.timestamp {
                return Err(TransitionError::OutOfOrder {
                    last: last.timestamp,
                    got: checkpoint.timestamp,
                });
            }
        }

        let transition = Transition {
            from: self.status,
            to: checkpoint.status,
        };

        self.status = checkpoint.status;
        self.updated_at = checkpoint.timestamp;
        if transition.reached_terminal() {
            self.completed_at = Some(checkpoint.timestamp);
        }
        self.checkpoints.push(checkpoint);

        Ok(transition)
    }

    /// Timestamp mínimo que puede llevar el próximo checkpoint
    pub fn checkpoint_floor(&self) -> DateTime<Utc> {
        self.last_checkpoint()
            .map(|c| c.timestamp)
            .unwrap_or(self.started_at)
            .max(self.started_at)
    }
}
