//! Locks por equipo
//!
//! Serializa las escrituras de un mismo equipo (rechazo de pings viejos y
//! orden de checkpoints) sin bloquear a los demás equipos.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Default)]
pub struct CrewLocks {
    locks: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl CrewLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Esperar el turno del equipo. El guard libera el lock al soltarse.
    pub async fn acquire(&self, team_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut locks = self.locks.lock().await;
            Arc::clone(locks.entry(team_id).or_default())
        };
        lock.lock_owned().await
    }

    /// Soltar las entradas que nadie está usando
    pub async fn prune(&self) {
        self.locks
            .lock()
            .await
            .retain(|_, lock| Arc::strong_count(lock) > 1);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.locks.lock().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_same_crew_is_serialized() {
        let locks = CrewLocks::new();
        let team = Uuid::new_v4();

        let guard = locks.acquire(team).await;
        let contended = tokio::time::timeout(Duration::from_millis(50), locks.acquire(team)).await;
        assert!(contended.is_err());

        drop(guard);
        let reacquired = tokio::time::timeout(Duration::from_millis(50), locks.acquire(team)).await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn test_different_crews_do_not_block_each_other() {
        let locks = CrewLocks::new();
        let _a = locks.acquire(Uuid::new_v4()).await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire(Uuid::new_v4())).await;
        assert!(other.is_ok());
    }

    #[tokio::test]
    async fn test_prune_keeps_held_locks() {
        let locks = CrewLocks::new();
        let held = Uuid::new_v4();
        let _guard = locks.acquire(held).await;
        drop(locks.acquire(Uuid::new_v4()).await);

        locks.prune().await;
        assert_eq!(locks.len().await, 1);
    }
}
