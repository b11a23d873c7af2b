//! Cache de reportes EOD
//!
//! Guarda cada reporte por equipo y fecha. Regenerar sobreescribe la clave.
//! Cualquier fallo de Redis se degrada a leer del store.

use chrono::NaiveDate;
use tracing::warn;
use uuid::Uuid;

use super::{CacheOperations, RedisClient};
use crate::models::EodReport;

#[derive(Clone)]
pub struct ReportCache {
    client: RedisClient,
    ttl: u64,
}

impl ReportCache {
    pub fn new(client: RedisClient, ttl: u64) -> Self {
        Self { client, ttl }
    }

    fn key(&self, team_id: Uuid, date: NaiveDate) -> String {
        self.client
            .eod_report_key(&team_id.to_string(), &date.format("%Y-%m-%d").to_string())
    }

    pub async fn get(&self, team_id: Uuid, date: NaiveDate) -> Option<EodReport> {
        match self.client.get::<EodReport>(&self.key(team_id, date)).await {
            Ok(report) => report,
            Err(e) => {
                warn!("⚠️ Reporte EOD en cache ilegible ({} {}): {}", team_id, date, e);
                None
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    pub async fn put(&self, report: &EodReport) {
        let key = self.key(report.team_id, report.report_date);
        if let Err(e) = self.client.set(&key, report, self.ttl).await {
            warn!("⚠️ No se pudo cachear el reporte EOD {}: {}", key, e);
        }
    }
}
