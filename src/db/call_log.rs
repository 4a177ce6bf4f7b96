//! Call log repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// A persisted record of one completed call
#[derive(Debug, Clone)]
pub struct CallLog {
    pub id: String,
    /// Transport call identifier
    pub call_id: String,
    pub caller_number: String,
    pub callee_number: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub duration_seconds: i64,
    /// Speaker-tagged transcript, one line per utterance
    pub transcript: String,
    pub appointment_booked: bool,
    pub appointment_id: Option<String>,
    pub reasoning_calls: u32,
    pub total_latency_ms: u64,
    pub total_cost_usd: f64,
    pub last_provider: Option<String>,
}

/// Call log repository
#[derive(Clone)]
pub struct CallLogRepo {
    pool: DbPool,
}

impl CallLogRepo {
    /// Create a new call log repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a completed call
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn create(&self, log: &CallLog) -> Result<String> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let id = if log.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            log.id.clone()
        };

        conn.execute(
            "INSERT INTO call_logs
                (id, call_id, caller_number, callee_number, started_at, ended_at,
                 duration_seconds, transcript, appointment_booked, appointment_id,
                 reasoning_calls, total_latency_ms, total_cost_usd, last_provider)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            rusqlite::params![
                &id,
                &log.call_id,
                &log.caller_number,
                &log.callee_number,
                log.started_at.to_rfc3339(),
                log.ended_at.to_rfc3339(),
                log.duration_seconds,
                &log.transcript,
                log.appointment_booked,
                &log.appointment_id,
                log.reasoning_calls,
                i64::try_from(log.total_latency_ms).unwrap_or(i64::MAX),
                log.total_cost_usd,
                &log.last_provider,
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(id)
    }

    /// List call logs for a caller number, most recent first
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn find_by_caller(&self, caller_number: &str) -> Result<Vec<CallLog>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn
            .prepare(
                "SELECT id, call_id, caller_number, callee_number, started_at, ended_at,
                        duration_seconds, transcript, appointment_booked, appointment_id,
                        reasoning_calls, total_latency_ms, total_cost_usd, last_provider
                 FROM call_logs WHERE caller_number = ?1 ORDER BY started_at DESC",
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        let logs = stmt
            .query_map([caller_number], |row| {
                Ok(CallLog {
                    id: row.get(0)?,
                    call_id: row.get(1)?,
                    caller_number: row.get(2)?,
                    callee_number: row.get(3)?,
                    started_at: parse_datetime(&row.get::<_, String>(4)?),
                    ended_at: parse_datetime(&row.get::<_, String>(5)?),
                    duration_seconds: row.get(6)?,
                    transcript: row.get(7)?,
                    appointment_booked: row.get(8)?,
                    appointment_id: row.get(9)?,
                    reasoning_calls: row.get(10)?,
                    total_latency_ms: row.get::<_, i64>(11)?.try_into().unwrap_or(0),
                    total_cost_usd: row.get(12)?,
                    last_provider: row.get(13)?,
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(logs)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}
