//! Appointment repository

use chrono::{DateTime, Utc};
use uuid::Uuid;

use super::DbPool;
use crate::{Error, Result};

/// A persisted appointment record
#[derive(Debug, Clone)]
pub struct Appointment {
    pub id: String,
    /// Calendar event this record is keyed to
    pub event_id: String,
    pub caller_name: String,
    pub caller_phone: String,
    pub start_time: DateTime<Utc>,
    pub duration_minutes: u32,
    pub reason: String,
    pub status: AppointmentStatus,
    pub created_at: DateTime<Utc>,
}

/// Lifecycle status of an appointment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppointmentStatus {
    Confirmed,
    Cancelled,
    Completed,
    NoShow,
}

impl AppointmentStatus {
    const fn as_str(self) -> &'static str {
        match self {
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Completed => "completed",
            Self::NoShow => "no_show",
        }
    }

    fn from_str(s: &str) -> Option<Self> {
        match s {
            "confirmed" => Some(Self::Confirmed),
            "cancelled" => Some(Self::Cancelled),
            "completed" => Some(Self::Completed),
            "no_show" => Some(Self::NoShow),
            _ => None,
        }
    }
}

/// Appointment repository
#[derive(Clone)]
pub struct AppointmentRepo {
    pool: DbPool,
}

impl AppointmentRepo {
    /// Create a new appointment repository
    #[must_use]
    pub const fn new(pool: DbPool) -> Self {
        Self { pool }
    }

    /// Persist a new appointment keyed to its calendar event
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn create(
        &self,
        event_id: &str,
        caller_name: &str,
        caller_phone: &str,
        start_time: DateTime<Utc>,
        duration_minutes: u32,
        reason: &str,
    ) -> Result<Appointment> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let id = Uuid::new_v4().to_string();
        let now = Utc::now();

        conn.execute(
            "INSERT INTO appointments
                (id, event_id, caller_name, caller_phone, start_time, duration_minutes, reason, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            rusqlite::params![
                &id,
                event_id,
                caller_name,
                caller_phone,
                start_time.to_rfc3339(),
                duration_minutes,
                reason,
                now.to_rfc3339(),
            ],
        )
        .map_err(|e| Error::Database(e.to_string()))?;

        Ok(Appointment {
            id,
            event_id: event_id.to_string(),
            caller_name: caller_name.to_string(),
            caller_phone: caller_phone.to_string(),
            start_time,
            duration_minutes,
            reason: reason.to_string(),
            status: AppointmentStatus::Confirmed,
            created_at: now,
        })
    }

    /// Update an appointment's lifecycle status
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails or the id is unknown
    pub fn update_status(&self, id: &str, status: AppointmentStatus) -> Result<()> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let changed = conn
            .execute(
                "UPDATE appointments SET status = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![status.as_str(), Utc::now().to_rfc3339(), id],
            )
            .map_err(|e| Error::Database(e.to_string()))?;

        if changed == 0 {
            return Err(Error::Database(format!("appointment not found: {id}")));
        }
        Ok(())
    }

    /// List appointments for a caller phone number, most recent first
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn find_by_phone(&self, phone: &str) -> Result<Vec<Appointment>> {
        self.query(
            "SELECT id, event_id, caller_name, caller_phone, start_time, duration_minutes, reason, status, created_at
             FROM appointments WHERE caller_phone = ?1 ORDER BY start_time DESC",
            rusqlite::params![phone],
        )
    }

    /// List confirmed appointments starting inside a window, soonest first
    ///
    /// # Errors
    ///
    /// Returns error if the database operation fails
    pub fn find_in_window(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<Appointment>> {
        self.query(
            "SELECT id, event_id, caller_name, caller_phone, start_time, duration_minutes, reason, status, created_at
             FROM appointments
             WHERE status = 'confirmed' AND start_time >= ?1 AND start_time < ?2
             ORDER BY start_time ASC",
            rusqlite::params![from.to_rfc3339(), to.to_rfc3339()],
        )
    }

    fn query(&self, sql: &str, params: impl rusqlite::Params) -> Result<Vec<Appointment>> {
        let conn = self.pool.get().map_err(|e| Error::Database(e.to_string()))?;

        let mut stmt = conn.prepare(sql).map_err(|e| Error::Database(e.to_string()))?;
        let rows = stmt
            .query_map(params, |row| {
                Ok(Appointment {
                    id: row.get(0)?,
                    event_id: row.get(1)?,
                    caller_name: row.get(2)?,
                    caller_phone: row.get(3)?,
                    start_time: parse_datetime(&row.get::<_, String>(4)?),
                    duration_minutes: row.get(5)?,
                    reason: row.get(6)?,
                    status: AppointmentStatus::from_str(&row.get::<_, String>(7)?)
                        .unwrap_or(AppointmentStatus::Confirmed),
                    created_at: parse_datetime(&row.get::<_, String>(8)?),
                })
            })
            .map_err(|e| Error::Database(e.to_string()))?
            .filter_map(std::result::Result::ok)
            .collect();

        Ok(rows)
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).map_or_else(|_| Utc::now(), |dt| dt.with_timezone(&Utc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::init_memory;
    use chrono::TimeZone;

    fn setup() -> AppointmentRepo {
        AppointmentRepo::new(init_memory().unwrap())
    }

    fn start() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 14, 0, 0).unwrap()
    }

    #[test]
    fn create_and_find_by_phone() {
        let repo = setup();

        let appt = repo
            .create("evt-1", "Dana Reyes", "+15550001111", start(), 30, "cleaning")
            .unwrap();
        assert_eq!(appt.status, AppointmentStatus::Confirmed);

        let found = repo.find_by_phone("+15550001111").unwrap();
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].event_id, "evt-1");
        assert_eq!(found[0].start_time, start());
    }

    #[test]
    fn duplicate_event_id_is_rejected() {
        let repo = setup();
        repo.create("evt-1", "A", "+15550001111", start(), 30, "").unwrap();
        assert!(repo.create("evt-1", "B", "+15550002222", start(), 30, "").is_err());
    }

    #[test]
    fn status_update_and_window_query() {
        let repo = setup();
        let appt = repo
            .create("evt-2", "Sam", "+15550003333", start(), 30, "checkup")
            .unwrap();

        let window = repo
            .find_in_window(start() - chrono::Duration::hours(1), start() + chrono::Duration::hours(1))
            .unwrap();
        assert_eq!(window.len(), 1);

        repo.update_status(&appt.id, AppointmentStatus::Cancelled).unwrap();
        let window = repo
            .find_in_window(start() - chrono::Duration::hours(1), start() + chrono::Duration::hours(1))
            .unwrap();
        assert!(window.is_empty());
    }

    #[test]
    fn unknown_status_update_errors() {
        let repo = setup();
        assert!(repo.update_status("missing", AppointmentStatus::Cancelled).is_err());
    }
}
