//! Database schema and migrations

use rusqlite::Connection;

use crate::Result;

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Initialize the database schema
///
/// # Errors
///
/// Returns error if migration fails
pub fn init(conn: &Connection) -> Result<()> {
    let version: i32 = conn
        .query_row("PRAGMA user_version", [], |row| row.get(0))
        .unwrap_or(0);

    if version < 1 {
        migrate_v1(conn)?;
    }

    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r"
        -- Booked appointments, keyed to the calendar event
        CREATE TABLE IF NOT EXISTS appointments (
            id TEXT PRIMARY KEY,
            event_id TEXT NOT NULL UNIQUE,
            caller_name TEXT NOT NULL,
            caller_phone TEXT NOT NULL,
            start_time TEXT NOT NULL,
            duration_minutes INTEGER NOT NULL,
            reason TEXT NOT NULL DEFAULT '',
            status TEXT NOT NULL DEFAULT 'confirmed'
                CHECK(status IN ('confirmed', 'cancelled', 'completed', 'no_show')),
            created_at TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE INDEX IF NOT EXISTS idx_appointments_phone ON appointments(caller_phone);
        CREATE INDEX IF NOT EXISTS idx_appointments_start ON appointments(start_time);

        -- One row per completed phone call
        CREATE TABLE IF NOT EXISTS call_logs (
            id TEXT PRIMARY KEY,
            call_id TEXT NOT NULL,
            caller_number TEXT NOT NULL,
            callee_number TEXT NOT NULL,
            started_at TEXT NOT NULL,
            ended_at TEXT NOT NULL,
            duration_seconds INTEGER NOT NULL,
            transcript TEXT NOT NULL,
            appointment_booked INTEGER NOT NULL DEFAULT 0,
            appointment_id TEXT,
            reasoning_calls INTEGER NOT NULL DEFAULT 0,
            total_latency_ms INTEGER NOT NULL DEFAULT 0,
            total_cost_usd REAL NOT NULL DEFAULT 0,
            last_provider TEXT
        );

        CREATE INDEX IF NOT EXISTS idx_call_logs_caller ON call_logs(caller_number);
        CREATE INDEX IF NOT EXISTS idx_call_logs_started ON call_logs(started_at);

        PRAGMA user_version = 1;
        ",
    )?;

    Ok(())
}
