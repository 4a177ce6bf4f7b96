//! Calendar collaborator
//!
//! Availability and booking against configured business hours. Writes are
//! serialized behind one lock so two concurrent sessions cannot book the
//! same window.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::BusinessConfig;
use crate::{Error, Result};

/// An open booking window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// A confirmed calendar event
#[derive(Debug, Clone)]
pub struct CalendarEvent {
    pub event_id: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
}

/// Details for creating an event
#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub caller_name: String,
    pub caller_phone: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    pub reason: String,
}

/// Availability and booking oracle
#[async_trait]
pub trait Calendar: Send + Sync {
    /// Whether a single window is free
    async fn check_availability(&self, start: DateTime<Utc>, duration_minutes: u32)
        -> Result<bool>;

    /// All free windows on a business day
    async fn get_available_slots(&self, day: NaiveDate, duration_minutes: u32)
        -> Result<Vec<Slot>>;

    /// Book an event; fails if the window conflicts
    async fn create_appointment(&self, request: &BookingRequest) -> Result<CalendarEvent>;

    /// Remove an event
    async fn cancel_appointment(&self, event_id: &str) -> Result<()>;

    /// Move an existing event to a new window
    async fn reschedule_appointment(
        &self,
        event_id: &str,
        new_start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<CalendarEvent>;
}

#[derive(Debug, Clone)]
struct BookedWindow {
    start: DateTime<Utc>,
    end: DateTime<Utc>,
}

/// In-process calendar generating slots from configured business hours
pub struct InMemoryCalendar {
    timezone: Tz,
    open_hour: u32,
    close_hour: u32,
    booked: Mutex<HashMap<String, BookedWindow>>,
}

impl InMemoryCalendar {
    /// Build a calendar from the business profile
    ///
    /// # Errors
    ///
    /// Returns error if the configured timezone is not a valid IANA name
    pub fn new(business: &BusinessConfig) -> Result<Self> {
        let timezone: Tz = business
            .timezone
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone: {}", business.timezone)))?;

        Ok(Self {
            timezone,
            open_hour: business.open_hour,
            close_hour: business.close_hour,
            booked: Mutex::new(HashMap::new()),
        })
    }

    fn business_day_bounds(&self, day: NaiveDate) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
        let open = self
            .timezone
            .with_ymd_and_hms(
                chrono::Datelike::year(&day),
                chrono::Datelike::month(&day),
                chrono::Datelike::day(&day),
                self.open_hour,
                0,
                0,
            )
            .single()?;
        let close = self
            .timezone
            .with_ymd_and_hms(
                chrono::Datelike::year(&day),
                chrono::Datelike::month(&day),
                chrono::Datelike::day(&day),
                self.close_hour,
                0,
                0,
            )
            .single()?;
        Some((open.with_timezone(&Utc), close.with_timezone(&Utc)))
    }

    fn overlaps(booked: &HashMap<String, BookedWindow>, start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
        booked.values().any(|w| start < w.end && w.start < end)
    }
}

#[async_trait]
impl Calendar for InMemoryCalendar {
    async fn check_availability(
        &self,
        start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<bool> {
        let end = start + Duration::minutes(i64::from(duration_minutes));

        let local_day = start.with_timezone(&self.timezone).date_naive();
        let Some((open, close)) = self.business_day_bounds(local_day) else {
            return Ok(false);
        };
        if start < open || end > close {
            return Ok(false);
        }

        let booked = self.booked.lock().await;
        Ok(!Self::overlaps(&booked, start, end))
    }

    async fn get_available_slots(
        &self,
        day: NaiveDate,
        duration_minutes: u32,
    ) -> Result<Vec<Slot>> {
        let Some((open, close)) = self.business_day_bounds(day) else {
            return Ok(Vec::new());
        };

        let step = Duration::minutes(i64::from(duration_minutes));
        let booked = self.booked.lock().await;

        let mut slots = Vec::new();
        let mut cursor = open;
        while cursor + step <= close {
            let end = cursor + step;
            if !Self::overlaps(&booked, cursor, end) {
                slots.push(Slot { start: cursor, end });
            }
            cursor = end;
        }

        Ok(slots)
    }

    async fn create_appointment(&self, request: &BookingRequest) -> Result<CalendarEvent> {
        let end = request.start + Duration::minutes(i64::from(request.duration_minutes));

        let mut booked = self.booked.lock().await;
        if Self::overlaps(&booked, request.start, end) {
            return Err(Error::Calendar(format!(
                "window at {} is already booked",
                request.start.to_rfc3339()
            )));
        }

        let event_id = Uuid::new_v4().to_string();
        booked.insert(
            event_id.clone(),
            BookedWindow {
                start: request.start,
                end,
            },
        );

        tracing::info!(
            event_id = %event_id,
            start = %request.start,
            duration = request.duration_minutes,
            "calendar event created"
        );

        Ok(CalendarEvent {
            event_id,
            start: request.start,
            duration_minutes: request.duration_minutes,
        })
    }

    async fn cancel_appointment(&self, event_id: &str) -> Result<()> {
        let mut booked = self.booked.lock().await;
        booked
            .remove(event_id)
            .map(|_| ())
            .ok_or_else(|| Error::Calendar(format!("unknown event: {event_id}")))
    }

    async fn reschedule_appointment(
        &self,
        event_id: &str,
        new_start: DateTime<Utc>,
        duration_minutes: u32,
    ) -> Result<CalendarEvent> {
        let end = new_start + Duration::minutes(i64::from(duration_minutes));

        let mut booked = self.booked.lock().await;
        if !booked.contains_key(event_id) {
            return Err(Error::Calendar(format!("unknown event: {event_id}")));
        }

        // Exclude the event being moved from its own conflict check
        let conflicting = booked
            .iter()
            .any(|(id, w)| id != event_id && new_start < w.end && w.start < end);
        if conflicting {
            return Err(Error::Calendar(format!(
                "window at {} is already booked",
                new_start.to_rfc3339()
            )));
        }

        booked.insert(
            event_id.to_string(),
            BookedWindow {
                start: new_start,
                end,
            },
        );

        Ok(CalendarEvent {
            event_id: event_id.to_string(),
            start: new_start,
            duration_minutes,
        })
    }
}
