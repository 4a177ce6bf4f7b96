//! Booking collaborators behind narrow async interfaces
//!
//! The conversational core treats the calendar and the SMS notifier as
//! opaque oracles; everything here is swappable for fakes in tests.

pub mod calendar;
pub mod notify;

pub use calendar::{BookingRequest, Calendar, CalendarEvent, InMemoryCalendar, Slot};
pub use notify::{ConfirmationDetails, Notifier, TwilioSms};
