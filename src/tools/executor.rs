//! Tool execution against the booking collaborators
//!
//! Every handler failure is caught here and converted into a structured
//! result the reasoning engine can narrate; the session loop never sees an
//! unhandled fault from a tool.

use std::sync::Arc;

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};
use chrono_tz::Tz;

use crate::booking::{BookingRequest, Calendar, ConfirmationDetails, Notifier};
use crate::config::BusinessConfig;
use crate::db::AppointmentRepo;
use crate::session::AppointmentDraft;
use crate::timezone::{infer_timezone, parse_time_of_day};
use crate::tools::{
    CheckAvailabilityArgs, CreateAppointmentArgs, EndCallArgs, GetAvailableSlotsArgs,
    SetCallerTimezoneArgs, ToolCall, ToolInvocation, UpdateAppointmentInfoArgs,
};
use crate::{Error, Result};

/// The structured outcome of one invocation
#[derive(Debug, Clone)]
pub struct ToolResult {
    pub invocation_id: String,
    pub payload: serde_json::Value,
    /// Signals the session to schedule termination
    pub end_call: bool,
}

/// Executes tool invocations against the calendar, notifier, and record store
pub struct ToolExecutor {
    calendar: Arc<dyn Calendar>,
    notifier: Option<Arc<dyn Notifier>>,
    appointments: AppointmentRepo,
    business: BusinessConfig,
    business_tz: Tz,
}

impl ToolExecutor {
    /// Create an executor over the booking collaborators
    ///
    /// # Errors
    ///
    /// Returns error if the configured business timezone is invalid
    pub fn new(
        calendar: Arc<dyn Calendar>,
        notifier: Option<Arc<dyn Notifier>>,
        appointments: AppointmentRepo,
        business: BusinessConfig,
    ) -> Result<Self> {
        let business_tz: Tz = business
            .timezone
            .parse()
            .map_err(|_| Error::Config(format!("unknown timezone: {}", business.timezone)))?;
        Ok(Self {
            calendar,
            notifier,
            appointments,
            business,
            business_tz,
        })
    }

    /// Execute a raw provider tool-call request. Parse failures become
    /// structured error results keyed to the request id, so the turn
    /// continues regardless.
    pub async fn execute_request(
        &self,
        request: &crate::agent::ToolCallRequest,
        draft: &mut AppointmentDraft,
        now: DateTime<Utc>,
    ) -> ToolResult {
        match ToolInvocation::from_request(request) {
            Ok(invocation) => self.execute_at(&invocation, draft, now).await,
            Err(error) => {
                tracing::warn!(tool = %request.name, %error, "unparseable tool call");
                ToolResult {
                    invocation_id: request.id.clone(),
                    payload: serde_json::json!({
                        "error": format!("Invalid tool call ({error}). Use only the declared tools and argument shapes."),
                    }),
                    end_call: false,
                }
            }
        }
    }

    /// Execute one parsed invocation with an explicit clock, mutating the
    /// session draft as a side effect
    pub async fn execute_at(
        &self,
        invocation: &ToolInvocation,
        draft: &mut AppointmentDraft,
        now: DateTime<Utc>,
    ) -> ToolResult {
        let name = invocation.call.name();
        let mut end_call = false;

        let outcome = match &invocation.call {
            ToolCall::SetCallerTimezone(args) => self.set_caller_timezone(args, draft, now),
            ToolCall::CheckAvailability(args) => self.check_availability(args).await,
            ToolCall::GetAvailableSlots(args) => self.get_available_slots(args, draft, now).await,
            ToolCall::CreateAppointment(args) => self.create_appointment(args, draft).await,
            ToolCall::UpdateAppointmentInfo(args) => Ok(Self::update_appointment_info(args, draft)),
            ToolCall::EndCallWithConfirmation(args) => {
                end_call = true;
                Ok(Self::end_call(args, draft))
            }
        };

        let payload = outcome.unwrap_or_else(|error| {
            tracing::warn!(tool = name, %error, "tool handler failed");
            serde_json::json!({ "error": fallback_message(name) })
        });

        tracing::debug!(tool = name, id = %invocation.id, "tool executed");

        ToolResult {
            invocation_id: invocation.id.clone(),
            payload,
            end_call,
        }
    }

    fn set_caller_timezone(
        &self,
        args: &SetCallerTimezoneArgs,
        draft: &mut AppointmentDraft,
        now: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        // Vague reports ("afternoon") are rejected here, not in the parser:
        // the model should ask for an actual clock reading.
        if !args.current_time.chars().any(|c| c.is_ascii_digit()) {
            return Ok(serde_json::json!({
                "error": "That is not a specific clock time. Ask the caller what time their clock shows right now."
            }));
        }

        match infer_timezone(&args.current_time, now) {
            Ok(inferred) => {
                draft.timezone_offset_minutes = Some(inferred.offset_minutes);
                draft.caller_local_time = Some(inferred.reported_local_24h.clone());
                draft.caller_timezone = inferred.tz.parse().ok();
                Ok(serde_json::json!({
                    "timezone": inferred.tz,
                    "offset_minutes": inferred.offset_minutes,
                    "caller_local_time": inferred.reported_local_24h,
                }))
            }
            Err(reason) => Ok(serde_json::json!({
                "error": format!("Could not read that time ({reason}). Ask the caller to repeat it, like '2:30 pm'.")
            })),
        }
    }

    async fn check_availability(&self, args: &CheckAvailabilityArgs) -> Result<serde_json::Value> {
        let start = self.resolve_start(&args.date, &args.time)?;
        let duration = self.duration_or_default(args.duration_minutes);
        let available = self.calendar.check_availability(start, duration).await?;
        Ok(serde_json::json!({
            "date": args.date,
            "time": args.time,
            "available": available,
        }))
    }

    async fn get_available_slots(
        &self,
        args: &GetAvailableSlotsArgs,
        draft: &AppointmentDraft,
        now: DateTime<Utc>,
    ) -> Result<serde_json::Value> {
        let day = parse_date(&args.date)?;
        let duration = self.duration_or_default(args.duration_minutes);
        let mut slots = self.calendar.get_available_slots(day, duration).await?;

        // For today, drop anything starting inside a 2-hour buffer of the
        // caller's current local clock
        let display_tz = draft.caller_timezone.unwrap_or(self.business_tz);
        if day == now.with_timezone(&display_tz).date_naive() {
            let cutoff = now + Duration::hours(2);
            slots.retain(|slot| slot.start >= cutoff);
        }

        let rendered: Vec<serde_json::Value> = slots
            .iter()
            .map(|slot| {
                serde_json::json!({
                    "time": slot.start.with_timezone(&self.business_tz).format("%H:%M").to_string(),
                    "spoken": slot.start.with_timezone(&display_tz).format("%-I:%M %p").to_string(),
                })
            })
            .collect();

        if rendered.is_empty() {
            Ok(serde_json::json!({
                "date": args.date,
                "slots": [],
                "note": "No openings remain on this day; offer another day.",
            }))
        } else {
            Ok(serde_json::json!({ "date": args.date, "slots": rendered }))
        }
    }

    async fn create_appointment(
        &self,
        args: &CreateAppointmentArgs,
        draft: &mut AppointmentDraft,
    ) -> Result<serde_json::Value> {
        let start = self.resolve_start(&args.date, &args.time)?;
        let duration = self.duration_or_default(args.duration_minutes);
        let phone = args
            .phone
            .clone()
            .or_else(|| draft.caller_phone.clone())
            .unwrap_or_default();
        let reason = args.reason.clone().unwrap_or_default();

        let request = BookingRequest {
            caller_name: args.name.clone(),
            caller_phone: phone.clone(),
            start,
            duration_minutes: duration,
            reason: reason.clone(),
        };

        let event = match self.calendar.create_appointment(&request).await {
            Ok(event) => event,
            Err(error) => {
                tracing::warn!(%error, "booking rejected by calendar");
                return Ok(serde_json::json!({
                    "error": "That time is no longer open. Offer the caller another slot."
                }));
            }
        };

        let record = self.appointments.create(
            &event.event_id,
            &args.name,
            &phone,
            start,
            duration,
            &reason,
        )?;

        draft.caller_name = Some(args.name.clone());
        if !reason.is_empty() {
            draft.reason = Some(reason);
        }
        draft.preferred_date = Some(args.date.clone());
        draft.preferred_time = Some(args.time.clone());
        draft.appointment_id = Some(record.id.clone());
        draft.provider_event_id = Some(event.event_id);
        draft.booked = true;

        let display_tz = draft.caller_timezone.unwrap_or(self.business_tz);
        let spoken_time = start
            .with_timezone(&display_tz)
            .format("%A, %B %-d at %-I:%M %p")
            .to_string();

        // Confirmation text is best-effort; the booking already stands
        let sms_sent = match &self.notifier {
            Some(notifier) if !phone.is_empty() => {
                let details = ConfirmationDetails {
                    caller_name: args.name.clone(),
                    business_name: self.business.name.clone(),
                    start,
                    duration_minutes: duration,
                    display_timezone: display_tz,
                };
                match notifier.send_confirmation(&phone, &details).await {
                    Ok(()) => true,
                    Err(error) => {
                        tracing::warn!(%error, "confirmation sms failed");
                        false
                    }
                }
            }
            _ => false,
        };

        Ok(serde_json::json!({
            "appointment_id": record.id,
            "confirmation": format!("Booked for {spoken_time}."),
            "sms_sent": sms_sent,
        }))
    }

    fn update_appointment_info(
        args: &UpdateAppointmentInfoArgs,
        draft: &mut AppointmentDraft,
    ) -> serde_json::Value {
        let mut updated = Vec::new();
        let fields: [(&str, &Option<String>, &mut Option<String>); 6] = [
            ("name", &args.name, &mut draft.caller_name),
            ("phone", &args.phone, &mut draft.caller_phone),
            ("preferred_date", &args.preferred_date, &mut draft.preferred_date),
            ("preferred_time", &args.preferred_time, &mut draft.preferred_time),
            ("reason", &args.reason, &mut draft.reason),
            ("notes", &args.notes, &mut draft.notes),
        ];
        for (name, source, target) in fields {
            if let Some(value) = source {
                *target = Some(value.clone());
                updated.push(name);
            }
        }
        serde_json::json!({ "updated": updated })
    }

    fn end_call(args: &EndCallArgs, draft: &mut AppointmentDraft) -> serde_json::Value {
        // A real booking is never unwound by the wrap-up flag
        draft.booked = draft.booked || args.appointment_booked;
        if let Some(summary) = &args.summary {
            draft.notes = Some(summary.clone());
        }
        serde_json::json!({ "call_ending": true })
    }

    fn duration_or_default(&self, requested: Option<u32>) -> u32 {
        requested.unwrap_or(self.business.default_duration_minutes)
    }

    fn resolve_start(&self, date: &str, time: &str) -> Result<DateTime<Utc>> {
        let day = parse_date(date)?;
        let minutes = parse_time_of_day(time).map_err(Error::Tool)?;
        let hour = u32::try_from(minutes / 60).unwrap_or(0);
        let minute = u32::try_from(minutes % 60).unwrap_or(0);
        self.business_tz
            .with_ymd_and_hms(
                chrono::Datelike::year(&day),
                chrono::Datelike::month(&day),
                chrono::Datelike::day(&day),
                hour,
                minute,
                0,
            )
            .single()
            .map(|dt| dt.with_timezone(&Utc))
            .ok_or_else(|| Error::Tool(format!("ambiguous local time {date} {time}")))
    }
}

fn parse_date(date: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| Error::Tool(format!("bad date: {date:?}")))
}

fn fallback_message(tool: &str) -> &'static str {
    match tool {
        "check_availability" | "get_available_slots" | "create_appointment" => {
            "Having trouble accessing the calendar right now. Ask the caller for their preferred times and offer to confirm later."
        }
        "set_caller_timezone" => {
            "Could not work out the caller's timezone; continue using the business's local time."
        }
        _ => "The operation failed. Continue the conversation and retry if it matters.",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::booking::{CalendarEvent, InMemoryCalendar, Slot};
    use crate::db::init_memory;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FailingCalendar;

    #[async_trait]
    impl Calendar for FailingCalendar {
        async fn check_availability(&self, _: DateTime<Utc>, _: u32) -> Result<bool> {
            Err(Error::Calendar("backend down".to_string()))
        }
        async fn get_available_slots(&self, _: NaiveDate, _: u32) -> Result<Vec<Slot>> {
            Err(Error::Calendar("backend down".to_string()))
        }
        async fn create_appointment(&self, _: &BookingRequest) -> Result<CalendarEvent> {
            Err(Error::Calendar("backend down".to_string()))
        }
        async fn cancel_appointment(&self, _: &str) -> Result<()> {
            Err(Error::Calendar("backend down".to_string()))
        }
        async fn reschedule_appointment(
            &self,
            _: &str,
            _: DateTime<Utc>,
            _: u32,
        ) -> Result<CalendarEvent> {
            Err(Error::Calendar("backend down".to_string()))
        }
    }

    struct CountingNotifier {
        sent: AtomicU32,
        fail: bool,
    }

    #[async_trait]
    impl Notifier for CountingNotifier {
        async fn send_confirmation(&self, _: &str, _: &ConfirmationDetails) -> Result<()> {
            if self.fail {
                return Err(Error::Notify("sms down".to_string()));
            }
            self.sent.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
        async fn send_reminder(&self, _: &str, _: &ConfirmationDetails) -> Result<()> {
            Ok(())
        }
        async fn send_cancellation(&self, _: &str, _: &ConfirmationDetails) -> Result<()> {
            Ok(())
        }
    }

    fn business() -> BusinessConfig {
        BusinessConfig {
            name: "Lakeside Dental".to_string(),
            timezone: "America/New_York".to_string(),
            open_hour: 9,
            close_hour: 17,
            default_duration_minutes: 30,
        }
    }

    fn executor_with(
        calendar: Arc<dyn Calendar>,
        notifier: Option<Arc<dyn Notifier>>,
    ) -> ToolExecutor {
        ToolExecutor::new(
            calendar,
            notifier,
            AppointmentRepo::new(init_memory().unwrap()),
            business(),
        )
        .unwrap()
    }

    fn executor() -> ToolExecutor {
        executor_with(Arc::new(InMemoryCalendar::new(&business()).unwrap()), None)
    }

    fn invoke(name: &str, args: &str) -> ToolInvocation {
        ToolInvocation::from_request(&crate::agent::ToolCallRequest {
            id: format!("call_{name}"),
            name: name.to_string(),
            arguments: args.to_string(),
        })
        .unwrap()
    }

    // 16:00 UTC = noon Eastern on a September weekday
    fn noon_eastern() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 9, 1, 16, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn vague_timezone_report_is_rejected_by_the_handler() {
        let exec = executor();
        let mut draft = AppointmentDraft::default();

        let result = exec
            .execute_at(
                &invoke("set_caller_timezone", r#"{"current_time":"afternoon"}"#),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert!(result.payload["error"].as_str().unwrap().contains("clock time"));
        assert!(draft.caller_timezone.is_none());
    }

    #[tokio::test]
    async fn timezone_inference_lands_on_the_draft() {
        let exec = executor();
        let mut draft = AppointmentDraft::default();

        let result = exec
            .execute_at(
                &invoke("set_caller_timezone", r#"{"current_time":"12:00 pm"}"#),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert_eq!(result.payload["timezone"], "America/New_York");
        assert_eq!(draft.timezone_offset_minutes, Some(-240));
        assert_eq!(draft.caller_timezone, Some(chrono_tz::America::New_York));
    }

    #[tokio::test]
    async fn todays_slots_respect_the_two_hour_buffer() {
        let exec = executor();
        let mut draft = AppointmentDraft {
            caller_timezone: Some(chrono_tz::America::New_York),
            ..AppointmentDraft::default()
        };

        let result = exec
            .execute_at(
                &invoke("get_available_slots", r#"{"date":"2026-09-01"}"#),
                &mut draft,
                noon_eastern(),
            )
            .await;

        // Noon caller-local: everything before 2:00 PM is filtered, leaving
        // 2:00 through 4:30
        let slots = result.payload["slots"].as_array().unwrap();
        assert_eq!(slots.len(), 6);
        assert_eq!(slots[0]["time"], "14:00");
        assert_eq!(slots[0]["spoken"], "2:00 PM");
    }

    #[tokio::test]
    async fn future_day_slots_are_unfiltered() {
        let exec = executor();
        let mut draft = AppointmentDraft::default();

        let result = exec
            .execute_at(
                &invoke("get_available_slots", r#"{"date":"2026-09-02"}"#),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert_eq!(result.payload["slots"].as_array().unwrap().len(), 16);
    }

    #[tokio::test]
    async fn create_then_check_reports_unavailable() {
        let exec = executor();
        let mut draft = AppointmentDraft {
            caller_phone: Some("+15550001111".to_string()),
            ..AppointmentDraft::default()
        };

        let created = exec
            .execute_at(
                &invoke(
                    "create_appointment",
                    r#"{"name":"Dana","date":"2026-09-02","time":"14:00","reason":"cleaning"}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;
        assert!(created.payload["appointment_id"].is_string());
        assert!(draft.booked);
        assert_eq!(draft.caller_name.as_deref(), Some("Dana"));

        let checked = exec
            .execute_at(
                &invoke(
                    "check_availability",
                    r#"{"date":"2026-09-02","time":"14:00"}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;
        assert_eq!(checked.payload["available"], false);

        // Double booking comes back as a structured refusal, not a fault
        let doubled = exec
            .execute_at(
                &invoke(
                    "create_appointment",
                    r#"{"name":"Riley","date":"2026-09-02","time":"14:00"}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;
        assert!(doubled.payload["error"].as_str().unwrap().contains("no longer open"));
    }

    #[tokio::test]
    async fn sms_failure_does_not_fail_the_booking() {
        let notifier = Arc::new(CountingNotifier {
            sent: AtomicU32::new(0),
            fail: true,
        });
        let exec = executor_with(
            Arc::new(InMemoryCalendar::new(&business()).unwrap()),
            Some(notifier),
        );
        let mut draft = AppointmentDraft {
            caller_phone: Some("+15550001111".to_string()),
            ..AppointmentDraft::default()
        };

        let result = exec
            .execute_at(
                &invoke(
                    "create_appointment",
                    r#"{"name":"Dana","date":"2026-09-02","time":"10:00"}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert!(result.payload["appointment_id"].is_string());
        assert_eq!(result.payload["sms_sent"], false);
        assert!(draft.booked);
    }

    #[tokio::test]
    async fn calendar_outage_becomes_a_fallback_message() {
        let exec = executor_with(Arc::new(FailingCalendar), None);
        let mut draft = AppointmentDraft::default();

        let result = exec
            .execute_at(
                &invoke(
                    "check_availability",
                    r#"{"date":"2026-09-02","time":"14:00"}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert!(result.payload["error"].as_str().unwrap().contains("calendar"));
        assert!(!result.end_call);
    }

    #[tokio::test]
    async fn update_merges_fields_last_write_wins() {
        let exec = executor();
        let mut draft = AppointmentDraft::default();

        exec.execute_at(
            &invoke(
                "update_appointment_info",
                r#"{"name":"Dana","reason":"cleaning"}"#,
            ),
            &mut draft,
            noon_eastern(),
        )
        .await;
        let result = exec
            .execute_at(
                &invoke("update_appointment_info", r#"{"name":"Dana Reyes"}"#),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert_eq!(result.payload["updated"], serde_json::json!(["name"]));
        assert_eq!(draft.caller_name.as_deref(), Some("Dana Reyes"));
        assert_eq!(draft.reason.as_deref(), Some("cleaning"));
    }

    #[tokio::test]
    async fn unknown_tool_request_yields_a_structured_error() {
        let exec = executor();
        let mut draft = AppointmentDraft::default();

        let result = exec
            .execute_request(
                &crate::agent::ToolCallRequest {
                    id: "call_x".to_string(),
                    name: "reboot_server".to_string(),
                    arguments: "{}".to_string(),
                },
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert_eq!(result.invocation_id, "call_x");
        assert!(result.payload["error"].as_str().unwrap().contains("Invalid tool call"));
    }

    #[tokio::test]
    async fn end_call_sets_the_flag_without_unbooking() {
        let exec = executor();
        let mut draft = AppointmentDraft {
            booked: true,
            ..AppointmentDraft::default()
        };

        let result = exec
            .execute_at(
                &invoke(
                    "end_call_with_confirmation",
                    r#"{"summary":"booked a cleaning","appointment_booked":false}"#,
                ),
                &mut draft,
                noon_eastern(),
            )
            .await;

        assert!(result.end_call);
        assert_eq!(result.payload["call_ending"], true);
        assert!(draft.booked);
    }
}
