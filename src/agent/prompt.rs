//! Prompt construction
//!
//! Everything the model is told about who it is, who is calling, and how to
//! behave on a phone line lives here, so the conversational rules are
//! reviewable in one place.

use chrono::{DateTime, Utc};

use crate::config::BusinessConfig;

/// Spoken while the reasoning engine recovers from a failure
pub const APOLOGY: &str = "I'm sorry, I'm having a little trouble on my end. Could you say that again?";

/// Spoken farewell when the transcription stream cannot be brought back
pub const HEARING_TROUBLE: &str = "I'm sorry, I'm having trouble hearing you on this line. Please call back and we'll get you scheduled.";

/// Build the system prompt for one call
#[must_use]
pub fn system_prompt(business: &BusinessConfig, caller_number: &str, now: DateTime<Utc>) -> String {
    format!(
        "You are the phone receptionist for {name}. You are on a live voice call; \
everything you write is spoken aloud to the caller.

Today's date is {date} (UTC).
The caller's phone number is {phone}. Read it back as individual digits if asked.

Rules:
- Keep replies to one or two short sentences. No lists, no markdown, no emoji.
- Never speak tool names, JSON, or function-call syntax. Tools are invoked \
silently; only their results inform what you say.
- Early in the call, ask what local time it is for the caller and record it \
with set_caller_timezone so appointment times can be spoken in their zone.
- Always check availability before offering or booking a time. Never promise \
a slot you have not checked.
- Collect the caller's name and the reason for the visit before booking.
- Appointments run {duration} minutes during business hours, {open}:00 to \
{close}:00 {tz}.
- After booking, confirm the day and time back to the caller, then use \
end_call_with_confirmation to wrap up politely.
- If the caller is vague about time (\"morning\", \"sometime next week\"), \
offer two or three concrete open slots instead of asking them to narrow down.",
        name = business.name,
        date = now.format("%A, %B %-d, %Y"),
        phone = speakable_number(caller_number),
        duration = business.default_duration_minutes,
        open = business.open_hour,
        close = business.close_hour,
        tz = business.timezone,
    )
}

/// Opening line spoken as soon as the media stream is up
#[must_use]
pub fn greeting(business_name: &str) -> String {
    format!("Thank you for calling {business_name}! How can I help you today?")
}

/// Space out an E.164 number so TTS reads digits individually
#[must_use]
pub fn speakable_number(number: &str) -> String {
    let digits: Vec<String> = number
        .chars()
        .filter(char::is_ascii_digit)
        .map(String::from)
        .collect();
    if digits.is_empty() {
        "unknown".to_string()
    } else {
        digits.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn number_is_spaced_digit_by_digit() {
        assert_eq!(speakable_number("+15551234567"), "1 5 5 5 1 2 3 4 5 6 7");
        assert_eq!(speakable_number("anonymous"), "unknown");
    }

    #[test]
    fn prompt_carries_business_profile() {
        let business = BusinessConfig {
            name: "Lakeside Dental".to_string(),
            timezone: "America/Chicago".to_string(),
            open_hour: 8,
            close_hour: 18,
            default_duration_minutes: 45,
        };
        let now = Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).unwrap();
        let prompt = system_prompt(&business, "+15550001111", now);

        assert!(prompt.contains("Lakeside Dental"));
        assert!(prompt.contains("Tuesday, September 1, 2026"));
        assert!(prompt.contains("45 minutes"));
        assert!(prompt.contains("8:00 to 18:00 America/Chicago"));
        assert!(prompt.contains("1 5 5 5 0 0 0 1 1 1 1"));
    }

    #[test]
    fn greeting_names_the_business() {
        assert!(greeting("Lakeside Dental").contains("Lakeside Dental"));
    }
}
