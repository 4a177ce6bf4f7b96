//! SMS notifications via Twilio
//!
//! Confirmation texts are best-effort: a failed send never unwinds a
//! booking that already landed on the calendar.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::{Error, Result};

/// What goes into a confirmation or reminder message
#[derive(Debug, Clone)]
pub struct ConfirmationDetails {
    pub caller_name: String,
    pub business_name: String,
    pub start: DateTime<Utc>,
    pub duration_minutes: u32,
    /// Timezone to render the time in; the caller's inferred zone when
    /// known, otherwise the business zone
    pub display_timezone: Tz,
}

impl ConfirmationDetails {
    fn formatted_time(&self) -> String {
        self.start
            .with_timezone(&self.display_timezone)
            .format("%A, %B %-d at %-I:%M %p %Z")
            .to_string()
    }
}

/// Outbound SMS notifier
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Text the caller that their appointment is booked
    async fn send_confirmation(&self, to: &str, details: &ConfirmationDetails) -> Result<()>;

    /// Text the caller ahead of their appointment
    async fn send_reminder(&self, to: &str, details: &ConfirmationDetails) -> Result<()>;

    /// Text the caller that their appointment was cancelled
    async fn send_cancellation(&self, to: &str, details: &ConfirmationDetails) -> Result<()>;
}

/// Twilio SMS client
pub struct TwilioSms {
    client: reqwest::Client,
    account_sid: String,
    auth_token: String,
    from_number: String,
}

impl TwilioSms {
    /// Create a new Twilio SMS client
    #[must_use]
    pub fn new(account_sid: String, auth_token: String, from_number: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            account_sid,
            auth_token,
            from_number,
        }
    }

    async fn send(&self, to: &str, body: &str) -> Result<()> {
        let url = format!(
            "https://api.twilio.com/2010-04-01/Accounts/{}/Messages.json",
            self.account_sid
        );

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.account_sid, Some(&self.auth_token))
            .form(&[("To", to), ("From", &self.from_number), ("Body", body)])
            .send()
            .await
            .map_err(|e| Error::Notify(format!("twilio request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(Error::Notify(format!("twilio returned {status}: {text}")));
        }

        tracing::info!(to = %to, "sms sent");
        Ok(())
    }
}

#[async_trait]
impl Notifier for TwilioSms {
    async fn send_confirmation(&self, to: &str, details: &ConfirmationDetails) -> Result<()> {
        self.send(to, &confirmation_body(details)).await
    }

    async fn send_reminder(&self, to: &str, details: &ConfirmationDetails) -> Result<()> {
        self.send(to, &reminder_body(details)).await
    }

    async fn send_cancellation(&self, to: &str, details: &ConfirmationDetails) -> Result<()> {
        self.send(to, &cancellation_body(details)).await
    }
}

fn confirmation_body(details: &ConfirmationDetails) -> String {
    format!(
        "Hi {}, your {}-minute appointment with {} is confirmed for {}. Reply to this number if you need to make changes.",
        details.caller_name,
        details.duration_minutes,
        details.business_name,
        details.formatted_time()
    )
}

fn reminder_body(details: &ConfirmationDetails) -> String {
    format!(
        "Reminder: you have an appointment with {} on {}. See you soon!",
        details.business_name,
        details.formatted_time()
    )
}

fn cancellation_body(details: &ConfirmationDetails) -> String {
    format!(
        "Hi {}, your appointment with {} on {} has been cancelled. Call us back any time to rebook.",
        details.caller_name,
        details.business_name,
        details.formatted_time()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn details() -> ConfirmationDetails {
        ConfirmationDetails {
            caller_name: "Dana".to_string(),
            business_name: "Lakeside Dental".to_string(),
            start: Utc.with_ymd_and_hms(2026, 9, 1, 18, 30, 0).unwrap(),
            duration_minutes: 30,
            display_timezone: chrono_tz::America::New_York,
        }
    }

    #[test]
    fn confirmation_renders_local_time() {
        let body = confirmation_body(&details());
        assert!(body.contains("Dana"));
        assert!(body.contains("Lakeside Dental"));
        // 18:30 UTC is 2:30 PM Eastern in September
        assert!(body.contains("2:30 PM"), "{body}");
        assert!(body.contains("Tuesday, September 1"), "{body}");
    }

    #[test]
    fn reminder_and_cancellation_name_the_business() {
        let d = details();
        assert!(reminder_body(&d).starts_with("Reminder:"));
        assert!(cancellation_body(&d).contains("cancelled"));
        assert!(cancellation_body(&d).contains("Lakeside Dental"));
    }
}
