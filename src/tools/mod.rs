//! Tool invocations offered to the reasoning engine
//!
//! The tool surface is a closed enum: unknown names and malformed argument
//! payloads are rejected at parse time, so the executor only ever sees
//! well-typed calls.

pub mod executor;

use serde::Deserialize;

use crate::agent::ToolCallRequest;
use crate::{Error, Result};

pub use executor::{ToolExecutor, ToolResult};

/// Arguments for `set_caller_timezone`
#[derive(Debug, Clone, Deserialize)]
pub struct SetCallerTimezoneArgs {
    /// The caller's current local time as they spoke it
    pub current_time: String,
}

/// Arguments for `check_availability`
#[derive(Debug, Clone, Deserialize)]
pub struct CheckAvailabilityArgs {
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Arguments for `get_available_slots`
#[derive(Debug, Clone, Deserialize)]
pub struct GetAvailableSlotsArgs {
    pub date: String,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Arguments for `create_appointment`
#[derive(Debug, Clone, Deserialize)]
pub struct CreateAppointmentArgs {
    pub name: String,
    #[serde(default)]
    pub phone: Option<String>,
    pub date: String,
    pub time: String,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub duration_minutes: Option<u32>,
}

/// Arguments for `update_appointment_info`; every field optional, merged
/// additively into the draft
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateAppointmentInfoArgs {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub preferred_date: Option<String>,
    #[serde(default)]
    pub preferred_time: Option<String>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub notes: Option<String>,
}

/// Arguments for `end_call_with_confirmation`
#[derive(Debug, Clone, Deserialize)]
pub struct EndCallArgs {
    #[serde(default)]
    pub summary: Option<String>,
    #[serde(default)]
    pub appointment_booked: bool,
}

/// The closed set of operations the model may invoke
#[derive(Debug, Clone)]
pub enum ToolCall {
    SetCallerTimezone(SetCallerTimezoneArgs),
    CheckAvailability(CheckAvailabilityArgs),
    GetAvailableSlots(GetAvailableSlotsArgs),
    CreateAppointment(CreateAppointmentArgs),
    UpdateAppointmentInfo(UpdateAppointmentInfoArgs),
    EndCallWithConfirmation(EndCallArgs),
}

impl ToolCall {
    /// Parse a named call with raw JSON arguments
    ///
    /// # Errors
    ///
    /// Returns error on an unknown name or arguments that do not match the
    /// declared schema
    pub fn parse(name: &str, arguments: &str) -> Result<Self> {
        let args = if arguments.trim().is_empty() {
            "{}"
        } else {
            arguments
        };
        match name {
            "set_caller_timezone" => Ok(Self::SetCallerTimezone(serde_json::from_str(args)?)),
            "check_availability" => Ok(Self::CheckAvailability(serde_json::from_str(args)?)),
            "get_available_slots" => Ok(Self::GetAvailableSlots(serde_json::from_str(args)?)),
            "create_appointment" => Ok(Self::CreateAppointment(serde_json::from_str(args)?)),
            "update_appointment_info" => {
                Ok(Self::UpdateAppointmentInfo(serde_json::from_str(args)?))
            }
            "end_call_with_confirmation" => {
                Ok(Self::EndCallWithConfirmation(serde_json::from_str(args)?))
            }
            other => Err(Error::Tool(format!("unknown tool: {other}"))),
        }
    }

    /// Wire name of this operation
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::SetCallerTimezone(_) => "set_caller_timezone",
            Self::CheckAvailability(_) => "check_availability",
            Self::GetAvailableSlots(_) => "get_available_slots",
            Self::CreateAppointment(_) => "create_appointment",
            Self::UpdateAppointmentInfo(_) => "update_appointment_info",
            Self::EndCallWithConfirmation(_) => "end_call_with_confirmation",
        }
    }
}

/// A parsed invocation with its correlation id
#[derive(Debug, Clone)]
pub struct ToolInvocation {
    pub id: String,
    pub call: ToolCall,
}

impl ToolInvocation {
    /// Parse a provider tool-call request
    ///
    /// # Errors
    ///
    /// Returns error if the name or arguments are invalid
    pub fn from_request(request: &ToolCallRequest) -> Result<Self> {
        let call = ToolCall::parse(&request.name, &request.arguments)?;
        Ok(Self {
            id: request.id.clone(),
            call,
        })
    }
}

/// JSON-schema catalog of every tool, in the chat-completions shape
#[must_use]
pub fn catalog() -> serde_json::Value {
    serde_json::json!([
        {
            "type": "function",
            "function": {
                "name": "set_caller_timezone",
                "description": "Record the caller's timezone from their spoken local time. Call this early so appointment times can be presented in the caller's zone.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "current_time": {
                            "type": "string",
                            "description": "The caller's current local clock time, e.g. '2:30 pm' or '14:30'. Must contain digits."
                        }
                    },
                    "required": ["current_time"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "check_availability",
                "description": "Check whether a single appointment slot is open.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "date": { "type": "string", "description": "YYYY-MM-DD, in the business's timezone" },
                        "time": { "type": "string", "description": "24-hour HH:MM, in the business's timezone" },
                        "duration_minutes": { "type": "integer", "description": "Appointment length; omit for the default" }
                    },
                    "required": ["date", "time"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "get_available_slots",
                "description": "List every open slot on a business day.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "date": { "type": "string", "description": "YYYY-MM-DD, in the business's timezone" },
                        "duration_minutes": { "type": "integer", "description": "Appointment length; omit for the default" }
                    },
                    "required": ["date"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "create_appointment",
                "description": "Book an appointment. Only call after availability has been confirmed.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string", "description": "Caller's name" },
                        "phone": { "type": "string", "description": "Caller's phone in E.164; omit to use the number they called from" },
                        "date": { "type": "string", "description": "YYYY-MM-DD, in the business's timezone" },
                        "time": { "type": "string", "description": "24-hour HH:MM, in the business's timezone" },
                        "reason": { "type": "string", "description": "Reason for the visit" },
                        "duration_minutes": { "type": "integer" }
                    },
                    "required": ["name", "date", "time"]
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "update_appointment_info",
                "description": "Record appointment details as the caller provides them, before booking.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "name": { "type": "string" },
                        "phone": { "type": "string" },
                        "preferred_date": { "type": "string" },
                        "preferred_time": { "type": "string" },
                        "reason": { "type": "string" },
                        "notes": { "type": "string" }
                    }
                }
            }
        },
        {
            "type": "function",
            "function": {
                "name": "end_call_with_confirmation",
                "description": "End the call after saying goodbye. Set appointment_booked to whether an appointment was booked on this call.",
                "parameters": {
                    "type": "object",
                    "properties": {
                        "summary": { "type": "string", "description": "One-line summary of the call outcome" },
                        "appointment_booked": { "type": "boolean" }
                    },
                    "required": ["appointment_booked"]
                }
            }
        }
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_every_catalog_name() {
        let cases = [
            ("set_caller_timezone", r#"{"current_time":"2:30 pm"}"#),
            ("check_availability", r#"{"date":"2026-09-01","time":"14:00"}"#),
            ("get_available_slots", r#"{"date":"2026-09-01"}"#),
            (
                "create_appointment",
                r#"{"name":"Dana","date":"2026-09-01","time":"14:00"}"#,
            ),
            ("update_appointment_info", r#"{"name":"Dana"}"#),
            ("end_call_with_confirmation", r#"{"appointment_booked":true}"#),
        ];
        for (name, args) in cases {
            let call = ToolCall::parse(name, args).unwrap();
            assert_eq!(call.name(), name);
        }
    }

    #[test]
    fn unknown_name_and_bad_args_are_rejected() {
        assert!(ToolCall::parse("delete_everything", "{}").is_err());
        assert!(ToolCall::parse("check_availability", r#"{"date":"2026-09-01"}"#).is_err());
        assert!(ToolCall::parse("set_caller_timezone", "not json").is_err());
    }

    #[test]
    fn empty_arguments_parse_as_defaults() {
        let call = ToolCall::parse("update_appointment_info", "").unwrap();
        assert!(matches!(call, ToolCall::UpdateAppointmentInfo(args) if args.name.is_none()));
    }

    #[test]
    fn catalog_covers_all_six_operations() {
        let catalog = catalog();
        let names: Vec<&str> = catalog
            .as_array()
            .unwrap()
            .iter()
            .map(|t| t["function"]["name"].as_str().unwrap())
            .collect();
        assert_eq!(names.len(), 6);
        for name in [
            "set_caller_timezone",
            "check_availability",
            "get_available_slots",
            "create_appointment",
            "update_appointment_info",
            "end_call_with_confirmation",
        ] {
            assert!(names.contains(&name), "missing {name}");
        }
    }

    #[test]
    fn parsed_invocation_keeps_the_correlation_id() {
        let invocation = ToolInvocation::from_request(&crate::agent::ToolCallRequest {
            id: "call_42".to_string(),
            name: "get_available_slots".to_string(),
            arguments: r#"{"date":"2026-09-01"}"#.to_string(),
        })
        .unwrap();

        assert_eq!(invocation.id, "call_42");
        assert_eq!(invocation.call.name(), "get_available_slots");
    }
}
