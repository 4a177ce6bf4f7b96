//! Telephony transport wire model
//!
//! The transport delivers a duplex media session over a WebSocket as typed
//! JSON events (`start`, `media`, `stop`) with base64 µ-law payloads, and a
//! voice webhook that tells the carrier where to open that socket.

pub mod ws;

use std::collections::HashMap;

use serde::Deserialize;

pub use ws::router;

/// An inbound transport message. The `event` discriminant decides which of
/// the optional bodies is present.
#[derive(Debug, Deserialize)]
pub struct InboundMessage {
    pub event: String,
    #[serde(default)]
    pub start: Option<StartMeta>,
    #[serde(default)]
    pub media: Option<MediaMeta>,
}

/// Body of the `start` event
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartMeta {
    pub stream_sid: String,
    pub call_sid: String,
    #[serde(default)]
    pub custom_parameters: HashMap<String, String>,
}

/// Body of a `media` event; payload is base64 µ-law
#[derive(Debug, Deserialize)]
pub struct MediaMeta {
    pub payload: String,
}

/// Render one outbound µ-law frame as a transport media message
#[must_use]
pub fn outbound_media(stream_sid: &str, payload_b64: &str) -> String {
    serde_json::json!({
        "event": "media",
        "streamSid": stream_sid,
        "media": { "payload": payload_b64 },
    })
    .to_string()
}

/// TwiML instructing the carrier to open the media stream, carrying the
/// caller and callee numbers through as custom parameters
#[must_use]
pub fn connect_stream_twiml(host: &str, caller: &str, callee: &str) -> String {
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<Response>
  <Connect>
    <Stream url="wss://{host}/media">
      <Parameter name="caller" value="{}" />
      <Parameter name="callee" value="{}" />
    </Stream>
  </Connect>
</Response>"#,
        xml_escape(caller),
        xml_escape(callee),
    )
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn start_event_parses_with_custom_parameters() {
        let message: InboundMessage = serde_json::from_str(
            r#"{
                "event": "start",
                "start": {
                    "streamSid": "MZ123",
                    "callSid": "CA456",
                    "customParameters": { "caller": "+15550001111", "callee": "+15559990000" }
                }
            }"#,
        )
        .unwrap();

        assert_eq!(message.event, "start");
        let start = message.start.unwrap();
        assert_eq!(start.stream_sid, "MZ123");
        assert_eq!(start.call_sid, "CA456");
        assert_eq!(start.custom_parameters["caller"], "+15550001111");
    }

    #[test]
    fn media_event_parses_payload() {
        let message: InboundMessage = serde_json::from_str(
            r#"{"event":"media","media":{"payload":"//8A"}}"#,
        )
        .unwrap();
        assert_eq!(message.media.unwrap().payload, "//8A");
    }

    #[test]
    fn unknown_events_still_parse() {
        let message: InboundMessage = serde_json::from_str(r#"{"event":"mark"}"#).unwrap();
        assert_eq!(message.event, "mark");
        assert!(message.start.is_none());
    }

    #[test]
    fn outbound_media_is_well_formed() {
        let rendered = outbound_media("MZ123", "//8A");
        let parsed: serde_json::Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["event"], "media");
        assert_eq!(parsed["streamSid"], "MZ123");
        assert_eq!(parsed["media"]["payload"], "//8A");
    }

    #[test]
    fn twiml_points_at_the_media_socket() {
        let twiml = connect_stream_twiml("gw.example.com", "+15550001111", "+15559990000");
        assert!(twiml.contains(r#"url="wss://gw.example.com/media""#));
        assert!(twiml.contains(r#"value="+15550001111""#));
    }

    #[test]
    fn twiml_escapes_markup() {
        let twiml = connect_stream_twiml("h", "<scary>", "ok");
        assert!(twiml.contains("&lt;scary&gt;"));
    }
}
