//! Civil timezone inference from a spoken local time
//!
//! Callers rarely know their UTC offset, but they do know their wall clock.
//! Comparing the reported local time against the current UTC instant yields
//! an offset, which is matched against the live (DST-correct) offsets of a
//! fixed list of common zones.

use chrono::{DateTime, Datelike, Offset, TimeZone, Timelike, Utc};
use chrono_tz::Tz;

/// Zones considered as candidates, in tie-break priority order
const CANDIDATE_ZONES: [Tz; 12] = [
    Tz::America__New_York,
    Tz::America__Chicago,
    Tz::America__Denver,
    Tz::America__Los_Angeles,
    Tz::America__Phoenix,
    Tz::America__Anchorage,
    Tz::Pacific__Honolulu,
    Tz::Europe__London,
    Tz::Europe__Paris,
    Tz::Asia__Kolkata,
    Tz::Asia__Tokyo,
    Tz::Australia__Sydney,
];

/// Result of a successful inference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredTimezone {
    /// Selected IANA zone identifier
    pub tz: String,
    /// Offset from UTC in minutes, snapped to the hour
    pub offset_minutes: i32,
    /// All zones whose live offset matched exactly
    pub candidates: Vec<String>,
    /// The reported time normalized to 24h "HH:MM"
    pub reported_local_24h: String,
}

/// Infer the caller's timezone from a reported local time
///
/// Always produces a usable zone: when no candidate matches the snapped
/// offset exactly, the nearest zone by absolute offset difference is chosen,
/// and UTC is the final fallback. Only a syntactically unparseable time
/// yields `Err`.
///
/// # Errors
///
/// Returns the parse failure reason if `reported` is not a recognizable
/// time of day.
pub fn infer_timezone(reported: &str, now_utc: DateTime<Utc>) -> Result<InferredTimezone, String> {
    let reported_minutes = parse_time_of_day(reported)?;

    let utc_minutes = i32::try_from(now_utc.hour() * 60 + now_utc.minute()).unwrap_or(0);

    // Raw difference, normalized into (-720, 720]
    let mut offset = reported_minutes - utc_minutes;
    if offset <= -720 {
        offset += 1440;
    } else if offset > 720 {
        offset -= 1440;
    }

    // Zone offsets come in whole hours for every candidate we carry;
    // snapping absorbs clock skew and rounding in the caller's report.
    #[allow(clippy::cast_possible_truncation)]
    let snapped = ((f64::from(offset) / 60.0).round() as i32) * 60;

    let live: Vec<(Tz, i32)> = CANDIDATE_ZONES
        .iter()
        .map(|&tz| (tz, live_offset_minutes(tz, now_utc)))
        .collect();

    let exact: Vec<String> = live
        .iter()
        .filter(|(_, off)| *off == snapped)
        .map(|(tz, _)| tz.name().to_string())
        .collect();

    let tz = if let Some(first) = exact.first() {
        first.clone()
    } else {
        live.iter()
            .min_by_key(|(_, off)| (off - snapped).abs())
            .map_or_else(|| "UTC".to_string(), |(tz, _)| tz.name().to_string())
    };

    Ok(InferredTimezone {
        tz,
        offset_minutes: snapped,
        candidates: exact,
        reported_local_24h: format!("{:02}:{:02}", reported_minutes / 60, reported_minutes % 60),
    })
}

/// Live UTC offset of a zone at the given instant, via calendar-field
/// decomposition so DST transitions are honored
fn live_offset_minutes(tz: Tz, now_utc: DateTime<Utc>) -> i32 {
    let local = now_utc.with_timezone(&tz);
    // Re-resolve the local calendar fields to obtain the effective offset
    let resolved = tz
        .with_ymd_and_hms(
            local.year(),
            local.month(),
            local.day(),
            local.hour(),
            local.minute(),
            local.second(),
        )
        .single()
        .unwrap_or(local);
    resolved.offset().fix().local_minus_utc() / 60
}

/// Parse a time of day into minutes since midnight
///
/// Accepts `"2:30 pm"`, `"2pm"`, `"14:30"`, `"1430"`, and a bare hour.
/// Ambiguity (an hour 1-12 with no meridiem) resolves as given; rejecting
/// vague reports is the tool handler's job, not the parser's.
pub fn parse_time_of_day(input: &str) -> Result<i32, String> {
    let trimmed = input.trim().to_lowercase();
    if trimmed.is_empty() {
        return Err("empty time".to_string());
    }

    let (body, meridiem) = if let Some(stripped) = trimmed.strip_suffix("pm") {
        (stripped.trim_end_matches('.').trim().to_string(), Some(12))
    } else if let Some(stripped) = trimmed.strip_suffix("am") {
        (stripped.trim_end_matches('.').trim().to_string(), Some(0))
    } else {
        (trimmed, None)
    };

    let (hour, minute) = if let Some((h, m)) = body.split_once(':') {
        (
            h.trim().parse::<i32>().map_err(|_| format!("bad hour in {input:?}"))?,
            m.trim().parse::<i32>().map_err(|_| format!("bad minute in {input:?}"))?,
        )
    } else {
        let digits: String = body.chars().filter(|c| !c.is_whitespace()).collect();
        if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
            return Err(format!("no digits in {input:?}"));
        }
        match digits.len() {
            1 | 2 => (digits.parse::<i32>().map_err(|_| format!("bad hour in {input:?}"))?, 0),
            3 | 4 => {
                // Military style: "930" or "1430"
                let split = digits.len() - 2;
                (
                    digits[..split].parse::<i32>().map_err(|_| format!("bad hour in {input:?}"))?,
                    digits[split..].parse::<i32>().map_err(|_| format!("bad minute in {input:?}"))?,
                )
            }
            _ => return Err(format!("unrecognized time {input:?}")),
        }
    };

    let hour = match meridiem {
        Some(12) if hour < 12 => hour + 12,
        Some(0) if hour == 12 => 0,
        _ => hour,
    };

    if !(0..24).contains(&hour) || !(0..60).contains(&minute) {
        return Err(format!("time out of range: {input:?}"));
    }

    Ok(hour * 60 + minute)
}
