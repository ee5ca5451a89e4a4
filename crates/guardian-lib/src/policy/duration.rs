//! Human-readable duration strings (`90s`, `30m`, `1h30m`, `2d`)

use serde::{de, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Parse a duration made of `Nd`, `Nh`, `Nm`, `Ns` and `Nms` components.
///
/// A bare number is read as seconds. Returns `None` for empty or
/// malformed input.
pub fn parse_duration(s: &str) -> Option<Duration> {
    let s = s.trim();
    if s.is_empty() {
        return None;
    }
    if let Ok(secs) = s.parse::<u64>() {
        return Some(Duration::from_secs(secs));
    }

    let mut total_ms: u64 = 0;
    let mut num_buf = String::new();
    let mut chars = s.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch.is_ascii_digit() {
            num_buf.push(ch);
            continue;
        }
        let n: u64 = num_buf.parse().ok()?;
        num_buf.clear();
        let unit_ms = match ch {
            'd' => 86_400_000,
            'h' => 3_600_000,
            'm' if chars.peek() == Some(&'s') => {
                chars.next();
                1
            }
            'm' => 60_000,
            's' => 1_000,
            _ => return None,
        };
        total_ms = total_ms.checked_add(n.checked_mul(unit_ms)?)?;
    }

    // Trailing digits without a unit are ambiguous ("30m15")
    if !num_buf.is_empty() {
        return None;
    }

    Some(Duration::from_millis(total_ms))
}

/// Render a duration in the same notation accepted by [`parse_duration`]
pub fn format_duration(duration: Duration) -> String {
    let mut secs = duration.as_secs();
    let millis = duration.subsec_millis();
    if secs == 0 {
        return if millis == 0 {
            "0s".to_string()
        } else {
            format!("{}ms", millis)
        };
    }

    let mut out = String::new();
    for (unit, size) in [("d", 86_400), ("h", 3_600), ("m", 60)] {
        if secs >= size {
            out.push_str(&format!("{}{}", secs / size, unit));
            secs %= size;
        }
    }
    if secs > 0 {
        out.push_str(&format!("{}s", secs));
    }
    out
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawDuration {
    Secs(u64),
    Text(String),
}

fn from_raw<E: de::Error>(raw: RawDuration) -> Result<Duration, E> {
    match raw {
        RawDuration::Secs(secs) => Ok(Duration::from_secs(secs)),
        RawDuration::Text(text) => parse_duration(&text)
            .ok_or_else(|| E::custom(format!("invalid duration '{}'", text))),
    }
}

/// `#[serde(with = "...")]` helper for `Duration` fields
pub mod serde_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_duration(*value))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        from_raw(RawDuration::deserialize(deserializer)?)
    }
}

/// `#[serde(with = "...")]` helper for `Option<Duration>` fields
pub mod serde_opt_duration {
    use super::*;

    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => serializer.serialize_some(&format_duration(*d)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        match Option::<RawDuration>::deserialize(deserializer)? {
            Some(raw) => from_raw(raw).map(Some),
            None => Ok(None),
        }
    }
}
