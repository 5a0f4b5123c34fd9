use std::time::Duration;

use serde::de::Deserializer;
use serde::Deserialize;

use crate::types::TimestampMillis;

/// Current timestamp in milliseconds
#[inline]
pub fn timestamp_millis() -> TimestampMillis {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|t| t.as_millis() as i64)
        .unwrap_or_else(|_| chrono::Local::now().timestamp_millis())
}

/// Deserialize Duration from a human-readable string, e.g. "5s", "300ms"
#[inline]
pub fn deserialize_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: Deserializer<'de>,
{
    let v = String::deserialize(deserializer)?;
    Ok(to_duration(&v))
}

/// Convert a human-readable duration string to Duration. Supported units:
/// ms, s, m, h; a bare number is taken as seconds.
#[inline]
pub fn to_duration(text: &str) -> Duration {
    let text = text.trim();
    if let Some(v) = text.strip_suffix("ms") {
        return Duration::from_millis(v.trim().parse::<u64>().unwrap_or_default());
    }
    let (v, factor) = if let Some(v) = text.strip_suffix('s') {
        (v, 1)
    } else if let Some(v) = text.strip_suffix('m') {
        (v, 60)
    } else if let Some(v) = text.strip_suffix('h') {
        (v, 3600)
    } else {
        (text, 1)
    };
    Duration::from_secs(v.trim().parse::<u64>().unwrap_or_default().saturating_mul(factor))
}

#[cfg(test)]
mod tests {
    use super::to_duration;
    use std::time::Duration;

    #[test]
    fn durations() {
        assert_eq!(to_duration("300ms"), Duration::from_millis(300));
        assert_eq!(to_duration("5s"), Duration::from_secs(5));
        assert_eq!(to_duration("2m"), Duration::from_secs(120));
        assert_eq!(to_duration("1h"), Duration::from_secs(3600));
        assert_eq!(to_duration("7"), Duration::from_secs(7));
        assert_eq!(to_duration("oops"), Duration::from_secs(0));
        //absurdly large values clamp instead of overflowing
        assert_eq!(to_duration("9999999999999999999h"), Duration::from_secs(u64::MAX));
    }
}
