//! Serde codecs for `Duration` values on the wire
//!
//! Every duration this crate serializes (retry delays, breaker cooldowns,
//! elapsed transport time) is expressed in whole milliseconds so that JSON
//! consumers never see the `{secs, nanos}` struct form.

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serializer};

/// `Duration` as a `u64` count of milliseconds
///
/// # Usage
/// ```rust
/// use std::time::Duration;
///
/// use relaygate_common::utils::duration_millis;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Backoff {
///     #[serde(with = "duration_millis")]
///     delay: Duration,
/// }
///
/// let json = serde_json::to_string(&Backoff { delay: Duration::from_secs(2) }).unwrap();
/// assert_eq!(json, r#"{"delay":2000}"#);
/// ```
pub mod duration_millis {
    use super::*;

    /// Serialize as milliseconds, saturating at `u64::MAX`
    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    /// Deserialize milliseconds into a `Duration`
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

/// `Option<Duration>` as nullable milliseconds
pub mod option_duration_millis {
    use super::*;

    /// Serialize `Some(d)` as milliseconds and `None` as `null`
    pub fn serialize<S>(duration: &Option<Duration>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match duration {
            Some(d) => super::duration_millis::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserialize nullable milliseconds
    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        Option::<u64>::deserialize(deserializer).map(|ms| ms.map(Duration::from_millis))
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};

    use super::*;

    #[derive(Serialize, Deserialize, PartialEq, Debug)]
    struct Window {
        #[serde(with = "duration_millis")]
        cooldown: Duration,
        #[serde(default, with = "option_duration_millis")]
        elapsed: Option<Duration>,
    }

    #[test]
    fn test_durations_serialize_as_millis() {
        let window = Window {
            cooldown: Duration::from_secs(30),
            elapsed: Some(Duration::from_millis(1_250)),
        };
        let json = serde_json::to_string(&window).unwrap();
        assert_eq!(json, r#"{"cooldown":30000,"elapsed":1250}"#);
    }

    #[test]
    fn test_missing_optional_duration_is_none() {
        let window: Window = serde_json::from_str(r#"{"cooldown":0}"#).unwrap();
        assert_eq!(window.cooldown, Duration::ZERO);
        assert_eq!(window.elapsed, None);
    }

    #[test]
    fn test_rejects_non_numeric_millis() {
        let result: Result<Window, _> = serde_json::from_str(r#"{"cooldown":"soon"}"#);
        assert!(result.is_err());
    }
}
