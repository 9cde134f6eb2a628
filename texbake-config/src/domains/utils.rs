//! Serde helpers shared by the config domains

use serde::{de::Error as _, Deserialize, Deserializer, Serializer};
use std::time::Duration;

/// Durations written as seconds. Fractions are accepted (`0.5`), and
/// whole values are written back without a fractional part.
pub mod serde_duration {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        if duration.subsec_nanos() == 0 {
            serializer.serialize_u64(duration.as_secs())
        } else {
            serializer.serialize_f64(duration.as_secs_f64())
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let seconds = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(seconds)
            .map_err(|_| D::Error::custom(format!("invalid duration: {} seconds", seconds)))
    }
}

/// Durations written as whole milliseconds
pub mod serde_duration_millis {
    use super::*;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use serde::{Deserialize, Serialize};
    use std::time::Duration;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Timeouts {
        #[serde(with = "super::serde_duration")]
        grace: Duration,
        #[serde(with = "super::serde_duration_millis")]
        interval: Duration,
    }

    #[test]
    fn test_fractional_seconds() {
        let parsed: Timeouts = serde_yaml::from_str("grace: 0.5\ninterval: 250\n").unwrap();
        assert_eq!(parsed.grace, Duration::from_millis(500));
        assert_eq!(parsed.interval, Duration::from_millis(250));

        let whole: Timeouts = serde_yaml::from_str("grace: 300\ninterval: 500\n").unwrap();
        assert_eq!(whole.grace, Duration::from_secs(300));
        let written = serde_yaml::to_string(&whole).unwrap();
        assert!(written.contains("grace: 300\n"));
    }

    #[test]
    fn test_negative_seconds_rejected() {
        assert!(serde_yaml::from_str::<Timeouts>("grace: -1\ninterval: 1\n").is_err());
    }
}
