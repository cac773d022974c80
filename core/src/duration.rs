//! Duration field parsing.
//!
//! The routing collaborator reports durations either as `"1500s"` strings
//! or as bare integer seconds. Both are accepted and rounded up to whole
//! minutes; departure arithmetic only ever works in minutes.

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// A duration as it appears on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DurationField {
    /// Bare integer seconds.
    Seconds(u64),
    /// String form, `"<n>s"`.
    Text(String),
}

impl DurationField {
    /// Convert to whole minutes, rounding up.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidDuration` when the string form is not
    /// `"<n>s"` or a bare integer.
    pub fn to_minutes(&self) -> Result<u32> {
        let seconds = match self {
            Self::Seconds(s) => *s,
            Self::Text(text) => parse_seconds(text)?,
        };
        let minutes = seconds.div_ceil(60);
        u32::try_from(minutes).map_err(|_| CoreError::InvalidDuration {
            value: format!("{seconds}s"),
        })
    }
}

fn parse_seconds(text: &str) -> Result<u64> {
    let invalid = || CoreError::InvalidDuration {
        value: text.to_string(),
    };
    let digits = text.strip_suffix('s').unwrap_or(text);
    if digits.is_empty() {
        return Err(invalid());
    }
    digits.parse::<u64>().map_err(|_| invalid())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffixed_seconds_round_up() {
        assert_eq!(DurationField::Text("1500s".into()).to_minutes().unwrap(), 25);
        assert_eq!(DurationField::Text("1501s".into()).to_minutes().unwrap(), 26);
    }

    #[test]
    fn bare_integer_seconds() {
        assert_eq!(DurationField::Seconds(60).to_minutes().unwrap(), 1);
        assert_eq!(DurationField::Seconds(61).to_minutes().unwrap(), 2);
        assert_eq!(DurationField::Seconds(0).to_minutes().unwrap(), 0);
    }

    #[test]
    fn bare_digits_string() {
        assert_eq!(DurationField::Text("90".into()).to_minutes().unwrap(), 2);
    }

    #[test]
    fn garbage_is_rejected() {
        for bad in ["", "s", "12.5s", "-60s", "1h"] {
            assert!(
                DurationField::Text(bad.into()).to_minutes().is_err(),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn untagged_wire_forms_deserialize() {
        let n: DurationField = serde_json::from_str("1500").unwrap();
        let s: DurationField = serde_json::from_str("\"1500s\"").unwrap();
        assert_eq!(n.to_minutes().unwrap(), 25);
        assert_eq!(s.to_minutes().unwrap(), 25);
    }
}
