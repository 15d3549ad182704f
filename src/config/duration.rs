//! Duration strings such as `"90s"`, `"1h30m"` or `"1.5h"`.
//!
//! A duration string is a sequence of decimal numbers, each followed by a
//! unit: `ns`, `us` (or `µs`), `ms`, `s`, `m`, `h`. A bare `"0"` is also
//! accepted. Negative durations are rejected.

use std::time::Duration;

use thiserror::Error;

/// A string that does not follow the duration grammar.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid duration \"{input}\": {reason}")]
pub struct DurationError {
    /// The rejected input.
    pub input: String,
    /// What is wrong with it.
    pub reason: String,
}

const NANOS_PER_UNIT: &[(&str, u128)] = &[
    ("ns", 1),
    ("us", 1_000),
    ("\u{b5}s", 1_000),
    ("\u{3bc}s", 1_000),
    ("ms", 1_000_000),
    ("s", 1_000_000_000),
    ("m", 60_000_000_000),
    ("h", 3_600_000_000_000),
];

// Fraction digits beyond this cannot change a nanosecond result.
const MAX_FRACTION_DIGITS: usize = 18;

/// Parses a duration string.
///
/// # Errors
///
/// Returns a [`DurationError`] when the input is empty, negative, has a
/// number without a unit, uses an unknown unit, or overflows.
pub fn parse_duration(input: &str) -> Result<Duration, DurationError> {
    let fail = |reason: &str| DurationError {
        input: input.to_string(),
        reason: reason.to_string(),
    };

    let mut rest = input.strip_prefix('+').unwrap_or(input);
    if let Some(unsigned) = rest.strip_prefix('-') {
        if unsigned == "0" {
            return Ok(Duration::ZERO);
        }
        return Err(fail("negative durations are not allowed"));
    }
    if rest == "0" {
        return Ok(Duration::ZERO);
    }
    if rest.is_empty() {
        return Err(fail("empty duration"));
    }

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let whole_len = rest.find(|c: char| !c.is_ascii_digit()).unwrap_or(rest.len());
        let (whole, after_whole) = rest.split_at(whole_len);

        let (fraction, after_number) = match after_whole.strip_prefix('.') {
            Some(tail) => {
                let len = tail.find(|c: char| !c.is_ascii_digit()).unwrap_or(tail.len());
                tail.split_at(len)
            }
            None => ("", after_whole),
        };
        if whole.is_empty() && fraction.is_empty() {
            return Err(fail("expected a number"));
        }

        let unit_len = after_number
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(after_number.len());
        let (unit, tail) = after_number.split_at(unit_len);
        if unit.is_empty() {
            return Err(fail("missing unit"));
        }
        let scale = NANOS_PER_UNIT
            .iter()
            .find(|(name, _)| *name == unit)
            .map(|(_, scale)| *scale)
            .ok_or_else(|| fail(&format!("unknown unit \"{unit}\"")))?;

        let whole_value: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| fail("number too large"))?
        };
        let mut part = whole_value
            .checked_mul(scale)
            .ok_or_else(|| fail("duration too large"))?;

        if !fraction.is_empty() {
            let digits = &fraction[..fraction.len().min(MAX_FRACTION_DIGITS)];
            let numerator: u128 = digits.parse().map_err(|_| fail("invalid fraction"))?;
            let denominator = 10u128.pow(u32::try_from(digits.len()).unwrap_or(0));
            part += numerator * scale / denominator;
        }

        total = total
            .checked_add(part)
            .ok_or_else(|| fail("duration too large"))?;
        rest = tail;
    }

    let nanos = u64::try_from(total).map_err(|_| fail("duration too large"))?;
    Ok(Duration::from_nanos(nanos))
}

/// Formats a duration in the same grammar, e.g. `1h30m0s` or `250ms`.
#[must_use]
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    let nanos = duration.subsec_nanos();

    if secs == 0 {
        return match nanos {
            0 => String::from("0s"),
            n if n % 1_000_000 == 0 => format!("{}ms", n / 1_000_000),
            n if n % 1_000 == 0 => format!("{}\u{b5}s", n / 1_000),
            n => format!("{n}ns"),
        };
    }

    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;

    let mut out = String::new();
    if hours > 0 {
        out.push_str(&format!("{hours}h"));
    }
    if hours > 0 || minutes > 0 {
        out.push_str(&format!("{minutes}m"));
    }
    if nanos == 0 {
        out.push_str(&format!("{seconds}s"));
    } else {
        let fraction = format!("{nanos:09}");
        out.push_str(&format!("{seconds}.{}s", fraction.trim_end_matches('0')));
    }
    out
}

/// Serde helpers that encode a [`Duration`] as integer nanoseconds.
pub mod nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes a duration as nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the duration does not fit in 64 bits.
    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        let nanos = u64::try_from(value.as_nanos())
            .map_err(|_| serde::ser::Error::custom("duration overflows u64 nanoseconds"))?;
        serializer.serialize_u64(nanos)
    }

    /// Deserializes a duration from nanoseconds.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_nanos)
    }
}

/// Serde helpers for an optional [`Duration`] encoded as nanoseconds.
pub mod option_nanos {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    /// Serializes an optional duration as nanoseconds or `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the duration does not fit in 64 bits.
    pub fn serialize<S: Serializer>(
        value: &Option<Duration>,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        match value {
            Some(d) => super::nanos::serialize(d, serializer),
            None => serializer.serialize_none(),
        }
    }

    /// Deserializes an optional duration from nanoseconds or `null`.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is neither `null` nor an unsigned integer.
    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<Duration>, D::Error> {
        Option::<u64>::deserialize(deserializer).map(|n| n.map(Duration::from_nanos))
    }
}
