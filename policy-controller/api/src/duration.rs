use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::{fmt, str::FromStr, time};

/// A duration written as integer quantities with units, e.g. `1h30m` or `250ms`.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Duration(time::Duration);

#[derive(Debug, thiserror::Error, Eq, PartialEq)]
#[non_exhaustive]
pub enum ParseError {
    #[error("empty duration")]
    Empty,

    #[error("missing a unit: {}", EXPECTED_UNITS)]
    NoUnit,

    #[error("invalid unit {0:?}: {}", EXPECTED_UNITS)]
    InvalidUnit(String),

    #[error("duration is too large")]
    Overflow,

    #[error("invalid number: {0}")]
    NotANumber(#[from] std::num::ParseIntError),
}

const EXPECTED_UNITS: &str = "expected one of 'ms', 's', 'm', or 'h'";

const MILLISECOND: time::Duration = time::Duration::from_millis(1);
const SECOND: time::Duration = time::Duration::from_secs(1);
const MINUTE: time::Duration = time::Duration::from_secs(60);
const HOUR: time::Duration = time::Duration::from_secs(60 * 60);

/// Units from largest to smallest.
const UNITS: [(&str, time::Duration); 4] = [
    ("h", HOUR),
    ("m", MINUTE),
    ("s", SECOND),
    ("ms", MILLISECOND),
];

// === impl Duration ===

impl Duration {
    pub fn from_millis(ms: u64) -> Self {
        Self(time::Duration::from_millis(ms))
    }

    pub fn from_secs(secs: u64) -> Self {
        Self(time::Duration::from_secs(secs))
    }
}

impl From<time::Duration> for Duration {
    fn from(duration: time::Duration) -> Self {
        Self(duration)
    }
}

impl From<Duration> for time::Duration {
    fn from(Duration(duration): Duration) -> Self {
        duration
    }
}

impl fmt::Display for Duration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut rest = self.0.as_millis();
        if rest == 0 {
            return f.write_str("0s");
        }
        for (unit, base) in UNITS {
            let base = base.as_millis();
            let n = rest / base;
            if n > 0 {
                write!(f, "{n}{unit}")?;
                rest %= base;
            }
        }
        Ok(())
    }
}

impl FromStr for Duration {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut s = s.trim();
        if s.is_empty() {
            return Err(ParseError::Empty);
        }
        if s == "0" {
            return Ok(Self::default());
        }

        let mut total = time::Duration::ZERO;
        while !s.is_empty() {
            let unit_start = s
                .find(|c: char| !c.is_ascii_digit())
                .ok_or(ParseError::NoUnit)?;
            let (n, rest) = s.split_at(unit_start);
            let n = n.parse::<u64>()?;
            let unit_end = rest.find(|c: char| c.is_ascii_digit()).unwrap_or(rest.len());
            let (unit, rest) = rest.split_at(unit_end);
            let base = UNITS
                .iter()
                .find(|(name, _)| *name == unit)
                .map(|(_, base)| *base)
                .ok_or_else(|| ParseError::InvalidUnit(unit.to_string()))?;
            total = u64::try_from(base.as_millis())
                .ok()
                .and_then(|ms| ms.checked_mul(n))
                .map(time::Duration::from_millis)
                .and_then(|d| total.checked_add(d))
                .ok_or(ParseError::Overflow)?;
            s = rest;
        }
        Ok(Self(total))
    }
}

impl Serialize for Duration {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Duration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        struct Visitor;
        impl de::Visitor<'_> for Visitor {
            type Value = Duration;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a duration such as `1m30s`")
            }

            fn visit_str<E>(self, value: &str) -> Result<Self::Value, E>
            where
                E: de::Error,
            {
                value.parse().map_err(de::Error::custom)
            }
        }
        deserializer.deserialize_str(Visitor)
    }
}

impl schemars::JsonSchema for Duration {
    fn schema_name() -> String {
        "Duration".to_owned()
    }

    fn is_referenceable() -> bool {
        false
    }

    fn json_schema(_: &mut schemars::gen::SchemaGenerator) -> schemars::schema::Schema {
        schemars::schema::SchemaObject {
            instance_type: Some(schemars::schema::InstanceType::String.into()),
            string: Some(Box::new(schemars::schema::StringValidation {
                pattern: Some("^(0|([0-9]+(ms|s|m|h))+)$".to_string()),
                ..Default::default()
            })),
            ..Default::default()
        }
        .into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("0", time::Duration::ZERO)]
    #[case("250ms", 250 * MILLISECOND)]
    #[case("5s", 5 * SECOND)]
    #[case("15m", 15 * MINUTE)]
    #[case("1h30m", HOUR + 30 * MINUTE)]
    #[case("1m1s1ms", MINUTE + SECOND + MILLISECOND)]
    #[case("90s", 90 * SECOND)]
    fn parses(#[case] input: &str, #[case] expected: time::Duration) {
        assert_eq!(input.parse::<Duration>(), Ok(Duration(expected)));
    }

    #[rstest]
    #[case("", ParseError::Empty)]
    #[case("10", ParseError::NoUnit)]
    #[case("10d", ParseError::InvalidUnit("d".to_string()))]
    #[case("1.5s", ParseError::InvalidUnit(".".to_string()))]
    fn rejects(#[case] input: &str, #[case] expected: ParseError) {
        assert_eq!(input.parse::<Duration>(), Err(expected));
    }

    #[test]
    fn displays_normalized() {
        assert_eq!(Duration::from_secs(90).to_string(), "1m30s");
        assert_eq!(Duration::from_millis(3_600_250).to_string(), "1h250ms");
        assert_eq!(Duration::default().to_string(), "0s");
    }

    #[rstest]
    #[case("4294967295h4294967295h", "8589934590h")]
    #[case("18446744073709551615ms", "5124095576030h25m51s615ms")]
    #[case("90m", "1h30m")]
    fn large_durations_round_trip(#[case] input: &str, #[case] displayed: &str) {
        let duration = input.parse::<Duration>().expect("duration must parse");
        assert_eq!(duration.to_string(), displayed);
        assert_eq!(displayed.parse::<Duration>(), Ok(duration));
    }

    #[test]
    fn rejects_overflowing_durations() {
        assert_eq!(
            "18446744073709551615h".parse::<Duration>(),
            Err(ParseError::Overflow)
        );
        assert!(matches!(
            "18446744073709551616ms".parse::<Duration>(),
            Err(ParseError::NotANumber(_))
        ));
    }
}
