use std::fmt;
use std::time::Duration;

use combine::error::ParseError;
use combine::parser::char::digit;
use combine::{eof, many1, one_of, EasyParser, Parser, Stream};

use crate::Error;

const SUFFIXES: &str = "smhd";

/// Unit suffix of an [`Interval`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimeUnit {
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    fn from_suffix(c: char) -> Option<Self> {
        match c {
            's' => Some(Self::Seconds),
            'm' => Some(Self::Minutes),
            'h' => Some(Self::Hours),
            'd' => Some(Self::Days),
            _ => None,
        }
    }

    pub fn suffix(self) -> char {
        match self {
            Self::Seconds => 's',
            Self::Minutes => 'm',
            Self::Hours => 'h',
            Self::Days => 'd',
        }
    }

    /// Number of seconds in one of this unit.
    pub fn seconds(self) -> u64 {
        match self {
            Self::Seconds => 1,
            Self::Minutes => 60,
            Self::Hours => 60 * 60,
            Self::Days => 60 * 60 * 24,
        }
    }
}

/// A wall-clock interval written as `<integer><unit>`, e.g. `90s` or `2h`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Interval {
    pub count: u64,
    pub unit: TimeUnit,
}

fn interval<Input>() -> impl Parser<Input, Output = (String, char)>
where
    Input: Stream<Token = char>,
    Input::Error: ParseError<Input::Token, Input::Range, Input::Position>,
{
    many1::<String, _, _>(digit())
        .and(one_of(SUFFIXES.chars()))
        .skip(eof())
}

impl Interval {
    /// Parse an interval string. Unknown suffixes and trailing garbage are errors.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let ((digits, suffix), _) = interval()
            .easy_parse(text.trim())
            .map_err(|_| Error::InvalidInterval(text.to_owned()))?;
        let count = digits
            .parse::<u64>()
            .map_err(|_| Error::IntervalOverflow(text.to_owned()))?;
        let unit = TimeUnit::from_suffix(suffix).ok_or_else(|| Error::InvalidInterval(text.to_owned()))?;
        Ok(Self { count, unit })
    }

    /// Total length in seconds.
    pub fn as_secs(&self) -> Option<u64> {
        self.count.checked_mul(self.unit.seconds())
    }

    pub fn as_duration(&self) -> Option<Duration> {
        self.as_secs().map(Duration::from_secs)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.count, self.unit.suffix())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn test_units() -> Result<()> {
        assert_eq!(Interval::parse("30s")?.as_secs(), Some(30));
        assert_eq!(Interval::parse("2m")?.as_secs(), Some(120));
        assert_eq!(Interval::parse("1h")?.as_secs(), Some(3600));
        assert_eq!(Interval::parse("1d")?.as_secs(), Some(86400));
        Ok(())
    }

    #[test]
    fn test_invalid() {
        assert!(matches!(Interval::parse("10x"), Err(Error::InvalidInterval(_))));
        assert!(matches!(Interval::parse("m"), Err(Error::InvalidInterval(_))));
        assert!(matches!(Interval::parse("10"), Err(Error::InvalidInterval(_))));
        assert!(matches!(Interval::parse("1.5h"), Err(Error::InvalidInterval(_))));
        assert!(matches!(
            Interval::parse("99999999999999999999999s"),
            Err(Error::IntervalOverflow(_))
        ));
    }

    #[test]
    fn test_display_round_trips_unit() -> Result<()> {
        let interval = Interval::parse("45m")?;
        assert_eq!(interval.to_string(), "45m");
        Ok(())
    }
}
