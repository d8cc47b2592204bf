use std::fmt;
use std::num::ParseIntError;
use std::time::Duration;

use serde::{de, Deserialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FromStrError {
    #[error("{0}")]
    ParseIntError(#[from] ParseIntError),
    #[error("missing `PT` prefix")]
    MissingPrefix,
    #[error("duration out of range")]
    Overflow,
}

/// ISO-8601 duration as reported by the YouTube Data API, like `PT1H2M3S`.
///
/// Day components (`P1DT2H`) are folded into hours.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(transparent)]
pub struct PtDuration(Duration);

impl PtDuration {
    /// Convert into inner duration.
    pub fn into_std(self) -> Duration {
        self.0
    }
}

impl std::str::FromStr for PtDuration {
    type Err = FromStrError;

    fn from_str(duration: &str) -> Result<Self, Self::Err> {
        let duration = duration.strip_prefix('P').ok_or(FromStrError::MissingPrefix)?;

        let (days, duration) = match duration.split_once('T') {
            Some((days, rest)) => (days, rest),
            None => (duration, ""),
        };

        let days = match days.strip_suffix('D') {
            Some(days) => str::parse::<u64>(days)?,
            None => 0,
        };

        let mut seconds = days.checked_mul(86400).ok_or(FromStrError::Overflow)?;
        let mut milliseconds = 0;
        let mut rest = duration;

        for (unit, factor) in [('H', 3600u64), ('M', 60)] {
            if let Some(index) = rest.find(unit) {
                seconds = str::parse::<u64>(&rest[..index])?
                    .checked_mul(factor)
                    .and_then(|n| n.checked_add(seconds))
                    .ok_or(FromStrError::Overflow)?;
                rest = &rest[(index + 1)..];
            }
        }

        if let Some(index) = rest.find('S') {
            let value = &rest[..index];

            let value = match value.split_once('.') {
                Some((value, fraction)) => {
                    let fraction = format!("{:0<3}", &fraction[..fraction.len().min(3)]);
                    milliseconds = str::parse::<u64>(&fraction)?;
                    value
                }
                None => value,
            };

            seconds = seconds
                .checked_add(str::parse::<u64>(value)?)
                .ok_or(FromStrError::Overflow)?;
        }

        Ok(PtDuration(
            Duration::from_secs(seconds) + Duration::from_millis(milliseconds),
        ))
    }
}

impl fmt::Display for PtDuration {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        let p = crate::display::partition(self.0);

        write!(fmt, "PT")?;

        if p.hours > 0 {
            write!(fmt, "{}H", p.hours)?;
        }

        if p.minutes > 0 {
            write!(fmt, "{}M", p.minutes)?;
        }

        if p.seconds > 0 || (p.hours == 0 && p.minutes == 0) {
            write!(fmt, "{}S", p.seconds)?;
        }

        Ok(())
    }
}

impl<'de> Deserialize<'de> for PtDuration {
    #[inline]
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: de::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        str::parse(&s).map_err(de::Error::custom)
    }
}
