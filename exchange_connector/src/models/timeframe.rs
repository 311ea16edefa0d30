//! Candle bucket sizes.
//!
//! A [`Timeframe`] pairs a non-zero amount with a [`TimeframeUnit`] and
//! round-trips through the short strings most exchange APIs use
//! (`"1m"`, `"4h"`, `"1d"`, `"1w"`, `"1M"`). Minutes are lowercase `m`,
//! months uppercase `M`. Whether a given timeframe is available is decided by
//! each connector.

use std::{fmt, num::NonZeroU32, str::FromStr};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum TimeframeError {
    #[error("Invalid amount in timeframe {input:?}: {message}")]
    InvalidAmount { input: String, message: String },

    #[error("Invalid timeframe unit {unit:?} in {input:?}")]
    InvalidUnit { input: String, unit: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeframeUnit {
    Minute,
    Hour,
    Day,
    Week,
    Month,
}

impl TimeframeUnit {
    fn suffix(self) -> &'static str {
        match self {
            TimeframeUnit::Minute => "m",
            TimeframeUnit::Hour => "h",
            TimeframeUnit::Day => "d",
            TimeframeUnit::Week => "w",
            TimeframeUnit::Month => "M",
        }
    }
}

/// amount × unit, e.g. 15-Minute or 1-Day.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Timeframe {
    pub amount: NonZeroU32,
    pub unit: TimeframeUnit,
}

impl Timeframe {
    pub const fn new(amount: NonZeroU32, unit: TimeframeUnit) -> Self {
        Self { amount, unit }
    }

    /// One day, the default bucket for price history.
    pub const fn daily() -> Self {
        Self::new(NonZeroU32::MIN, TimeframeUnit::Day)
    }

    pub const fn amount(&self) -> u32 {
        self.amount.get()
    }

    pub const fn unit(&self) -> TimeframeUnit {
        self.unit
    }

    /// Fixed bucket length in seconds. Months have no fixed length.
    pub fn seconds(&self) -> Option<i64> {
        let unit = match self.unit {
            TimeframeUnit::Minute => 60,
            TimeframeUnit::Hour => 3_600,
            TimeframeUnit::Day => 86_400,
            TimeframeUnit::Week => 604_800,
            TimeframeUnit::Month => return None,
        };
        Some(unit * i64::from(self.amount()))
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Self::daily()
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.amount, self.unit.suffix())
    }
}

impl FromStr for Timeframe {
    type Err = TimeframeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let Some(unit) = s.chars().last() else {
            return Err(TimeframeError::InvalidInput {
                message: "empty timeframe".into(),
            });
        };
        let digits = &s[..s.len() - unit.len_utf8()];
        let amount: u32 = digits.parse().map_err(|_| TimeframeError::InvalidAmount {
            input: s.to_string(),
            message: format!("{digits:?} is not a number"),
        })?;
        let amount = NonZeroU32::new(amount).ok_or_else(|| TimeframeError::InvalidAmount {
            input: s.to_string(),
            message: "amount must be > 0".into(),
        })?;
        let unit = match unit {
            'm' => TimeframeUnit::Minute,
            'h' | 'H' => TimeframeUnit::Hour,
            'd' | 'D' => TimeframeUnit::Day,
            'w' | 'W' => TimeframeUnit::Week,
            'M' => TimeframeUnit::Month,
            other => {
                return Err(TimeframeError::InvalidUnit {
                    input: s.to_string(),
                    unit: other.to_string(),
                });
            }
        };
        Ok(Timeframe::new(amount, unit))
    }
}

impl TryFrom<String> for Timeframe {
    type Error = TimeframeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.to_string()
    }
}
