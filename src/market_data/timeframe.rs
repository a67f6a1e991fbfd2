//! Candle timeframe vocabulary

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sampling interval for historical candle aggregation.
///
/// The engine accepts exactly these four values; the wire codes match the
/// exchange's interval vocabulary one-to-one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum Timeframe {
    H1,
    H2,
    H4,
    D1,
}

impl Timeframe {
    /// All supported timeframes, in ascending interval order
    pub const ALL: [Timeframe; 4] = [Timeframe::H1, Timeframe::H2, Timeframe::H4, Timeframe::D1];

    /// Interval code understood by the historical candle endpoint
    pub fn interval(&self) -> &'static str {
        match self {
            Timeframe::H1 => "1h",
            Timeframe::H2 => "2h",
            Timeframe::H4 => "4h",
            Timeframe::D1 => "1d",
        }
    }
}

impl Default for Timeframe {
    fn default() -> Self {
        Timeframe::H1
    }
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.interval())
    }
}

impl FromStr for Timeframe {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "1h" => Ok(Timeframe::H1),
            "2h" => Ok(Timeframe::H2),
            "4h" => Ok(Timeframe::H4),
            "1d" => Ok(Timeframe::D1),
            other => Err(format!(
                "unsupported timeframe '{}', expected one of: 1h, 2h, 4h, 1d",
                other
            )),
        }
    }
}

impl TryFrom<String> for Timeframe {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Timeframe> for String {
    fn from(tf: Timeframe) -> Self {
        tf.interval().to_string()
    }
}
