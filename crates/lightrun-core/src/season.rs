use chrono::Datelike;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Season {
    Christmas,
    Halloween,
}

impl Season {
    /// September and October are Halloween; every other month falls back to Christmas.
    pub fn for_month(month: u32) -> Self {
        match month {
            9 | 10 => Season::Halloween,
            _ => Season::Christmas,
        }
    }

    pub fn current() -> Self {
        Self::for_month(chrono::Local::now().month())
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Season::Christmas => "christmas",
            Season::Halloween => "halloween",
        }
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Season {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "christmas" => Ok(Season::Christmas),
            "halloween" => Ok(Season::Halloween),
            other => Err(format!("Unknown season: {}", other)),
        }
    }
}
