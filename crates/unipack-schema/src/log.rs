//! Logger output style.

use serde::{Deserialize, Serialize};
use std::fmt;

/// How log and progress output is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogType {
    /// Interactive output that redraws in place.
    #[default]
    Fancy,
    /// Line-oriented output without cursor control.
    Basic,
    /// Machine-readable output.
    Json,
}

impl LogType {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fancy => "fancy",
            Self::Basic => "basic",
            Self::Json => "json",
        }
    }
}

impl fmt::Display for LogType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for LogType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fancy" => Ok(Self::Fancy),
            "basic" | "plain" => Ok(Self::Basic),
            "json" => Ok(Self::Json),
            _ => Err(format!("Unknown log type: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_type_from_str() {
        assert_eq!("FANCY".parse::<LogType>().unwrap(), LogType::Fancy);
        assert_eq!("plain".parse::<LogType>().unwrap(), LogType::Basic);
        assert!("loud".parse::<LogType>().is_err());
    }
}
