//! The engine's own log-level names

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing_subscriber::filter::LevelFilter;

/// Verbosity levels understood by the engine, from most to least verbose
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EngineLogLevel {
    DebugEvent,
    Debug,
    Detail,
    #[default]
    Summary,
    Warning,
    Error,
    Fatal,
    Nothing,
}

impl EngineLogLevel {
    pub const ALL: [EngineLogLevel; 8] = [
        EngineLogLevel::DebugEvent,
        EngineLogLevel::Debug,
        EngineLogLevel::Detail,
        EngineLogLevel::Summary,
        EngineLogLevel::Warning,
        EngineLogLevel::Error,
        EngineLogLevel::Fatal,
        EngineLogLevel::Nothing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineLogLevel::DebugEvent => "debug_event",
            EngineLogLevel::Debug => "debug",
            EngineLogLevel::Detail => "detail",
            EngineLogLevel::Summary => "summary",
            EngineLogLevel::Warning => "warning",
            EngineLogLevel::Error => "error",
            EngineLogLevel::Fatal => "fatal",
            EngineLogLevel::Nothing => "nothing",
        }
    }

    /// The closest `tracing` filter; `Detail` has no counterpart and maps to debug
    pub fn level_filter(&self) -> LevelFilter {
        match self {
            EngineLogLevel::DebugEvent | EngineLogLevel::Debug | EngineLogLevel::Detail => {
                LevelFilter::DEBUG
            }
            EngineLogLevel::Summary => LevelFilter::INFO,
            EngineLogLevel::Warning => LevelFilter::WARN,
            EngineLogLevel::Error | EngineLogLevel::Fatal => LevelFilter::ERROR,
            EngineLogLevel::Nothing => LevelFilter::OFF,
        }
    }
}

impl fmt::Display for EngineLogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineLogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|level| level.as_str() == lower)
            .ok_or_else(|| format!("Invalid engine log level: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!("Summary".parse::<EngineLogLevel>().unwrap(), EngineLogLevel::Summary);
        assert_eq!(
            "debug_event".parse::<EngineLogLevel>().unwrap(),
            EngineLogLevel::DebugEvent
        );
        assert_eq!("FATAL".parse::<EngineLogLevel>().unwrap(), EngineLogLevel::Fatal);
        assert!("verbose".parse::<EngineLogLevel>().is_err());
    }

    #[test]
    fn test_level_filters() {
        assert_eq!(EngineLogLevel::Detail.level_filter(), LevelFilter::DEBUG);
        assert_eq!(EngineLogLevel::Summary.level_filter(), LevelFilter::INFO);
        assert_eq!(EngineLogLevel::Warning.level_filter(), LevelFilter::WARN);
        assert_eq!(EngineLogLevel::Fatal.level_filter(), LevelFilter::ERROR);
        assert_eq!(EngineLogLevel::Nothing.level_filter(), LevelFilter::OFF);
    }

    #[test]
    fn test_ordering_follows_verbosity() {
        let mut sorted = EngineLogLevel::ALL;
        sorted.sort();
        assert_eq!(sorted, EngineLogLevel::ALL);
        assert!(EngineLogLevel::Debug < EngineLogLevel::Warning);
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_string(&EngineLogLevel::DebugEvent).unwrap();
        assert_eq!(json, "\"debug_event\"");
    }
}
