//! Logging notifications and the syslog-style level ladder.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Log level, ordered by syslog priority (emergency=0 .. debug=7).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Detailed debugging information
    Debug,
    /// Normal operational messages
    Info,
    /// Normal but significant events
    Notice,
    /// Warning conditions
    Warning,
    /// Error conditions
    Error,
    /// Critical conditions
    Critical,
    /// Action must be taken immediately
    Alert,
    /// System is unusable
    Emergency,
}

impl LogLevel {
    /// Syslog priority: lower is more severe.
    pub const fn priority(self) -> u8 {
        match self {
            Self::Debug => 7,
            Self::Info => 6,
            Self::Notice => 5,
            Self::Warning => 4,
            Self::Error => 3,
            Self::Critical => 2,
            Self::Alert => 1,
            Self::Emergency => 0,
        }
    }

    /// Whether a message at `self` passes a session floor of `floor`.
    ///
    /// A message is delivered iff its priority is at most the floor's
    /// (more severe or equal).
    pub const fn passes(self, floor: Self) -> bool {
        self.priority() <= floor.priority()
    }

    /// Wire name of the level.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Notice => "notice",
            Self::Warning => "warning",
            Self::Error => "error",
            Self::Critical => "critical",
            Self::Alert => "alert",
            Self::Emergency => "emergency",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LogLevel {
    type Err = UnknownLogLevel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "notice" => Ok(Self::Notice),
            "warning" => Ok(Self::Warning),
            "error" => Ok(Self::Error),
            "critical" => Ok(Self::Critical),
            "alert" => Ok(Self::Alert),
            "emergency" => Ok(Self::Emergency),
            other => Err(UnknownLogLevel(other.to_string())),
        }
    }
}

/// Error for unrecognized level strings from the wire.
#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown log level: {0}")]
pub struct UnknownLogLevel(pub String);

/// `logging/setLevel` request parameters.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SetLevelRequest {
    /// New minimum level for the session
    pub level: LogLevel,
}

/// `notifications/message` payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LoggingMessageNotification {
    /// Severity of this message
    pub level: LogLevel,
    /// Optional logger name
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    /// Arbitrary JSON payload
    pub data: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priorities_follow_syslog() {
        assert_eq!(LogLevel::Debug.priority(), 7);
        assert_eq!(LogLevel::Info.priority(), 6);
        assert_eq!(LogLevel::Notice.priority(), 5);
        assert_eq!(LogLevel::Warning.priority(), 4);
        assert_eq!(LogLevel::Error.priority(), 3);
        assert_eq!(LogLevel::Critical.priority(), 2);
        assert_eq!(LogLevel::Alert.priority(), 1);
        assert_eq!(LogLevel::Emergency.priority(), 0);
    }

    #[test]
    fn floor_filtering() {
        // Floor info: info and more severe pass, debug does not.
        assert!(LogLevel::Info.passes(LogLevel::Info));
        assert!(LogLevel::Error.passes(LogLevel::Info));
        assert!(!LogLevel::Debug.passes(LogLevel::Info));
        // Floor debug: everything passes.
        assert!(LogLevel::Debug.passes(LogLevel::Debug));
    }

    #[test]
    fn levels_parse_from_wire_names() {
        assert_eq!("warning".parse::<LogLevel>().unwrap(), LogLevel::Warning);
        assert!("verbose".parse::<LogLevel>().is_err());
    }

    #[test]
    fn serde_uses_lowercase() {
        assert_eq!(
            serde_json::to_value(LogLevel::Emergency).unwrap(),
            serde_json::json!("emergency")
        );
    }
}
