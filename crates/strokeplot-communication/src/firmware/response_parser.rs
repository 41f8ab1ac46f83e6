//! Reply classification
//!
//! Every non-blank line a controller sends in answer to a command is one
//! `Reply`. The streamer treats any reply as the acknowledgment that lets it
//! send the next line; only strict mode looks at the kind.

use std::fmt;

/// A single reply line from the controller
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// OK acknowledgment
    Ok,
    /// Error response with error code
    Error(u8),
    /// Alarm response with alarm code
    Alarm(u8),
    /// Banner, status report or any other text
    Message(String),
}

impl Reply {
    /// Classify a reply line
    pub fn parse(line: &str) -> Self {
        let line = line.trim();

        if line.eq_ignore_ascii_case("ok") {
            return Self::Ok;
        }

        if let Some(code) = line.strip_prefix("error:") {
            if let Ok(code) = code.trim().parse::<u8>() {
                return Self::Error(code);
            }
        }

        let alarm = line
            .strip_prefix("ALARM:")
            .or_else(|| line.strip_prefix("alarm:"));
        if let Some(code) = alarm {
            if let Ok(code) = code.trim().parse::<u8>() {
                return Self::Alarm(code);
            }
        }

        Self::Message(line.to_string())
    }

    /// Check if this is a plain acknowledgment
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok)
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(code) => write!(f, "error:{} ({})", code, error_description(*code)),
            Self::Alarm(code) => write!(f, "ALARM:{} ({})", code, alarm_description(*code)),
            Self::Message(msg) => write!(f, "{}", msg),
        }
    }
}

/// Get error description
pub fn error_description(code: u8) -> &'static str {
    match code {
        1 => "Expected command letter",
        2 => "Bad number format",
        3 => "Invalid statement",
        4 => "Negative value",
        5 => "Setting disabled",
        9 => "G-code locked out during alarm",
        11 => "Line overflow",
        20 => "Unsupported or invalid g-code command",
        21 => "Modal group violation",
        22 => "Undefined feed rate",
        23 => "Command requires an integer value",
        24 => "Axis words conflict",
        25 => "Repeated g-code word",
        26 => "No axis words",
        _ => "Unknown error",
    }
}

/// Get alarm description
pub fn alarm_description(code: u8) -> &'static str {
    match code {
        1 => "Hard limit triggered",
        2 => "Soft limit exceeded",
        3 => "Abort during cycle",
        4 => "Probe fail",
        5 => "Probe not triggered",
        6 => "Homing fail",
        7 => "Homing fail pulloff",
        8 => "Spindle control failure",
        9 => "Cooling mist control failure",
        _ => "Unknown alarm",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ok() {
        assert_eq!(Reply::parse("ok"), Reply::Ok);
        assert_eq!(Reply::parse("ok\r"), Reply::Ok);
        assert!(Reply::parse(" OK ").is_ok());
    }

    #[test]
    fn test_parse_error_and_alarm() {
        assert_eq!(Reply::parse("error:20"), Reply::Error(20));
        assert_eq!(Reply::parse("ALARM:2"), Reply::Alarm(2));
        assert_eq!(Reply::parse("alarm:1"), Reply::Alarm(1));
    }

    #[test]
    fn test_unparseable_code_is_message() {
        assert_eq!(
            Reply::parse("error:abc"),
            Reply::Message("error:abc".to_string())
        );
        assert_eq!(
            Reply::parse("[MSG:Pgm End]"),
            Reply::Message("[MSG:Pgm End]".to_string())
        );
    }

    #[test]
    fn test_display_includes_description() {
        assert_eq!(
            Reply::Error(22).to_string(),
            "error:22 (Undefined feed rate)"
        );
        assert_eq!(
            Reply::Alarm(1).to_string(),
            "ALARM:1 (Hard limit triggered)"
        );
        assert_eq!(error_description(200), "Unknown error");
    }
}
