//! GRBL Response Parser
//!
//! Classifies inbound lines: acknowledgments (`ok`, `error:`), alarms,
//! telemetry frames, settings, the startup banner and bracketed messages.

use super::error_decoder::{describe_alarm, describe_error};
use super::status_parser::{StatusParser, StatusReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Payload of an `error:` acknowledgment
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Numeric code (GRBL 1.1)
    Code(u8),
    /// Free text (GRBL 0.9 and some forks)
    Text(String),
}

/// GRBL response types
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GrblResponse {
    /// Line accepted
    Ok,
    /// Line rejected
    Error(ErrorKind),
    /// Alarm with its code
    Alarm(u8),
    /// Telemetry frame
    Status(StatusReport),
    /// `$n=value`
    Setting { number: u16, value: String },
    /// Startup banner (`Grbl 1.1h ['$' for help]`)
    Version(String),
    /// Bracketed feedback (`[MSG:...]`) or any other unsolicited line
    Message(String),
}

impl GrblResponse {
    /// Parse one response line; `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }

        if line == "ok" {
            return Some(Self::Ok);
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "error:") {
            let rest = rest.trim();
            let kind = match rest.parse::<u8>() {
                Ok(code) => ErrorKind::Code(code),
                Err(_) => ErrorKind::Text(rest.to_string()),
            };
            return Some(Self::Error(kind));
        }

        if let Some(rest) = strip_prefix_ignore_case(line, "alarm:") {
            if let Ok(code) = rest.trim().parse::<u8>() {
                return Some(Self::Alarm(code));
            }
        }

        if let Some(report) = StatusParser::parse(line) {
            return Some(Self::Status(report));
        }

        if let Some(setting) = line.strip_prefix('$') {
            if let Some((number, value)) = setting.split_once('=') {
                if let Ok(number) = number.parse::<u16>() {
                    return Some(Self::Setting {
                        number,
                        value: value.to_string(),
                    });
                }
            }
        }

        if line.starts_with("Grbl ") {
            return Some(Self::Version(line.to_string()));
        }

        if let Some(inner) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            let text = inner.strip_prefix("MSG:").unwrap_or(inner);
            return Some(Self::Message(text.to_string()));
        }

        Some(Self::Message(line.to_string()))
    }

    /// `ok` and `error:` both acknowledge one sent line
    pub fn is_acknowledgment(&self) -> bool {
        matches!(self, Self::Ok | Self::Error(_))
    }

    /// Human-readable description for errors and alarms
    pub fn description(&self) -> Option<String> {
        match self {
            Self::Error(ErrorKind::Code(code)) => Some(describe_error(*code).to_string()),
            Self::Error(ErrorKind::Text(text)) => Some(text.clone()),
            Self::Alarm(code) => Some(describe_alarm(*code).to_string()),
            _ => None,
        }
    }
}

impl fmt::Display for GrblResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::Error(ErrorKind::Code(code)) => write!(f, "error:{}", code),
            Self::Error(ErrorKind::Text(text)) => write!(f, "error:{}", text),
            Self::Alarm(code) => write!(f, "ALARM:{}", code),
            Self::Status(report) => write!(f, "<{}>", report.raw_state),
            Self::Setting { number, value } => write!(f, "${}={}", number, value),
            Self::Version(banner) => write!(f, "{}", banner),
            Self::Message(msg) => write!(f, "{}", msg),
        }
    }
}

fn strip_prefix_ignore_case<'a>(line: &'a str, prefix: &str) -> Option<&'a str> {
    let head = line.get(..prefix.len())?;
    if head.eq_ignore_ascii_case(prefix) {
        Some(&line[prefix.len()..])
    } else {
        None
    }
}
