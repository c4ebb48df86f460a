//! Real-time commands
//!
//! Single bytes the firmware acts on immediately, bypassing the line buffer.
//! They are sent unterminated and never acknowledged.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RealtimeCommand {
    StatusQuery,
    FeedHold,
    CycleStart,
    SoftReset,
    JogCancel,
    FeedReset,
    FeedCoarsePlus,
    FeedCoarseMinus,
    FeedFinePlus,
    FeedFineMinus,
    RapidFull,
    RapidHalf,
    RapidQuarter,
    SpindleReset,
    SpindleCoarsePlus,
    SpindleCoarseMinus,
    SpindleFinePlus,
    SpindleFineMinus,
}

impl RealtimeCommand {
    pub const ALL: [RealtimeCommand; 18] = [
        Self::StatusQuery,
        Self::FeedHold,
        Self::CycleStart,
        Self::SoftReset,
        Self::JogCancel,
        Self::FeedReset,
        Self::FeedCoarsePlus,
        Self::FeedCoarseMinus,
        Self::FeedFinePlus,
        Self::FeedFineMinus,
        Self::RapidFull,
        Self::RapidHalf,
        Self::RapidQuarter,
        Self::SpindleReset,
        Self::SpindleCoarsePlus,
        Self::SpindleCoarseMinus,
        Self::SpindleFinePlus,
        Self::SpindleFineMinus,
    ];

    /// The byte put on the wire
    pub fn byte(self) -> u8 {
        match self {
            Self::StatusQuery => b'?',
            Self::FeedHold => b'!',
            Self::CycleStart => b'~',
            Self::SoftReset => 0x18,
            Self::JogCancel => 0x85,
            Self::FeedReset => 0x90,
            Self::FeedCoarsePlus => 0x91,
            Self::FeedCoarseMinus => 0x92,
            Self::FeedFinePlus => 0x93,
            Self::FeedFineMinus => 0x94,
            Self::RapidFull => 0x95,
            Self::RapidHalf => 0x96,
            Self::RapidQuarter => 0x97,
            Self::SpindleReset => 0x99,
            Self::SpindleCoarsePlus => 0x9A,
            Self::SpindleCoarseMinus => 0x9B,
            Self::SpindleFinePlus => 0x9C,
            Self::SpindleFineMinus => 0x9D,
        }
    }

    pub fn from_byte(byte: u8) -> Option<Self> {
        Self::ALL.into_iter().find(|cmd| cmd.byte() == byte)
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::StatusQuery => "status",
            Self::FeedHold => "hold",
            Self::CycleStart => "resume",
            Self::SoftReset => "reset",
            Self::JogCancel => "jog-cancel",
            Self::FeedReset => "feed-reset",
            Self::FeedCoarsePlus => "feed+10",
            Self::FeedCoarseMinus => "feed-10",
            Self::FeedFinePlus => "feed+1",
            Self::FeedFineMinus => "feed-1",
            Self::RapidFull => "rapid-100",
            Self::RapidHalf => "rapid-50",
            Self::RapidQuarter => "rapid-25",
            Self::SpindleReset => "spindle-reset",
            Self::SpindleCoarsePlus => "spindle+10",
            Self::SpindleCoarseMinus => "spindle-10",
            Self::SpindleFinePlus => "spindle+1",
            Self::SpindleFineMinus => "spindle-1",
        }
    }
}

impl fmt::Display for RealtimeCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for RealtimeCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|cmd| cmd.name() == wanted)
            .ok_or_else(|| format!("Unknown real-time command: {}", s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bytes() {
        assert_eq!(RealtimeCommand::FeedHold.byte(), 0x21);
        assert_eq!(RealtimeCommand::CycleStart.byte(), 0x7E);
        assert_eq!(RealtimeCommand::SoftReset.byte(), 0x18);
        assert_eq!(RealtimeCommand::JogCancel.byte(), 0x85);
        assert_eq!(RealtimeCommand::from_byte(0x94), Some(RealtimeCommand::FeedFineMinus));
        assert_eq!(RealtimeCommand::from_byte(0x98), None);
    }

    #[test]
    fn test_bytes_unique() {
        let mut bytes: Vec<u8> = RealtimeCommand::ALL.iter().map(|c| c.byte()).collect();
        bytes.sort_unstable();
        bytes.dedup();
        assert_eq!(bytes.len(), RealtimeCommand::ALL.len());
    }

    #[test]
    fn test_names() {
        assert_eq!("hold".parse(), Ok(RealtimeCommand::FeedHold));
        assert_eq!("Feed+10".parse(), Ok(RealtimeCommand::FeedCoarsePlus));
        assert!("warp".parse::<RealtimeCommand>().is_err());
    }
}
