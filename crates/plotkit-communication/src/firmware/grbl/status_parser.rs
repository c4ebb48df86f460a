//! GRBL Status Report Parsing
//!
//! Parses `<State|Field:v1,v2,...|...>` telemetry frames. Each field is
//! decoded on its own: a field whose numbers fail to parse is dropped and the
//! rest of the frame still applies, so the previous value for that field
//! survives in the status model.

use chrono::Utc;
use plotkit_core::{MachinePosition, MachineState, MachineStatus, OverrideValues};
use serde::{Deserialize, Serialize};

/// Planner and receive buffer availability (`Bf:` / `Buf:`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BufferState {
    /// Free planner blocks
    pub planner: u16,
    /// Free bytes in the serial receive buffer
    pub rx: u16,
}

/// One decoded telemetry frame.
///
/// Every field is optional; `None` means the field was absent or malformed.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct StatusReport {
    pub state: MachineState,
    /// State token as sent, including any sub-state (`Hold:0`)
    pub raw_state: String,
    pub machine_position: Option<MachinePosition>,
    pub work_position: Option<MachinePosition>,
    pub work_offset: Option<MachinePosition>,
    pub feed_rate: Option<f64>,
    pub spindle_speed: Option<f64>,
    pub overrides: Option<OverrideValues>,
    pub buffer: Option<BufferState>,
    pub line_number: Option<u32>,
}

impl StatusReport {
    /// Merge this frame into a status model.
    ///
    /// Fields missing from the frame keep their previous values. When only
    /// one of `MPos`/`WPos` is reported the other is derived from the work
    /// offset, using the last offset seen if this frame carries none.
    pub fn apply(&self, status: &mut MachineStatus) {
        status.state = self.state;

        if let Some(wco) = self.work_offset {
            status.work_offset = Some(wco);
        }

        match (self.machine_position, self.work_position) {
            (Some(mpos), Some(wpos)) => {
                status.machine_position = mpos;
                status.work_position = wpos;
            }
            (Some(mpos), None) => {
                status.machine_position = mpos;
                if let Some(wco) = status.work_offset {
                    status.work_position = mpos.subtract(&wco);
                }
            }
            (None, Some(wpos)) => {
                status.work_position = wpos;
                if let Some(wco) = status.work_offset {
                    status.machine_position = wpos.add(&wco);
                }
            }
            (None, None) => {}
        }

        if let Some(feed) = self.feed_rate {
            status.feed_rate = feed;
        }
        if let Some(spindle) = self.spindle_speed {
            status.spindle_speed = spindle;
        }
        if let Some(overrides) = self.overrides {
            status.overrides = overrides;
        }
        status.updated_at = Some(Utc::now());
    }
}

/// GRBL status report parser
pub struct StatusParser;

impl StatusParser {
    /// Whether a line looks like a telemetry frame
    pub fn is_status_frame(line: &str) -> bool {
        let trimmed = line.trim();
        trimmed.starts_with('<') && trimmed.ends_with('>')
    }

    /// Parse a single `<...>` frame; `None` when the line is not a frame
    pub fn parse(line: &str) -> Option<StatusReport> {
        let body = line.trim().strip_prefix('<')?.strip_suffix('>')?;
        let mut fields = body.split('|');
        let raw_state = fields.next()?.trim();
        if raw_state.is_empty() {
            return None;
        }

        let mut report = StatusReport {
            state: MachineState::from_token(raw_state),
            raw_state: raw_state.to_string(),
            ..Default::default()
        };

        for field in fields {
            let Some((key, value)) = field.split_once(':') else {
                continue;
            };
            match key.trim() {
                "MPos" => report.machine_position = parse_position(value),
                "WPos" => report.work_position = parse_position(value),
                "WCO" => report.work_offset = parse_position(value),
                "FS" => {
                    if let Some(values) = parse_values(value).filter(|v| v.len() >= 2) {
                        report.feed_rate = Some(values[0]);
                        report.spindle_speed = Some(values[1]);
                    }
                }
                "F" => {
                    if let Some(values) = parse_values(value) {
                        report.feed_rate = values.first().copied();
                    }
                }
                "Ov" => report.overrides = parse_overrides(value),
                "Bf" | "Buf" => {
                    report.buffer = parse_integers(value)
                        .filter(|v| v.len() >= 2)
                        .map(|v| BufferState {
                            planner: v[0],
                            rx: v[1],
                        });
                }
                "Ln" => report.line_number = value.trim().parse().ok(),
                other => tracing::trace!("Ignoring status field {}", other),
            }
        }

        Some(report)
    }

    /// Parse every frame in a message that may carry several, one per line
    pub fn parse_all(message: &str) -> Vec<StatusReport> {
        message.lines().filter_map(Self::parse).collect()
    }
}

/// Comma separated finite numbers; any bad component rejects the whole field
fn parse_values(value: &str) -> Option<Vec<f64>> {
    value
        .split(',')
        .map(|part| part.trim().parse::<f64>().ok().filter(|v| v.is_finite()))
        .collect()
}

fn parse_integers(value: &str) -> Option<Vec<u16>> {
    value
        .split(',')
        .map(|part| part.trim().parse::<u16>().ok())
        .collect()
}

fn parse_position(value: &str) -> Option<MachinePosition> {
    let values = parse_values(value)?;
    match values.as_slice() {
        [x, y] => Some(MachinePosition::new(*x, *y, 0.0)),
        [x, y, z, ..] => Some(MachinePosition::new(*x, *y, *z)),
        _ => None,
    }
}

fn parse_overrides(value: &str) -> Option<OverrideValues> {
    match parse_integers(value)?.as_slice() {
        [feed, rapid, spindle, ..] => Some(OverrideValues {
            feed: *feed,
            rapid: *rapid,
            spindle: *spindle,
        }),
        _ => None,
    }
}
