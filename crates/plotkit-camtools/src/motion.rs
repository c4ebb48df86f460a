//! Motion program model and text format.
//!
//! A [`MotionProgram`] is the ordered list of machine moves produced by the
//! emitter. Each move carries its duration and its start time measured from
//! the beginning of the program; [`ProgramBuilder`] keeps those consistent.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// A 3-D machine position in millimeters
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Point3 {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Point3) -> f64 {
        let (dx, dy, dz) = (self.x - other.x, self.y - other.y, self.z - other.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }
}

/// What a single move does
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum MoveKind {
    /// Pen-up travel (`G0`)
    Rapid { target: Point3, feed: f64 },
    /// Drawing or controlled move (`G1`)
    Linear { target: Point3, feed: f64 },
    /// Pause in seconds (`G4 P..`)
    Dwell { seconds: f64 },
    /// Opaque line carried through verbatim, e.g. from a dip template
    Command(String),
}

impl MoveKind {
    pub fn target(&self) -> Option<Point3> {
        match self {
            MoveKind::Rapid { target, .. } | MoveKind::Linear { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Execution time in seconds when starting from `from`
    pub fn duration_from(&self, from: &Point3) -> f64 {
        match self {
            MoveKind::Rapid { target, feed } | MoveKind::Linear { target, feed } => {
                if *feed > 0.0 {
                    from.distance_to(target) * 60.0 / feed
                } else {
                    0.0
                }
            }
            MoveKind::Dwell { seconds } => seconds.max(0.0),
            MoveKind::Command(_) => 0.0,
        }
    }
}

/// A move with derived timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Move {
    pub kind: MoveKind,
    /// Seconds this move takes
    pub duration: f64,
    /// Seconds from program start until this move begins
    pub start_time: f64,
    /// Comments rendered on their own lines before the move
    pub comments: Vec<String>,
}

/// An ordered, timed list of moves plus the surrounding program lines
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MotionProgram {
    pub preamble: Vec<String>,
    pub moves: Vec<Move>,
    pub postamble: Vec<String>,
    pub total_time: f64,
}

fn coord(value: f64) -> String {
    // avoid rendering "-0.000"
    let value = if value.abs() < 0.0005 { 0.0 } else { value };
    format!("{:.3}", value)
}

impl MotionProgram {
    pub fn builder(start: Point3) -> ProgramBuilder {
        ProgramBuilder::new(start)
    }

    pub fn len(&self) -> usize {
        self.moves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Render the program as one command per line.
    ///
    /// Only axes that changed since the previous move are written and `F` is
    /// written on `G1` only when the feed rate changes.
    pub fn to_lines(&self) -> Vec<String> {
        let mut lines = self.preamble.clone();
        let mut position: Option<Point3> = None;
        let mut last_feed: Option<f64> = None;

        for mv in &self.moves {
            for comment in &mv.comments {
                lines.push(format!("({})", comment));
            }
            match &mv.kind {
                MoveKind::Rapid { target, .. } => {
                    lines.push(format!("G0{}", axis_words(position, target)));
                    position = Some(*target);
                }
                MoveKind::Linear { target, feed } => {
                    let mut line = format!("G1{}", axis_words(position, target));
                    if last_feed != Some(*feed) {
                        line.push_str(&format!(" F{}", feed.round() as i64));
                        last_feed = Some(*feed);
                    }
                    lines.push(line);
                    position = Some(*target);
                }
                MoveKind::Dwell { seconds } => lines.push(format!("G4 P{}", coord(*seconds))),
                MoveKind::Command(text) => lines.push(text.clone()),
            }
        }

        lines.extend(self.postamble.iter().cloned());
        lines
    }

    /// Parse one program line into a move.
    ///
    /// Axes missing from the line keep their value from `from`. Returns
    /// `None` for blank, comment-only and `%` lines; any other line that is
    /// not `G0`, `G1` or `G4` becomes an opaque [`MoveKind::Command`].
    pub fn parse_line(line: &str, from: Point3, rapid_feed: f64, feed: f64) -> Option<MoveKind> {
        let code = strip_comment(line).trim();
        if code.is_empty() || code == "%" {
            return None;
        }

        let mut g: Option<u32> = None;
        let mut target = from;
        let mut f: Option<f64> = None;
        let mut p: Option<f64> = None;
        for caps in word_regex().captures_iter(code) {
            let Ok(value) = caps[2].parse::<f64>() else {
                continue;
            };
            match caps[1].to_ascii_uppercase().as_str() {
                "G" if g.is_none() => g = Some(value as u32),
                "X" => target.x = value,
                "Y" => target.y = value,
                "Z" => target.z = value,
                "F" => f = Some(value),
                "P" => p = Some(value),
                _ => {}
            }
        }

        match g {
            Some(0) => Some(MoveKind::Rapid {
                target,
                feed: f.unwrap_or(rapid_feed),
            }),
            Some(1) => Some(MoveKind::Linear {
                target,
                feed: f.unwrap_or(feed),
            }),
            Some(4) => Some(MoveKind::Dwell {
                seconds: p.unwrap_or(0.0),
            }),
            _ => Some(MoveKind::Command(code.to_string())),
        }
    }
}

fn axis_words(from: Option<Point3>, to: &Point3) -> String {
    let mut words = String::new();
    let changed = |a: f64, b: f64| coord(a) != coord(b);
    if from.is_none_or(|p| changed(p.x, to.x)) {
        words.push_str(&format!(" X{}", coord(to.x)));
    }
    if from.is_none_or(|p| changed(p.y, to.y)) {
        words.push_str(&format!(" Y{}", coord(to.y)));
    }
    if from.is_none_or(|p| changed(p.z, to.z)) {
        words.push_str(&format!(" Z{}", coord(to.z)));
    }
    words
}

fn word_regex() -> &'static Regex {
    static WORD_REGEX: OnceLock<Regex> = OnceLock::new();
    WORD_REGEX.get_or_init(|| {
        Regex::new(r"([A-Za-z])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
    })
}

fn dip_regex() -> &'static Regex {
    static DIP_REGEX: OnceLock<Regex> = OnceLock::new();
    DIP_REGEX.get_or_init(|| Regex::new(r"\(Dip #(\d+)").expect("invalid regex pattern"))
}

/// The part of a line before any `;` or `(` comment
pub fn strip_comment(line: &str) -> &str {
    match line.find([';', '(']) {
        Some(index) => &line[..index],
        None => line,
    }
}

/// Location of a dip comment in program text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DipMarker {
    /// Dip sequence number, starting at 1
    pub number: usize,
    /// Zero-based index of the comment line
    pub line_index: usize,
}

/// Find every `(Dip #n ...)` comment in program text
pub fn dip_markers<S: AsRef<str>>(lines: &[S]) -> Vec<DipMarker> {
    lines
        .iter()
        .enumerate()
        .filter_map(|(line_index, line)| {
            let caps = dip_regex().captures(line.as_ref())?;
            let number = caps[1].parse().ok()?;
            Some(DipMarker { number, line_index })
        })
        .collect()
}

/// Appends moves while keeping durations and start times consistent
#[derive(Debug, Clone)]
pub struct ProgramBuilder {
    moves: Vec<Move>,
    position: Point3,
    elapsed: f64,
    pending_comments: Vec<String>,
}

impl ProgramBuilder {
    pub fn new(start: Point3) -> Self {
        Self {
            moves: Vec::new(),
            position: start,
            elapsed: 0.0,
            pending_comments: Vec::new(),
        }
    }

    /// Logical machine position after the moves pushed so far
    pub fn position(&self) -> Point3 {
        self.position
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }

    /// Attach a comment to the next pushed move
    pub fn comment(&mut self, text: impl Into<String>) {
        self.pending_comments.push(text.into());
    }

    pub fn push(&mut self, kind: MoveKind) {
        let duration = kind.duration_from(&self.position);
        if let Some(target) = kind.target() {
            self.position = target;
        }
        self.moves.push(Move {
            kind,
            duration,
            start_time: self.elapsed,
            comments: std::mem::take(&mut self.pending_comments),
        });
        self.elapsed += duration;
    }

    /// Close the program. Comments with no move left to carry them are
    /// written ahead of the postamble.
    pub fn finish(self, preamble: Vec<String>, postamble: Vec<String>) -> MotionProgram {
        let mut trailing: Vec<String> = self
            .pending_comments
            .iter()
            .map(|comment| format!("({})", comment))
            .collect();
        trailing.extend(postamble);
        MotionProgram {
            preamble,
            moves: self.moves,
            postamble: trailing,
            total_time: self.elapsed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_durations_and_start_times() {
        let mut builder = MotionProgram::builder(Point3::default());
        builder.push(MoveKind::Rapid {
            target: Point3::new(30.0, 40.0, 0.0),
            feed: 3000.0,
        });
        builder.push(MoveKind::Dwell { seconds: 0.5 });
        builder.push(MoveKind::Command("M400".to_string()));
        builder.push(MoveKind::Linear {
            target: Point3::new(30.0, 0.0, 0.0),
            feed: 1200.0,
        });
        let program = builder.finish(Vec::new(), Vec::new());

        let durations: Vec<f64> = program.moves.iter().map(|m| m.duration).collect();
        assert_eq!(durations, vec![1.0, 0.5, 0.0, 2.0]);
        let starts: Vec<f64> = program.moves.iter().map(|m| m.start_time).collect();
        assert_eq!(starts, vec![0.0, 1.0, 1.5, 1.5]);
        assert_eq!(program.total_time, 3.5);
    }

    #[test]
    fn test_to_lines_writes_changed_axes() {
        let mut builder = MotionProgram::builder(Point3::default());
        builder.push(MoveKind::Rapid {
            target: Point3::new(10.0, 5.0, 2.0),
            feed: 3000.0,
        });
        builder.comment("Tool 2");
        builder.push(MoveKind::Linear {
            target: Point3::new(10.0, 5.0, 0.0),
            feed: 1000.0,
        });
        builder.push(MoveKind::Linear {
            target: Point3::new(20.0, 5.0, 0.0),
            feed: 1000.0,
        });
        builder.push(MoveKind::Dwell { seconds: 0.25 });
        let program = builder.finish(vec!["%".to_string()], vec!["%".to_string()]);

        assert_eq!(
            program.to_lines(),
            vec![
                "%",
                "G0 X10.000 Y5.000 Z2.000",
                "(Tool 2)",
                "G1 Z0.000 F1000",
                "G1 X20.000",
                "G4 P0.250",
                "%",
            ]
        );
    }

    #[test]
    fn test_parse_line() {
        let from = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(
            MotionProgram::parse_line("G0 X10 Y-2.5", from, 3000.0, 1000.0),
            Some(MoveKind::Rapid {
                target: Point3::new(10.0, -2.5, 3.0),
                feed: 3000.0
            })
        );
        assert_eq!(
            MotionProgram::parse_line("g1 z0 f300 ; plunge", from, 3000.0, 1000.0),
            Some(MoveKind::Linear {
                target: Point3::new(1.0, 2.0, 0.0),
                feed: 300.0
            })
        );
        assert_eq!(
            MotionProgram::parse_line("G4 P1.5", from, 3000.0, 1000.0),
            Some(MoveKind::Dwell { seconds: 1.5 })
        );
        assert_eq!(
            MotionProgram::parse_line("M3 S1000", from, 3000.0, 1000.0),
            Some(MoveKind::Command("M3 S1000".to_string()))
        );
        assert_eq!(MotionProgram::parse_line("%", from, 3000.0, 1000.0), None);
        assert_eq!(
            MotionProgram::parse_line("(Dip #1 at X0 Y0)", from, 3000.0, 1000.0),
            None
        );
    }

    #[test]
    fn test_trailing_comments_survive_finish() {
        let mut builder = MotionProgram::builder(Point3::default());
        builder.push(MoveKind::Rapid {
            target: Point3::new(0.0, 0.0, 5.0),
            feed: 3000.0,
        });
        builder.comment("Dip #3 at X10.000 Y20.000");
        let program = builder.finish(vec!["%".to_string()], vec!["%".to_string()]);

        let lines = program.to_lines();
        assert_eq!(
            lines[lines.len() - 2..],
            ["(Dip #3 at X10.000 Y20.000)".to_string(), "%".to_string()]
        );
        assert_eq!(dip_markers(&lines).len(), 1);
    }

    #[test]
    fn test_dip_markers() {
        let lines = vec![
            "%",
            "G21",
            "(Dip #1 at X10.000 Y20.000)",
            "G0 Z5.000",
            "(Tool 2)",
            "(Dip #2 at X10.000 Y20.000)",
        ];
        assert_eq!(
            dip_markers(&lines),
            vec![
                DipMarker {
                    number: 1,
                    line_index: 2
                },
                DipMarker {
                    number: 2,
                    line_index: 5
                },
            ]
        );
    }

    #[test]
    fn test_stacked_comments() {
        let mut builder = ProgramBuilder::new(Point3::default());
        builder.comment("Tool 1");
        builder.comment("Dip #1 at X0.000 Y0.000");
        builder.push(MoveKind::Dwell { seconds: 1.0 });
        let program = builder.finish(Vec::new(), Vec::new());
        let lines = program.to_lines();
        assert_eq!(lines, vec!["(Tool 1)", "(Dip #1 at X0.000 Y0.000)", "G4 P1.000"]);
        assert_eq!(dip_markers(&lines)[0].line_index, 1);
    }
}
