//! Dip / tool-service scheduling.
//!
//! Tracks pen-down distance and decides after which strokes the pen must
//! visit the service station. Also realigns user-supplied service templates
//! so they run at the configured station coordinates.

use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ParameterError, ParameterResult};
use crate::geometry::{Path, Point};
use crate::motion::strip_comment;

/// Service (dip) settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DipOptions {
    pub enabled: bool,
    /// Pen-down distance between service events, in millimeters
    pub interval: f64,
    /// Service station position
    pub station: Point,
    /// Z height the pen is lowered to at the station
    pub depth_z: f64,
    /// Seconds to wait at the station
    pub dwell: f64,
    /// Replaces the built-in sequence when set
    pub template: Option<String>,
    /// Continuous plotting disables service events entirely
    pub continuous: bool,
}

impl Default for DipOptions {
    fn default() -> Self {
        Self {
            enabled: false,
            interval: 200.0,
            station: Point::ORIGIN,
            depth_z: 0.0,
            dwell: 0.5,
            template: None,
            continuous: false,
        }
    }
}

impl DipOptions {
    /// Whether service events will be inserted at all
    pub fn is_active(&self) -> bool {
        self.enabled && !self.continuous
    }

    pub fn validate(&self) -> ParameterResult<()> {
        if self.is_active() {
            ParameterError::require_positive("dip.interval", self.interval)?;
        }
        ParameterError::require_non_negative("dip.dwell", self.dwell)?;
        Ok(())
    }
}

/// A service event inserted into the output stream
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DipPoint {
    /// Station the pen travels to
    pub position: Point,
    /// Stroke after which the event runs; `None` for the event before the
    /// first stroke
    pub after_path_index: Option<usize>,
}

/// Accumulates drawn distance and reports when a service event is due
#[derive(Debug, Clone)]
pub struct DipScheduler {
    active: bool,
    interval: f64,
    station: Point,
    accumulated: f64,
}

impl DipScheduler {
    pub fn new(options: &DipOptions) -> Self {
        Self {
            active: options.is_active(),
            interval: options.interval,
            station: options.station,
            accumulated: 0.0,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Distance drawn since the last service event
    pub fn accumulated(&self) -> f64 {
        self.accumulated
    }

    /// The event that runs before any drawing starts
    pub fn begin(&mut self) -> Option<DipPoint> {
        if !self.active {
            return None;
        }
        self.accumulated = 0.0;
        Some(DipPoint {
            position: self.station,
            after_path_index: None,
        })
    }

    /// Record a completed stroke; returns an event when the interval is exceeded
    pub fn after_stroke(&mut self, length: f64, path_index: usize) -> Option<DipPoint> {
        if !self.active {
            return None;
        }
        self.accumulated += length;
        if self.accumulated > self.interval {
            self.accumulated = 0.0;
            Some(DipPoint {
                position: self.station,
                after_path_index: Some(path_index),
            })
        } else {
            None
        }
    }
}

/// Plan every service event for an ordered stroke list
pub fn plan_dips(paths: &[Path], options: &DipOptions) -> Vec<DipPoint> {
    if paths.is_empty() {
        return Vec::new();
    }
    let mut scheduler = DipScheduler::new(options);
    let mut dips: Vec<DipPoint> = scheduler.begin().into_iter().collect();
    for (index, path) in paths.iter().enumerate() {
        if let Some(dip) = scheduler.after_stroke(path.length(), index) {
            dips.push(dip);
        }
    }
    dips
}

fn axis_regex() -> &'static Regex {
    static AXIS_REGEX: OnceLock<Regex> = OnceLock::new();
    AXIS_REGEX.get_or_init(|| {
        Regex::new(r"([XxYy])\s*([-+]?(?:\d+\.?\d*|\.\d+))").expect("invalid regex pattern")
    })
}

/// First line whose code part carries both an X and a Y word, in either order
pub fn template_anchor(template: &str) -> Option<Point> {
    template.lines().find_map(|line| {
        let mut x = None;
        let mut y = None;
        for caps in axis_regex().captures_iter(strip_comment(line)) {
            let value: f64 = caps[2].parse().ok()?;
            if caps[1].eq_ignore_ascii_case("x") {
                x.get_or_insert(value);
            } else {
                y.get_or_insert(value);
            }
        }
        Some(Point::new(x?, y?))
    })
}

/// Translate a service template so its anchor lands on `station`.
///
/// Every X and Y word outside comments is shifted by `station - anchor`.
/// A template without an anchor is returned unmodified.
pub fn realign_template(template: &str, station: Point) -> Vec<String> {
    let Some(anchor) = template_anchor(template) else {
        tracing::warn!("Dip template has no X/Y anchor, using it unmodified");
        return template.lines().map(str::to_string).collect();
    };
    let shift = station - anchor;

    template
        .lines()
        .map(|line| {
            let code = strip_comment(line);
            let rest = &line[code.len()..];
            let shifted = axis_regex().replace_all(code, |caps: &regex::Captures| {
                let value: f64 = caps[2].parse().unwrap_or(0.0);
                let axis = &caps[1];
                let moved = if axis.eq_ignore_ascii_case("x") {
                    value + shift.x
                } else {
                    value + shift.y
                };
                format!("{}{:.3}", axis.to_ascii_uppercase(), moved)
            });
            format!("{}{}", shifted, rest)
        })
        .collect()
}
