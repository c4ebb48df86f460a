//! Backlash Compensator
//!
//! Per-axis slack compensation for X and Y. When an axis reverses direction
//! the configured backlash distance is added to that axis' accumulated offset
//! and a corrective rapid pre-loads the slack before the real move runs.
//!
//! The compensator holds no run state of its own: [`BacklashState`] is threaded
//! through [`BacklashCompensator::step`] so each generation run folds over its
//! moves from a fresh state.

use serde::{Deserialize, Serialize};

use crate::motion::{MoveKind, Point3};

/// Backlash distances per axis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacklashOptions {
    pub x: f64,
    pub y: f64,
    /// Deltas smaller than this do not count as a direction
    pub threshold: f64,
}

impl Default for BacklashOptions {
    fn default() -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            threshold: 0.05,
        }
    }
}

impl BacklashOptions {
    pub fn is_enabled(&self) -> bool {
        self.x != 0.0 || self.y != 0.0
    }
}

/// Compensation state carried from one move to the next
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BacklashState {
    /// Last significant direction per axis: -1, 0 or 1
    pub last_direction: [i8; 2],
    /// Offset currently applied per axis
    pub offset: [f64; 2],
    /// Logical, uncompensated position
    pub cursor: Point3,
}

impl BacklashState {
    pub fn at(cursor: Point3) -> Self {
        Self {
            cursor,
            ..Default::default()
        }
    }

    fn apply(&self, point: Point3) -> Point3 {
        Point3::new(point.x + self.offset[0], point.y + self.offset[1], point.z)
    }
}

#[derive(Debug, Clone)]
pub struct BacklashCompensator {
    options: BacklashOptions,
    rapid_feed: f64,
}

impl BacklashCompensator {
    /// `rapid_feed` is used for the corrective pre-load moves
    pub fn new(options: BacklashOptions, rapid_feed: f64) -> Self {
        Self {
            options,
            rapid_feed,
        }
    }

    fn direction(&self, delta: f64) -> i8 {
        if delta.abs() < self.options.threshold {
            0
        } else if delta > 0.0 {
            1
        } else {
            -1
        }
    }

    /// Compensate one requested move.
    ///
    /// Returns the next state and the moves to emit: an optional corrective
    /// rapid followed by the requested move shifted by the accumulated
    /// offsets. Dwells and opaque commands pass through unchanged.
    pub fn step(&self, state: &BacklashState, request: MoveKind) -> (BacklashState, Vec<MoveKind>) {
        let Some(target) = request.target() else {
            return (*state, vec![request]);
        };

        let mut next = *state;
        let deltas = [target.x - state.cursor.x, target.y - state.cursor.y];
        let distances = [self.options.x, self.options.y];
        let mut offset_changed = false;

        for axis in 0..2 {
            let direction = self.direction(deltas[axis]);
            if direction == 0 {
                continue;
            }
            let last = state.last_direction[axis];
            if last != 0 && direction != last && distances[axis] != 0.0 {
                next.offset[axis] += distances[axis] * f64::from(direction);
                offset_changed = true;
            }
            next.last_direction[axis] = direction;
        }

        let mut moves = Vec::with_capacity(2);
        if offset_changed {
            moves.push(MoveKind::Rapid {
                target: next.apply(state.cursor),
                feed: self.rapid_feed,
            });
        }
        moves.push(match request {
            MoveKind::Rapid { feed, .. } => MoveKind::Rapid {
                target: next.apply(target),
                feed,
            },
            MoveKind::Linear { feed, .. } => MoveKind::Linear {
                target: next.apply(target),
                feed,
            },
            other => other,
        });
        next.cursor = target;

        (next, moves)
    }

    /// Compensate a whole move sequence starting at `start`
    pub fn compensate<I>(&self, start: Point3, requests: I) -> Vec<MoveKind>
    where
        I: IntoIterator<Item = MoveKind>,
    {
        requests
            .into_iter()
            .fold(
                (BacklashState::at(start), Vec::new()),
                |(state, mut out), request| {
                    let (next, moves) = self.step(&state, request);
                    out.extend(moves);
                    (next, out)
                },
            )
            .1
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear(x: f64, y: f64) -> MoveKind {
        MoveKind::Linear {
            target: Point3::new(x, y, 0.0),
            feed: 1000.0,
        }
    }

    fn compensator(x: f64, y: f64) -> BacklashCompensator {
        BacklashCompensator::new(
            BacklashOptions {
                x,
                y,
                ..Default::default()
            },
            3000.0,
        )
    }

    #[test]
    fn test_single_reversal_inserts_one_corrective_rapid() {
        let moves = compensator(2.0, 0.0)
            .compensate(Point3::default(), vec![linear(10.0, 0.0), linear(5.0, 0.0)]);

        assert_eq!(
            moves,
            vec![
                linear(10.0, 0.0),
                MoveKind::Rapid {
                    target: Point3::new(8.0, 0.0, 0.0),
                    feed: 3000.0
                },
                linear(3.0, 0.0),
            ]
        );
    }

    #[test]
    fn test_no_reversal_from_rest() {
        let moves = compensator(2.0, 2.0)
            .compensate(Point3::default(), vec![linear(-10.0, -10.0), linear(-20.0, -5.0)]);
        // only Y reverses on the second move
        assert_eq!(moves.len(), 3);
        assert_eq!(
            moves[1],
            MoveKind::Rapid {
                target: Point3::new(-10.0, -8.0, 0.0),
                feed: 3000.0
            }
        );
        assert_eq!(moves[2], linear(-20.0, -3.0));
    }

    #[test]
    fn test_small_deltas_keep_direction() {
        let comp = compensator(1.0, 0.0);
        let state = BacklashState::at(Point3::default());
        let (state, _) = comp.step(&state, linear(10.0, 0.0));
        let (state, moves) = comp.step(&state, linear(9.98, 0.0));
        assert_eq!(moves.len(), 1);
        assert_eq!(state.last_direction[0], 1);

        // the reversal is still detected after the jitter
        let (state, moves) = comp.step(&state, linear(5.0, 0.0));
        assert_eq!(moves.len(), 2);
        assert_eq!(state.offset[0], -1.0);
        assert_eq!(state.cursor, Point3::new(5.0, 0.0, 0.0));
    }

    #[test]
    fn test_offset_accumulates_and_unwinds() {
        let comp = compensator(0.5, 0.0);
        let moves = comp.compensate(
            Point3::default(),
            vec![linear(10.0, 0.0), linear(0.0, 0.0), linear(10.0, 0.0)],
        );
        assert_eq!(moves.len(), 5);
        assert_eq!(moves[4], linear(10.0, 0.0));
    }

    #[test]
    fn test_pass_through_non_motion() {
        let comp = compensator(1.0, 1.0);
        let state = BacklashState::at(Point3::default());
        let (next, moves) = comp.step(&state, MoveKind::Dwell { seconds: 1.0 });
        assert_eq!(next, state);
        assert_eq!(moves, vec![MoveKind::Dwell { seconds: 1.0 }]);
    }

    #[test]
    fn test_disabled_is_identity() {
        let requests = vec![linear(10.0, 0.0), linear(0.0, 10.0), linear(5.0, -5.0)];
        let moves = compensator(0.0, 0.0).compensate(Point3::default(), requests.clone());
        assert_eq!(moves, requests);
    }
}
