//! # Plotkit CAM Tools
//!
//! Toolpath pipeline for pen plotters: turns colored polylines into a timed,
//! backlash-compensated motion program.
//!
//! ## Pipeline
//!
//! - **Geometry**: points, distances, collinearity and bounds
//! - **Optimizer**: artefact filtering, duplicate removal, simplification,
//!   merging and travel ordering
//! - **Backlash**: per-axis slack compensation as a pure fold
//! - **Dip**: tool-service scheduling and template realignment
//! - **Motion**: the motion program model and its text format
//! - **Emitter**: runs the stages and assembles the program

pub mod backlash;
pub mod dip;
pub mod emitter;
pub mod error;
pub mod geometry;
pub mod motion;
pub mod optimizer;

pub use backlash::{BacklashCompensator, BacklashOptions, BacklashState};
pub use dip::{plan_dips, realign_template, DipOptions, DipPoint, DipScheduler};
pub use emitter::{Emitter, EmitterOptions, GenerationResult};
pub use error::{CamToolError, CamToolResult, ParameterError, ParameterResult};
pub use geometry::{paths_from_json, Bounds, Path, Point};
pub use motion::{dip_markers, DipMarker, MotionProgram, Move, MoveKind, Point3};
pub use optimizer::{
    optimize, GreedyMerge, MergeStrategy, NearestNeighborOrder, OptimizationStats,
    OptimizerOptions, OrderStrategy, PathOptimizer,
};
