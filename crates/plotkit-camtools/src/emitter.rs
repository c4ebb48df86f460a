//! Motion Program Emitter
//!
//! Runs the toolpath pipeline for one generation request: fit the artwork to
//! the target area, optimize the strokes, plan service events and emit the
//! backlash-compensated motion program.

use serde::{Deserialize, Serialize};

use crate::backlash::{BacklashCompensator, BacklashOptions, BacklashState};
use crate::dip::{plan_dips, realign_template, DipOptions, DipPoint};
use crate::error::{CamToolError, CamToolResult, ParameterError};
use crate::geometry::{Bounds, Path, Point};
use crate::motion::{MotionProgram, MoveKind, Point3, ProgramBuilder};
use crate::optimizer::{OptimizationStats, OptimizerOptions, PathOptimizer};

/// Everything needed to turn polylines into a motion program
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmitterOptions {
    /// Scale the artwork uniformly into the target area
    pub fit_to_target: bool,
    pub target_width: f64,
    pub target_height: f64,
    /// Lower-left corner of the target area
    pub offset: Point,
    /// Drawing coordinates grow downwards, machine coordinates upwards
    pub flip_y: bool,
    /// Drawing feed rate in mm/min
    pub feed_rate: f64,
    /// Travel feed rate in mm/min, used for timing estimates
    pub rapid_rate: f64,
    pub pen_up_z: f64,
    pub pen_down_z: f64,
    pub return_home: bool,
    pub optimizer: OptimizerOptions,
    pub backlash: BacklashOptions,
    pub dip: DipOptions,
}

impl Default for EmitterOptions {
    fn default() -> Self {
        Self {
            fit_to_target: true,
            target_width: 200.0,
            target_height: 200.0,
            offset: Point::ORIGIN,
            flip_y: true,
            feed_rate: 1500.0,
            rapid_rate: 3000.0,
            pen_up_z: 5.0,
            pen_down_z: 0.0,
            return_home: true,
            optimizer: OptimizerOptions::default(),
            backlash: BacklashOptions::default(),
            dip: DipOptions::default(),
        }
    }
}

impl EmitterOptions {
    pub fn validate(&self) -> CamToolResult<()> {
        ParameterError::require_positive("feed_rate", self.feed_rate)?;
        ParameterError::require_positive("rapid_rate", self.rapid_rate)?;
        if self.fit_to_target {
            ParameterError::require_positive("target_width", self.target_width)?;
            ParameterError::require_positive("target_height", self.target_height)?;
        }
        if self.pen_up_z <= self.pen_down_z {
            return Err(CamToolError::InvalidParameters(format!(
                "pen_up_z ({}) must be above pen_down_z ({})",
                self.pen_up_z, self.pen_down_z
            )));
        }
        ParameterError::require_non_negative("backlash.x", self.backlash.x)?;
        ParameterError::require_non_negative("backlash.y", self.backlash.y)?;
        self.optimizer.validate()?;
        self.dip.validate()?;
        Ok(())
    }
}

/// Output of one generation request
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub program: MotionProgram,
    pub dips: Vec<DipPoint>,
    pub stats: OptimizationStats,
}

impl GenerationResult {
    /// Program text, one command per line
    pub fn lines(&self) -> Vec<String> {
        self.program.to_lines()
    }
}

/// Uniformly scale `paths` into the target area, optionally flipping Y
pub fn fit_to_target(paths: &[Path], options: &EmitterOptions) -> Vec<Path> {
    let Some(bounds) = Bounds::of_paths(paths) else {
        return Vec::new();
    };
    let (width, height) = (bounds.width(), bounds.height());
    let scale = match (width > 0.0, height > 0.0) {
        (true, true) => (options.target_width / width).min(options.target_height / height),
        (true, false) => options.target_width / width,
        (false, true) => options.target_height / height,
        (false, false) => 1.0,
    };

    let transform = |p: &Point| {
        let x = (p.x - bounds.min.x) * scale + options.offset.x;
        let y = if options.flip_y {
            (bounds.max.y - p.y) * scale
        } else {
            (p.y - bounds.min.y) * scale
        };
        Point::new(x, y + options.offset.y)
    };

    paths
        .iter()
        .map(|path| Path {
            points: path.points.iter().map(transform).collect(),
            tool: path.tool,
        })
        .collect()
}

/// Writes compensated moves into a program builder
struct Writer {
    builder: ProgramBuilder,
    compensator: BacklashCompensator,
    state: BacklashState,
}

impl Writer {
    fn request(&mut self, kind: MoveKind) {
        let (next, moves) = self.compensator.step(&self.state, kind);
        self.state = next;
        for mv in moves {
            self.builder.push(mv);
        }
    }

    fn position(&self) -> Point3 {
        self.state.cursor
    }
}

/// Generates motion programs from polylines
#[derive(Debug, Clone, Default)]
pub struct Emitter {
    options: EmitterOptions,
}

impl Emitter {
    pub fn new(options: EmitterOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &EmitterOptions {
        &self.options
    }

    /// Run the full pipeline on drawing-unit polylines
    pub fn generate(&self, paths: &[Path]) -> CamToolResult<GenerationResult> {
        self.options.validate()?;
        let opts = &self.options;

        let placed = if opts.fit_to_target {
            fit_to_target(paths, opts)
        } else {
            paths.to_vec()
        };
        let (strokes, stats) = PathOptimizer::new(opts.optimizer.clone()).optimize(&placed);
        let dips = plan_dips(&strokes, &opts.dip);
        let template = opts
            .dip
            .template
            .as_deref()
            .map(|t| realign_template(t, opts.dip.station));

        let start = Point3::new(
            opts.optimizer.start_point.x,
            opts.optimizer.start_point.y,
            opts.pen_up_z,
        );
        let mut writer = Writer {
            builder: MotionProgram::builder(start),
            compensator: BacklashCompensator::new(opts.backlash.clone(), opts.rapid_rate),
            state: BacklashState::at(start),
        };

        let mut pending_dips = dips.iter().peekable();
        let mut dip_number = 0;
        if let Some(dip) = pending_dips.next_if(|d| d.after_path_index.is_none()) {
            dip_number += 1;
            self.emit_dip(&mut writer, dip, dip_number, template.as_deref());
        }

        let mut current_tool = None;
        for (index, stroke) in strokes.iter().enumerate() {
            if stroke.tool != current_tool {
                if let Some(tool) = stroke.tool {
                    writer.builder.comment(format!("Tool {}", tool));
                }
                current_tool = stroke.tool;
            }
            self.emit_stroke(&mut writer, stroke);

            if let Some(dip) = pending_dips.next_if(|d| d.after_path_index == Some(index)) {
                dip_number += 1;
                self.emit_dip(&mut writer, dip, dip_number, template.as_deref());
            }
        }

        self.lift(&mut writer);
        if opts.return_home && writer.position() != start {
            writer.request(MoveKind::Rapid {
                target: start,
                feed: opts.rapid_rate,
            });
        }

        let preamble = vec![
            "%".to_string(),
            format!("(plotkit {})", env!("CARGO_PKG_VERSION")),
            format!(
                "(strokes: {}, draw: {:.1} mm, travel: {:.1} mm)",
                stats.paths_after, stats.draw_distance, stats.travel_distance
            ),
            "G21".to_string(),
            "G90".to_string(),
            format!("G0 Z{:.3}", opts.pen_up_z),
        ];
        let program = writer.builder.finish(preamble, vec!["%".to_string()]);

        tracing::info!(
            strokes = strokes.len(),
            dips = dips.len(),
            moves = program.len(),
            "Generated motion program, estimated {:.1}s",
            program.total_time
        );

        Ok(GenerationResult {
            program,
            dips,
            stats,
        })
    }

    fn lift(&self, writer: &mut Writer) {
        let here = writer.position();
        if here.z != self.options.pen_up_z {
            writer.request(MoveKind::Rapid {
                target: Point3::new(here.x, here.y, self.options.pen_up_z),
                feed: self.options.rapid_rate,
            });
        }
    }

    fn travel_to(&self, writer: &mut Writer, point: Point) {
        self.lift(writer);
        let here = writer.position();
        if here.x != point.x || here.y != point.y {
            writer.request(MoveKind::Rapid {
                target: Point3::new(point.x, point.y, self.options.pen_up_z),
                feed: self.options.rapid_rate,
            });
        }
    }

    fn emit_stroke(&self, writer: &mut Writer, stroke: &Path) {
        let opts = &self.options;
        let Some(first) = stroke.start() else {
            return;
        };
        self.travel_to(writer, first);
        writer.request(MoveKind::Linear {
            target: Point3::new(first.x, first.y, opts.pen_down_z),
            feed: opts.feed_rate,
        });
        for point in &stroke.points[1..] {
            writer.request(MoveKind::Linear {
                target: Point3::new(point.x, point.y, opts.pen_down_z),
                feed: opts.feed_rate,
            });
        }
        self.lift(writer);
    }

    fn emit_dip(
        &self,
        writer: &mut Writer,
        dip: &DipPoint,
        number: usize,
        template: Option<&[String]>,
    ) {
        let opts = &self.options;
        writer.builder.comment(format!(
            "Dip #{} at X{:.3} Y{:.3}",
            number, dip.position.x, dip.position.y
        ));

        match template {
            Some(lines) => {
                for line in lines {
                    let from = writer.position();
                    if let Some(kind) =
                        MotionProgram::parse_line(line, from, opts.rapid_rate, opts.feed_rate)
                    {
                        writer.request(kind);
                    }
                }
            }
            None => {
                self.travel_to(writer, dip.position);
                writer.request(MoveKind::Linear {
                    target: Point3::new(dip.position.x, dip.position.y, opts.dip.depth_z),
                    feed: opts.feed_rate,
                });
                writer.request(MoveKind::Dwell {
                    seconds: opts.dip.dwell,
                });
                self.lift(writer);
            }
        }
    }
}
