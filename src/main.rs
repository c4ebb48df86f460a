use anyhow::{bail, Context};
use clap::{Args, Parser, Subcommand};
use plotkit::{
    event_bus, init_logging, paths_from_json, Config, ConnectionState, Emitter,
    MachineController, StreamingState, WebSocketConnector, BUILD_DATE, VERSION,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Parser)]
#[command(name = "plotkit", version, about = "Pen plotter toolpath optimizer and GRBL streamer")]
struct Cli {
    /// Configuration file (.toml or .json); defaults to the platform config file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log as JSON lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Turn a path list into a motion program
    Generate {
        /// JSON list of `{ "points": [[x, y], ...], "tool": n }`
        #[arg(long)]
        input: PathBuf,
        #[arg(long)]
        output: PathBuf,
    },
    /// Stream a motion program to the controller
    Stream {
        #[arg(long)]
        program: PathBuf,
        #[command(flatten)]
        link: LinkArgs,
    },
    /// Generate a program and stream it straight away
    Plot {
        #[arg(long)]
        input: PathBuf,
        /// Also keep the generated program
        #[arg(long)]
        output: Option<PathBuf>,
        #[command(flatten)]
        link: LinkArgs,
    },
}

#[derive(Args)]
struct LinkArgs {
    /// Controller address, overriding the configuration
    #[arg(long)]
    address: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.json)?;
    tracing::debug!("plotkit {} built {}", VERSION, BUILD_DATE);

    let config =
        Config::load_or_default(cli.config.as_deref()).context("Failed to load configuration")?;

    match cli.command {
        Command::Generate { input, output } => {
            let lines = generate(&config, &input)?;
            write_program(&output, &lines)?;
        }
        Command::Stream { program, link } => {
            let text = std::fs::read_to_string(&program)
                .with_context(|| format!("Failed to read {}", program.display()))?;
            let lines = text.lines().map(str::to_string).collect();
            stream(&config, link.address, lines).await?;
        }
        Command::Plot {
            input,
            output,
            link,
        } => {
            let lines = generate(&config, &input)?;
            if let Some(output) = output {
                write_program(&output, &lines)?;
            }
            stream(&config, link.address, lines).await?;
        }
    }

    Ok(())
}

fn generate(config: &Config, input: &Path) -> anyhow::Result<Vec<String>> {
    let text = std::fs::read_to_string(input)
        .with_context(|| format!("Failed to read {}", input.display()))?;
    let paths = paths_from_json(&text).context("Invalid path list")?;

    let result = Emitter::new(config.emitter_options())
        .generate(&paths)
        .context("Failed to generate motion program")?;

    let stats = &result.stats;
    tracing::info!(
        "{} paths -> {} strokes, {} dips, draw {:.1} mm, travel {:.1} mm ({:.1}% less), est. {:.0} s",
        stats.paths_before,
        stats.paths_after,
        result.dips.len(),
        stats.draw_distance,
        stats.travel_distance,
        stats.travel_reduction_percent,
        result.program.total_time
    );
    Ok(result.lines())
}

fn write_program(path: &Path, lines: &[String]) -> anyhow::Result<()> {
    let mut text = lines.join("\n");
    text.push('\n');
    std::fs::write(path, text).with_context(|| format!("Failed to write {}", path.display()))?;
    tracing::info!("Wrote {} lines to {}", lines.len(), path.display());
    Ok(())
}

async fn stream(
    config: &Config,
    address: Option<String>,
    lines: Vec<String>,
) -> anyhow::Result<()> {
    let (controller, handle) = MachineController::new(
        config.link_config(),
        config.stream_config(),
        Arc::new(WebSocketConnector::new()),
        event_bus(),
    );
    let task = controller.spawn();

    handle.connect(address);
    let mut connection = handle.connection_watch();
    tokio::time::timeout(
        CONNECT_TIMEOUT,
        connection.wait_for(|state| *state == ConnectionState::Connected),
    )
    .await
    .context("Timed out connecting to the controller")?
    .context("Controller stopped")?;

    let total = lines.len();
    let mut progress = tokio::time::timeout(CONNECT_TIMEOUT, handle.start_stream_watched(lines))
        .await
        .context("Timed out waiting for the stream to start")?
        .context("Controller refused to start the stream")?;
    let mut outcome = progress.borrow().clone();

    let mut ticker = tokio::time::interval(config.stream_config().tick_interval);
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut cancelled = false;

    while outcome.state.is_active() {
        tokio::select! {
            _ = &mut ctrl_c, if !cancelled => {
                tracing::warn!("Interrupted, cancelling stream");
                cancelled = true;
                if !handle.cancel_stream() {
                    outcome = handle.progress();
                    break;
                }
            }
            changed = progress.changed() => {
                if changed.is_err() {
                    bail!("Controller stopped unexpectedly");
                }
                outcome = progress.borrow_and_update().clone();
            }
            _ = ticker.tick() => {
                let snapshot = handle.progress();
                if snapshot.state.is_active() {
                    tracing::info!(
                        "{}/{} lines ({:.1}%) {:.0}s {}",
                        snapshot.current_line,
                        total,
                        snapshot.percentage,
                        snapshot.elapsed.as_secs_f64(),
                        snapshot.current_command.as_deref().unwrap_or("")
                    );
                }
            }
        }
    }

    for rejection in &outcome.errors {
        tracing::warn!("Rejected {}", rejection);
    }

    handle.shutdown();
    task.await.ok();

    match outcome.state {
        StreamingState::Completed => {
            tracing::info!(
                "Plot finished in {:.0}s, {} rejected lines",
                outcome.elapsed.as_secs_f64(),
                outcome.errors.len()
            );
            Ok(())
        }
        StreamingState::Idle => bail!("Stream cancelled"),
        _ => bail!("Stream aborted: link lost"),
    }
}
