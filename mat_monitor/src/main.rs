use clap::Parser;
use haptic_mat::MatConfig;
use haptic_mat::core_modules::actuator_selector::actuators_for;
use haptic_mat::core_modules::frame_decoder::MatReading;
use haptic_mat::core_modules::mat_device::{MatDevice, MatTransport};
use haptic_mat::feedback_loop::{FeedbackLoop, actuator_channel};
use haptic_mat::pipeline::PosturePipeline;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Runs the pressure-mat feedback loop and prints the actuator selection per cycle.
#[derive(Debug, Parser)]
#[command(name = "mat_monitor", version)]
struct Cli {
    /// TOML configuration file. Defaults are used when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Serial device of the mat. Overrides the config file and HAPTIC_MAT_PORT.
    #[arg(short, long)]
    port: Option<String>,

    /// Capture a single frame, print it, write a PNG heatmap here and exit.
    #[arg(long)]
    snapshot: Option<PathBuf>,

    /// Debug-level logging.
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .init();

    let config = match &cli.config {
        Some(path) => MatConfig::load(path)?,
        None => MatConfig::default(),
    }
    .with_env_overrides()
    .with_port_override(cli.port.clone());
    config.validate()?;

    let device = MatDevice::open(&config.serial)?;

    if let Some(path) = &cli.snapshot {
        return snapshot(device, &config, path);
    }

    let (sink, mut flags) = actuator_channel(&config);
    let handle = FeedbackLoop::new(device, &config).spawn(sink);

    loop {
        tokio::select! {
            received = flags.recv() => match received {
                Some(selection) => info!(actuators = %selection, "cycle"),
                None => break,
            },
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, stopping after the current cycle");
                handle.stop();
                break;
            }
        }
    }

    drop(flags);
    let summary = handle.join().await?;
    info!(
        cycles = summary.cycles,
        corrected = summary.corrected,
        skipped = summary.skipped,
        "done"
    );
    Ok(())
}

fn snapshot<T: MatTransport>(
    mut device: MatDevice<T>,
    config: &MatConfig,
    path: &Path,
) -> anyhow::Result<()> {
    let MatReading::Frame(matrix) = device.get_pressure_matrix()? else {
        warn!("mat sent no frame");
        return Ok(());
    };
    println!("{matrix}");

    let pipeline = PosturePipeline::from_config(config);
    let analysis = match pipeline.analyze(&matrix) {
        Ok(analysis) => {
            let flags = actuators_for(&analysis.correction, config.feedback.column_dead_band);
            info!(
                d_row = analysis.correction.d_row,
                d_column = analysis.correction.d_column,
                actuators = %flags,
                "posture"
            );
            Some(analysis)
        }
        Err(err) => {
            warn!(%err, "no posture analysis for this frame");
            None
        }
    };

    haptic_mat_visualizer::save_snapshot(&matrix, analysis.as_ref(), path)?;
    info!(path = %path.display(), "heatmap written");
    Ok(())
}
