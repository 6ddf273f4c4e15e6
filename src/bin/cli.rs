use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use log::info;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use screamer::circuit::{CircuitModel, Network};
use screamer::dsp::Coefficients;
use screamer::params::{ControlSnapshot, ParameterStore};
use screamer::pedal::{CircuitCoefficients, Pedal, Topology};
use screamer::render;
use screamer::settings::{PedalSettings, Settings};

#[derive(Parser, Debug)]
#[command(name = "screamer")]
#[command(version)]
#[command(about = "Tube Screamer style overdrive, rendered offline.")]
struct Cli {
    #[arg(long, env = "SCREAMER_CONFIG", help = "Settings file to use")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Render a WAV file through the pedal.
    Render {
        input: PathBuf,
        #[arg(short, long, help = "Output file, defaults to a timestamped name")]
        output: Option<PathBuf>,
        #[arg(long, help = "Frames per processing block")]
        block_size: Option<usize>,
        #[command(flatten)]
        pedal: PedalArgs,
    },
    /// Print the small-signal magnitude response of the chain.
    Response {
        #[arg(long, default_value_t = 48_000.0)]
        sample_rate: f64,
        #[arg(long, default_value_t = 24, help = "Number of log-spaced frequencies")]
        points: usize,
        #[command(flatten)]
        pedal: PedalArgs,
    },
    /// Print every derived coefficient set as JSON.
    Coefficients {
        #[arg(long, default_value_t = 48_000.0)]
        sample_rate: f64,
        #[command(flatten)]
        pedal: PedalArgs,
    },
}

#[derive(Args, Debug, Default)]
struct PedalArgs {
    #[arg(long)]
    drive: Option<f32>,
    #[arg(long)]
    tone: Option<f32>,
    #[arg(long)]
    level: Option<f32>,
    #[arg(long, value_enum)]
    model: Option<CircuitModel>,
    #[arg(long, value_enum)]
    topology: Option<Topology>,
    #[arg(long, help = "Oversampling factor (1, 2, 4 or 8)")]
    oversample: Option<usize>,
}

impl PedalArgs {
    fn apply(&self, settings: &mut PedalSettings) {
        if let Some(drive) = self.drive {
            settings.drive = drive;
        }
        if let Some(tone) = self.tone {
            settings.tone = tone;
        }
        if let Some(level) = self.level {
            settings.level = level;
        }
        if let Some(model) = self.model {
            settings.model = model;
        }
        if let Some(topology) = self.topology {
            settings.topology = topology;
            settings.oversampling = None;
        }
        if self.oversample.is_some() {
            settings.oversampling = self.oversample;
        }
    }
}

#[derive(Serialize)]
struct CoefficientReport {
    network: String,
    sample_rate: f64,
    stable: bool,
    max_pole_radius: f64,
    coefficients: Coefficients,
}

fn main() -> Result<()> {
    dotenv::dotenv().ok();
    env_logger::init();

    let cli = Cli::parse();
    info!("Screamer v{}", env!("CARGO_PKG_VERSION"));

    let settings = match &cli.config {
        Some(path) => Settings::load_from(path)?,
        None => Settings::load()?,
    };

    match cli.command {
        Command::Render {
            input,
            output,
            block_size,
            pedal,
        } => {
            let mut pedal_settings = settings.pedal.clone();
            pedal.apply(&mut pedal_settings);
            let block_size = block_size.unwrap_or(settings.render.block_size);
            let output =
                output.unwrap_or_else(|| render::default_output_path(&settings.render.output_dir));

            info!("Rendering {:?} -> {:?}\n{}", input, output, pedal_settings);

            let store = Arc::new(ParameterStore::new(pedal_settings.controls()));
            let (mut pedal, handle) = Pedal::new(
                store,
                pedal_settings.topology,
                pedal_settings.oversampling_factor(),
            );
            let summary = render::render_file(&mut pedal, &input, &output, block_size)
                .with_context(|| format!("failed to render {}", input.display()))?;
            handle.log_diagnostics();

            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Command::Response {
            sample_rate,
            points,
            pedal,
        } => {
            let mut pedal_settings = settings.pedal.clone();
            pedal.apply(&mut pedal_settings);
            let coeffs = derive(&pedal_settings, sample_rate)?;
            let layout = pedal_settings.topology.layout();

            println!("# {} / {} at {} Hz", pedal_settings.topology, pedal_settings.model, sample_rate);
            println!("# freq_hz\tgain_db");
            for freq in sweep(20.0, (sample_rate / 2.0).min(20_000.0), points) {
                let response = layout.small_signal_response(&coeffs, freq);
                println!("{freq:.1}\t{:.2}", response.db());
            }
        }
        Command::Coefficients { sample_rate, pedal } => {
            let mut pedal_settings = settings.pedal.clone();
            pedal.apply(&mut pedal_settings);
            let coeffs = derive(&pedal_settings, sample_rate)?;

            let report: Vec<CoefficientReport> = Network::ALL
                .iter()
                .map(|&network| {
                    let c = coeffs.get(network);
                    CoefficientReport {
                        network: network.to_string(),
                        sample_rate: if network.is_drive() {
                            coeffs.drive_rate
                        } else {
                            coeffs.base_rate
                        },
                        stable: c.is_valid(),
                        max_pole_radius: c.max_pole_radius(),
                        coefficients: c,
                    }
                })
                .collect();

            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }

    Ok(())
}

fn derive(settings: &PedalSettings, sample_rate: f64) -> Result<CircuitCoefficients> {
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        bail!("invalid sample rate: {sample_rate}");
    }

    let controls: ControlSnapshot = ParameterStore::new(settings.controls()).snapshot();
    let drive_rate = sample_rate * settings.oversampling_factor() as f64;
    let (coeffs, rejected) = CircuitCoefficients::default().derive(&controls, sample_rate, drive_rate);
    if rejected > 0 {
        bail!("{rejected} networks could not be derived at {sample_rate} Hz");
    }
    Ok(coeffs)
}

/// `points` log-spaced frequencies from `start` to `end` inclusive.
fn sweep(start: f64, end: f64, points: usize) -> impl Iterator<Item = f64> {
    let points = points.max(2);
    let ratio = (end / start).ln();
    (0..points).map(move |i| start * (ratio * i as f64 / (points - 1) as f64).exp())
}
