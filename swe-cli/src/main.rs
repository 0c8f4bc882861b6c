mod ic;
mod vxl;

use clap::{Args, Parser, Subcommand, ValueEnum};
use ic::{IcType, generate_ic};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;
use swe_core::{Rank, Scheme, SimConfig, Stepper, TickSummary};
use tracing::{Level, info};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Integrate an initial condition and write depth frames plus tick metadata
    Run(RunArgs),
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum SchemeArg {
    Momentum,
    Exchange,
}

impl From<SchemeArg> for Scheme {
    fn from(arg: SchemeArg) -> Self {
        match arg {
            SchemeArg::Momentum => Scheme::Momentum,
            SchemeArg::Exchange => Scheme::FlowExchange,
        }
    }
}

#[derive(Args, Debug)]
struct RunArgs {
    /// Output directory
    #[arg(long)]
    out: PathBuf,

    #[arg(long, value_enum, default_value = "momentum")]
    scheme: SchemeArg,

    /// Initial condition generator
    #[arg(long, value_enum, default_value = "dam-break")]
    ic: IcType,

    /// Voxel scene to import (implies --ic vxl)
    #[arg(long)]
    vxl: Option<PathBuf>,

    /// Physical rows
    #[arg(long, default_value_t = 32)]
    rows: usize,

    /// Physical columns (ignored for rank 1)
    #[arg(long, default_value_t = 32)]
    cols: usize,

    /// Grid rank: 1 (channel) or 2 (plane)
    #[arg(long, default_value_t = 2, value_parser = clap::value_parser!(u8).range(1..=2))]
    rank: u8,

    #[arg(long, default_value_t = 500)]
    ticks: u64,

    /// Write a depth frame every N ticks (0 disables frames)
    #[arg(long, default_value_t = 10)]
    snapshot_every: u64,

    /// RNG seed for the random generators
    #[arg(long, default_value_t = 123)]
    seed: u64,

    /// JSON file holding a SimConfig; missing keys take the scheme preset
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    dt: Option<f64>,

    #[arg(long)]
    dx: Option<f64>,

    #[arg(long)]
    g: Option<f64>,

    #[arg(long)]
    damping: Option<f64>,

    #[arg(long)]
    dry_threshold: Option<f64>,
}

/// Everything needed to reproduce a run, written to `config.json`.
#[derive(Serialize)]
struct RunRecord<'a> {
    scheme: Scheme,
    ic: IcType,
    rows: usize,
    cols: usize,
    rank: Rank,
    seed: u64,
    ticks: u64,
    snapshot_every: u64,
    vxl: Option<&'a PathBuf>,
    config: &'a SimConfig,
}

#[derive(Serialize)]
struct MetaRow<'a> {
    /// Index into `depth.bin` when this tick wrote a frame.
    frame: Option<u64>,
    #[serde(flatten)]
    summary: &'a TickSummary,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(cli.log_level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    match cli.command {
        Command::Run(args) => run(args),
    }
}

fn run(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let scheme = Scheme::from(args.scheme);
    let config = build_config(&args, scheme)?;
    config.validate()?;

    let rank = if args.rank == 1 { Rank::One } else { Rank::Two };
    let ic_type = if args.vxl.is_some() { IcType::Vxl } else { args.ic };
    let initial = match (&args.vxl, ic_type) {
        (Some(path), _) => vxl::load(path)?,
        (None, IcType::Vxl) => return Err("--ic vxl needs --vxl <path>".into()),
        (None, ic) => {
            let mut rng = ChaCha8Rng::seed_from_u64(args.seed);
            generate_ic(&mut rng, args.rows, args.cols, rank, ic)
        }
    };

    let mut stepper = Stepper::new(&initial, config.clone(), scheme)?;
    fs::create_dir_all(&args.out)?;

    let record = RunRecord {
        scheme,
        ic: ic_type,
        rows: initial.rows,
        cols: initial.cols,
        rank: initial.rank,
        seed: args.seed,
        ticks: args.ticks,
        snapshot_every: args.snapshot_every,
        vxl: args.vxl.as_ref(),
        config: &config,
    };
    let mut config_file = BufWriter::new(File::create(args.out.join("config.json"))?);
    serde_json::to_writer_pretty(&mut config_file, &record)?;
    config_file.flush()?;

    let mut depth_writer = BufWriter::new(File::create(args.out.join("depth.bin"))?);
    let mut meta_file = BufWriter::new(File::create(args.out.join("meta.jsonl"))?);

    let mut frames: u64 = 0;
    write_frame(&mut depth_writer, &stepper)?;
    frames += 1;

    info!(
        scheme = scheme.as_str(),
        ic = ic_type.as_str(),
        rows = initial.rows,
        cols = initial.cols,
        volume = stepper.snapshot().volume(),
        "starting run"
    );

    for _ in 0..args.ticks {
        let summary = stepper.advance()?;

        let frame = if args.snapshot_every > 0 && summary.tick % args.snapshot_every == 0 {
            write_frame(&mut depth_writer, &stepper)?;
            frames += 1;
            Some(frames - 1)
        } else {
            None
        };

        let row = MetaRow {
            frame,
            summary: &summary,
        };
        serde_json::to_writer(&mut meta_file, &row)?;
        meta_file.write_all(b"\n")?;
    }

    depth_writer.flush()?;
    meta_file.flush()?;

    info!(
        ticks = stepper.tick(),
        elapsed = stepper.elapsed(),
        volume = stepper.snapshot().volume(),
        frames,
        "run finished"
    );
    println!("Wrote run to: {}", args.out.display());

    Ok(())
}

/// Scheme preset, then the JSON file, then individual flags.
fn build_config(args: &RunArgs, scheme: Scheme) -> Result<SimConfig, Box<dyn std::error::Error>> {
    let mut config = match &args.config {
        Some(path) => {
            let text = fs::read_to_string(path)?;
            let mut merged = serde_json::to_value(preset(scheme))?;
            merge_json(&mut merged, serde_json::from_str(&text)?);
            serde_json::from_value(merged)?
        }
        None => preset(scheme),
    };

    if let Some(dt) = args.dt {
        config = config.with_dt_baseline(dt);
    }
    if let Some(dx) = args.dx {
        config = config.with_dx(dx);
    }
    if let Some(g) = args.g {
        config = config.with_g(g);
    }
    if let Some(damping) = args.damping {
        config = config.with_v_damping(damping);
    }
    if let Some(threshold) = args.dry_threshold {
        config = config.with_dry_threshold(threshold);
    }
    Ok(config)
}

fn preset(scheme: Scheme) -> SimConfig {
    match scheme {
        Scheme::Momentum => SimConfig::momentum(),
        Scheme::FlowExchange => SimConfig::flow_exchange(),
    }
}

/// Overlays `patch` onto `base`, recursing into objects.
fn merge_json(base: &mut serde_json::Value, patch: serde_json::Value) {
    match (base, patch) {
        (serde_json::Value::Object(base), serde_json::Value::Object(patch)) => {
            for (key, value) in patch {
                match base.get_mut(&key) {
                    Some(slot) => merge_json(slot, value),
                    None => {
                        base.insert(key, value);
                    }
                }
            }
        }
        (base, patch) => *base = patch,
    }
}

fn write_frame<W: Write>(w: &mut W, stepper: &Stepper) -> std::io::Result<()> {
    let depth: Vec<f32> = stepper
        .snapshot()
        .depth()
        .into_iter()
        .map(|d| d as f32)
        .collect();
    write_f32_vec(w, &depth)
}

fn write_f32_vec<W: Write>(w: &mut W, v: &[f32]) -> std::io::Result<()> {
    for &x in v {
        w.write_all(&x.to_le_bytes())?;
    }
    Ok(())
}
