use crate::config::{Config, load_config};
use crate::labeler::{PlaceInput, label_places};
use crate::output::{HistoryDump, label_features, point_features, write_json};
use crate::projection::Mercator;
use crate::text_metrics::{FixedMetrics, FontMetrics, TextMeasure};
use anyhow::Result;
use clap::Parser;
use log::{Level, LevelFilter, Log, Metadata, Record};
use rand::SeedableRng;
use rand::rngs::StdRng;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

#[derive(Parser, Debug)]
#[command(name = "dymo", version, about = "Point label placement by simulated annealing")]
pub struct Args {
    /// Input file (JSON array of place records) or '-' for stdin
    #[arg(short = 'i', long = "input")]
    pub input: Option<PathBuf>,

    /// Label GeoJSON output. Defaults to stdout if omitted.
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,

    /// Also write the placed anchor points as GeoJSON
    #[arg(long = "points")]
    pub points: Option<PathBuf>,

    /// Config file (JSON5)
    #[arg(short = 'c', long = "config")]
    pub config: Option<PathBuf>,

    /// Wall-clock budget for automatic annealing
    #[arg(long = "minutes")]
    pub minutes: Option<f64>,

    /// Upper bound on annealing steps
    #[arg(long = "steps")]
    pub steps: Option<usize>,

    /// Map zoom used to project places without pixel positions
    #[arg(long = "zoom")]
    pub zoom: Option<f64>,

    /// Random seed for reproducible output
    #[arg(long = "seed")]
    pub seed: Option<u64>,

    /// Size labels with fixed per-character metrics instead of font files
    #[arg(long = "fixed-metrics")]
    pub fixed_metrics: bool,

    /// Keep blocked and crowded labels in the output, marked as dropped
    #[arg(long = "include-dropped")]
    pub include_dropped: bool,

    /// Write every accepted search state to this file
    #[arg(long = "dump-history")]
    pub dump_history: Option<PathBuf>,

    /// More logging (-v info, -vv debug)
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub fn run() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);

    let input = read_input(args.input.as_deref())?;
    let places: Vec<PlaceInput> = serde_json::from_str(&input)
        .map_err(|err| anyhow::anyhow!("invalid place records: {err}"))?;

    let fixed = FixedMetrics::default();
    let measure: &dyn TextMeasure = if args.fixed_metrics {
        &fixed
    } else {
        &FontMetrics
    };
    let rng = match config.anneal.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_os_rng(),
    };

    let labeling = label_places(places, measure, &config, rng)?;
    let projection = config.projection.zoom.map(Mercator::new);

    let labels = label_features(&labeling, projection.as_ref(), args.include_dropped);
    match args.output.as_deref() {
        Some(path) => write_json(path, &labels)?,
        None => {
            let mut stdout = io::stdout().lock();
            serde_json::to_writer_pretty(&mut stdout, &labels)?;
            writeln!(stdout)?;
        }
    }
    if let Some(path) = args.points.as_deref() {
        write_json(path, &point_features(&labeling, projection.as_ref()))?;
    }
    if let Some(path) = args.dump_history.as_deref() {
        write_json(path, &HistoryDump::from_labeling(&labeling))?;
    }
    Ok(())
}

fn apply_overrides(config: &mut Config, args: &Args) {
    if let Some(minutes) = args.minutes {
        config.anneal.minutes = minutes;
    }
    if let Some(steps) = args.steps {
        config.anneal.max_steps = Some(steps);
    }
    if let Some(zoom) = args.zoom {
        config.projection.zoom = Some(zoom);
    }
    if let Some(seed) = args.seed {
        config.anneal.seed = Some(seed);
    }
    if args.dump_history.is_some() {
        config.anneal.keep_history = true;
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    if let Some(path) = path
        && path != Path::new("-")
    {
        return Ok(std::fs::read_to_string(path)?);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(buf)
}

struct StderrLogger;

static LOGGER: StderrLogger = StderrLogger;

impl Log for StderrLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= log::max_level()
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let tag = match record.level() {
            Level::Error => "error",
            Level::Warn => "warning",
            Level::Info => "info",
            Level::Debug => "debug",
            Level::Trace => "trace",
        };
        eprintln!("{tag}: {}", record.args());
    }

    fn flush(&self) {}
}

fn level_for(verbose: u8) -> LevelFilter {
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    }
}

fn init_logging(verbose: u8) {
    // Already installed when run() is called twice in one process.
    if log::set_logger(&LOGGER).is_ok() {
        log::set_max_level(level_for(verbose));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verbosity_raises_log_level() {
        assert_eq!(level_for(0), LevelFilter::Warn);
        assert_eq!(level_for(1), LevelFilter::Info);
        assert_eq!(level_for(5), LevelFilter::Debug);
    }

    #[test]
    fn flags_override_config_file() {
        let args = Args::parse_from([
            "dymo",
            "--minutes",
            "0.1",
            "--steps",
            "500",
            "--zoom",
            "9",
            "--seed",
            "7",
            "--dump-history",
            "history.json",
        ]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.anneal.minutes, 0.1);
        assert_eq!(config.anneal.max_steps, Some(500));
        assert_eq!(config.projection.zoom, Some(9.0));
        assert_eq!(config.anneal.seed, Some(7));
        assert!(config.anneal.keep_history);
    }

    #[test]
    fn defaults_leave_config_alone() {
        let args = Args::parse_from(["dymo", "-i", "places.json", "-vv"]);
        let mut config = Config::default();
        apply_overrides(&mut config, &args);
        assert_eq!(config.anneal.minutes, 2.0);
        assert!(!config.anneal.keep_history);
        assert_eq!(args.verbose, 2);
        assert_eq!(args.input.as_deref(), Some(Path::new("places.json")));
    }
}
