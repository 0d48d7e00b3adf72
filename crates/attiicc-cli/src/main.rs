//! attiicc CLI: command-line interface for the microscopy pipeline.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::{Path, PathBuf};

use attiicc::table::csv_io::{read_channel_csv, write_channel_csv, write_merged_csv};
use attiicc::{Channel, Frame, PipelineConfig};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "attiicc")]
#[command(about = "Segment, preprocess and analyse live-cell microscopy experiments")]
#[command(version)]
struct Cli {
    /// JSON run configuration; flags override its values.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Subtract background from every channel folder of an image tree.
    Preprocess(PreprocessArgs),

    /// Segment every image folder below a root into masks and ROI archives.
    Segment(SegmentArgs),

    /// Move empty ROI archives out of a segmentation tree.
    QuarantineRois {
        #[arg(long)]
        source: PathBuf,
        #[arg(long)]
        dest: PathBuf,
    },

    /// Create a root directory and subdirectories below it.
    Mkdirs {
        #[arg(long)]
        root: PathBuf,
        /// Subdirectory names, relative to the root.
        subdirs: Vec<PathBuf>,
    },

    /// Load the measurement exports of one channel into a single table.
    Load {
        /// Root of the measurement tree.
        #[arg(long)]
        root: PathBuf,
        #[arg(long, value_enum)]
        channel: ChannelArg,
        #[arg(long)]
        out: PathBuf,
    },

    /// Join three loaded channel tables into the merged cell table.
    Merge {
        #[arg(long)]
        d0: PathBuf,
        #[arg(long)]
        d1: PathBuf,
        #[arg(long)]
        d2: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },

    /// Run the full table analysis.
    Analyze(AnalyzeArgs),

    /// Group coincident points across per-frame CSV tables.
    Match(MatchArgs),
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ChannelArg {
    D0,
    D1,
    D2,
}

impl ChannelArg {
    fn to_core(self) -> Channel {
        match self {
            Self::D0 => Channel::D0,
            Self::D1 => Channel::D1,
            Self::D2 => Channel::D2,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MethodArg {
    Gaussian,
    RollingBall,
}

impl MethodArg {
    fn to_core(self) -> attiicc::BackgroundMethod {
        match self {
            Self::Gaussian => attiicc::BackgroundMethod::Gaussian,
            Self::RollingBall => attiicc::BackgroundMethod::RollingBall,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum MatchModeArg {
    Greedy,
    Transitive,
}

impl MatchModeArg {
    fn to_core(self) -> attiicc::MatchMode {
        match self {
            Self::Greedy => attiicc::MatchMode::Greedy,
            Self::Transitive => attiicc::MatchMode::Transitive,
        }
    }
}

#[derive(Debug, Clone, Args)]
struct PreprocessArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    #[arg(long, value_enum)]
    method: Option<MethodArg>,
    /// Sigma/radius for d0 folders.
    #[arg(long)]
    d0: Option<f32>,
    /// Sigma/radius for d1 folders.
    #[arg(long)]
    d1: Option<f32>,
    /// Sigma/radius for d2 folders.
    #[arg(long)]
    d2: Option<f32>,
}

#[derive(Debug, Clone, Args)]
struct SegmentArgs {
    #[arg(long)]
    input: PathBuf,
    #[arg(long)]
    output: PathBuf,
    /// Smallest object kept, in pixels.
    #[arg(long)]
    min_area: Option<u32>,
}

#[derive(Debug, Clone, Args)]
struct AnalyzeArgs {
    /// Root of the measurement tree (folders ending in d0/d1/d2).
    #[arg(long)]
    measurements: PathBuf,
    /// Directory receiving every output table.
    #[arg(long)]
    out_dir: PathBuf,
    /// Frames every well must cover, e.g. `p0,p1,p2` or `0,1,2`.
    #[arg(long, value_delimiter = ',')]
    frames: Option<Vec<String>>,
    /// Effector threshold on mean_intensity_d0.
    #[arg(long)]
    threshold_d0: Option<f64>,
    /// Target threshold on mean_intensity_d1.
    #[arg(long)]
    threshold_d1: Option<f64>,
    /// Death threshold on mean_intensity_d2.
    #[arg(long)]
    threshold_d2: Option<f64>,
    #[arg(long)]
    area_d0: Option<f64>,
    #[arg(long)]
    area_d1: Option<f64>,
    /// Write the run report as JSON.
    #[arg(long)]
    report: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct MatchArgs {
    /// Per-frame tables with X and Y columns, in frame order.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    #[arg(long)]
    out: PathBuf,
    #[arg(long)]
    threshold: Option<f64>,
    #[arg(long, value_enum)]
    mode: Option<MatchModeArg>,
}

fn load_config(path: Option<&Path>) -> CliResult<PipelineConfig> {
    match path {
        Some(path) => {
            tracing::info!("Loading config: {}", path.display());
            Ok(PipelineConfig::from_json_file(path)?)
        }
        None => Ok(PipelineConfig::default()),
    }
}

fn build_preprocess_config(base: &PipelineConfig, args: &PreprocessArgs) -> attiicc::PreprocessConfig {
    let mut config = base.preprocess;
    if let Some(method) = args.method {
        config.method = method.to_core();
    }
    if let Some(v) = args.d0 {
        config.params.d0 = v;
    }
    if let Some(v) = args.d1 {
        config.params.d1 = v;
    }
    if let Some(v) = args.d2 {
        config.params.d2 = v;
    }
    config
}

fn build_analysis_config(base: &PipelineConfig, args: &AnalyzeArgs) -> CliResult<attiicc::AnalysisConfig> {
    let mut config = base.analysis.clone();
    if let Some(frames) = &args.frames {
        let parsed = frames
            .iter()
            .map(|s| Frame::parse_loose(s).ok_or_else(|| -> CliError { format!("invalid frame '{}'", s).into() }))
            .collect::<CliResult<Vec<_>>>()?;
        config.required_frames = Some(parsed);
    }
    let t = &mut config.classify.intensity;
    if let Some(v) = args.threshold_d0 {
        t.d0 = v;
    }
    if let Some(v) = args.threshold_d1 {
        t.d1 = v;
    }
    if let Some(v) = args.threshold_d2 {
        t.d2 = v;
    }
    if args.area_d0.is_some() {
        config.classify.area_d0 = args.area_d0;
    }
    if args.area_d1.is_some() {
        config.classify.area_d1 = args.area_d1;
    }
    config.validate()?;
    Ok(config)
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Preprocess(args) => run_preprocess(&config, &args),
        Commands::Segment(args) => run_segment(&config, &args),
        Commands::QuarantineRois { source, dest } => run_quarantine(&source, &dest),
        Commands::Mkdirs { root, subdirs } => run_mkdirs(&root, &subdirs),
        Commands::Load { root, channel, out } => run_load(&root, channel.to_core(), &out),
        Commands::Merge { d0, d1, d2, out } => run_merge([&d0, &d1, &d2], &out),
        Commands::Analyze(args) => run_analyze(&config, &args),
        Commands::Match(args) => run_match(&config, &args),
    }
}

// ── images ─────────────────────────────────────────────────────────────

fn run_preprocess(base: &PipelineConfig, args: &PreprocessArgs) -> CliResult<()> {
    let config = build_preprocess_config(base, args);
    let summary = attiicc::process_tree(&args.input, &args.output, &config)?;
    println!(
        "{} images written from {} channel folders ({} failures)",
        summary.images, summary.folders, summary.failures
    );
    Ok(())
}

fn run_segment(base: &PipelineConfig, args: &SegmentArgs) -> CliResult<()> {
    let mut config = base.segmentation;
    if let Some(min_area) = args.min_area {
        config.min_area_px = min_area;
    }
    let segmenter = attiicc::ThresholdSegmenter::new(config);
    let summary = attiicc::segment_tree(&segmenter, &args.input, &args.output)?;
    println!(
        "{} images segmented: {} objects, {} without detections, {} failures",
        summary.images, summary.objects, summary.empty, summary.failures
    );
    Ok(())
}

fn run_quarantine(source: &Path, dest: &Path) -> CliResult<()> {
    let moved = attiicc::segment::quarantine_empty_archives(source, dest)?;
    println!("{} empty ROI archives moved to {}", moved.len(), dest.display());
    Ok(())
}

fn run_mkdirs(root: &Path, subdirs: &[PathBuf]) -> CliResult<()> {
    let created = attiicc::create_directories(root, subdirs)?;
    if created.len() < subdirs.len() {
        tracing::warn!("{} of {} subdirectories could not be created", subdirs.len() - created.len(), subdirs.len());
    }
    Ok(())
}

// ── tables ─────────────────────────────────────────────────────────────

fn run_load(root: &Path, channel: Channel, out: &Path) -> CliResult<()> {
    let table = attiicc::table::load_channel_table(root, channel)?;
    write_channel_csv(out, &table)?;
    Ok(())
}

fn run_merge(inputs: [&PathBuf; 3], out: &Path) -> CliResult<()> {
    let [d0, d1, d2] = inputs;
    let (t0, t1, t2) = (read_channel_csv(d0)?, read_channel_csv(d1)?, read_channel_csv(d2)?);
    let (rows, stats) = attiicc::table::merge_channel_tables(&t0, &t1, &t2)?;
    write_merged_csv(out, &rows)?;
    println!(
        "{} merged rows (dropped d0={} d1={} d2={})",
        stats.joined, stats.dropped[0], stats.dropped[1], stats.dropped[2]
    );
    Ok(())
}

fn run_analyze(base: &PipelineConfig, args: &AnalyzeArgs) -> CliResult<()> {
    let config = build_analysis_config(base, args)?;
    let layout = attiicc::OutputLayout::in_dir(&args.out_dir);
    let report = attiicc::run_analysis(&args.measurements, &config, &layout)?;

    let json = serde_json::to_string_pretty(&report)?;
    match &args.report {
        Some(path) => {
            std::fs::write(path, &json)?;
            tracing::info!("Report written to {}", path.display());
        }
        None => println!("{}", json),
    }
    Ok(())
}

// ── matching ───────────────────────────────────────────────────────────

fn run_match(base: &PipelineConfig, args: &MatchArgs) -> CliResult<()> {
    let mut config = base.matching;
    if let Some(t) = args.threshold {
        config.distance_threshold = t;
    }
    if let Some(mode) = args.mode {
        config.mode = mode.to_core();
    }

    let frames = args
        .inputs
        .iter()
        .map(|p| attiicc::matching::read_points_csv(p))
        .collect::<Result<Vec<_>, _>>()?;
    let points = attiicc::match_points(&frames, &config)?;
    attiicc::matching::write_matches_csv(&args.out, &points)?;
    Ok(())
}
