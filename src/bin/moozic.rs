use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context as _;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use moozic::{
    BackendOpts, BackendPolicy, BuildConfig, BuildEvent, BuildOrchestrator, BuildStatus,
    Compositor, ConversionCache, Converter, CoverSelection, FingerprintMode, MaskVariant,
    ModProject, ResolutionTier, TargetFormat,
};

#[derive(Parser, Debug)]
#[command(name = "moozic", version, about = "Build Project Zomboid music mods")]
struct Cli {
    /// Log debug output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build a mod tree from a project JSON file.
    Build(BuildArgs),
    /// Convert one audio file to canonical Ogg Vorbis.
    Convert(ConvertArgs),
    /// Concatenate several audio files into one canonical Ogg Vorbis file.
    Stitch(StitchArgs),
    /// Maintain the conversion cache.
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
    /// Composite one cover into a mask and write it as PNG.
    Composite(CompositeArgs),
}

#[derive(Parser, Debug)]
struct BuildArgs {
    /// Project JSON.
    #[arg(long)]
    project: PathBuf,

    /// Output directory; the mod is assembled in `<out>/<mod_id>`.
    #[arg(long, default_value = "OUTPUT")]
    out: PathBuf,

    /// Conversion cache directory.
    #[arg(long, default_value = ".moozic-cache")]
    cache: PathBuf,

    /// Directory holding masks/, covers/ and poster/.
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Backend policy (auto, native-only, external-only). Defaults to $MOOZIC_AUDIO_BACKEND.
    #[arg(long)]
    backend: Option<BackendPolicy>,

    /// Reconvert every track.
    #[arg(long)]
    force: bool,

    /// Worker threads.
    #[arg(long)]
    threads: Option<usize>,

    /// Fingerprint sources by content instead of path, size and mtime.
    #[arg(long)]
    content_hash: bool,

    /// Seed for default cover selection.
    #[arg(long, default_value_t = 0, conflicts_with = "random_covers")]
    seed: u64,

    /// Pick default covers at random.
    #[arg(long)]
    random_covers: bool,

    /// Time limit per external conversion, in seconds.
    #[arg(long, default_value_t = 300)]
    timeout_secs: u64,
}

#[derive(Parser, Debug)]
struct ConvertArgs {
    /// Source audio.
    #[arg(long = "in")]
    in_path: PathBuf,

    /// Output .ogg path.
    #[arg(long)]
    out: PathBuf,

    /// Backend policy. Defaults to $MOOZIC_AUDIO_BACKEND, then auto.
    #[arg(long)]
    backend: Option<BackendPolicy>,
}

#[derive(Parser, Debug)]
struct StitchArgs {
    /// Sources, concatenated in order.
    #[arg(required = true, num_args = 1..)]
    inputs: Vec<PathBuf>,

    /// Output .ogg path.
    #[arg(long)]
    out: PathBuf,

    /// Backend policy. Defaults to $MOOZIC_AUDIO_BACKEND, then auto.
    #[arg(long)]
    backend: Option<BackendPolicy>,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    /// Drop every entry; converted files stay until purged.
    Invalidate {
        /// Cache directory.
        #[arg(long, default_value = ".moozic-cache")]
        cache: PathBuf,
    },
    /// Delete converted files no entry refers to.
    Purge {
        /// Cache directory.
        #[arg(long, default_value = ".moozic-cache")]
        cache: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct CompositeArgs {
    /// Base image.
    #[arg(long)]
    base: PathBuf,

    /// Mask variant (cassette-front, vinyl-outer, vinyl-inner).
    #[arg(long)]
    variant: MaskVariant,

    /// Resolution tier.
    #[arg(long, value_enum, default_value_t = TierChoice::Standard)]
    tier: TierChoice,

    /// Directory holding masks/.
    #[arg(long, default_value = "assets")]
    assets: PathBuf,

    /// Output PNG path.
    #[arg(long)]
    out: PathBuf,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum TierChoice {
    Standard,
    HighRes,
}

impl From<TierChoice> for ResolutionTier {
    fn from(t: TierChoice) -> Self {
        match t {
            TierChoice::Standard => ResolutionTier::Standard,
            TierChoice::HighRes => ResolutionTier::HighRes,
        }
    }
}

fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.cmd {
        Command::Build(args) => cmd_build(args),
        Command::Convert(args) => cmd_convert(args).map(|()| ExitCode::SUCCESS),
        Command::Stitch(args) => cmd_stitch(args).map(|()| ExitCode::SUCCESS),
        Command::Cache { action } => cmd_cache(action).map(|()| ExitCode::SUCCESS),
        Command::Composite(args) => cmd_composite(args).map(|()| ExitCode::SUCCESS),
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn resolve_policy(flag: Option<BackendPolicy>) -> anyhow::Result<BackendPolicy> {
    match flag {
        Some(p) => Ok(p),
        None => Ok(BackendPolicy::from_env()?.unwrap_or_default()),
    }
}

fn cmd_build(args: BuildArgs) -> anyhow::Result<ExitCode> {
    let project = ModProject::from_path(&args.project)?;
    let config = BuildConfig {
        output_dir: args.out,
        cache_dir: args.cache,
        assets_root: args.assets,
        policy: resolve_policy(args.backend)?,
        force: args.force,
        threads: args.threads,
        convert_timeout: Duration::from_secs(args.timeout_secs),
        fingerprint_mode: if args.content_hash {
            FingerprintMode::Content
        } else {
            FingerprintMode::Metadata
        },
        cover_selection: if args.random_covers {
            CoverSelection::Random
        } else {
            CoverSelection::Seeded(args.seed)
        },
        ..BuildConfig::default()
    };

    eprintln!(
        "building '{}' ({} tracks, backend {})",
        project.mod_id,
        project.tracks.len(),
        config.policy
    );
    let handle = BuildOrchestrator::new(config).spawn(project);
    for event in handle.events.iter() {
        match event {
            BuildEvent::Stage(stage) => eprintln!("[{stage}]"),
            BuildEvent::TrackConverted(t) => match &t.result {
                Ok(a) if a.cached => eprintln!("  cached    {}", t.track_id),
                Ok(a) => eprintln!("  converted {} ({})", t.track_id, a.backend),
                Err(_) => eprintln!("  failed    {}", t.track_id),
            },
            BuildEvent::CoverComposited(c) => {
                let mark = if c.result.is_ok() { "cover    " } else { "cover fail" };
                eprintln!("  {mark} {}", c.target);
            }
            BuildEvent::Finished(_) => {}
        }
    }
    let (_project, result) = handle.wait()?;

    for line in result.summary_lines() {
        println!("{line}");
    }
    match result.status {
        BuildStatus::Succeeded => Ok(ExitCode::SUCCESS),
        BuildStatus::PartiallySucceeded { .. } => Ok(ExitCode::from(2)),
        BuildStatus::Failed(reason) => anyhow::bail!("build failed: {reason}"),
        BuildStatus::Cancelled => anyhow::bail!("build cancelled"),
    }
}

fn cmd_convert(args: ConvertArgs) -> anyhow::Result<()> {
    let policy = resolve_policy(args.backend)?;
    let converter = Converter::with_opts(&BackendOpts::default());
    let backend = converter
        .convert(&args.in_path, &args.out, TargetFormat::OggVorbis, policy, None)
        .with_context(|| format!("convert '{}'", args.in_path.display()))?;
    eprintln!("wrote {} ({backend})", args.out.display());
    Ok(())
}

fn cmd_stitch(args: StitchArgs) -> anyhow::Result<()> {
    let policy = resolve_policy(args.backend)?;
    let converter = Converter::with_opts(&BackendOpts::default());
    let backend = converter
        .stitch(&args.inputs, &args.out, TargetFormat::OggVorbis, policy, None)
        .with_context(|| format!("stitch {} sources", args.inputs.len()))?;
    eprintln!("wrote {} ({backend})", args.out.display());
    Ok(())
}

fn cmd_cache(action: CacheAction) -> anyhow::Result<()> {
    let open = |dir: PathBuf| {
        ConversionCache::open(
            dir,
            Converter::with_opts(&BackendOpts::default()),
            FingerprintMode::Metadata,
        )
    };
    match action {
        CacheAction::Invalidate { cache } => {
            open(cache)?.invalidate_all()?;
            eprintln!("cache invalidated");
        }
        CacheAction::Purge { cache } => {
            let removed = open(cache)?.purge_unreferenced()?;
            eprintln!("removed {removed} unreferenced file(s)");
        }
    }
    Ok(())
}

fn cmd_composite(args: CompositeArgs) -> anyhow::Result<()> {
    let compositor = Compositor::new(args.assets.join("masks"));
    let texture = compositor.composite(&args.base, args.variant, args.tier.into())?;
    texture
        .save_png(&args.out)
        .with_context(|| format!("write png '{}'", args.out.display()))?;
    eprintln!(
        "wrote {} ({}x{})",
        args.out.display(),
        texture.width,
        texture.height
    );
    Ok(())
}
