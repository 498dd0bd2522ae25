//! voxseg CLI: drive an interactive segmentation session from the command line

mod phantom;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

use voxseg_core::{Orientation, Volume};
use voxseg_engine::{
    BrushModifiers, CommitStatus, ConfigUpdate, MaskChange, MaskCompositor, MergeMode, PaddedMask,
    SegmentReport, SegmentationAlgorithm, Session, SessionConfig, StrokeEvent, StrokePoint,
};

use crate::phantom::Phantom;

#[derive(Parser)]
#[command(name = "voxseg")]
#[command(author, version, about = "Interactive volumetric segmentation", long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Paint scripted markers on a phantom and segment it
    Segment {
        #[command(flatten)]
        phantom: PhantomArgs,
        /// Session configuration (JSON); omitted fields take defaults
        #[arg(long)]
        config: Option<PathBuf>,
        /// Algorithm: watershed, watershed-ift, classifier, flood-fill
        #[arg(short, long)]
        algorithm: Option<SegmentationAlgorithm>,
        /// Merge mode for committed labels
        #[arg(long)]
        merge: Option<Merge>,
        /// Brush size in voxels
        #[arg(long)]
        brush: Option<usize>,
        /// Slice orientation the strokes are painted on
        #[arg(long, value_enum, default_value = "axial")]
        view: View,
        /// Foreground marks as z,y,x (repeatable); defaults to the phantom's solid centre
        #[arg(long = "fg", value_parser = parse_voxel)]
        foreground: Vec<(usize, usize, usize)>,
        /// Background marks as z,y,x (repeatable); defaults to a void voxel
        #[arg(long = "bg", value_parser = parse_voxel)]
        background: Vec<(usize, usize, usize)>,
        /// Re-run the algorithm over the whole volume afterwards
        #[arg(long)]
        expand_3d: bool,
        /// Remove foreground components of at most N voxels
        #[arg(long)]
        remove_small: Option<usize>,
        /// Seconds to wait for the background segmentation
        #[arg(long, default_value = "120")]
        timeout: u64,
        /// Write the mask (without padding) as raw u8 bytes, z-major
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Generate a phantom and print its statistics
    Phantom {
        #[command(flatten)]
        phantom: PhantomArgs,
    },
}

#[derive(clap::Args)]
struct PhantomArgs {
    /// Phantom shape
    #[arg(long, value_enum, default_value = "sphere")]
    shape: Phantom,
    /// Edge length of the cubic volume
    #[arg(long, default_value = "48")]
    size: usize,
    /// Surface periods across the volume (schwarz-p)
    #[arg(long, default_value = "2.0")]
    periods: f64,
    /// Uniform noise amplitude
    #[arg(long, default_value = "0.0")]
    noise: f64,
    /// Random seed for the noise
    #[arg(long, default_value = "42")]
    seed: u64,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum View {
    Axial,
    Coronal,
    Sagittal,
}

impl From<View> for Orientation {
    fn from(view: View) -> Self {
        match view {
            View::Axial => Orientation::Axial,
            View::Coronal => Orientation::Coronal,
            View::Sagittal => Orientation::Sagittal,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Merge {
    Overwrite,
    Additive,
}

impl From<Merge> for MergeMode {
    fn from(merge: Merge) -> Self {
        match merge {
            Merge::Overwrite => MergeMode::Overwrite,
            Merge::Additive => MergeMode::Additive,
        }
    }
}

// ─── Helpers ───────────────────────────────────────────────────────────

fn setup_logging(verbose: bool) -> Result<()> {
    let level = if verbose { Level::DEBUG } else { Level::INFO };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set subscriber")
}

fn spinner(msg: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(msg.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

fn done(name: &str, path: &Path, elapsed: Duration) {
    println!("{} saved to: {} ({:.2}s)", name, path.display(), elapsed.as_secs_f64());
}

fn parse_voxel(s: &str) -> std::result::Result<(usize, usize, usize), String> {
    let parts: Vec<&str> = s.split(',').map(str::trim).collect();
    let [z, y, x] = parts.as_slice() else {
        return Err(format!("expected z,y,x, got '{s}'"));
    };
    let parse = |v: &str| v.parse::<usize>().map_err(|e| format!("'{v}': {e}"));
    Ok((parse(z)?, parse(y)?, parse(x)?))
}

fn load_config(path: Option<&Path>) -> Result<SessionConfig> {
    let Some(path) = path else {
        return Ok(SessionConfig::default());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config: {}", path.display()))?;
    let config: SessionConfig = serde_json::from_str(&text)
        .with_context(|| format!("Failed to parse config: {}", path.display()))?;
    config.validate().context("Invalid configuration")?;
    Ok(config)
}

fn build_phantom(args: &PhantomArgs) -> Result<Volume<i16>> {
    if args.size < 3 {
        bail!("Phantom size must be at least 3, got {}", args.size);
    }
    let pb = spinner("Generating phantom...");
    let volume = phantom::generate(args.shape, args.size, args.periods, args.noise, args.seed);
    pb.finish_and_clear();
    Ok(volume)
}

fn stroke(
    session: &mut Session<i16>,
    orientation: Orientation,
    voxel: (usize, usize, usize),
    modifiers: BrushModifiers,
) -> Result<()> {
    let (slice, row, col) = orientation.to_plane(voxel);
    let point = StrokePoint { orientation, slice, center: (row as isize, col as isize) };
    session.handle(StrokeEvent::Start { point, modifiers })?;
    session.handle(StrokeEvent::End)?;
    Ok(())
}

fn describe(report: &SegmentReport) -> String {
    match &report.status {
        CommitStatus::Committed(summary) => format!(
            "committed {} changed voxels, {} foreground ({:.2}s)",
            summary.changed,
            summary.foreground,
            report.elapsed.as_secs_f64()
        ),
        CommitStatus::NotReady(reason) => format!("not ready: {reason}"),
        CommitStatus::Declined(reason) => format!("declined: {reason}"),
        CommitStatus::Cancelled => "cancelled".to_string(),
    }
}

fn print_mask_counts(mask: &PaddedMask, config: &SessionConfig, foreground: u8, ambiguous: u8) {
    let interior = mask.interior();
    let total = interior.len();
    let fg = interior.iter().filter(|v| **v == foreground).count();
    let amb = interior.iter().filter(|v| **v == ambiguous).count();
    println!("Algorithm:   {:?}", config.algorithm);
    println!("Voxels:      {}", total);
    println!("Foreground:  {} ({:.2}%)", fg, 100.0 * fg as f64 / total.max(1) as f64);
    if amb > 0 {
        println!("Ambiguous:   {}", amb);
    }
    println!("Background:  {}", total - fg - amb);
}

// ─── Commands ──────────────────────────────────────────────────────────

#[allow(clippy::too_many_arguments)]
fn run_segment(
    phantom_args: &PhantomArgs,
    config_path: Option<&Path>,
    algorithm: Option<SegmentationAlgorithm>,
    merge: Option<Merge>,
    brush: Option<usize>,
    view: View,
    mut foreground: Vec<(usize, usize, usize)>,
    mut background: Vec<(usize, usize, usize)>,
    expand_3d: bool,
    remove_small: Option<usize>,
    timeout: u64,
    output: Option<&Path>,
) -> Result<()> {
    let start = Instant::now();
    let config = load_config(config_path)?;
    let volume = build_phantom(phantom_args)?;

    if foreground.is_empty() || background.is_empty() {
        let (solid, void) = phantom::default_marks(&volume);
        if foreground.is_empty() {
            foreground.extend(solid);
        }
        if background.is_empty() {
            background.extend(void);
        }
    }
    let shape = volume.shape();
    for &(z, y, x) in foreground.iter().chain(&background) {
        if z >= shape.0 || y >= shape.1 || x >= shape.2 {
            bail!("Mark ({z},{y},{x}) is outside the {:?} volume", shape);
        }
    }

    let compositor = MaskCompositor::default().on_mask_changed(|change: &MaskChange| {
        info!(scope = ?change.scope, changed = change.summary.changed, "mask updated");
    });
    let sentinels = compositor.sentinels().clone();
    let (mut session, handle) = Session::new(Arc::new(volume), config, compositor)?;

    if let Some(algorithm) = algorithm {
        handle.send(ConfigUpdate::Algorithm(algorithm))?;
    }
    if let Some(merge) = merge {
        handle.send(ConfigUpdate::MergeMode(merge.into()))?;
    }
    if let Some(size) = brush {
        handle.send(ConfigUpdate::BrushSize(size))?;
    }

    let orientation = Orientation::from(view);
    let mut mask = PaddedMask::new(shape);
    for &voxel in &foreground {
        stroke(&mut session, orientation, voxel, BrushModifiers::default())?;
    }
    for &voxel in &background {
        stroke(&mut session, orientation, voxel, BrushModifiers { alternate: true, erase: false })?;
    }
    info!(foreground = foreground.len(), background = background.len(), "markers painted");

    let pb = spinner("Segmenting...");
    let report = session.wait(&mut mask, Duration::from_secs(timeout))?;
    pb.finish_and_clear();
    match report {
        Some(report) => println!("Segmentation: {}", describe(&report)),
        None => bail!("Segmentation did not finish within {timeout}s"),
    }

    if expand_3d {
        let pb = spinner("Expanding to 3D...");
        let report = session.expand_to_3d(&mut mask)?;
        pb.finish_and_clear();
        println!("3D expansion: {}", describe(&report));
    }

    if let Some(max_size) = remove_small {
        let removed = session.remove_small_regions(&mut mask, max_size)?;
        println!("Removed {} voxels in components of at most {} voxels", removed, max_size);
    }

    print_mask_counts(&mask, session.config(), sentinels.foreground, sentinels.ambiguous);

    if let Some(path) = output {
        let bytes: Vec<u8> = mask.interior().iter().copied().collect();
        std::fs::write(path, bytes)
            .with_context(|| format!("Failed to write mask: {}", path.display()))?;
        done("Mask", path, start.elapsed());
    }
    Ok(())
}

fn run_phantom(args: &PhantomArgs) -> Result<()> {
    let volume = build_phantom(args)?;
    let (min, max) = volume.min_max().context("Empty phantom")?;
    let data = volume.data();
    let mean = data.iter().map(|v| *v as f64).sum::<f64>() / data.len() as f64;
    let threshold = (phantom::SOLID + phantom::VOID) / 2;
    let solid = data.iter().filter(|v| **v > threshold).count();

    println!("Phantom:     {:?}", args.shape);
    println!("Shape:       {:?}", volume.shape());
    println!("Range:       [{}, {}]", min, max);
    println!("Mean:        {:.2}", mean);
    println!("Solid:       {} ({:.2}%)", solid, 100.0 * solid as f64 / data.len() as f64);
    if let Some(window) = volume.window() {
        println!("Window:      {:?}", window);
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose)?;

    match cli.command {
        Commands::Segment {
            phantom,
            config,
            algorithm,
            merge,
            brush,
            view,
            foreground,
            background,
            expand_3d,
            remove_small,
            timeout,
            output,
        } => run_segment(
            &phantom,
            config.as_deref(),
            algorithm,
            merge,
            brush,
            view,
            foreground,
            background,
            expand_3d,
            remove_small,
            timeout,
            output.as_deref(),
        ),
        Commands::Phantom { phantom } => run_phantom(&phantom),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_voxel() {
        assert_eq!(parse_voxel("1, 2,3").unwrap(), (1, 2, 3));
        assert!(parse_voxel("1,2").is_err());
        assert!(parse_voxel("a,b,c").is_err());
    }

    #[test]
    fn test_cli_parses_segment() {
        let cli = Cli::try_parse_from([
            "voxseg", "segment", "--shape", "schwarz-p", "-a", "classifier", "--fg", "4,4,4", "--expand-3d",
        ])
        .unwrap();
        match cli.command {
            Commands::Segment { phantom, algorithm, foreground, expand_3d, .. } => {
                assert_eq!(phantom.shape, Phantom::SchwarzP);
                assert_eq!(algorithm, Some(SegmentationAlgorithm::Classifier));
                assert_eq!(foreground, vec![(4, 4, 4)]);
                assert!(expand_3d);
            }
            Commands::Phantom { .. } => panic!("expected segment"),
        }
    }
}
