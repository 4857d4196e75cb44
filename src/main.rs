use anyhow::Context as _;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use halftone::assets::AssetLoader;
use halftone::codec;
use halftone::codec::resident;
use halftone::halftone::{DeviceHalftone, HalftoneContext, SetSummary};
use halftone::memory::Memory;
use halftone::models::HalftoneConfig;
use halftone::rendering;
use halftone::services::ScreenBuilder;

#[derive(Parser)]
#[command(name = "halftone")]
#[command(about = "Halftone cell orders, tile caches and serialized halftone records")]
struct Cli {
    /// Configuration file (overrides CONFIG_FILE)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Paint a gray ramp through a screen to a PNG file
    Render {
        /// Screen name (defaults to the configured halftone)
        #[arg(short, long)]
        screen: Option<String>,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// Ramp width in pixels
        #[arg(long, default_value_t = 512)]
        width: u32,

        /// Ramp height in pixels
        #[arg(long, default_value_t = 64)]
        height: u32,

        /// Color component to paint
        #[arg(short, long, default_value_t = 0)]
        component: usize,

        /// Compare against the threshold array instead of rendering tiles
        #[arg(long)]
        threshold: bool,
    },
    /// Write a screen's threshold array as a grayscale PNG
    Threshold {
        /// Screen name (defaults to the configured halftone)
        #[arg(short, long)]
        screen: Option<String>,

        /// Output PNG file path
        #[arg(short, long)]
        output: PathBuf,

        /// Color component
        #[arg(short, long, default_value_t = 0)]
        component: usize,
    },
    /// Serialize the configured halftone to a file
    Encode {
        /// Screen name (defaults to the configured halftone)
        #[arg(short, long)]
        screen: Option<String>,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,
    },
    /// Read a serialized halftone and install it
    Decode {
        /// Input file path
        input: PathBuf,

        /// Rebuild independently in this many worker threads
        #[arg(short, long, default_value_t = 1)]
        workers: usize,

        /// Print the summary as JSON
        #[arg(long)]
        json: bool,
    },
    /// List the built-in resident patterns
    Residents,
    /// Extract the embedded halftone.yaml for customization
    Init {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,

        /// List embedded assets without extracting
        #[arg(long)]
        list: bool,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_file = cli
        .config
        .clone()
        .or_else(|| std::env::var("CONFIG_FILE").ok().map(PathBuf::from));

    match cli.command {
        Some(Commands::Render {
            screen,
            output,
            width,
            height,
            component,
            threshold,
        }) => run_render_command(
            config_file,
            screen.as_deref(),
            &output,
            width,
            height,
            component,
            threshold,
        ),
        Some(Commands::Threshold {
            screen,
            output,
            component,
        }) => run_threshold_command(config_file, screen.as_deref(), &output, component),
        Some(Commands::Encode { screen, output }) => {
            run_encode_command(config_file, screen.as_deref(), &output)
        }
        Some(Commands::Decode {
            input,
            workers,
            json,
        }) => run_decode_command(config_file, &input, workers, json),
        Some(Commands::Residents) => {
            run_residents_command();
            Ok(())
        }
        Some(Commands::Init { force, list }) => run_init_command(config_file, force, list),
        None => {
            run_status_command(config_file);
            Ok(())
        }
    }
}

fn init_logging() {
    // Minimal logging for CLI
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "halftone=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().without_time())
        .init();
}

fn load_builder(config_file: Option<PathBuf>) -> ScreenBuilder {
    let loader = AssetLoader::new(config_file);
    if let Err(e) = loader.seed_if_configured() {
        tracing::warn!(%e, "Failed to seed config");
    }
    ScreenBuilder::new(HalftoneConfig::load_from_assets(&loader))
}

/// Install one named screen, or the whole configured halftone.
fn install_screen(
    builder: &ScreenBuilder,
    ctx: &mut HalftoneContext,
    screen: Option<&str>,
) -> anyhow::Result<()> {
    let mut candidate = match screen {
        Some(name) => {
            let built = builder.build_order(ctx.memory(), name)?;
            if let Some(sel) = built.selection {
                tracing::info!(
                    screen = name,
                    frequency = sel.actual_frequency,
                    angle = sel.actual_angle,
                    "Selected screen cell"
                );
            }
            let kind = if built.order.is_resident() {
                halftone::halftone::HalftoneType::Threshold
            } else {
                halftone::halftone::HalftoneType::Screen
            };
            DeviceHalftone::new(kind, built.order)
        }
        None => builder.build_halftone(ctx.memory())?,
    };
    ctx.install(&mut candidate)?;
    Ok(())
}

/// Paint a gray ramp to a PNG file
fn run_render_command(
    config_file: Option<PathBuf>,
    screen: Option<&str>,
    output: &Path,
    width: u32,
    height: u32,
    component: usize,
    threshold: bool,
) -> anyhow::Result<()> {
    init_logging();
    let builder = load_builder(config_file);
    let mut ctx = builder.context(Memory::new());
    install_screen(&builder, &mut ctx, screen)?;

    let image = if threshold {
        rendering::ramp_with_threshold(&ctx, component, width, height)?
    } else {
        rendering::ramp_with_tiles(&ctx, component, width, height)?
    };
    let png = rendering::encode_levels(
        image.width,
        image.height,
        image.levels,
        &image.pixels,
        image.subtractive,
    )?;
    std::fs::write(output, &png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Rendered {}x{} ramp ({} levels) to {} ({} bytes)",
        width,
        height,
        image.levels,
        output.display(),
        png.len()
    );
    Ok(())
}

/// Write a threshold array as an 8-bit grayscale PNG
fn run_threshold_command(
    config_file: Option<PathBuf>,
    screen: Option<&str>,
    output: &Path,
    component: usize,
) -> anyhow::Result<()> {
    init_logging();
    let builder = load_builder(config_file);
    let mut ctx = builder.context(Memory::new());
    install_screen(&builder, &mut ctx, screen)?;

    let array = ctx.threshold(component)?;
    let png = rendering::encode_gray8(array.width(), array.height(), array.data())?;
    std::fs::write(output, &png)
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Wrote {}x{} threshold array to {}",
        array.width(),
        array.height(),
        output.display()
    );
    Ok(())
}

/// Serialize the installed halftone, sizing the buffer first
fn run_encode_command(
    config_file: Option<PathBuf>,
    screen: Option<&str>,
    output: &Path,
) -> anyhow::Result<()> {
    init_logging();
    let builder = load_builder(config_file);
    let mut ctx = builder.context(Memory::new());
    install_screen(&builder, &mut ctx, screen)?;

    let set = ctx
        .halftone()
        .context("No halftone installed after install")?;
    let mut buf = vec![0u8; codec::encoded_len(set)];
    let written = codec::write(set, &mut buf)?;
    std::fs::write(output, &buf[..written])
        .with_context(|| format!("Failed to write {}", output.display()))?;

    println!(
        "Encoded {} component(s) into {} bytes at {}",
        set.num_components(),
        written,
        output.display()
    );
    Ok(())
}

/// Install a serialized halftone, once per worker
fn run_decode_command(
    config_file: Option<PathBuf>,
    input: &Path,
    workers: usize,
    json: bool,
) -> anyhow::Result<()> {
    init_logging();
    let builder = load_builder(config_file);
    let data =
        std::fs::read(input).with_context(|| format!("Failed to read {}", input.display()))?;
    let workers = workers.max(1);

    let results: Vec<anyhow::Result<(usize, SetSummary)>> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(|worker| {
                let builder = &builder;
                let data = &data;
                scope.spawn(move || -> anyhow::Result<(usize, SetSummary)> {
                    let mut ctx = builder.context(Memory::new());
                    let consumed = codec::read_and_install(&mut ctx, data)?;
                    let set = ctx.halftone().context("No halftone installed")?;
                    tracing::debug!(worker, consumed, "Worker installed halftone");
                    Ok((consumed, set.summary()))
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| {
                h.join()
                    .unwrap_or_else(|_| Err(anyhow::anyhow!("Decode worker panicked")))
            })
            .collect()
    });

    let mut summaries = Vec::with_capacity(workers);
    for result in results {
        summaries.push(result?);
    }
    let Some((consumed, first)) = summaries.first() else {
        anyhow::bail!("No workers ran");
    };
    if summaries
        .iter()
        .any(|(_, s)| s.components != first.components || s.kind != first.kind)
    {
        anyhow::bail!("Workers rebuilt different halftones");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(first)?);
        return Ok(());
    }

    println!(
        "Header: {}",
        hex::encode(&data[..data.len().min(16)])
    );
    println!(
        "Read {} of {} bytes in {} worker(s): {:?}, {} component(s), {} distinct order(s), lcm {}x{}",
        consumed,
        data.len(),
        workers,
        first.kind,
        first.components.len(),
        first.distinct_orders,
        first.lcm_width,
        first.lcm_height
    );
    for (i, c) in first.components.iter().enumerate() {
        println!(
            "  [{i}] {}x{} shift {} levels {} bits {} {}{}{}",
            c.width,
            c.height,
            c.shift,
            c.num_levels,
            c.num_bits,
            c.packing,
            if c.resident { " resident" } else { "" },
            if c.transfer { " transfer" } else { "" },
        );
    }
    Ok(())
}

fn run_residents_command() {
    println!("Resident patterns:");
    for r in resident::candidates() {
        println!(
            "  {:<8} {}x{} {} levels ({})",
            r.name,
            r.width,
            r.height,
            r.num_levels(),
            r.packing.name()
        );
    }
}

fn run_init_command(config_file: Option<PathBuf>, force: bool, list: bool) -> anyhow::Result<()> {
    if list {
        println!("Embedded assets:\n");
        for f in AssetLoader::list_embedded() {
            println!("  {f}");
        }
        return Ok(());
    }

    let loader = AssetLoader::new(config_file);
    let report = loader.init(force)?;

    for f in &report.written {
        println!("  + {f}");
    }
    if !report.skipped.is_empty() {
        println!("Skipped existing file (use --force to overwrite):");
        for f in &report.skipped {
            println!("  - {f}");
        }
    }
    Ok(())
}

fn run_status_command(config_file: Option<PathBuf>) {
    const VERSION: &str = env!("CARGO_PKG_VERSION");

    println!("halftone v{VERSION}");
    println!("Halftone cell orders, tile caches and serialized halftone records\n");

    println!("Environment Variables:");
    println!(
        "  CONFIG_FILE = {}",
        std::env::var("CONFIG_FILE")
            .ok()
            .as_deref()
            .unwrap_or("(not set)")
    );

    let config_source = match config_file {
        Some(ref path) if path.exists() => path.display().to_string(),
        Some(_) => "embedded (file not found)".to_string(),
        None => "embedded".to_string(),
    };
    println!("\nConfig: {config_source}");

    let config = HalftoneConfig::load_from_assets(&AssetLoader::new(config_file));
    let model = config.color_model.model();
    println!(
        "  Color model: {:?} ({} component(s), {} levels)",
        config.color_model.kind, model.num_components, config.color_model.levels
    );
    println!(
        "  Tile cache:  {} bytes, {} tiles max",
        config.cache.bits_size, config.cache.max_tiles
    );
    println!(
        "  Default:     {}",
        config.default_screen.as_deref().unwrap_or("(none)")
    );

    let mut names: Vec<_> = config.screens.keys().collect();
    names.sort();
    println!("\nScreens:");
    for name in names {
        if let Some(screen) = config.get_screen(name) {
            match screen.resident {
                Some(ref pattern) => println!("  {name:<12} resident {pattern}"),
                None => println!(
                    "  {name:<12} {} lpi at {}° on {} dpi, {} spot",
                    screen.frequency, screen.angle, screen.resolution, screen.spot
                ),
            }
        }
    }

    println!("\nCommands:");
    println!("  halftone render      Paint a gray ramp through a screen");
    println!("  halftone threshold   Write a threshold array as PNG");
    println!("  halftone encode      Serialize the configured halftone");
    println!("  halftone decode      Install a serialized halftone");
    println!("  halftone residents   List resident patterns");
    println!("  halftone init        Extract embedded halftone.yaml");
    println!("\nRun 'halftone --help' for more details.");
}
