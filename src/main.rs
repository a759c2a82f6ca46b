use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use widepix::batch::{self, BatchJob, Pipeline};
use widepix::config::{self, WidepixConfig};
use widepix::context::Context;
use widepix::mapper::codecs;
use widepix::output::{self, ImageInfo};

#[derive(Parser)]
#[command(name = "widepix")]
#[command(about = "Load, transform and save raster images")]
#[command(long_about = "\
Load, transform and save raster images

Operations are chained as steps, each written name or name:arg,arg,...
and applied left to right:

  widepix apply in.jpg out.png -o resize:200,200 -o rotate:30,#ffffff
  widepix batch photos/*.jpg --out-dir thumbs --format webp -o resize:120,120,outside -o crop:center,center,120,120

Arguments:
  Coordinates  120, 50%, 50%+10, center, right, bottom-5
  Colors       #rrggbb or #rrggbbaa
  Images       @path/to/overlay.png
  Matrices     semicolon separated (0;-1;0;-1;5;-1;0;-1;0)
  Omitted      leave empty, as in resize:,200

Besides registered operations, as_palette[:colors,dither,match],
as_true_color and as_negative convert the image in place.

Defaults for quality, palettes and resizing come from widepix.toml in the
current directory; run 'widepix gen-config' for a documented template.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./widepix.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// More log output (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Show format, size and color mode of images
    Info {
        files: Vec<PathBuf>,
        /// Print JSON instead of text
        #[arg(long)]
        json: bool,
    },
    /// Re-encode an image, format taken from the output extension
    Convert {
        input: PathBuf,
        output: PathBuf,
        /// Output format, overriding the extension
        #[arg(long)]
        format: Option<String>,
    },
    /// Apply operation steps to one image
    Apply {
        input: PathBuf,
        output: PathBuf,
        /// Operation step, repeatable
        #[arg(short = 'o', long = "op", required = true)]
        ops: Vec<String>,
        #[arg(long)]
        format: Option<String>,
    },
    /// Apply operation steps to many images in parallel
    Batch {
        files: Vec<PathBuf>,
        #[arg(long, default_value = "out")]
        out_dir: PathBuf,
        /// Output format for every file (default: keep each input's)
        #[arg(long)]
        format: Option<String>,
        #[arg(short = 'o', long = "op")]
        ops: Vec<String>,
    },
    /// List registered operations and formats
    List,
    /// Print a stock widepix.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref())?;
    let ctx = Context::new();

    match cli.command {
        Command::Info { files, json } => {
            let mut infos = Vec::new();
            for file in &files {
                let bytes = std::fs::read(file)?;
                let format = codecs::sniff(&bytes);
                let mime = format.and_then(|f| ctx.mappers().mime_type(f).ok());
                let image = ctx.load_from_bytes(&bytes, None)?;
                infos.push(ImageInfo::describe(file, format, mime.as_deref(), &image));
            }
            if json {
                println!("{}", serde_json::to_string_pretty(&infos)?);
            } else {
                for (i, info) in infos.iter().enumerate() {
                    output::print_info(i + 1, info);
                }
            }
        }
        Command::Convert {
            input,
            output,
            format,
        } => {
            let pipeline = Pipeline::default();
            let (w, h) = batch::process_file(&ctx, &pipeline, &input, &output, format.as_deref(), &config)?;
            println!("{} → {} ({}x{})", input.display(), output.display(), w, h);
        }
        Command::Apply {
            input,
            output,
            ops,
            format,
        } => {
            let pipeline = Pipeline::parse(ops.as_slice())?;
            pipeline.check(&ctx)?;
            let (w, h) = batch::process_file(&ctx, &pipeline, &input, &output, format.as_deref(), &config)?;
            println!("{} → {} ({}x{})", input.display(), output.display(), w, h);
        }
        Command::Batch {
            files,
            out_dir,
            format,
            ops,
        } => {
            init_thread_pool(&config.processing);
            let pipeline = Pipeline::parse(ops.as_slice())?;
            let job = BatchJob {
                inputs: &files,
                out_dir: &out_dir,
                format: format.as_deref(),
                pipeline: &pipeline,
                config: &config,
            };
            let (tx, rx) = std::sync::mpsc::channel();
            let printer = std::thread::spawn(move || {
                for event in rx {
                    for line in output::format_batch_event(&event) {
                        println!("{}", line);
                    }
                }
            });
            let summary = batch::run_batch(&ctx, &job, Some(tx));
            printer.join().ok();
            let summary = summary?;
            output::print_batch_summary(&summary);
            if !summary.failed.is_empty() {
                std::process::exit(1);
            }
        }
        Command::List => {
            println!("Operations");
            for name in ctx.operations().names() {
                println!("    {}", name);
            }
            println!("Formats");
            for name in ctx.mappers().names() {
                println!("    {}", name);
            }
        }
        Command::GenConfig => {
            print!("{}", config::stock_config_toml());
        }
    }

    Ok(())
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// An explicit `--config` must exist; otherwise `./widepix.toml` is used
/// when present and stock defaults when not.
fn load_config(path: Option<&Path>) -> Result<WidepixConfig, config::ConfigError> {
    match path {
        Some(path) => config::load_config_file(path),
        None => config::load_config(Path::new(".")),
    }
}

/// Initialize the rayon thread pool based on processing config.
///
/// Caps at the number of available CPU cores; the config can constrain down, not up.
fn init_thread_pool(processing: &config::ProcessingConfig) {
    let threads = config::effective_threads(processing);
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}
