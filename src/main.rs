use clap::{Parser, Subcommand};
use imageconv::config::{self, AppConfig, Backend};
use imageconv::imaging::{
    Compression, Filter, Quality, SaveOptions, ScopedImage, Transformation, mime_for_path,
};
use imageconv::{batch, output};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "imageconv")]
#[command(about = "Transform and convert images through interchangeable engines")]
#[command(long_about = "\
Transform and convert images through interchangeable engines

Filters are written as name:key=value,... and applied in order:

  scale:width=W,height=H[,direction=both|down|up]   fit inside WxH
  scaleWidth:width=W[,direction=...]                 fixed width
  scaleHeight:height=H[,direction=...]               fixed height
  scalePercent:width=P,height=P                      percentages
  scaleExact:width=W,height=H                        ignore aspect ratio
  crop:x=X,y=Y,width=W,height=H
  colorspace:space=grey|monochrome|sepia
  swirl:degrees=D                                    magick backend only

Converting PNG or GIF to a format without transparency flattens the image
onto the configured background colour.

Run 'imageconv gen-config' to generate a documented imageconv.toml.")]
#[command(version)]
struct Cli {
    /// Config file (default: ./imageconv.toml if present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Override the configured engine
    #[arg(long, value_enum, global = true)]
    backend: Option<Backend>,

    #[command(subcommand)]
    command: Command,
}

/// Shared flags for commands that write images.
#[derive(clap::Args, Clone)]
struct SaveArgs {
    /// Quality for lossy formats (1-100)
    #[arg(long)]
    quality: Option<u32>,

    /// PNG compression effort
    #[arg(long, value_parser = parse_compression)]
    compression: Option<Compression>,
}

impl SaveArgs {
    fn to_options(&self) -> SaveOptions {
        SaveOptions {
            quality: self.quality.map(Quality::new),
            compression: self.compression,
        }
    }
}

#[derive(Subcommand)]
enum Command {
    /// Apply filters to one image and save it
    Transform {
        input: PathBuf,
        output: PathBuf,
        /// Filter to apply, repeatable
        #[arg(short, long = "filter")]
        filters: Vec<String>,
        /// Output MIME type (default: from the output extension, else the input's)
        #[arg(long)]
        mime: Option<String>,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Run a named transformation from the config on one image
    Apply {
        name: String,
        input: PathBuf,
        output: PathBuf,
        #[command(flatten)]
        save: SaveArgs,
    },
    /// Run a named transformation over every image in a directory
    Batch {
        name: String,
        input_dir: PathBuf,
        output_dir: PathBuf,
        /// Worker threads (default: number of CPUs)
        #[arg(long)]
        jobs: Option<usize>,
    },
    /// Print dimensions and type of images
    Info {
        #[arg(required = true)]
        inputs: Vec<PathBuf>,
    },
    /// List the filters the engine supports
    Filters,
    /// List the MIME types the engine reads and writes
    Formats,
    /// Print a stock imageconv.toml with all options documented
    GenConfig,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();
    let cli = Cli::parse();

    // gen-config never reads an existing config file
    let mut app_config = match cli.command {
        Command::GenConfig => AppConfig::default(),
        _ => config::load_config(cli.config.as_deref())?,
    };
    if let Some(backend) = cli.backend {
        app_config.handler.backend = backend;
    }

    match cli.command {
        Command::Transform {
            input,
            output,
            filters,
            mime,
            save,
        } => {
            let filters = filters
                .iter()
                .map(|f| f.parse::<Filter>())
                .collect::<Result<Vec<_>, _>>()?;
            let mimes = match mime.as_deref().or_else(|| mime_for_path(&output)) {
                Some(m) => vec![m.to_string()],
                None => Vec::new(),
            };
            let mut transformation = Transformation::new("transform", filters, mimes);
            transformation.save_options = app_config.save;
            run_one(&app_config, &transformation, &input, &output, &save)?;
        }
        Command::Apply {
            name,
            input,
            output,
            save,
        } => {
            let transformation = app_config.transformation(&name)?;
            run_one(&app_config, &transformation, &input, &output, &save)?;
        }
        Command::Batch {
            name,
            input_dir,
            output_dir,
            jobs,
        } => {
            let transformation = app_config.transformation(&name)?;
            init_thread_pool(jobs);
            let inputs = batch::collect_inputs(&input_dir);
            let summary = batch::run(&transformation, &input_dir, &output_dir, &inputs, || {
                app_config.build_handler()
            });
            output::print_batch_summary(&summary);
            if !summary.is_success() {
                return Err(format!("{} file(s) failed", summary.failures.len()).into());
            }
        }
        Command::Info { inputs } => {
            let mut handler = app_config.build_handler();
            for input in &inputs {
                let image = ScopedImage::open(handler.as_mut(), input, None)?;
                output::print_info(&image.info()?);
                image.close()?;
            }
        }
        Command::Filters => output::print_filters(app_config.build_handler().as_ref()),
        Command::Formats => output::print_formats(app_config.build_handler().as_ref()),
        Command::GenConfig => print!("{}", config::stock_config_toml()),
    }

    Ok(())
}

fn run_one(
    app_config: &AppConfig,
    transformation: &Transformation,
    input: &Path,
    output: &Path,
    save: &SaveArgs,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut handler = app_config.build_handler();
    let report = transformation.transform(
        handler.as_mut(),
        input,
        output,
        Some(save.to_options()),
    )?;
    output::print_report(&report);
    Ok(())
}

/// Log to stderr, filtered by `RUST_LOG` (default `warn`).
fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();
}

/// Size the rayon pool. Caps at the number of available CPU cores.
fn init_thread_pool(jobs: Option<usize>) {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    let threads = jobs.map_or(cores, |j| j.clamp(1, cores));
    rayon::ThreadPoolBuilder::new()
        .num_threads(threads)
        .build_global()
        .ok();
}

fn parse_compression(s: &str) -> Result<Compression, String> {
    s.parse()
}
