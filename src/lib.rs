//! gtbot: ground-truth cutouts and annotation rewriting for volumetric EM.
//!
//! gtbot sits between a web volume viewer and a desktop proofreading
//! editor. It turns point annotations into boxes (optionally naming the
//! segments under them), cuts boxes out of an image volume as slice
//! directories, and uploads edited slice directories back as new layers.
//!
//! # Modules
//!
//! - [`geom`]: points, boxes and resolution mapping
//! - [`volume`]: volumetric sources, the precomputed client and the labeler
//! - [`cutout`]: slice directories and the cutout/upload workflows
//! - [`payload`]: viewer state, links and the state server
//! - [`translate`]: point-to-box expansion and segment labeling
//! - [`command`] and [`bot`]: chat commands and their dispatch
//! - [`error`]: the error type shared by every operation

pub mod bot;
pub mod command;
pub mod config;
pub mod cutout;
pub mod error;
pub mod geom;
pub mod notify;
pub mod payload;
pub mod translate;
pub mod volume;

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;

use bot::{Bot, Outcome};
use command::Bucket;
use config::{Config, LabelMode};
use notify::{LogNotifier, Notifier};
use payload::{MemoryPayloadStore, PayloadStore};
use volume::PrecomputedOpener;

pub use error::GtbotError;

/// The gtbot CLI application.
#[derive(Parser)]
#[command(name = "gtbot")]
#[command(version, author, about)]
#[command(propagate_version = true)]
struct Cli {
    /// YAML configuration file.
    #[arg(long, global = true, env = "GTBOT_CONFIG")]
    config: Option<PathBuf>,

    /// Bearer token for the volume store and the state server.
    #[arg(long, global = true, env = "GTBOT_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Name recorded as the requester.
    #[arg(long, global = true, env = "GTBOT_AUTHOR")]
    author: Option<String>,

    /// Chat webhook that receives progress messages.
    #[arg(long, global = true, env = "GTBOT_WEBHOOK")]
    webhook: Option<String>,

    /// Seed for generated ids and tags.
    #[arg(long, global = true)]
    seed: Option<u64>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Expand point annotations of a viewer link into boxes.
    Bbox(BboxArgs),
    /// Cut every box annotation of a viewer link out as a slice directory.
    Cutout(CutoutArgs),
    /// Upload an edited slice directory as a new layer.
    Upload(UploadArgs),
    /// Handle one chat message addressed to the bot.
    Handle(HandleArgs),
    /// Print the payload behind a viewer link.
    Link(LinkArgs),
}

#[derive(Clone, Copy, Debug, Default, ValueEnum)]
enum OutputFormat {
    #[default]
    Text,
    Json,
}

#[derive(clap::Args)]
struct BboxArgs {
    /// Viewer link holding point annotations.
    link: String,

    /// Whether to look up the segments inside each new box.
    #[arg(long, value_enum)]
    labels: Option<LabelMode>,

    /// Box extent in voxels, as `x,y,z`.
    #[arg(long, value_delimiter = ',')]
    span: Option<Vec<i64>>,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct CutoutArgs {
    /// Viewer link holding box annotations.
    link: String,

    /// Resolution level to cut at.
    #[arg(long)]
    mip: Option<usize>,

    /// Directory the cutouts are written under.
    #[arg(long)]
    prefix: Option<PathBuf>,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct UploadArgs {
    /// Slice directory, or a path inside the shared mount.
    path: String,

    /// Upload into the permanent bucket.
    #[arg(long)]
    save: bool,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct HandleArgs {
    /// The raw message text.
    message: String,

    /// Mention that prefixes messages addressed to the bot.
    #[arg(long, env = "GTBOT_BOT_ID")]
    bot_id: Option<String>,

    #[arg(long, value_enum, default_value_t)]
    output: OutputFormat,
}

#[derive(clap::Args)]
struct LinkArgs {
    link: String,
}

/// Run the gtbot CLI.
///
/// This is the main entry point for the CLI, called from `main.rs`.
pub fn run() -> Result<(), GtbotError> {
    let cli = Cli::parse();

    let Some(command) = cli.command else {
        println!("gtbot {}", env!("CARGO_PKG_VERSION"));
        println!();
        println!("Ground-truth cutouts and annotation rewriting.");
        println!();
        println!("Run 'gtbot --help' for usage information.");
        return Ok(());
    };

    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    let author = cli
        .author
        .clone()
        .unwrap_or_else(|| config.upload.default_author.clone());

    match command {
        Commands::Bbox(args) => {
            if let Some(mode) = args.labels {
                config.labels.mode = mode;
            }
            if let Some(span) = args.span.as_deref() {
                let [x, y, z] = span else {
                    return Err(GtbotError::InvalidDimensions {
                        message: format!("--span needs three values, got {}", span.len()),
                    });
                };
                config.bbox.dim = geom::Point3::new(*x, *y, *z);
            }
            let mut bot = build_bot(config, &cli.token, &cli.webhook);
            let outcome = bot.create_bboxes(&args.link, &author)?;
            emit(args.output, &Outcome::Bboxes(outcome))
        }
        Commands::Cutout(args) => {
            if let Some(mip) = args.mip {
                config.cutout.mip = mip;
            }
            if let Some(prefix) = args.prefix {
                config.cutout.prefix = prefix;
            }
            let mut bot = build_bot(config, &cli.token, &cli.webhook);
            let reports = bot.create_cutouts(&args.link, &author)?;
            emit(args.output, &Outcome::Cutouts { reports })
        }
        Commands::Upload(args) => {
            let bucket = if args.save {
                Bucket::Permanent
            } else {
                Bucket::Scratch
            };
            let mut bot = build_bot(config, &cli.token, &cli.webhook);
            let outcome = bot.upload(&args.path, bucket, &author)?;
            emit(args.output, &Outcome::Upload(outcome))
        }
        Commands::Handle(args) => {
            let mut bot = build_bot(config, &cli.token, &cli.webhook);
            let outcome = bot.handle(&args.message, args.bot_id.as_deref(), &author)?;
            emit(args.output, &outcome)
        }
        Commands::Link(args) => {
            let bot = build_bot(config, &cli.token, &cli.webhook);
            let payload = bot.resolve(&args.link)?;
            print_json(&payload)
        }
    }
}

fn build_bot(config: Config, token: &Option<String>, webhook: &Option<String>) -> Bot {
    let timeout = config.timeout();
    let opener = PrecomputedOpener::new(token.clone(), timeout);
    let store = payload_store(&config, token);
    let notifier = notifier(webhook, timeout);
    Bot::new(config, Box::new(opener.clone()), store, notifier).with_destinations(opener)
}

#[cfg(feature = "remote")]
fn payload_store(config: &Config, token: &Option<String>) -> Box<dyn PayloadStore> {
    match &config.viewer.state_server {
        Some(url) => Box::new(payload::HttpPayloadStore::new(
            url,
            token.clone(),
            config.timeout(),
        )),
        None => Box::new(MemoryPayloadStore::new()),
    }
}

#[cfg(not(feature = "remote"))]
fn payload_store(_config: &Config, _token: &Option<String>) -> Box<dyn PayloadStore> {
    Box::new(MemoryPayloadStore::new())
}

#[cfg(feature = "remote")]
fn notifier(webhook: &Option<String>, timeout: std::time::Duration) -> Box<dyn Notifier> {
    match webhook {
        Some(url) => Box::new(notify::WebhookNotifier::new(url, timeout)),
        None => Box::new(LogNotifier),
    }
}

#[cfg(not(feature = "remote"))]
fn notifier(_webhook: &Option<String>, _timeout: std::time::Duration) -> Box<dyn Notifier> {
    Box::new(LogNotifier)
}

fn emit(format: OutputFormat, outcome: &Outcome) -> Result<(), GtbotError> {
    match format {
        OutputFormat::Json => print_json(outcome),
        OutputFormat::Text => {
            match outcome {
                Outcome::Bboxes(o) => {
                    print!("{}", o.report);
                    println!("{}", o.link);
                }
                Outcome::Cutouts { reports } => {
                    if reports.is_empty() {
                        println!("No bounding boxes found");
                    }
                    for report in reports {
                        println!("{}", report);
                    }
                }
                Outcome::Upload(o) => {
                    print!("{}", o.report);
                    println!("neuroglancer link: {}", o.link);
                }
            }
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), GtbotError> {
    let text =
        serde_json::to_string_pretty(value).map_err(|source| GtbotError::PayloadParse { source })?;
    println!("{}", text);
    Ok(())
}
