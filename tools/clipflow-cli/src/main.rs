//! Clipflow CLI: plan, validate, caption and render EDLs, or run workflows.
//!
//! Usage:
//!   clipflow plan <CLIPS>        Plan an EDL from a clip list
//!   clipflow validate <EDL>      Validate an EDL document
//!   clipflow captions <EDL>      Build the ASS caption track for an EDL
//!   clipflow render <EDL> -o OUT Render an EDL to video
//!   clipflow run <GRAPH>         Execute a workflow graph
//!   clipflow check               Check the local setup

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use clipflow_common::AppConfig;

mod commands;

#[derive(Parser)]
#[command(
    name = "clipflow",
    about = "Short-form video workflows driven by edit decision lists",
    version,
    author
)]
struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Plan an EDL from a JSON list of clips
    Plan {
        /// JSON array of clips (`{"url", "durationSec"}` objects or URL strings)
        clips: PathBuf,

        /// Target length in seconds
        #[arg(short, long, default_value = "30")]
        target: f64,

        /// Shortest segment in seconds
        #[arg(long, default_value = "1.5")]
        min_clip: f64,

        /// Longest segment in seconds
        #[arg(long, default_value = "3.5")]
        max_clip: f64,

        /// Output aspect ratio: 9:16, 1:1 or 16:9
        #[arg(long, default_value = "9:16")]
        aspect: String,

        /// Seed for a reproducible clip order
        #[arg(long)]
        seed: Option<u64>,

        /// Hook text shown over the first seconds
        #[arg(long)]
        hook: Option<String>,

        /// Voiceover URL
        #[arg(long)]
        voiceover: Option<String>,

        /// Background music URL
        #[arg(long)]
        music: Option<String>,

        /// Write the EDL here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Validate an EDL document
    Validate {
        /// Path to the EDL JSON
        path: PathBuf,
    },

    /// Build the caption track for an EDL's overlays
    Captions {
        /// Path to the EDL JSON
        path: PathBuf,

        /// Write the .ass file here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Render an EDL to a video file
    Render {
        /// Path to the EDL JSON
        path: PathBuf,

        /// Output video file
        #[arg(short, long)]
        output: PathBuf,

        /// Render at draft bitrate
        #[arg(long)]
        draft: bool,

        /// Local voiceover file replacing the EDL's voiceover URL
        #[arg(long)]
        voiceover: Option<PathBuf>,

        /// Fail instead of writing a placeholder when the render breaks
        #[arg(long)]
        strict: bool,
    },

    /// Execute a workflow graph and print the run
    Run {
        /// Path to the graph JSON
        graph: PathBuf,

        /// User the run belongs to
        #[arg(long, default_value = "local")]
        user: String,

        /// JSON payload handed to trigger steps
        #[arg(long)]
        payload: Option<String>,

        /// Approve review gates instead of stopping at them.
        ///
        /// Without this flag a gate configured with `timeoutSec` is waited out
        /// and auto-approved; a gate without a timeout stops the run.
        #[arg(long)]
        approve: bool,
    },

    /// Check the encoder, storage and provider setup
    Check,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::load();
    if cli.verbose {
        config.logging.level = "debug".to_string();
    }
    clipflow_common::logging::init_logging(&config.logging);

    match cli.command {
        Commands::Plan {
            clips,
            target,
            min_clip,
            max_clip,
            aspect,
            seed,
            hook,
            voiceover,
            music,
            output,
        } => commands::plan::run(commands::plan::PlanArgs {
            clips,
            target,
            min_clip,
            max_clip,
            aspect,
            seed,
            hook,
            voiceover,
            music,
            output,
        }),
        Commands::Validate { path } => commands::validate::run(path),
        Commands::Captions { path, output } => commands::captions::run(path, output),
        Commands::Render {
            path,
            output,
            draft,
            voiceover,
            strict,
        } => commands::render::run(&config, path, output, draft, voiceover, strict).await,
        Commands::Run {
            graph,
            user,
            payload,
            approve,
        } => commands::run::run(&config, graph, user, payload, approve).await,
        Commands::Check => commands::check::run(&config).await,
    }
}
