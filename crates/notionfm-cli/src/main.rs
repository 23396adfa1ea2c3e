//! notionfm CLI - Command-line interface for notionfm
//!
//! Provides commands for:
//! - Uploading local files to a Notion page
//! - Listing the files attached to a page
//! - Downloading an attached file by name
//! - Viewing and validating configuration

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

mod commands;
mod output;

use commands::{
    config::ConfigCommand, download::DownloadCommand, list::ListCommand, upload::UploadCommand,
    Context,
};
use output::OutputFormat;

#[derive(Debug, Parser)]
#[command(name = "notionfm", version, about = "Use Notion pages as file storage")]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output (can be repeated: -v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Use alternate config file
    #[arg(long, global = true)]
    config: Option<String>,

    /// Minimal output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Notion integration token (overrides `api.token`)
    #[arg(long, env = "NOTION_TOKEN", global = true, hide_env_values = true)]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Upload files to a page
    Upload(UploadCommand),
    /// List files attached to a page
    List(ListCommand),
    /// Download a file attached to a page
    Download(DownloadCommand),
    /// View and manage configuration
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let ctx = Context::load(cli.config.as_deref(), cli.token.clone(), cli.quiet)?;

    // Setup tracing
    let filter = match cli.verbose {
        0 => ctx.config.logging.level.clone(),
        1 => "debug".to_string(),
        _ => "trace".to_string(),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let format = if cli.json {
        OutputFormat::Json
    } else {
        OutputFormat::Human
    };

    match cli.command {
        Commands::Upload(cmd) => cmd.execute(format, &ctx).await,
        Commands::List(cmd) => cmd.execute(format, &ctx).await,
        Commands::Download(cmd) => cmd.execute(format, &ctx).await,
        Commands::Config(cmd) => cmd.execute(format, &ctx).await,
    }
}
