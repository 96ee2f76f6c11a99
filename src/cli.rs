use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use vod_collector::domain::{CollectAction, WireFormat};

/// Collects video catalogs from MacCMS-compatible sources
#[derive(Parser)]
#[command(name = "vod-collector", version)]
#[command(about = "Collect video catalogs from MacCMS-compatible sources", long_about = None)]
pub struct Cli {
    /// Configuration file (defaults to ./vod-collector.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Manage collection sources
    Sources {
        #[command(subcommand)]
        action: SourceCommand,
    },
    /// Run a collection job and wait for it to finish
    Collect(CollectArgs),
    /// Download remote posters for every stored video
    Localize,
    /// Clear localization flags whose poster file is gone
    Verify,
    /// Fetch page 1 of a source URL and summarize it
    Probe {
        url: String,
        #[arg(long, default_value = "json")]
        format: WireFormat,
    },
    /// List the categories advertised by a registered source
    Categories { source_id: i64 },
    /// Search a registered source by keyword without storing results
    Search {
        source_id: i64,
        keyword: String,
        #[arg(long, default_value_t = 1)]
        page: u32,
        #[arg(short = 't', long)]
        category: Option<i64>,
    },
    /// Delete event log entries older than the given number of days
    PurgeLogs {
        #[arg(default_value_t = 30)]
        days: u32,
    },
}

#[derive(Subcommand)]
pub enum SourceCommand {
    /// List registered sources
    List,
    /// Register a new source
    Add {
        name: String,
        url: String,
        #[arg(long, default_value = "json")]
        format: WireFormat,
    },
    /// Map a remote category id onto a local one
    Bind {
        source_id: i64,
        remote_type_id: i64,
        local_type_id: i64,
    },
    /// Enable or disable a source
    Activate {
        source_id: i64,
        #[arg(long)]
        disable: bool,
    },
}

#[derive(Args)]
pub struct CollectArgs {
    pub source_id: i64,
    #[arg(long, default_value = "videolist")]
    pub action: CollectAction,
    /// Override the source's wire format
    #[arg(long)]
    pub format: Option<WireFormat>,
    #[arg(short = 't', long)]
    pub category: Option<i64>,
    #[arg(long, default_value_t = 1)]
    pub start_page: u32,
    #[arg(long)]
    pub end_page: Option<u32>,
    #[arg(long)]
    pub ids: Option<String>,
    #[arg(long)]
    pub keyword: Option<String>,
    /// Only records updated within this many hours
    #[arg(long)]
    pub hours: Option<u32>,
    #[arg(long)]
    pub update_existing: bool,
    #[arg(short, long)]
    pub workers: Option<usize>,
    #[arg(long)]
    pub timeout: Option<u64>,
    #[arg(long)]
    pub retries: Option<u32>,
}
