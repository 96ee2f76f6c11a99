mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::time::Duration;
use tracing::{info, warn};

use cli::{Cli, CollectArgs, Commands, SourceCommand};
use vod_collector::application::CollectorService;
use vod_collector::domain::{JobSnapshot, NewSource};
use vod_collector::infrastructure::{AppConfig, init_logging_with_config};

const POLL_INTERVAL: Duration = Duration::from_secs(2);

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    let _logging = init_logging_with_config(&config.logging)?;

    let service = CollectorService::open(&config).await?;
    let outcome = run(&service, cli.command).await;
    service.shutdown().await;
    outcome
}

async fn run(service: &CollectorService, command: Commands) -> Result<()> {
    match command {
        Commands::Sources { action } => sources(service, action).await,
        Commands::Collect(args) => {
            let snapshot = collect(service, args).await?;
            print_json(&snapshot)
        }
        Commands::Localize => {
            service.start_localization().await?;
            let status = tokio::select! {
                status = service.wait_for_localization() => status,
                signal = tokio::signal::ctrl_c() => {
                    signal?;
                    warn!("Interrupted, stopping poster localization");
                    service.stop_localization().await?;
                    service.wait_for_localization().await
                }
            };
            print_json(&status)
        }
        Commands::Verify => print_json(&service.verify_localization().await?),
        Commands::Probe { url, format } => print_json(&service.probe_source(&url, format).await?),
        Commands::Categories { source_id } => print_json(&service.list_categories(source_id).await?),
        Commands::Search {
            source_id,
            keyword,
            page,
            category,
        } => print_json(&service.search_source(source_id, &keyword, page, category).await?),
        Commands::PurgeLogs { days } => {
            let removed = service.purge_events_older_than(days).await?;
            println!("Removed {removed} event(s) older than {days} day(s)");
            Ok(())
        }
    }
}

async fn sources(service: &CollectorService, action: SourceCommand) -> Result<()> {
    match action {
        SourceCommand::List => print_json(&service.sources().await?),
        SourceCommand::Add { name, url, format } => {
            let id = service.add_source(&NewSource::new(name, url, format)).await?;
            println!("Registered source {id}");
            Ok(())
        }
        SourceCommand::Bind {
            source_id,
            remote_type_id,
            local_type_id,
        } => {
            service.bind_category(source_id, remote_type_id, local_type_id).await?;
            println!("Bound category {remote_type_id} -> {local_type_id} for source {source_id}");
            Ok(())
        }
        SourceCommand::Activate { source_id, disable } => {
            if !service.set_source_active(source_id, !disable).await? {
                anyhow::bail!("source {source_id} does not exist");
            }
            Ok(())
        }
    }
}

/// Starts the job and polls until it is terminal. Ctrl-C requests a stop.
async fn collect(service: &CollectorService, args: CollectArgs) -> Result<JobSnapshot> {
    let defaults = service.default_params();
    let params = vod_collector::domain::CollectionParams {
        action: args.action,
        format: args.format,
        category_id: args.category,
        start_page: args.start_page,
        end_page: args.end_page,
        ids: args.ids,
        keyword: args.keyword,
        recent_hours: args.hours,
        update_existing: args.update_existing,
        workers: args.workers.unwrap_or(defaults.workers),
        timeout_secs: args.timeout.unwrap_or(defaults.timeout_secs),
        max_retries: args.retries.unwrap_or(defaults.max_retries),
    };

    let job_id = service.start_job(args.source_id, params).await?;
    info!(job_id, "Collection job started");

    let mut ticker = tokio::time::interval(POLL_INTERVAL);
    let mut interrupted = false;
    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c(), if !interrupted => {
                signal?;
                interrupted = true;
                warn!(job_id, "Interrupted, stopping collection job");
                service.stop_job(job_id).await;
            }
            _ = ticker.tick() => {
                let snapshot = service
                    .job_status(job_id)
                    .await
                    .context("job disappeared from the registry")?;
                if snapshot.status.is_terminal() {
                    return Ok(snapshot);
                }
                info!(
                    job_id,
                    page = snapshot.current_page,
                    total_pages = snapshot.total_pages,
                    success = snapshot.success,
                    skip = snapshot.skip,
                    failed = snapshot.failed,
                    "Collecting"
                );
            }
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
