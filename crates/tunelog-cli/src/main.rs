// SPDX-License-Identifier: GPL-3.0-or-later

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;
use tunelog_application::{
    PlayHistorySource, ReconcileOutcome, ReconcileOverride, ReconciliationService, SyncCriteria,
};
use tunelog_config::AppConfig;
use tunelog_domain::{ReconciliationKey, SongId};
use tunelog_infrastructure::repositories::{CatalogRepository, CompactionOutcome};
use tunelog_infrastructure::sqlite_adapters::SqliteCatalogRepository;
use tunelog_scrobble::ScrobbleClient;
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "tunelog", about = "Chronological listening-log reconciliation")]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute reconciliation decisions without touching the catalog
    Preview {
        #[arg(long)]
        user: Option<String>,
        /// Window start, YYYY-MM-DD
        #[arg(long)]
        from: Option<String>,
        /// Window end, YYYY-MM-DD
        #[arg(long)]
        to: Option<String>,
        /// Accept a suggestion: "title|artist=<song-uuid>", repeatable
        #[arg(long = "link")]
        links: Vec<String>,
        /// Print decisions as JSON instead of the plain report
        #[arg(long)]
        json: bool,
    },
    /// Reconcile and persist catalog mutations
    Commit {
        #[arg(long)]
        user: Option<String>,
        #[arg(long)]
        from: Option<String>,
        #[arg(long)]
        to: Option<String>,
        #[arg(long = "link")]
        links: Vec<String>,
        #[arg(long)]
        json: bool,
    },
    /// Renumber the catalog sequence to a dense 1..N
    Compact,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = tunelog_config::load(cli.config.as_deref())?;
    init_tracing(&config);

    let pool = tunelog_infrastructure::connect_database(&config).await?;
    let catalog: Arc<dyn CatalogRepository> = Arc::new(SqliteCatalogRepository::new(pool));
    let service = ReconciliationService::new(catalog.clone());

    match cli.command {
        Command::Preview {
            user,
            from,
            to,
            links,
            json,
        } => {
            let outcome = reconcile(&config, &service, user, from, to, links, false).await?;
            print_report(&outcome, false, json)?;
        }
        Command::Commit {
            user,
            from,
            to,
            links,
            json,
        } => {
            let outcome = reconcile(&config, &service, user, from, to, links, true).await?;
            print_report(&outcome, true, json)?;
        }
        Command::Compact => match catalog.compact_sequences().await? {
            CompactionOutcome::Compacted { rows } => {
                println!("compacted: {} rows renumbered", rows)
            }
            CompactionOutcome::Skipped(reason) => println!("skipped: {}", reason),
        },
    }

    Ok(())
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.telemetry.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[allow(clippy::too_many_arguments)]
async fn reconcile(
    config: &AppConfig,
    service: &ReconciliationService,
    user: Option<String>,
    from: Option<String>,
    to: Option<String>,
    links: Vec<String>,
    commit: bool,
) -> Result<ReconcileOutcome> {
    let user = user
        .or_else(|| config.scrobble.user.clone())
        .ok_or_else(|| anyhow!("no user given; pass --user or set scrobble.user"))?;

    let criteria = SyncCriteria {
        user,
        from: from.as_deref().map(parse_day_start).transpose()?,
        to: to.as_deref().map(parse_day_end).transpose()?,
    };

    let source = PlayHistorySource::new(build_client(config)?);
    let plays = source.fetch(&criteria).await?;
    info!(target: "cli", plays = plays.len(), commit, "fetched play history, reconciling");

    let overrides = parse_overrides(&links)?;
    let outcome = if commit {
        service.commit(plays, &overrides).await?
    } else {
        service.preview(plays, &overrides).await?
    };
    Ok(outcome)
}

fn build_client(config: &AppConfig) -> Result<ScrobbleClient> {
    let api_key = config
        .scrobble
        .api_key
        .clone()
        .context("scrobble.api_key is not configured")?;

    let mut builder = ScrobbleClient::builder(api_key)
        .page_size(config.scrobble.page_size)
        .max_pages(config.scrobble.max_pages)
        .rate_limit_interval(Duration::from_millis(config.scrobble.request_interval_ms));
    if let Some(base_url) = &config.scrobble.base_url {
        builder = builder.base_url(base_url.clone());
    }
    Ok(builder.build()?)
}

fn parse_day_start(s: &str) -> Result<DateTime<Utc>> {
    let date = parse_day(s)?;
    Ok(date.and_hms_opt(0, 0, 0).expect("midnight is valid").and_utc())
}

fn parse_day_end(s: &str) -> Result<DateTime<Utc>> {
    let date = parse_day(s)?;
    Ok(date
        .and_hms_opt(23, 59, 59)
        .expect("end of day is valid")
        .and_utc())
}

fn parse_day(s: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").with_context(|| format!("invalid date: {}", s))
}

/// Each link takes the form "title|artist=<song-uuid>".
fn parse_overrides(links: &[String]) -> Result<HashMap<ReconciliationKey, ReconcileOverride>> {
    let mut overrides = HashMap::new();
    for link in links {
        let (key_part, id_part) = link
            .rsplit_once('=')
            .ok_or_else(|| anyhow!("invalid --link {:?}, expected title|artist=uuid", link))?;
        let (title, artist) = key_part
            .split_once('|')
            .ok_or_else(|| anyhow!("invalid --link {:?}, expected title|artist=uuid", link))?;
        let song_id = SongId::from_uuid(
            Uuid::parse_str(id_part.trim())
                .with_context(|| format!("invalid song id in --link {:?}", link))?,
        );
        overrides.insert(
            ReconciliationKey::new(title, artist),
            ReconcileOverride::LinkTo(song_id),
        );
    }
    Ok(overrides)
}

fn print_report(outcome: &ReconcileOutcome, committed: bool, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.decisions)?);
    } else {
        for decision in &outcome.decisions {
            let mut line = format!(
                "{:<7} {} — {}",
                decision.action.to_string(),
                decision.title,
                decision.artist
            );
            if let Some(date) = decision.new_date.or(decision.date) {
                line.push_str(&format!(" ({})", date));
            }
            if let Some(position) = decision.insertion_position {
                line.push_str(&format!(" [pos {}]", position));
            }
            if let Some(suggestion) = &decision.suggestion {
                line.push_str(&format!(
                    " ~ did you mean {} — {}? ({:.3})",
                    suggestion.title, suggestion.artist, suggestion.score
                ));
            }
            println!("{}", line);
        }
    }

    let s = &outcome.summary;
    if committed {
        println!(
            "created: {}  updated: {}  linked: {}  skipped: {}",
            s.created, s.updated, s.linked, s.skipped
        );
        if let Some(CompactionOutcome::Skipped(reason)) = &outcome.compaction {
            println!("compaction skipped: {}", reason);
        }
    } else {
        println!(
            "would create: {}  would update: {}  would link: {}  skipped: {}",
            s.created, s.updated, s.linked, s.skipped
        );
    }
    Ok(())
}
