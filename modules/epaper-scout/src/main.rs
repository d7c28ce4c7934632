use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use epaper_archive::ArchiveLayout;
use epaper_common::{Config, EditionDate};
use epaper_scout::notify::{DiscordWebhook, NoopBackend, NotifyBackend};
use epaper_scout::{HttpTransport, Pipeline};

#[derive(Parser)]
#[command(name = "epaper", about = "Download today's e-paper editions into the archive")]
struct Cli {
    /// Edition date to fetch (YYYY-MM-DD). Defaults to today.
    #[arg(long)]
    date: Option<EditionDate>,

    /// Only process the named publication (repeatable)
    #[arg(long = "only", value_name = "NAME")]
    only: Vec<String>,

    /// Do not send notifications
    #[arg(long)]
    no_notify: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("epaper=info".parse()?))
        .init();

    let cli = Cli::parse();

    let mut config = Config::from_env()?;
    if !cli.only.is_empty() {
        config
            .publications
            .retain(|p| cli.only.iter().any(|name| name.eq_ignore_ascii_case(&p.name)));
        if config.publications.is_empty() {
            anyhow::bail!("--only matched none of the configured publications");
        }
    }
    config.log_redacted();

    ArchiveLayout::new(&config.archive_dir)
        .ensure_writable()
        .context("archive root check failed")?;

    let date = cli
        .date
        .unwrap_or_else(|| EditionDate::new(chrono::Local::now().date_naive()));

    let transport = Arc::new(HttpTransport::new(&config.user_agent)?);

    let notifier: Box<dyn NotifyBackend> = match (&config.webhook_url, cli.no_notify) {
        (Some(url), false) => {
            info!("Discord notifications enabled");
            Box::new(DiscordWebhook::new(url.clone()))
        }
        (Some(_), true) => {
            info!("Notifications disabled by --no-notify");
            Box::new(NoopBackend)
        }
        (None, _) => {
            info!("No DISCORD_WEBHOOK_URL set, notifications disabled");
            Box::new(NoopBackend)
        }
    };

    println!("E-paper run for {} ({})", date, date.date().format("%A, %B %d, %Y"));
    println!("Publications: {}", config.publications.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(", "));

    let mut pipeline = Pipeline::from_config(&config, transport, notifier);
    let summary = pipeline.run(date).await;

    println!("{}", summary.render());

    Ok(if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}
