use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use nfl_stats_scraper::{
    boxscore::{self, BoxScoreOptions},
    config::ScraperConfig,
    drives,
    fetch::{BrowserFetcher, HttpFetcher, PageFetcher, RequestPacer},
    integration,
    metrics::MetricsCollector,
    schedule, stats, strength,
    teams::TeamNames,
};

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// How pages behind client-side rendering are fetched
    #[arg(long, value_enum, global = true, default_value_t = FetchMode::Browser)]
    fetch_mode: FetchMode,

    /// Season to scrape, overrides NFL_SEASON
    #[arg(long, global = true)]
    season: Option<u16>,

    /// Directory CSV files are written to, overrides OUTPUT_DIR
    #[arg(long, global = true)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum FetchMode {
    /// Plain HTTP only
    Http,
    /// Headless Chrome for rendered pages
    Browser,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Scrape the season schedule into finished and upcoming games
    Schedule,
    /// Scrape team statistics from nfl.com
    Stats,
    /// Scrape season drive averages
    Drives,
    /// Scrape box score tables for every played game
    BoxScores {
        /// Re-scrape games already marked complete
        #[arg(short, long)]
        force: bool,
        /// Optional limit on number of games to scrape
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Build the team strength table from saved stats
    TeamStrength,
    /// Merge the schedule with team strength
    Integrate,
    /// Compute home-minus-away feature differences
    Diff,
    /// Run the whole pipeline
    All,
}

impl Commands {
    fn needs_rendering(&self) -> bool {
        matches!(self, Commands::Drives | Commands::BoxScores { .. } | Commands::All)
    }

    fn needs_network(&self) -> bool {
        !matches!(self, Commands::TeamStrength | Commands::Integrate | Commands::Diff)
    }
}

async fn run(command: Commands, pages: &PageFetcher, config: &ScraperConfig) -> Result<()> {
    let teams = TeamNames::nfl();
    let today = chrono::Local::now().date_naive();

    match command {
        Commands::Schedule => {
            schedule::run(pages, config, &teams, today).await?;
        }
        Commands::Stats => {
            stats::run(pages, config, &teams).await?;
        }
        Commands::Drives => {
            drives::run(pages, config, &teams).await?;
        }
        Commands::BoxScores { force, limit } => {
            boxscore::run(pages, config, &teams, BoxScoreOptions { force, limit }).await?;
        }
        Commands::TeamStrength => {
            strength::run(config)?;
        }
        Commands::Integrate => {
            integration::run_integrate(config)?;
        }
        Commands::Diff => {
            integration::run_diff(config)?;
        }
        Commands::All => {
            schedule::run(pages, config, &teams, today).await?;
            stats::run(pages, config, &teams).await?;
            drives::run(pages, config, &teams).await?;
            boxscore::run(pages, config, &teams, BoxScoreOptions::default()).await?;
            strength::run(config)?;
            integration::run_integrate(config)?;
            integration::run_diff(config)?;
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = ScraperConfig::from_env();
    if let Some(season) = cli.season {
        config.sources.season = season;
    }
    if let Some(dir) = cli.output_dir {
        config.output.dir = dir;
    }
    debug!("Using config: {:?}", config);

    let metrics = MetricsCollector::new();
    let pacer = RequestPacer::new(&config, metrics.clone())?;
    let http = HttpFetcher::new(&config, pacer.clone())?;
    let browser = if cli.fetch_mode == FetchMode::Browser && cli.command.needs_rendering() {
        Some(BrowserFetcher::launch(&config, pacer).await?)
    } else {
        None
    };
    let pages = PageFetcher::new(http, browser);
    let needs_network = cli.command.needs_network();

    let result = run(cli.command, &pages, &config).await;

    if let Err(e) = pages.shutdown().await {
        warn!("Browser did not shut down cleanly: {}", e);
    }
    if needs_network {
        metrics.log_summary();
        debug!("Fetch metrics: {}", serde_json::to_string(&metrics.get_metrics())?);
    }

    result?;
    info!("Finished");
    Ok(())
}
