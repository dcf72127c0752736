use anyhow::{Context, Result};
use chrono::Utc;
use indicatif::{ProgressBar, ProgressStyle};
use scraper::Html;
use std::{fs, path::Path};
use tracing::{debug, info};

use crate::{
    config::ScraperConfig,
    fetch::HtmlFetcher,
    normalize::normalize,
    schedule::{extract_box_score_links, GameLink},
    table::{locate_in, LocateOutcome, TableLocator},
    teams::TeamNames,
    types::RecordSet,
};

pub const GAME_STATS_DIR: &str = "Game Stats";
/// Written into a game directory once every table of the game is saved.
pub const COMPLETE_MARKER: &str = ".complete";

pub const BOX_SCORE_TABLES: [&str; 14] = [
    "scoring",
    "game_info",
    "expected_points",
    "team_stats",
    "player_offense",
    "player_defense",
    "returns",
    "kicking",
    "passing_advanced",
    "rushing_advanced",
    "receiving_advanced",
    "defense_advanced",
    "home_drives",
    "away_drives",
];

// Scoring is served uncommented, so its presence means the page has loaded
const READY_SELECTOR: &str = "div#all_scoring";

#[derive(Debug, Clone, Copy, Default)]
pub struct BoxScoreOptions {
    /// Rescrape games that already have a completion marker.
    pub force: bool,
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BoxScoreSummary {
    pub games_scraped: usize,
    pub games_skipped: usize,
    pub tables_saved: usize,
    pub tables_missing: usize,
}

/// Every box score table present on the page. Missing ones are logged and
/// left out.
pub fn extract_game_tables(html: &str, teams: &TeamNames) -> Vec<(&'static str, RecordSet)> {
    let document = Html::parse_document(html);
    BOX_SCORE_TABLES
        .iter()
        .filter_map(|&name| match locate_in(&document, &TableLocator::wrapped(name)) {
            LocateOutcome::Found(raw) => {
                debug!("Located table {}", name);
                Some((name, normalize(&raw, teams)))
            }
            outcome => {
                info!("Skipping table {}: {}", name, outcome);
                None
            }
        })
        .collect()
}

pub fn is_complete(game_dir: &Path) -> bool {
    game_dir.join(COMPLETE_MARKER).is_file()
}

/// Scrapes one game into `game_dir` and marks it complete. Returns the
/// number of tables saved.
pub async fn scrape_game<F: HtmlFetcher>(
    fetcher: &F,
    game: &GameLink,
    game_dir: &Path,
    teams: &TeamNames,
) -> Result<usize> {
    info!(
        "Scraping week {} {} vs {} from {}",
        game.week, game.winner, game.loser, game.url
    );
    let html = fetcher.fetch_rendered(&game.url, READY_SELECTOR).await?;

    fs::create_dir_all(game_dir)
        .with_context(|| format!("Failed to create {}", game_dir.display()))?;

    let tables = extract_game_tables(&html, teams);
    for (name, table) in &tables {
        let path = game_dir.join(format!("{}.csv", name));
        table.write_csv(&path)?;
        debug!("Saved {} ({} rows) to {}", name, table.len(), path.display());
    }

    fs::write(game_dir.join(COMPLETE_MARKER), Utc::now().to_rfc3339())
        .with_context(|| format!("Failed to mark {} complete", game_dir.display()))?;
    Ok(tables.len())
}

/// Scrapes every played game of the season. Games already marked complete
/// are skipped unless `force` is set.
pub async fn run<F: HtmlFetcher>(
    fetcher: &F,
    config: &ScraperConfig,
    teams: &TeamNames,
    options: BoxScoreOptions,
) -> Result<BoxScoreSummary> {
    let html = fetcher.fetch_html(&config.sources.schedule_url()).await?;
    let mut games = extract_box_score_links(&html, teams, &config.sources);
    if let Some(limit) = options.limit {
        games.truncate(limit);
    }

    let base_dir = config.output.dir.join(GAME_STATS_DIR);
    let progress = ProgressBar::new(games.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")?,
    );

    let mut summary = BoxScoreSummary::default();
    for game in &games {
        let game_dir = base_dir.join(game.relative_dir());
        progress.set_message(format!("Week {} {} vs {}", game.week, game.winner, game.loser));

        if !options.force && is_complete(&game_dir) {
            debug!("Already scraped {}", game_dir.display());
            summary.games_skipped += 1;
            progress.inc(1);
            continue;
        }

        let saved = scrape_game(fetcher, game, &game_dir, teams).await?;
        summary.games_scraped += 1;
        summary.tables_saved += saved;
        summary.tables_missing += BOX_SCORE_TABLES.len() - saved;
        progress.inc(1);
    }
    progress.finish_with_message("done");

    info!(
        "Box scores: {} games scraped, {} already complete, {} tables saved, {} missing",
        summary.games_scraped, summary.games_skipped, summary.tables_saved, summary.tables_missing
    );
    Ok(summary)
}
