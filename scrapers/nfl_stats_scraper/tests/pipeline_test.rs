use anyhow::{anyhow, Result};
use chrono::NaiveDate;
use pretty_assertions::assert_eq;
use test_log::test;
use std::{
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use nfl_stats_scraper::{
    boxscore::{self, BoxScoreOptions, BoxScoreSummary, COMPLETE_MARKER, GAME_STATS_DIR},
    config::ScraperConfig,
    drives::{self, DRIVE_AVERAGES_CSV, DRIVE_COLUMNS},
    fetch::HtmlFetcher,
    schedule::{self, FINISHED_GAMES_CSV, UPCOMING_GAMES_CSV},
    stats::{self, stat_csv_path, StatsSummary, OFFENSIVE_DIR, SPECIAL_DIR, SPECIAL_FIELD_GOALS},
    teams::TeamNames,
    types::{RecordSet, Value},
};

struct TestHtmlFetcher {
    fixtures_dir: PathBuf,
    requests: Mutex<Vec<String>>,
}

impl TestHtmlFetcher {
    fn new() -> Self {
        let mut fixtures_dir = PathBuf::from(env!("CARGO_MANIFEST_DIR"));
        fixtures_dir.push("tests/fixtures");
        Self {
            fixtures_dir,
            requests: Mutex::new(Vec::new()),
        }
    }

    fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

impl HtmlFetcher for TestHtmlFetcher {
    async fn fetch_html(&self, url: &str) -> Result<String> {
        self.requests.lock().unwrap().push(url.to_string());

        let filename = if url.ends_with("/years/2024/games.htm") {
            "pfr/schedule.html"
        } else if url.contains("/boxscores/") {
            "pfr/boxscore.html"
        } else if url.ends_with("/years/2024/") {
            "pfr/season.html"
        } else if url.contains("/stats/player-stats/") {
            "nfl/player_stats.html"
        } else if url.contains("/special-teams/field-goals/") {
            "nfl/field_goals.html"
        } else if url.contains("/stats/team-stats/") {
            "nfl/team_stats.html"
        } else {
            return Err(anyhow!("Unexpected URL in test: {}", url));
        };

        let path = self.fixtures_dir.join(filename);
        Ok(fs::read_to_string(path)?)
    }
}

fn config_for(dir: &Path) -> ScraperConfig {
    let mut config = ScraperConfig::default();
    config.output.dir = dir.to_path_buf();
    config
}

fn reference_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 10, 1).unwrap()
}

#[test(tokio::test)]
async fn test_schedule_split() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let fetcher = TestHtmlFetcher::new();

    let split = schedule::run(&fetcher, &config, &TeamNames::nfl(), reference_date())
        .await
        .unwrap();

    assert_eq!(
        split.finished.columns(),
        ["Week", "Day", "Date", "Time", "Winner", "Loser", "Winner_Points", "Loser_Points"]
    );
    assert_eq!(split.finished.len(), 2, "repeated header row must not become a game");
    assert_eq!(split.finished.value(0, "Winner"), Some(&Value::from("Kansas City Chiefs")));
    assert_eq!(split.finished.value(0, "Time"), Some(&Value::from("20:20:00")));
    assert_eq!(split.finished.value(1, "Winner_Points"), Some(&Value::Int(34)));

    assert_eq!(split.upcoming.len(), 1);
    assert_eq!(split.upcoming.value(0, "Week"), Some(&Value::Int(18)));
    assert_eq!(split.upcoming.value(0, "Visitor"), Some(&Value::from("Minnesota Vikings")));
    assert_eq!(split.upcoming.value(0, "Home"), Some(&Value::from("Detroit Lions")));
    assert_eq!(split.upcoming.value(0, "Winner_Points"), Some(&Value::from("N/A")));

    let finished = RecordSet::read_csv(&dir.path().join(FINISHED_GAMES_CSV)).unwrap();
    assert_eq!(finished.len(), 2);
    let upcoming = RecordSet::read_csv(&dir.path().join(UPCOMING_GAMES_CSV)).unwrap();
    assert_eq!(upcoming.value(0, "Date"), Some(&Value::from("2025-01-05")));
}

#[test(tokio::test)]
async fn test_box_scores_resume() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let teams = TeamNames::nfl();

    let fetcher = TestHtmlFetcher::new();
    let summary = boxscore::run(&fetcher, &config, &teams, BoxScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(
        summary,
        BoxScoreSummary {
            games_scraped: 2,
            games_skipped: 0,
            tables_saved: 4,
            tables_missing: 24,
        }
    );

    let game_dir = dir
        .path()
        .join(GAME_STATS_DIR)
        .join("Week 1")
        .join("Kansas City Chiefs vs Baltimore Ravens");
    assert!(game_dir.join(COMPLETE_MARKER).is_file());
    assert!(game_dir.join("scoring.csv").is_file());
    assert!(!game_dir.join("game_info.csv").exists());

    let team_stats = RecordSet::read_csv(&game_dir.join("team_stats.csv")).unwrap();
    assert_eq!(team_stats.len(), 3);
    assert_eq!(team_stats.value(1, "BAL"), Some(&Value::Int(452)));

    // Completed games are not fetched again
    let fetcher = TestHtmlFetcher::new();
    let summary = boxscore::run(&fetcher, &config, &teams, BoxScoreOptions::default())
        .await
        .unwrap();
    assert_eq!(summary.games_skipped, 2);
    assert_eq!(summary.games_scraped, 0);
    assert_eq!(fetcher.requests().len(), 1);

    let fetcher = TestHtmlFetcher::new();
    let options = BoxScoreOptions {
        force: true,
        limit: Some(1),
    };
    let summary = boxscore::run(&fetcher, &config, &teams, options).await.unwrap();
    assert_eq!(summary.games_scraped, 1);
    assert_eq!(
        fetcher.requests(),
        [
            "https://www.pro-football-reference.com/years/2024/games.htm",
            "https://www.pro-football-reference.com/boxscores/202409050kan.htm",
        ]
    );
}

#[test(tokio::test)]
async fn test_drive_averages_from_commented_table() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let fetcher = TestHtmlFetcher::new();

    let table = drives::run(&fetcher, &config, &TeamNames::nfl()).await.unwrap();
    assert_eq!(table.columns(), DRIVE_COLUMNS);
    assert_eq!(table.len(), 2, "league average row must be dropped");
    assert_eq!(table.value(1, "Team"), Some(&Value::from("Buffalo Bills")));
    assert_eq!(table.value(1, "Avg_Drive_Time"), Some(&Value::Int(167)));
    assert_eq!(table.value(1, "Avg_Drive_Start"), Some(&Value::Float(68.4)));

    assert!(dir.path().join(DRIVE_AVERAGES_CSV).is_file());
}

#[test(tokio::test)]
async fn test_team_stats() {
    let dir = tempfile::tempdir().unwrap();
    let config = config_for(dir.path());
    let fetcher = TestHtmlFetcher::new();

    let summary = stats::run(&fetcher, &config, &TeamNames::nfl()).await.unwrap();
    assert_eq!(
        summary,
        StatsSummary {
            saved: 17,
            skipped: 9,
            // Every team page but field goals carries a -1 sentinel
            flagged: 16,
        }
    );

    let rushing = RecordSet::read_csv(&stat_csv_path(dir.path(), OFFENSIVE_DIR, "Offensive_Rushing")).unwrap();
    assert_eq!(rushing.value(0, "Team"), Some(&Value::from("Philadelphia Eagles")));
    assert_eq!(rushing.value(1, "Rush Yds"), Some(&Value::Int(3189)));

    let goals = RecordSet::read_csv(&stat_csv_path(dir.path(), SPECIAL_DIR, SPECIAL_FIELD_GOALS)).unwrap();
    assert!(!goals.has_column("30-39 > A-M"));
    assert_eq!(goals.value(0, "Team"), Some(&Value::from("Baltimore Ravens")));
    assert_eq!(goals.value(0, "FG_30_39_Attempts"), Some(&Value::Int(10)));
    assert_eq!(goals.value(0, "FG_30_39_Made"), Some(&Value::Int(9)));
    assert_eq!(goals.value(0, "FG_30_39_Percentage").and_then(Value::as_f64), Some(90.0));
    assert_eq!(goals.value(1, "FG_60_Percentage").and_then(Value::as_f64), Some(0.0));
}
