use anyhow::Result;
use scraper::{ElementRef, Html, Selector};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::{
    config::ScraperConfig,
    fetch::HtmlFetcher,
    teams::TeamNames,
    types::{RecordSet, TableError, Value},
    utils::{round2, split_attempts_made},
};

pub const TOP_PLAYERS_DIR: &str = "Top 25 Players";
pub const OFFENSIVE_DIR: &str = "Offensive Team Stats";
pub const DEFENSIVE_DIR: &str = "Defensive Team Stats";
pub const SPECIAL_DIR: &str = "Special Team Stats";

pub const SPECIAL_FIELD_GOALS: &str = "Special_Field_Goals";

/// Field goal range columns as served ("A_M" cells) and their output prefix.
pub const FIELD_GOAL_RANGES: [(&str, &str); 6] = [
    ("1-19 > A-M", "FG_1_19"),
    ("20-29 > A-M", "FG_20_29"),
    ("30-39 > A-M", "FG_30_39"),
    ("40-49 > A-M", "FG_40_49"),
    ("50-59 > A-M", "FG_50_59"),
    ("60+ > A-M", "FG_60"),
];

/// Columns where a zero is suspicious enough to report.
const ZERO_CHECK_COLUMNS: [&str; 3] = ["FG_Attempted", "XP_Made", "Punts"];
const SENTINEL: f64 = -1.0;

/// One nfl.com stat listing and where its CSV goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatPage {
    pub folder: &'static str,
    pub name: &'static str,
    /// Path below the nfl.com base URL; `{season}` is substituted.
    pub path: &'static str,
}

impl StatPage {
    const fn new(folder: &'static str, name: &'static str, path: &'static str) -> Self {
        Self { folder, name, path }
    }

    pub fn csv_path(&self, output_dir: &Path) -> PathBuf {
        stat_csv_path(output_dir, self.folder, self.name)
    }
}

pub fn stat_csv_path(output_dir: &Path, folder: &str, name: &str) -> PathBuf {
    output_dir.join(folder).join(format!("{}.csv", name))
}

pub const STAT_CATALOG: [StatPage; 26] = [
    StatPage::new(TOP_PLAYERS_DIR, "Passing_Yards", "/stats/player-stats/category/passing/{season}/reg/all/passingyards/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Rushing_Yards", "/stats/player-stats/category/rushing/{season}/reg/all/rushingyards/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Reciving_Receptions", "/stats/player-stats/category/receiving/{season}/reg/all/receivingreceptions/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Defensive_Forced_Fumbles", "/stats/player-stats/category/fumbles/{season}/reg/all/defensiveforcedfumble/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Defensive_Combine_Tackles", "/stats/player-stats/category/tackles/{season}/reg/all/defensivecombinetackles/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Defensive_Interceptions", "/stats/player-stats/category/interceptions/{season}/reg/all/defensiveinterceptions/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Kicking_Field_Goals_Made", "/stats/player-stats/category/field-goals/{season}/reg/all/kickingfgmade/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Punting_Average_Yards", "/stats/player-stats/category/punts/{season}/reg/all/puntingaverageyards/desc"),
    StatPage::new(TOP_PLAYERS_DIR, "Punt_Returns_Average_Yards", "/stats/player-stats/category/punt-returns/{season}/reg/all/puntreturnsaverageyards/desc"),
    StatPage::new(OFFENSIVE_DIR, "Offensive_Passing", "/stats/team-stats/offense/passing/{season}/reg/all"),
    StatPage::new(OFFENSIVE_DIR, "Offensive_Rushing", "/stats/team-stats/offense/rushing/{season}/reg/all"),
    StatPage::new(OFFENSIVE_DIR, "Offensive_Receiving", "/stats/team-stats/offense/receiving/{season}/reg/all"),
    StatPage::new(OFFENSIVE_DIR, "Offensive_Scoring", "/stats/team-stats/offense/scoring/{season}/reg/all"),
    StatPage::new(OFFENSIVE_DIR, "Offensive_Downs", "/stats/team-stats/offense/downs/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Passing", "/stats/team-stats/defense/passing/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Rushing", "/stats/team-stats/defense/rushing/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Receiving", "/stats/team-stats/defense/receiving/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Scoring", "/stats/team-stats/defense/scoring/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Tackles", "/stats/team-stats/defense/tackles/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Downs", "/stats/team-stats/defense/downs/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Fumbles", "/stats/team-stats/defense/fumbles/{season}/reg/all"),
    StatPage::new(DEFENSIVE_DIR, "Defensive_Interceptions", "/stats/team-stats/defense/interceptions/{season}/reg/all"),
    StatPage::new(SPECIAL_DIR, SPECIAL_FIELD_GOALS, "/stats/team-stats/special-teams/field-goals/{season}/reg/all"),
    StatPage::new(SPECIAL_DIR, "Special_Scoring", "/stats/team-stats/special-teams/scoring/{season}/reg/all"),
    StatPage::new(SPECIAL_DIR, "Special_Punts", "/stats/team-stats/special-teams/punts/{season}/reg/all"),
    StatPage::new(SPECIAL_DIR, "Special_Punt_Returns", "/stats/team-stats/special-teams/punt-returns/{season}/reg/all"),
];

/// Reads the first table of an nfl.com stat page. Team cells resolve to
/// canonical names. `None` when the page has no table, no headers or no rows.
pub fn parse_stat_table(html: &str, teams: &TeamNames) -> Option<RecordSet> {
    let document = Html::parse_document(html);
    let table = document
        .select(&Selector::parse("table").unwrap())
        .next()?;

    let headers: Vec<String> = table
        .select(&Selector::parse("th").unwrap())
        .map(joined_text)
        .collect();

    let td = Selector::parse("td").unwrap();
    let club = Selector::parse("div.d3-o-club-fullname").unwrap();
    let rows: Vec<Vec<Value>> = table
        .select(&Selector::parse("tr").unwrap())
        .skip(1)
        .map(|row| {
            row.select(&td)
                .map(|cell| match cell.select(&club).next() {
                    Some(name) => Value::Text(teams.canonical(&joined_text(name)).to_string()),
                    None => Value::parse(&joined_text(cell)),
                })
                .collect()
        })
        .collect();

    if headers.is_empty() || rows.is_empty() {
        return None;
    }
    Some(RecordSet::with_rows(headers, rows))
}

/// Text nodes trimmed and joined with single spaces.
fn joined_text(element: ElementRef<'_>) -> String {
    element
        .text()
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Splits each "A_M" field goal range column into `_Attempts`, `_Made` and
/// `_Percentage` columns and drops the combined originals.
pub fn process_special_field_goals(goals: &mut RecordSet) -> Result<(), TableError> {
    for (column, prefix) in FIELD_GOAL_RANGES {
        let split: Vec<_> = goals
            .column(column)?
            .into_iter()
            .map(|value| split_attempts_made(&value.to_string()))
            .collect();

        goals.put_column(
            &format!("{}_Attempts", prefix),
            split.iter().map(|s| Value::Int(s.attempts.into())).collect(),
        );
        goals.put_column(
            &format!("{}_Made", prefix),
            split.iter().map(|s| Value::Int(s.made.into())).collect(),
        );
    }

    let originals: Vec<&str> = FIELD_GOAL_RANGES.iter().map(|(column, _)| *column).collect();
    goals.drop_columns(&originals);

    for (_, prefix) in FIELD_GOAL_RANGES {
        let attempts = format!("{}_Attempts", prefix);
        let made = format!("{}_Made", prefix);
        goals.derive_column(&format!("{}_Percentage", prefix), |row| {
            match (row.f64(&attempts), row.f64(&made)) {
                (Some(a), Some(m)) if a > 0.0 => Value::Float(round2(m / a * 100.0)),
                _ => Value::Float(0.0),
            }
        });
    }
    Ok(())
}

/// Findings of a post-save sanity check.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Missing cells per column
    pub missing: Vec<(String, usize)>,
    /// `-1` sentinel values per column
    pub sentinels: Vec<(String, usize)>,
    /// Zeros in columns where they are unexpected
    pub zeros: Vec<(String, usize)>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.missing.is_empty() && self.sentinels.is_empty() && self.zeros.is_empty()
    }
}

/// Reports missing cells, `-1` sentinels and unexpected zeros.
pub fn validate_stat_table(table: &RecordSet, name: &str) -> ValidationReport {
    let mut report = ValidationReport::default();

    for column in table.columns() {
        let values: Vec<&Value> = table.iter().map(|row| row.get(column)).collect();
        let missing = values.iter().filter(|v| v.is_missing()).count();
        if missing > 0 {
            report.missing.push((column.clone(), missing));
        }
        let sentinels = values.iter().filter(|v| v.as_f64() == Some(SENTINEL)).count();
        if sentinels > 0 {
            warn!(
                "{}: invalid value -1 in column {} for {:?}",
                name,
                column,
                teams_where(table, column, SENTINEL)
            );
            report.sentinels.push((column.clone(), sentinels));
        }
    }
    if !report.missing.is_empty() {
        warn!("{}: missing data found {:?}", name, report.missing);
    }

    for column in ZERO_CHECK_COLUMNS {
        if !table.has_column(column) {
            continue;
        }
        let zeros = teams_where(table, column, 0.0);
        if !zeros.is_empty() {
            warn!("{}: zero values in column {} for {:?}, which may be unexpected", name, column, zeros);
            report.zeros.push((column.to_string(), zeros.len()));
        }
    }

    report
}

fn teams_where(table: &RecordSet, column: &str, target: f64) -> Vec<String> {
    table
        .iter()
        .filter(|row| row.f64(column) == Some(target))
        .map(|row| row.get("Team").to_string())
        .collect()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StatsSummary {
    pub saved: usize,
    pub skipped: usize,
    pub flagged: usize,
}

/// Scrapes every catalog page, saves it under its folder, then reloads the
/// CSV and validates it.
pub async fn run<F: HtmlFetcher>(
    fetcher: &F,
    config: &ScraperConfig,
    teams: &TeamNames,
) -> Result<StatsSummary> {
    let mut summary = StatsSummary::default();

    for page in &STAT_CATALOG {
        let url = config.sources.nfl_url(page.path);
        info!("Scraping {} from {}", page.name, url);
        let html = fetcher.fetch_html(&url).await?;

        let Some(mut table) = parse_stat_table(&html, teams) else {
            warn!("No stat table found for {} at {}", page.name, url);
            summary.skipped += 1;
            continue;
        };
        if page.name == SPECIAL_FIELD_GOALS {
            process_special_field_goals(&mut table)?;
        }

        let path = page.csv_path(&config.output.dir);
        table.write_csv(&path)?;
        info!("Saved {} rows to {}", table.len(), path.display());
        summary.saved += 1;

        let reloaded = RecordSet::read_csv(&path)?;
        if !validate_stat_table(&reloaded, page.name).is_clean() {
            summary.flagged += 1;
        }
    }

    info!(
        "Stats: {} tables saved, {} skipped, {} with validation warnings",
        summary.saved, summary.skipped, summary.flagged
    );
    Ok(summary)
}
