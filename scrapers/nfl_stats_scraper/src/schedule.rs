use anyhow::{bail, Context, Result};
use chrono::{NaiveDate, NaiveTime};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, warn};

use crate::{
    config::{ScraperConfig, SourceConfig},
    fetch::HtmlFetcher,
    normalize::normalize,
    table::{cell_text, find_by_id, locate_table, TableLocator},
    teams::TeamNames,
    types::{RecordSet, Value},
};

pub const FINISHED_GAMES_CSV: &str = "Finished_Games.csv";
pub const UPCOMING_GAMES_CSV: &str = "Upcoming_Games.csv";
pub const SCHEDULE_TABLE: &str = "games";

const PLACEHOLDER: &str = "N/A";
const DATE_FORMAT: &str = "%Y-%m-%d";
const SOURCE_TIME_FORMAT: &str = "%I:%M%p";
const TIME_FORMAT: &str = "%H:%M:%S";

const SCHEDULE_COLUMNS: [(&str, &str); 8] = [
    ("Week", "Week"),
    ("Day", "Day"),
    ("Date", "Date"),
    ("Time", "Time"),
    ("Winner/tie", "Winner"),
    ("Loser/tie", "Loser"),
    ("PtsW", "Winner_Points"),
    ("PtsL", "Loser_Points"),
];

/// Games before the reference date and games on or after it.
#[derive(Debug, Clone, PartialEq)]
pub struct ScheduleSplit {
    pub finished: RecordSet,
    pub upcoming: RecordSet,
}

/// A played game with a box score page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GameLink {
    pub week: String,
    pub winner: String,
    pub loser: String,
    pub url: String,
}

impl GameLink {
    /// `Week {n}/{winner} vs {loser}`
    pub fn relative_dir(&self) -> std::path::PathBuf {
        std::path::Path::new(&format!("Week {}", self.week))
            .join(format!("{} vs {}", self.winner, self.loser))
    }
}

/// Reads the season schedule into `Week, Day, Date, Time, Winner, Loser,
/// Winner_Points, Loser_Points`.
pub fn parse_schedule(html: &str, teams: &TeamNames) -> Result<RecordSet> {
    let Some(raw) = locate_table(html, &TableLocator::by_id(SCHEDULE_TABLE)).found() else {
        bail!("Schedule table '{}' not found", SCHEDULE_TABLE);
    };
    let table = normalize(&raw, teams);

    let sources: Vec<&str> = SCHEDULE_COLUMNS.iter().map(|(from, _)| *from).collect();
    let mut schedule = table
        .select(&sources)
        .context("Schedule table has an unexpected layout")?;
    schedule.rename_columns(&SCHEDULE_COLUMNS);

    info!("Parsed {} scheduled games", schedule.len());
    Ok(schedule)
}

/// Coerces `Week` to integers and normalizes `Date` to `YYYY-MM-DD` and
/// `Time` to `HH:MM:SS`. Cells that do not parse become missing.
pub fn validate_and_format(schedule: &mut RecordSet) -> Result<()> {
    if schedule.has_column("Week") {
        let coerced = schedule.coerce_numeric("Week")?;
        if coerced > 0 {
            warn!("{} 'Week' values could not be converted to integers", coerced);
        } else {
            info!("All 'Week' values are valid integers");
        }
    }

    if schedule.has_column("Date") {
        let invalid = reformat_column(schedule, "Date", |text| {
            NaiveDate::parse_from_str(text, DATE_FORMAT)
                .ok()
                .map(|date| date.format(DATE_FORMAT).to_string())
        })?;
        if invalid > 0 {
            warn!("{} 'Date' values are not in YYYY-MM-DD format", invalid);
        } else {
            info!("All 'Date' values are valid");
        }
    }

    if schedule.has_column("Time") {
        let invalid = reformat_column(schedule, "Time", |text| {
            NaiveTime::parse_from_str(text, SOURCE_TIME_FORMAT)
                .ok()
                .map(|time| time.format(TIME_FORMAT).to_string())
        })?;
        if invalid > 0 {
            warn!("{} 'Time' values are not in H:MMAM/PM format", invalid);
        } else {
            info!("All 'Time' values are valid");
        }
    }

    Ok(())
}

fn reformat_column<F>(table: &mut RecordSet, column: &str, parse: F) -> Result<usize>
where
    F: Fn(&str) -> Option<String>,
{
    let mut invalid = 0;
    table.map_column(column, |value| {
        if value.is_missing() {
            invalid += 1;
            return Value::Missing;
        }
        match parse(&value.to_string()) {
            Some(formatted) => Value::Text(formatted),
            None => {
                invalid += 1;
                Value::Missing
            }
        }
    })?;
    Ok(invalid)
}

/// Splits games on `today`: earlier dates are finished, the rest upcoming.
/// Upcoming games name their teams `Visitor`/`Home` and carry placeholder
/// points. Rows without a date are dropped.
pub fn split_by_date(schedule: &RecordSet, today: NaiveDate) -> Result<ScheduleSplit> {
    let date_col = schedule
        .column_index("Date")
        .context("Schedule has no 'Date' column")?;

    let mut finished = RecordSet::new(schedule.columns().iter().cloned());
    let mut upcoming = RecordSet::new([
        "Week",
        "Day",
        "Date",
        "Time",
        "Visitor",
        "Home",
        "Winner_Points",
        "Loser_Points",
    ]);
    let mut undated = 0;

    for row in schedule.iter() {
        let date = row.values()[date_col]
            .as_str()
            .and_then(|text| NaiveDate::parse_from_str(text, DATE_FORMAT).ok());
        match date {
            None => undated += 1,
            Some(date) if date < today => finished.push_row(row.values().to_vec()),
            Some(_) => upcoming.push_row(vec![
                row.get("Week").clone(),
                row.get("Day").clone(),
                row.get("Date").clone(),
                row.get("Time").clone(),
                row.get("Winner").clone(),
                row.get("Loser").clone(),
                Value::from(PLACEHOLDER),
                Value::from(PLACEHOLDER),
            ]),
        }
    }

    if undated > 0 {
        warn!("Dropped {} games without a valid date", undated);
    }
    Ok(ScheduleSplit { finished, upcoming })
}

/// Played games (box score cell reading "boxscore") with canonical team
/// names and absolute box score URLs.
pub fn extract_box_score_links(
    html: &str,
    teams: &TeamNames,
    sources: &SourceConfig,
) -> Vec<GameLink> {
    let document = Html::parse_document(html);
    let Some(table) = find_by_id(document.root_element(), "table", SCHEDULE_TABLE) else {
        warn!("Schedule table '{}' not found, no box scores to scrape", SCHEDULE_TABLE);
        return Vec::new();
    };

    let row_selector = Selector::parse("tr").unwrap();
    let link_selector = Selector::parse("a[href]").unwrap();

    let mut links = Vec::new();
    for row in table.select(&row_selector) {
        let Some(boxscore) = stat_cell(row, "td", "boxscore_word") else {
            continue;
        };
        if cell_text(boxscore) != "boxscore" {
            continue;
        }
        let Some(href) = boxscore
            .select(&link_selector)
            .next()
            .and_then(|a| a.value().attr("href"))
        else {
            continue;
        };

        let text_or = |tag: &str, stat: &str, fallback: &str| {
            stat_cell(row, tag, stat)
                .map(cell_text)
                .filter(|text| !text.is_empty())
                .unwrap_or_else(|| fallback.to_string())
        };
        let winner = teams.canonical(&text_or("td", "winner", "Unknown_Winner")).to_string();
        let loser = teams.canonical(&text_or("td", "loser", "Unknown_Loser")).to_string();
        for name in [&winner, &loser] {
            if teams.abbreviation(name).is_none() {
                warn!("'{}' is not a known franchise, box score saved under that name", name);
            }
        }

        links.push(GameLink {
            week: text_or("th", "week_num", "Unknown_Week"),
            winner,
            loser,
            url: sources.pfr_url(href),
        });
    }

    info!("Found {} games with box scores", links.len());
    links
}

fn stat_cell<'a>(row: ElementRef<'a>, tag: &str, stat: &str) -> Option<ElementRef<'a>> {
    row.children()
        .filter_map(ElementRef::wrap)
        .find(|cell| cell.value().name() == tag && cell.value().attr("data-stat") == Some(stat))
}

/// Fetches the schedule and writes the finished and upcoming game lists.
pub async fn run<F: HtmlFetcher>(
    fetcher: &F,
    config: &ScraperConfig,
    teams: &TeamNames,
    today: NaiveDate,
) -> Result<ScheduleSplit> {
    let url = config.sources.schedule_url();
    info!("Scraping schedule from {}", url);
    let html = fetcher.fetch_html(&url).await?;

    let mut schedule = parse_schedule(&html, teams)?;
    validate_and_format(&mut schedule)?;
    let split = split_by_date(&schedule, today)?;

    let finished_path = config.output.dir.join(FINISHED_GAMES_CSV);
    split.finished.write_csv(&finished_path)?;
    info!("Saved {} finished games to {}", split.finished.len(), finished_path.display());

    let upcoming_path = config.output.dir.join(UPCOMING_GAMES_CSV);
    split.upcoming.write_csv(&upcoming_path)?;
    info!("Saved {} upcoming games to {}", split.upcoming.len(), upcoming_path.display());

    Ok(split)
}
