use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::{
    config::ScraperConfig,
    fetch::HtmlFetcher,
    normalize::normalize,
    table::{locate_table, TableLocator},
    teams::TeamNames,
    types::{RecordSet, Value},
    utils::{clock_to_seconds, field_position_to_yards, round2},
};

pub const DRIVE_AVERAGES_CSV: &str = "Drive_Averages.csv";
pub const DRIVES_TABLE: &str = "drives";

pub const DRIVE_COLUMNS: [&str; 12] = [
    "Rank",
    "Team",
    "Games",
    "Drives",
    "Total_Plays",
    "Score_Percent",
    "Turnover_Percent",
    "Avg_Drive_Plays",
    "Avg_Drive_Yards",
    "Avg_Drive_Start",
    "Avg_Drive_Time",
    "Avg_Drive_Points",
];

const NUMERIC_COLUMNS: [&str; 9] = [
    "Rank",
    "Games",
    "Drives",
    "Total_Plays",
    "Score_Percent",
    "Turnover_Percent",
    "Avg_Drive_Plays",
    "Avg_Drive_Yards",
    "Avg_Drive_Points",
];

/// Drops summary rows, names the twelve drive columns, and converts the
/// average drive time to seconds and the average start to yards from the
/// opponent's goal line.
pub fn clean_drive_table(mut drives: RecordSet) -> Result<RecordSet> {
    let dropped = drives.drop_incomplete_rows();
    info!("Dropped {} incomplete drive rows", dropped);

    if drives.width() != DRIVE_COLUMNS.len() {
        bail!(
            "Drive table has {} columns, expected {}: {:?}",
            drives.width(),
            DRIVE_COLUMNS.len(),
            drives.columns()
        );
    }
    drives.replace_columns(DRIVE_COLUMNS)?;

    for column in NUMERIC_COLUMNS {
        let coerced = drives.coerce_numeric(column)?;
        if coerced > 0 {
            warn!("{} non-numeric values in {} set to missing", coerced, column);
        }
    }

    drives.map_column("Avg_Drive_Time", |value| {
        let text = value.to_string();
        match clock_to_seconds(&text) {
            Ok(seconds) => Value::Int(seconds.into()),
            Err(e) => {
                warn!("Avg_Drive_Time: {}", e);
                Value::Missing
            }
        }
    })?;

    drives.map_column("Avg_Drive_Start", |value| {
        Value::from_f64(field_position_to_yards(&value.to_string()).map(round2))
    })?;

    Ok(drives)
}

/// Scrapes the season drive averages into `Drive_Averages.csv`.
pub async fn run<F: HtmlFetcher>(
    fetcher: &F,
    config: &ScraperConfig,
    teams: &TeamNames,
) -> Result<RecordSet> {
    let url = config.sources.season_url();
    let locator = TableLocator::by_id(DRIVES_TABLE);
    info!("Scraping drive averages from {}", url);
    let html = fetcher.fetch_rendered(&url, &locator.ready_selector()).await?;

    let raw = locate_table(&html, &locator)
        .found()
        .with_context(|| format!("Drive table '{}' not found on {}", DRIVES_TABLE, url))?;
    let drives = clean_drive_table(normalize(&raw, teams))?;

    let path = config.output.dir.join(DRIVE_AVERAGES_CSV);
    drives.write_csv(&path)?;
    info!("Saved {} drive averages to {}", drives.len(), path.display());
    Ok(drives)
}
