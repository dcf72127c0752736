use anyhow::{Context, Result};
use std::path::Path;
use tracing::info;

use crate::{
    config::ScraperConfig,
    join::{left_join, JoinSpec},
    stats::{stat_csv_path, DEFENSIVE_DIR, OFFENSIVE_DIR, SPECIAL_DIR, SPECIAL_FIELD_GOALS},
    types::{RecordSet, Value},
    utils::{rate, stop_rate},
};

pub const TEAM_STRENGTH_CSV: &str = "Team_Strength.csv";
const KEY: &str = "Team";

/// Output name, then the source column it is read from.
type Features = &'static [(&'static str, &'static str)];

const FG_RANGE_FLAGS: [(&str, &str); 4] = [
    ("FG_30_39_Attempts", "FG_30_Attempted_Flag"),
    ("FG_40_49_Attempts", "FG_40_Attempted_Flag"),
    ("FG_50_59_Attempts", "FG_50_Attempted_Flag"),
    ("FG_60_Attempts", "FG_60_Attempted_Flag"),
];

/// Loads a team stat CSV, dropping incomplete rows and trimming team names.
/// A missing file is fatal.
pub fn load_team_stats(output_dir: &Path, folder: &str, name: &str) -> Result<RecordSet> {
    let path = stat_csv_path(output_dir, folder, name);
    let mut table = RecordSet::read_csv(&path)?;
    let dropped = table.drop_incomplete_rows();
    if dropped > 0 {
        info!("Dropped {} incomplete rows from {}", dropped, path.display());
    }
    table
        .map_column(KEY, |value| match value {
            Value::Text(team) => Value::Text(team.trim().to_string()),
            other => other.clone(),
        })
        .with_context(|| format!("{} has no Team column", path.display()))?;
    Ok(table)
}

/// `Team` plus the given source columns under their feature names.
fn features(table: &RecordSet, wanted: Features) -> Result<RecordSet> {
    let mut columns = vec![KEY];
    columns.extend(wanted.iter().map(|(_, source)| *source));
    let mut selected = table.select(&columns)?;
    let renames: Vec<(&str, &str)> = wanted.iter().map(|(name, source)| (*source, *name)).collect();
    selected.rename_columns(&renames);
    Ok(selected)
}

/// Left-joins every part onto the first, keyed on `Team`.
fn join_on_team(parts: Vec<RecordSet>) -> Result<RecordSet> {
    let mut parts = parts.into_iter();
    let mut combined = parts.next().unwrap_or_else(|| RecordSet::new([KEY]));
    for part in parts {
        combined = left_join(&combined, &part, &JoinSpec::on(KEY))?;
    }
    Ok(combined)
}

/// Joined parts, projected to `order`.
fn assemble(parts: Vec<RecordSet>, order: &[&str]) -> Result<RecordSet> {
    Ok(join_on_team(parts)?.select(order)?)
}

/// Offensive third and fourth down conversion rates, in percent.
pub fn add_conversion_rates(downs: &mut RecordSet) {
    downs.derive_column("3rd Down Conversion Rate", |row| {
        Value::from_f64(rate(row.f64("3rd Md"), row.f64("3rd Att")))
    });
    downs.derive_column("4th Down Conversion Rate", |row| {
        Value::from_f64(rate(row.f64("4th Md"), row.f64("4th Att")))
    });
}

/// Share of opponent third and fourth down attempts that were stopped, in
/// percent.
pub fn add_stop_rates(downs: &mut RecordSet) {
    downs.derive_column("3rd Down Stop Rate", |row| {
        Value::from_f64(stop_rate(row.f64("3rd Md"), row.f64("3rd Att")))
    });
    downs.derive_column("4th Down Stop Rate", |row| {
        Value::from_f64(stop_rate(row.f64("4th Md"), row.f64("4th Att")))
    });
}

/// Flags set when a team attempted at least one field goal in the range.
pub fn add_attempted_flags(special: &mut RecordSet) {
    for (attempts, flag) in FG_RANGE_FLAGS {
        special.derive_column(flag, |row| {
            let attempted = row.f64(attempts).is_some_and(|n| n > 0.0);
            Value::Int(attempted.into())
        });
    }
}

pub fn offensive_strength(output_dir: &Path) -> Result<RecordSet> {
    let load = |name| load_team_stats(output_dir, OFFENSIVE_DIR, name);
    let mut downs = load("Offensive_Downs")?;
    add_conversion_rates(&mut downs);

    assemble(
        vec![
            features(&load("Offensive_Rushing")?, &[("Off_Rush_Yds", "Rush Yds"), ("Off_YPCar", "YPC")])?,
            features(&load("Offensive_Receiving")?, &[("Off_YPRec", "Yds/Rec")])?,
            features(&load("Offensive_Passing")?, &[("Off_Pass_Yds", "Pass Yds"), ("Off_Completion_Rate", "Cmp %")])?,
            features(&load("Offensive_Scoring")?, &[("Off_Scoring", "Tot TD")])?,
            features(
                &downs,
                &[
                    ("Off_3rd_Down_Conversion_Rate", "3rd Down Conversion Rate"),
                    ("Off_4th_Down_Conversion_Rate", "4th Down Conversion Rate"),
                ],
            )?,
        ],
        &[
            KEY,
            "Off_Rush_Yds",
            "Off_YPCar",
            "Off_YPRec",
            "Off_Pass_Yds",
            "Off_Scoring",
            "Off_Completion_Rate",
            "Off_3rd_Down_Conversion_Rate",
            "Off_4th_Down_Conversion_Rate",
        ],
    )
}

pub fn defensive_strength(output_dir: &Path) -> Result<RecordSet> {
    let load = |name| load_team_stats(output_dir, DEFENSIVE_DIR, name);
    let mut downs = load("Defensive_Downs")?;
    add_stop_rates(&mut downs);

    assemble(
        vec![
            features(
                &load("Defensive_Rushing")?,
                &[("Def_Rush_Yds_Allowed", "Rush Yds"), ("Def_YPCar_Allowed", "YPC")],
            )?,
            features(&load("Defensive_Passing")?, &[("Def_Pass_Yds_Allowed", "Yds"), ("Def_INT", "INT")])?,
            features(&load("Defensive_Receiving")?, &[("Def_Yds/Rec_Allowed", "Yds/Rec")])?,
            features(&load("Defensive_Tackles")?, &[("Def_Sacks", "Sck")])?,
            features(
                &downs,
                &[
                    ("Def_3rd_Down_Stop_Rate", "3rd Down Stop Rate"),
                    ("Def_4th_Down_Stop_Rate", "4th Down Stop Rate"),
                ],
            )?,
        ],
        &[
            KEY,
            "Def_Rush_Yds_Allowed",
            "Def_YPCar_Allowed",
            "Def_Pass_Yds_Allowed",
            "Def_INT",
            "Def_Yds/Rec_Allowed",
            "Def_Sacks",
            "Def_3rd_Down_Stop_Rate",
            "Def_4th_Down_Stop_Rate",
        ],
    )
}

pub fn special_teams_strength(output_dir: &Path) -> Result<RecordSet> {
    let load = |name| load_team_stats(output_dir, SPECIAL_DIR, name);

    let mut special = assemble(
        vec![
            features(
                &load(SPECIAL_FIELD_GOALS)?,
                &[
                    ("FG_Made", "FGM"),
                    ("FG_Attempted", "Att"),
                    ("FG_30_39_Attempts", "FG_30_39_Attempts"),
                    ("FG_40_49_Attempts", "FG_40_49_Attempts"),
                    ("FG_50_59_Attempts", "FG_50_59_Attempts"),
                    ("FG_60_Attempts", "FG_60_Attempts"),
                    ("FG_30+", "FG_30_39_Percentage"),
                    ("FG_40+", "FG_40_49_Percentage"),
                    ("FG_50+", "FG_50_59_Percentage"),
                    ("FG_60+", "FG_60_Percentage"),
                    ("Longest_FG", "Lng"),
                ],
            )?,
            features(&load("Special_Punts")?, &[("Punts", "Punts"), ("Punt_Avg", "Avg")])?,
            features(&load("Special_Scoring")?, &[("XP_Made", "XPM"), ("XP_%", "XP Pct")])?,
        ],
        &[
            KEY,
            "FG_Made",
            "FG_Attempted",
            "FG_30_39_Attempts",
            "FG_40_49_Attempts",
            "FG_50_59_Attempts",
            "FG_60_Attempts",
            "FG_30+",
            "FG_40+",
            "FG_50+",
            "FG_60+",
            "Longest_FG",
            "Punts",
            "Punt_Avg",
            "XP_Made",
            "XP_%",
        ],
    )?;
    add_attempted_flags(&mut special);
    Ok(special)
}

/// Builds `Team_Strength.csv` from the saved team stat tables.
pub fn run(config: &ScraperConfig) -> Result<RecordSet> {
    let dir = &config.output.dir;
    let strength = join_on_team(vec![
        offensive_strength(dir)?,
        defensive_strength(dir)?,
        special_teams_strength(dir)?,
    ])?;

    let path = dir.join(TEAM_STRENGTH_CSV);
    strength.write_csv(&path)?;
    info!("Saved team strength for {} teams to {}", strength.len(), path.display());
    Ok(strength)
}
