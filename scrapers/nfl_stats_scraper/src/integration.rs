use anyhow::Result;
use tracing::info;

use crate::{
    config::ScraperConfig,
    join::{concat, feature_differences, left_join, JoinSpec},
    schedule::{FINISHED_GAMES_CSV, UPCOMING_GAMES_CSV},
    strength::TEAM_STRENGTH_CSV,
    types::{RecordSet, TableError},
};

pub const NFL_FINISHED_GAMES_CSV: &str = "NFL_Finished_Games.csv";
pub const NFL_UPCOMING_GAMES_CSV: &str = "NFL_Upcoming_Games.csv";
pub const FEATURE_DIFFERENCES_CSV: &str = "NFL_Games_With_Feature_Differences.csv";

const HOME_SUFFIX: &str = "_home";
const AWAY_SUFFIX: &str = "_away";
const PLACEHOLDER: &str = "N/A";

/// Team strength features compared between the two sides of a game.
pub const DIFF_FEATURES: [&str; 24] = [
    "Off_Rush_Yds",
    "Off_YPCar",
    "Off_YPRec",
    "Off_Pass_Yds",
    "Off_Scoring",
    "Off_Completion_Rate",
    "Off_3rd_Down_Conversion_Rate",
    "Off_4th_Down_Conversion_Rate",
    "Def_Rush_Yds_Allowed",
    "Def_YPCar_Allowed",
    "Def_Pass_Yds_Allowed",
    "Def_INT",
    "Def_Yds/Rec_Allowed",
    "Def_Sacks",
    "Def_3rd_Down_Stop_Rate",
    "Def_4th_Down_Stop_Rate",
    "FG_Made",
    "FG_Attempted",
    "XP_Made",
    "XP_%",
    "FG_30+",
    "FG_40+",
    "FG_50+",
    "FG_60+",
];

pub fn integrated_csv(season: u16) -> String {
    format!("NFL_Integrated_Data_{}.csv", season)
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntegratedGames {
    pub finished: RecordSet,
    pub upcoming: RecordSet,
    /// Both lists stacked, without the team key columns, missing cells
    /// filled with "N/A".
    pub combined: RecordSet,
}

/// Attaches strength to both teams of each game: `home_key`'s team gets
/// `_home` columns, `away_key`'s team `_away` columns.
pub fn attach_strength(
    games: &RecordSet,
    strength: &RecordSet,
    home_key: &str,
    away_key: &str,
) -> Result<RecordSet, TableError> {
    let home = left_join(
        games,
        strength,
        &JoinSpec::keys(home_key, "Team").with_suffixes("", HOME_SUFFIX),
    )?;
    left_join(
        &home,
        strength,
        &JoinSpec::keys(away_key, "Team").with_suffixes(HOME_SUFFIX, AWAY_SUFFIX),
    )
}

/// Finished games pair winner (home side) with loser; upcoming games pair
/// home with visitor.
pub fn integrate(
    finished: &RecordSet,
    upcoming: &RecordSet,
    strength: &RecordSet,
) -> Result<IntegratedGames, TableError> {
    let finished = attach_strength(finished, strength, "Winner", "Loser")?;
    let upcoming = attach_strength(upcoming, strength, "Home", "Visitor")?;

    let mut combined = concat(&[&finished, &upcoming]);
    combined.drop_columns(&["Team_home", "Team_away"]);
    combined.fill_missing(PLACEHOLDER);

    Ok(IntegratedGames {
        finished,
        upcoming,
        combined,
    })
}

/// Adds a `{feature}_Diff` column (home minus away) for every compared
/// feature.
pub fn games_with_differences(mut games: RecordSet) -> Result<RecordSet, TableError> {
    games.trim_column_names();
    games.drop_columns(&["Team_away"]);
    feature_differences(&mut games, &DIFF_FEATURES, HOME_SUFFIX, AWAY_SUFFIX)?;
    Ok(games)
}

/// Merges the schedule with team strength into the NFL game datasets.
pub fn run_integrate(config: &ScraperConfig) -> Result<IntegratedGames> {
    let dir = &config.output.dir;
    let finished = RecordSet::read_csv(&dir.join(FINISHED_GAMES_CSV))?;
    let upcoming = RecordSet::read_csv(&dir.join(UPCOMING_GAMES_CSV))?;
    let strength = RecordSet::read_csv(&dir.join(TEAM_STRENGTH_CSV))?;

    let games = integrate(&finished, &upcoming, &strength)?;

    games.finished.write_csv(&dir.join(NFL_FINISHED_GAMES_CSV))?;
    games.upcoming.write_csv(&dir.join(NFL_UPCOMING_GAMES_CSV))?;
    let combined_path = dir.join(integrated_csv(config.sources.season));
    games.combined.write_csv(&combined_path)?;

    info!(
        "Integrated {} finished and {} upcoming games into {}",
        games.finished.len(),
        games.upcoming.len(),
        combined_path.display()
    );
    Ok(games)
}

/// Computes home-minus-away feature differences for finished games.
pub fn run_diff(config: &ScraperConfig) -> Result<RecordSet> {
    let dir = &config.output.dir;
    let games = RecordSet::read_csv(&dir.join(NFL_FINISHED_GAMES_CSV))?;
    let games = games_with_differences(games)?;

    let path = dir.join(FEATURE_DIFFERENCES_CSV);
    games.write_csv(&path)?;
    info!("Saved feature differences for {} games to {}", games.len(), path.display());
    Ok(games)
}
