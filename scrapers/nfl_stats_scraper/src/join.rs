use std::collections::{hash_map::Entry, HashMap, HashSet};
use tracing::{debug, warn};

use crate::{
    types::{RecordSet, TableError, Value},
    utils::round2,
};

/// Key columns and collision suffixes for a left join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinSpec {
    pub left_key: String,
    pub right_key: String,
    pub suffixes: Option<(String, String)>,
}

impl JoinSpec {
    /// Join on a key column both tables share.
    pub fn on(key: &str) -> Self {
        Self::keys(key, key)
    }

    pub fn keys(left_key: &str, right_key: &str) -> Self {
        Self {
            left_key: left_key.to_string(),
            right_key: right_key.to_string(),
            suffixes: None,
        }
    }

    pub fn with_suffixes(mut self, left: &str, right: &str) -> Self {
        self.suffixes = Some((left.to_string(), right.to_string()));
        self
    }

    fn suffixed(&self, name: &str, right: bool) -> Result<String, TableError> {
        let (left_suffix, right_suffix) = self
            .suffixes
            .as_ref()
            .ok_or_else(|| TableError::ColumnCollision(name.to_string()))?;
        let suffix = if right { right_suffix } else { left_suffix };
        Ok(format!("{}{}", name, suffix))
    }
}

/// Left join on exact key equality. The output has exactly one row per left
/// row, in left order; when the right table repeats a key its first row is
/// used. Left rows without a match get missing values for every right column.
pub fn left_join(
    left: &RecordSet,
    right: &RecordSet,
    spec: &JoinSpec,
) -> Result<RecordSet, TableError> {
    let left_key = left
        .column_index(&spec.left_key)
        .ok_or_else(|| TableError::MissingColumn(spec.left_key.clone()))?;
    let right_key = right
        .column_index(&spec.right_key)
        .ok_or_else(|| TableError::MissingColumn(spec.right_key.clone()))?;

    let shared_key = spec.left_key == spec.right_key;
    let right_cols: Vec<usize> = (0..right.width())
        .filter(|&i| !(shared_key && i == right_key))
        .collect();

    let left_names: HashSet<&str> = left.columns().iter().map(String::as_str).collect();
    let right_names: HashSet<&str> = right_cols
        .iter()
        .map(|&i| right.columns()[i].as_str())
        .collect();

    let mut columns = Vec::with_capacity(left.width() + right_cols.len());
    for name in left.columns() {
        if right_names.contains(name.as_str()) {
            columns.push(spec.suffixed(name, false)?);
        } else {
            columns.push(name.clone());
        }
    }
    for &i in &right_cols {
        let name = &right.columns()[i];
        if left_names.contains(name.as_str()) {
            columns.push(spec.suffixed(name, true)?);
        } else {
            columns.push(name.clone());
        }
    }

    let mut lookup: HashMap<String, usize> = HashMap::new();
    let mut duplicates = Vec::new();
    for (i, row) in right.rows().iter().enumerate() {
        if row[right_key].is_missing() {
            continue;
        }
        match lookup.entry(row[right_key].to_string()) {
            Entry::Occupied(entry) => duplicates.push(entry.key().clone()),
            Entry::Vacant(entry) => {
                entry.insert(i);
            }
        }
    }
    if !duplicates.is_empty() {
        warn!(
            "Right table repeats {} key(s) in '{}', keeping the first row: {:?}",
            duplicates.len(),
            spec.right_key,
            duplicates
        );
    }

    let mut joined = RecordSet::new(columns);
    let mut unmatched = 0;
    for row in left.rows() {
        let key = &row[left_key];
        let matched = if key.is_missing() {
            None
        } else {
            lookup.get(&key.to_string()).copied()
        };

        let mut values = row.clone();
        match matched {
            Some(r) => values.extend(right_cols.iter().map(|&i| right.rows()[r][i].clone())),
            None => {
                unmatched += 1;
                values.extend(std::iter::repeat(Value::Missing).take(right_cols.len()));
            }
        }
        joined.push_row(values);
    }

    debug!(
        "Joined '{}' = '{}': {} rows, {} without a match",
        spec.left_key,
        spec.right_key,
        joined.len(),
        unmatched
    );
    Ok(joined)
}

/// Stacks tables row-wise. Columns are the union in first-seen order and
/// cells a table does not have are missing.
pub fn concat(tables: &[&RecordSet]) -> RecordSet {
    let mut columns: Vec<String> = Vec::new();
    for table in tables {
        for name in table.columns() {
            if !columns.contains(name) {
                columns.push(name.clone());
            }
        }
    }

    let mut stacked = RecordSet::new(columns.clone());
    for table in tables {
        for row in table.iter() {
            stacked.push_row(columns.iter().map(|name| row.get(name).clone()).collect());
        }
    }
    stacked
}

/// Adds `{feature}_Diff = {feature}{left_suffix} - {feature}{right_suffix}`
/// rounded to two decimals. A missing or non-numeric operand gives a missing
/// difference.
pub fn feature_differences(
    table: &mut RecordSet,
    features: &[&str],
    left_suffix: &str,
    right_suffix: &str,
) -> Result<(), TableError> {
    for feature in features {
        let left_col = format!("{}{}", feature, left_suffix);
        let right_col = format!("{}{}", feature, right_suffix);
        for col in [&left_col, &right_col] {
            if !table.has_column(col) {
                return Err(TableError::MissingColumn(col.clone()));
            }
        }

        table.derive_column(&format!("{}_Diff", feature), |row| {
            match (row.f64(&left_col), row.f64(&right_col)) {
                (Some(a), Some(b)) => Value::Float(round2(a - b)),
                _ => Value::Missing,
            }
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn strength() -> RecordSet {
        RecordSet::with_rows(
            ["Team", "Off_Pass_Yds"],
            [
                vec!["Chicago Bears".into(), Value::Int(210)],
                vec!["Detroit Lions".into(), Value::Int(260)],
                vec!["Chicago Bears".into(), Value::Int(999)],
            ],
        )
    }

    #[test]
    fn test_left_join_keeps_every_left_row() {
        let games = RecordSet::with_rows(
            ["Week", "Winner"],
            [
                vec![Value::Int(1), "Chicago Bears".into()],
                vec![Value::Int(1), "Unknown Team".into()],
                vec![Value::Int(2), Value::Missing],
                vec![Value::Int(3), "Detroit Lions".into()],
            ],
        );

        let joined = left_join(&games, &strength(), &JoinSpec::keys("Winner", "Team")).unwrap();
        assert_eq!(joined.len(), games.len());
        assert_eq!(joined.columns(), ["Week", "Winner", "Team", "Off_Pass_Yds"]);
        // First of the duplicated right rows wins
        assert_eq!(joined.value(0, "Off_Pass_Yds"), Some(&Value::Int(210)));
        assert_eq!(joined.value(1, "Team"), Some(&Value::Missing));
        assert_eq!(joined.value(2, "Off_Pass_Yds"), Some(&Value::Missing));
        assert_eq!(joined.value(3, "Off_Pass_Yds"), Some(&Value::Int(260)));
    }

    #[test]
    fn test_home_then_away_suffixes() {
        let games = RecordSet::with_rows(
            ["Winner", "Loser"],
            [vec!["Detroit Lions".into(), "Chicago Bears".into()]],
        );

        let home = left_join(
            &games,
            &strength(),
            &JoinSpec::keys("Winner", "Team").with_suffixes("", "_home"),
        )
        .unwrap();
        let full = left_join(
            &home,
            &strength(),
            &JoinSpec::keys("Loser", "Team").with_suffixes("_home", "_away"),
        )
        .unwrap();

        assert_eq!(
            full.columns(),
            [
                "Winner",
                "Loser",
                "Team_home",
                "Off_Pass_Yds_home",
                "Team_away",
                "Off_Pass_Yds_away"
            ]
        );
        assert_eq!(full.value(0, "Off_Pass_Yds_home"), Some(&Value::Int(260)));
        assert_eq!(full.value(0, "Off_Pass_Yds_away"), Some(&Value::Int(210)));
    }

    #[test]
    fn test_collision_without_suffixes_is_an_error() {
        let left = RecordSet::with_rows(
            ["Team", "Off_Pass_Yds"],
            [vec!["Chicago Bears".into(), Value::Int(1)]],
        );
        assert_eq!(
            left_join(&left, &strength(), &JoinSpec::on("Team")),
            Err(TableError::ColumnCollision("Off_Pass_Yds".to_string()))
        );
        assert_eq!(
            left_join(&left, &strength(), &JoinSpec::keys("Club", "Team")),
            Err(TableError::MissingColumn("Club".to_string()))
        );
    }

    #[test]
    fn test_shared_key_appears_once() {
        let left = RecordSet::with_rows(["Team", "Sacks"], [vec!["Detroit Lions".into(), Value::Int(40)]]);
        let joined = left_join(&left, &strength(), &JoinSpec::on("Team")).unwrap();
        assert_eq!(joined.columns(), ["Team", "Sacks", "Off_Pass_Yds"]);
    }

    #[test]
    fn test_concat_unions_columns() {
        let finished = RecordSet::with_rows(["Week", "Winner"], [vec![Value::Int(1), "Chicago Bears".into()]]);
        let upcoming = RecordSet::with_rows(["Week", "Home"], [vec![Value::Int(9), "Detroit Lions".into()]]);

        let all = concat(&[&finished, &upcoming]);
        assert_eq!(all.columns(), ["Week", "Winner", "Home"]);
        assert_eq!(all.len(), 2);
        assert_eq!(all.value(1, "Winner"), Some(&Value::Missing));
        assert_eq!(all.value(1, "Home"), Some(&Value::from("Detroit Lions")));
    }

    #[test]
    fn test_feature_differences() {
        let mut games = RecordSet::with_rows(
            ["Def_Sacks_home", "Def_Sacks_away"],
            [
                vec![Value::Int(10), Value::Float(7.5)],
                vec![Value::Float(3.333), Value::Int(1)],
                vec![Value::Int(4), Value::Missing],
                vec![Value::Int(4), "N/A".into()],
            ],
        );
        feature_differences(&mut games, &["Def_Sacks"], "_home", "_away").unwrap();

        assert_eq!(
            games.column("Def_Sacks_Diff").unwrap(),
            vec![
                &Value::Float(2.5),
                &Value::Float(2.33),
                &Value::Missing,
                &Value::Missing
            ]
        );
        assert_eq!(
            feature_differences(&mut games, &["FG_60+"], "_home", "_away"),
            Err(TableError::MissingColumn("FG_60+_home".to_string()))
        );
    }
}
