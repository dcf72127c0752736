use std::collections::HashMap;

use crate::types::{RecordSet, Value};

/// One franchise as it appears across the scraped sites.
#[derive(Debug, Clone, Copy)]
pub struct Franchise {
    pub name: &'static str,
    /// pro-football-reference abbreviation
    pub abbreviation: &'static str,
    /// Short name used by nfl.com stat tables
    pub nickname: &'static str,
    pub aliases: &'static [&'static str],
}

pub const FRANCHISES: [Franchise; 32] = [
    Franchise { name: "Arizona Cardinals", abbreviation: "ARI", nickname: "Cardinals", aliases: &["ARZ"] },
    Franchise { name: "Atlanta Falcons", abbreviation: "ATL", nickname: "Falcons", aliases: &[] },
    Franchise { name: "Baltimore Ravens", abbreviation: "BAL", nickname: "Ravens", aliases: &[] },
    Franchise { name: "Buffalo Bills", abbreviation: "BUF", nickname: "Bills", aliases: &[] },
    Franchise { name: "Carolina Panthers", abbreviation: "CAR", nickname: "Panthers", aliases: &[] },
    Franchise { name: "Chicago Bears", abbreviation: "CHI", nickname: "Bears", aliases: &[] },
    Franchise { name: "Cincinnati Bengals", abbreviation: "CIN", nickname: "Bengals", aliases: &[] },
    Franchise { name: "Cleveland Browns", abbreviation: "CLE", nickname: "Browns", aliases: &[] },
    Franchise { name: "Dallas Cowboys", abbreviation: "DAL", nickname: "Cowboys", aliases: &[] },
    Franchise { name: "Denver Broncos", abbreviation: "DEN", nickname: "Broncos", aliases: &[] },
    Franchise { name: "Detroit Lions", abbreviation: "DET", nickname: "Lions", aliases: &[] },
    Franchise { name: "Green Bay Packers", abbreviation: "GNB", nickname: "Packers", aliases: &["GB"] },
    Franchise { name: "Houston Texans", abbreviation: "HOU", nickname: "Texans", aliases: &[] },
    Franchise { name: "Indianapolis Colts", abbreviation: "IND", nickname: "Colts", aliases: &[] },
    Franchise { name: "Jacksonville Jaguars", abbreviation: "JAX", nickname: "Jaguars", aliases: &["JAC"] },
    Franchise { name: "Kansas City Chiefs", abbreviation: "KAN", nickname: "Chiefs", aliases: &["KC"] },
    Franchise { name: "Las Vegas Raiders", abbreviation: "LVR", nickname: "Raiders", aliases: &["LV"] },
    Franchise { name: "Los Angeles Chargers", abbreviation: "LAC", nickname: "Chargers", aliases: &[] },
    Franchise { name: "Los Angeles Rams", abbreviation: "LAR", nickname: "Rams", aliases: &[] },
    Franchise { name: "Miami Dolphins", abbreviation: "MIA", nickname: "Dolphins", aliases: &[] },
    Franchise { name: "Minnesota Vikings", abbreviation: "MIN", nickname: "Vikings", aliases: &[] },
    Franchise { name: "New England Patriots", abbreviation: "NWE", nickname: "Patriots", aliases: &["NE"] },
    Franchise { name: "New Orleans Saints", abbreviation: "NOR", nickname: "Saints", aliases: &["NO"] },
    Franchise { name: "New York Giants", abbreviation: "NYG", nickname: "Giants", aliases: &[] },
    Franchise { name: "New York Jets", abbreviation: "NYJ", nickname: "Jets", aliases: &[] },
    Franchise { name: "Philadelphia Eagles", abbreviation: "PHI", nickname: "Eagles", aliases: &[] },
    Franchise { name: "Pittsburgh Steelers", abbreviation: "PIT", nickname: "Steelers", aliases: &[] },
    Franchise { name: "San Francisco 49ers", abbreviation: "SFO", nickname: "49ers", aliases: &["SF"] },
    Franchise { name: "Seattle Seahawks", abbreviation: "SEA", nickname: "Seahawks", aliases: &[] },
    Franchise { name: "Tampa Bay Buccaneers", abbreviation: "TAM", nickname: "Buccaneers", aliases: &["TB"] },
    Franchise { name: "Tennessee Titans", abbreviation: "TEN", nickname: "Titans", aliases: &[] },
    Franchise { name: "Washington Commanders", abbreviation: "WAS", nickname: "Commanders", aliases: &["WSH"] },
];

/// Immutable lookup from every known abbreviation or short name to the
/// canonical franchise name, plus the reverse abbreviation lookup.
#[derive(Debug, Clone)]
pub struct TeamNames {
    canonical: HashMap<String, String>,
    abbreviations: HashMap<String, String>,
}

impl Default for TeamNames {
    fn default() -> Self {
        Self::nfl()
    }
}

impl TeamNames {
    pub fn nfl() -> Self {
        Self::from_franchises(&FRANCHISES)
    }

    pub fn from_franchises(franchises: &[Franchise]) -> Self {
        let mut canonical = HashMap::new();
        let mut abbreviations = HashMap::new();

        for franchise in franchises {
            let names = [franchise.abbreviation, franchise.nickname]
                .into_iter()
                .chain(franchise.aliases.iter().copied());
            for alias in names {
                canonical.insert(alias.to_string(), franchise.name.to_string());
            }
            abbreviations.insert(franchise.name.to_string(), franchise.abbreviation.to_string());
        }

        Self {
            canonical,
            abbreviations,
        }
    }

    /// Canonical name for an alias, `None` for anything unknown (including
    /// names that are already canonical).
    pub fn lookup(&self, alias: &str) -> Option<&str> {
        self.canonical.get(alias.trim()).map(String::as_str)
    }

    /// Canonical name for an alias, or the input unchanged.
    pub fn canonical<'a>(&'a self, name: &'a str) -> &'a str {
        self.lookup(name).unwrap_or(name.trim())
    }

    pub fn abbreviation(&self, canonical: &str) -> Option<&str> {
        self.abbreviations.get(canonical).map(String::as_str)
    }

    /// Rewrites every text cell that is exactly a known alias. Returns the
    /// number of cells changed.
    pub fn replace_in(&self, table: &mut RecordSet) -> usize {
        let mut replaced = 0;
        table.map_values(|value| match value {
            Value::Text(text) => match self.lookup(text) {
                Some(name) => {
                    replaced += 1;
                    Value::Text(name.to_string())
                }
                None => value.clone(),
            },
            other => other.clone(),
        });
        replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_every_franchise_maps_both_ways() {
        let teams = TeamNames::nfl();
        for franchise in FRANCHISES {
            assert_eq!(teams.lookup(franchise.abbreviation), Some(franchise.name));
            assert_eq!(teams.lookup(franchise.nickname), Some(franchise.name));
            assert_eq!(teams.abbreviation(franchise.name), Some(franchise.abbreviation));
            // Canonical names never collide with an alias token
            assert_eq!(teams.lookup(franchise.name), None);
        }
        assert_eq!(teams.canonical("KAN"), "Kansas City Chiefs");
        assert_eq!(teams.canonical("Team Total"), "Team Total");
    }

    #[test]
    fn test_replacement_is_idempotent() {
        let teams = TeamNames::nfl();
        let mut table = RecordSet::with_rows(
            ["Tm", "Detail"],
            [
                vec!["KAN".into(), "KAN 7".into()],
                vec!["49ers".into(), Value::Int(3)],
                vec!["Buffalo Bills".into(), Value::Missing],
            ],
        );

        assert_eq!(teams.replace_in(&mut table), 2);
        let once = table.clone();
        assert_eq!(teams.replace_in(&mut table), 0);
        assert_eq!(table, once);

        assert_eq!(
            table.column("Tm").unwrap(),
            vec![
                &Value::from("Kansas City Chiefs"),
                &Value::from("San Francisco 49ers"),
                &Value::from("Buffalo Bills"),
            ]
        );
        // Only whole cells are replaced
        assert_eq!(table.value(0, "Detail"), Some(&Value::from("KAN 7")));
    }
}
