use std::collections::HashMap;
use tracing::{debug, warn};

use crate::{
    table::{RawRow, RawTable},
    teams::TeamNames,
    types::{RecordSet, Value},
};

/// Cleans a raw table into a record set: picks the header, strips repeated
/// header rows and blank rows, and swaps team abbreviations for canonical
/// names.
pub fn normalize(raw: &RawTable, teams: &TeamNames) -> RecordSet {
    let width = raw.column_count();
    let authoritative = &raw.authoritative_headers;
    // With a thead the header row has been consumed before the body starts
    let mut header_consumed = !raw.headers.is_empty();

    let headers = if !authoritative.is_empty() && authoritative.len() == width {
        authoritative.clone()
    } else {
        if !authoritative.is_empty() {
            debug!(
                "Header count {} does not match {} columns, keeping markup headers",
                authoritative.len(),
                width
            );
        }
        if !raw.headers.is_empty() {
            raw.headers.clone()
        } else if let Some(row) = raw.rows.iter().find(|row| row.decorative) {
            row.cells.clone()
        } else {
            warn!("No header row found, using positional column names");
            Vec::new()
        }
    };

    let label_sets = [&raw.headers, authoritative, &headers];
    let mut table = RecordSet::new(unique_headers(&headers, width));
    let mut repeats = 0;
    let mut blanks = 0;

    for row in &raw.rows {
        if is_decorative(row, &label_sets) {
            if header_consumed {
                repeats += 1;
            } else {
                header_consumed = true;
            }
            continue;
        }
        if row.is_empty() {
            blanks += 1;
            continue;
        }
        table.push_row(row.cells.iter().map(|cell| Value::parse(cell)).collect());
    }

    let replaced = teams.replace_in(&mut table);
    debug!(
        "Normalized table: {} rows kept, {} repeated headers and {} blank rows dropped, {} team names replaced",
        table.len(),
        repeats,
        blanks,
        replaced
    );

    table
}

fn is_decorative(row: &RawRow, label_sets: &[&Vec<String>]) -> bool {
    row.decorative
        || label_sets
            .iter()
            .any(|labels| repeats_labels(&row.cells, labels))
}

/// True when every non-blank cell equals the label of its column.
fn repeats_labels(cells: &[String], labels: &[String]) -> bool {
    let mut matched = false;
    for (i, cell) in cells.iter().enumerate() {
        let cell = cell.trim();
        if cell.is_empty() {
            continue;
        }
        match labels.get(i) {
            Some(label) if label == cell => matched = true,
            _ => return false,
        }
    }
    matched
}

/// Pads to `width` and makes every name unique ("Yds", "Yds.1", ...). Blank
/// labels become "Unnamed: N".
fn unique_headers(headers: &[String], width: usize) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    (0..width)
        .map(|i| {
            let base = match headers.get(i).map(|h| h.trim()) {
                Some(label) if !label.is_empty() => label.to_string(),
                _ => format!("Unnamed: {}", i),
            };
            let count = seen.entry(base.clone()).or_insert(0);
            let name = if *count == 0 {
                base
            } else {
                format!("{}.{}", base, count)
            };
            *count += 1;
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn raw(headers: &[&str], authoritative: &[&str], rows: Vec<RawRow>) -> RawTable {
        RawTable {
            headers: headers.iter().map(|s| s.to_string()).collect(),
            authoritative_headers: authoritative.iter().map(|s| s.to_string()).collect(),
            rows,
        }
    }

    #[test]
    fn test_injected_header_rows_are_removed() {
        let rows = vec![
            RawRow::new(["1", "KAN", "27"]),
            RawRow::new(["2", "BUF", "31"]),
            RawRow::decorative(["Week", "Tm", "Pts"]),
            RawRow::new(["3", "DET", "20"]),
            // Unmarked repeat, recognised by its text
            RawRow::new(["Week", "Tm", "Pts"]),
            RawRow::new(["4", "SFO", "17"]),
        ];
        let original = rows.len();
        let table = normalize(
            &raw(&["Week", "Tm", "Pts"], &["Week", "Tm", "Pts"], rows),
            &TeamNames::nfl(),
        );

        assert_eq!(table.len(), original - 2);
        assert_eq!(table.columns(), ["Week", "Tm", "Pts"]);
        assert!(table
            .iter()
            .all(|row| row.get("Tm") != &Value::from("Tm")));
        assert_eq!(
            table.column("Tm").unwrap(),
            vec![
                &Value::from("Kansas City Chiefs"),
                &Value::from("Buffalo Bills"),
                &Value::from("Detroit Lions"),
                &Value::from("San Francisco 49ers"),
            ]
        );
        assert_eq!(table.value(3, "Week"), Some(&Value::Int(4)));
    }

    #[test]
    fn test_authoritative_headers_replace_flattened_ones() {
        let table = normalize(
            &raw(
                &["Tm", "Average Drive Plays"],
                &["Tm", "Plays"],
                vec![RawRow::new(["Chicago Bears", "5.6"])],
            ),
            &TeamNames::nfl(),
        );
        assert_eq!(table.columns(), ["Tm", "Plays"]);
        assert_eq!(table.value(0, "Plays"), Some(&Value::Float(5.6)));
    }

    #[test]
    fn test_header_count_mismatch_keeps_markup_headers() {
        let table = normalize(
            &raw(
                &["Tm", "Yds", "TD"],
                &["Tm", "Yds"],
                vec![RawRow::new(["Chicago Bears", "300", "2"])],
            ),
            &TeamNames::nfl(),
        );
        assert_eq!(table.columns(), ["Tm", "Yds", "TD"]);
    }

    #[test]
    fn test_missing_header_is_not_fatal() {
        let table = normalize(
            &raw(&[], &[], vec![RawRow::new(["a", "1"]), RawRow::new(["", " "])]),
            &TeamNames::nfl(),
        );
        assert_eq!(table.columns(), ["Unnamed: 0", "Unnamed: 1"]);
        assert_eq!(table.len(), 1);
    }

    #[test]
    fn test_header_shipped_in_body_is_consumed_once() {
        let table = normalize(
            &raw(
                &[],
                &[],
                vec![
                    RawRow::decorative(["Player", "Tm"]),
                    RawRow::new(["Josh Allen", "BUF"]),
                    RawRow::decorative(["Player", "Tm"]),
                    RawRow::new(["Jared Goff", "DET"]),
                ],
            ),
            &TeamNames::nfl(),
        );
        assert_eq!(table.columns(), ["Player", "Tm"]);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn test_duplicate_and_blank_headers_are_made_unique() {
        assert_eq!(
            unique_headers(
                &["Player".to_string(), "Yds".to_string(), "Yds".to_string(), "".to_string()],
                5
            ),
            vec!["Player", "Yds", "Yds.1", "Unnamed: 3", "Unnamed: 4"]
        );
    }
}
