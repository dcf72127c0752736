use scraper::{ElementRef, Html, Node, Selector};
use std::fmt;

const OVER_HEADER: &str = "over_header";
const REPEATED_HEADER: &str = "thead";

/// How a table is addressed on a page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableLocator {
    /// `<table id="...">`
    ById(String),
    /// `div#all_{name}` wrapping `div#div_{name}` wrapping the table, as used
    /// on pro-football-reference box scores.
    Wrapped(String),
}

impl TableLocator {
    pub fn by_id(id: impl Into<String>) -> Self {
        Self::ById(id.into())
    }

    pub fn wrapped(name: impl Into<String>) -> Self {
        Self::Wrapped(name.into())
    }

    pub fn name(&self) -> &str {
        match self {
            Self::ById(name) | Self::Wrapped(name) => name,
        }
    }

    /// CSS selector whose presence means the table has been rendered.
    pub fn ready_selector(&self) -> String {
        match self {
            Self::ById(id) => format!("table#{}", id),
            Self::Wrapped(name) => format!("div#div_{} table", name),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LocateOutcome {
    Found(RawTable),
    OuterMissing,
    InnerMissing,
    TableMissing,
}

impl LocateOutcome {
    pub fn found(self) -> Option<RawTable> {
        match self {
            LocateOutcome::Found(table) => Some(table),
            _ => None,
        }
    }
}

impl fmt::Display for LocateOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LocateOutcome::Found(table) => write!(f, "found ({} rows)", table.rows.len()),
            LocateOutcome::OuterMissing => f.write_str("no outer wrapper div"),
            LocateOutcome::InnerMissing => f.write_str("no inner div"),
            LocateOutcome::TableMissing => f.write_str("no table"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    pub cells: Vec<String>,
    /// Set when the row or one of its cells carries a header/group marker.
    pub decorative: bool,
}

impl RawRow {
    pub fn new<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Self {
            cells: cells.into_iter().map(Into::into).collect(),
            decorative: false,
        }
    }

    pub fn decorative<S: Into<String>>(cells: impl IntoIterator<Item = S>) -> Self {
        Self {
            decorative: true,
            ..Self::new(cells)
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.iter().all(|c| c.trim().is_empty())
    }
}

/// A table as found in the markup, before any cleaning.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    /// All `thead` rows flattened into one label per column.
    pub headers: Vec<String>,
    /// Labels of the first `thead` row that is not a grouping header.
    pub authoritative_headers: Vec<String>,
    pub rows: Vec<RawRow>,
}

impl RawTable {
    pub fn column_count(&self) -> usize {
        self.rows
            .iter()
            .map(|r| r.cells.len())
            .max()
            .unwrap_or(0)
            .max(self.headers.len())
    }

    pub fn from_element(table: ElementRef<'_>) -> Self {
        let head_rows: Vec<ElementRef> = table
            .select(&Selector::parse("thead > tr").unwrap())
            .collect();

        let expanded: Vec<Vec<String>> = head_rows.iter().map(|row| expand_cells(*row)).collect();
        let headers = flatten_headers(&expanded);
        let authoritative_headers = authoritative_headers(&head_rows);

        let rows = table
            .select(&Selector::parse("tr").unwrap())
            .filter(|row| !in_thead(row))
            .map(|row| RawRow {
                cells: expand_cells(row),
                decorative: is_marked(&row),
            })
            .collect();

        Self {
            headers,
            authoritative_headers,
            rows,
        }
    }
}

/// Finds a table on a page.
///
/// Tables that ship inside HTML comments (pro-football-reference un-comments
/// them client side) are found too, so plain HTTP responses and rendered pages
/// both work.
pub fn locate_table(html: &str, locator: &TableLocator) -> LocateOutcome {
    locate_in(&Html::parse_document(html), locator)
}

/// [`locate_table`] on an already parsed page, for pages holding several
/// tables.
pub fn locate_in(document: &Html, locator: &TableLocator) -> LocateOutcome {
    let root = document.root_element();

    match locator {
        TableLocator::ById(id) => find_by_id(root, "table", id)
            .map(RawTable::from_element)
            .or_else(|| {
                search_comments(root, |fragment| {
                    find_by_id(fragment.root_element(), "table", id).map(RawTable::from_element)
                })
            })
            .map_or(LocateOutcome::TableMissing, LocateOutcome::Found),
        TableLocator::Wrapped(name) => {
            let Some(outer) = find_by_id(root, "div", &format!("all_{}", name)) else {
                return LocateOutcome::OuterMissing;
            };
            let inner_id = format!("div_{}", name);

            let nested = table_in_inner(outer, &inner_id).or_else(|| {
                search_comments(outer, |fragment| table_in_inner(fragment.root_element(), &inner_id))
            });
            match nested {
                Some(Some(table)) => LocateOutcome::Found(table),
                Some(None) => LocateOutcome::TableMissing,
                None => LocateOutcome::InnerMissing,
            }
        }
    }
}

/// Header labels of the first `thead` row not marked as a grouping header.
/// Empty when every row is a grouping row or there is no `thead`.
pub fn authoritative_headers(head_rows: &[ElementRef<'_>]) -> Vec<String> {
    let th = Selector::parse("th").unwrap();
    head_rows
        .iter()
        .find(|row| !has_class(row, OVER_HEADER))
        .map(|row| row.select(&th).map(cell_text).collect())
        .unwrap_or_default()
}

pub(crate) fn find_by_id<'a>(root: ElementRef<'a>, tag: &str, id: &str) -> Option<ElementRef<'a>> {
    let selector = Selector::parse(tag).ok()?;
    root.select(&selector).find(|el| el.value().id() == Some(id))
}

/// `None` when the inner div is absent, `Some(None)` when it holds no table.
fn table_in_inner(root: ElementRef<'_>, inner_id: &str) -> Option<Option<RawTable>> {
    let inner = find_by_id(root, "div", inner_id)?;
    Some(
        inner
            .select(&Selector::parse("table").unwrap())
            .next()
            .map(RawTable::from_element),
    )
}

fn search_comments<T>(root: ElementRef<'_>, mut find: impl FnMut(&Html) -> Option<T>) -> Option<T> {
    root.descendants().find_map(|node| match node.value() {
        Node::Comment(comment) if comment.contains("<table") => {
            find(&Html::parse_fragment(comment))
        }
        _ => None,
    })
}

/// Direct `th`/`td` children with colspans repeated.
fn expand_cells(row: ElementRef<'_>) -> Vec<String> {
    let mut cells = Vec::new();
    for cell in row.children().filter_map(ElementRef::wrap) {
        if !matches!(cell.value().name(), "th" | "td") {
            continue;
        }
        let span = cell
            .value()
            .attr("colspan")
            .and_then(|s| s.trim().parse::<usize>().ok())
            .unwrap_or(1)
            .max(1);
        let text = cell_text(cell);
        cells.extend(std::iter::repeat(text).take(span));
    }
    cells
}

/// Joins stacked header labels per column, e.g. "Passing" over "Yds" gives
/// "Passing Yds".
fn flatten_headers(rows: &[Vec<String>]) -> Vec<String> {
    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    (0..width)
        .map(|col| {
            let mut parts: Vec<&str> = Vec::new();
            for label in rows.iter().filter_map(|row| row.get(col)) {
                if !label.is_empty() && parts.last() != Some(&label.as_str()) {
                    parts.push(label);
                }
            }
            parts.join(" ")
        })
        .collect()
}

pub(crate) fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn has_class(element: &ElementRef<'_>, class: &str) -> bool {
    element.value().classes().any(|c| c == class)
}

fn is_marked(row: &ElementRef<'_>) -> bool {
    let marked = |el: &ElementRef<'_>| has_class(el, OVER_HEADER) || has_class(el, REPEATED_HEADER);
    marked(row) || row.children().filter_map(ElementRef::wrap).any(|cell| marked(&cell))
}

fn in_thead(row: &ElementRef<'_>) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .take_while(|el| el.value().name() != "table")
        .any(|el| el.value().name() == "thead")
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const GROUPED_TABLE: &str = r#"
        <table id="drives">
          <thead>
            <tr class="over_header"><th colspan="2"></th><th colspan="2">Average Drive</th></tr>
            <tr><th>Tm</th><th>Dr</th><th>Plays</th><th>Time</th></tr>
          </thead>
          <tbody>
            <tr><th>Chicago Bears</th><td>180</td><td>5.6</td><td>2:41</td></tr>
            <tr class="thead"><th>Tm</th><th>Dr</th><th>Plays</th><th>Time</th></tr>
            <tr><th>Detroit Lions</th><td>171</td><td>6.1</td><td>2:55</td></tr>
          </tbody>
        </table>"#;

    #[test]
    fn test_locate_by_id_reads_headers_and_rows() {
        let html = format!("<html><body>{}</body></html>", GROUPED_TABLE);
        let table = locate_table(&html, &TableLocator::by_id("drives")).found().unwrap();

        assert_eq!(
            table.headers,
            vec!["Tm", "Dr", "Average Drive Plays", "Average Drive Time"]
        );
        assert_eq!(table.authoritative_headers, vec!["Tm", "Dr", "Plays", "Time"]);
        assert_eq!(table.rows.len(), 3);
        assert_eq!(table.rows[0].cells, vec!["Chicago Bears", "180", "5.6", "2:41"]);
        assert!(!table.rows[0].decorative);
        assert!(table.rows[1].decorative);
    }

    #[test]
    fn test_authoritative_headers_empty_when_all_grouped() {
        let html = r#"<table id="t"><thead><tr class="over_header"><th>Group</th></tr></thead>
            <tbody><tr><td>1</td></tr></tbody></table>"#;
        let table = locate_table(html, &TableLocator::by_id("t")).found().unwrap();
        assert!(table.authoritative_headers.is_empty());
        assert_eq!(table.headers, vec!["Group"]);
    }

    #[test]
    fn test_wrapped_outcomes_per_nesting_level() {
        let locator = TableLocator::wrapped("team_stats");

        assert_eq!(locate_table("<div id='other'></div>", &locator), LocateOutcome::OuterMissing);
        assert_eq!(
            locate_table("<div id='all_team_stats'><div id='x'></div></div>", &locator),
            LocateOutcome::InnerMissing
        );
        assert_eq!(
            locate_table(
                "<div id='all_team_stats'><div id='div_team_stats'><p>soon</p></div></div>",
                &locator
            ),
            LocateOutcome::TableMissing
        );

        let found = locate_table(
            "<div id='all_team_stats'><div id='div_team_stats'><table><tr><td>1</td></tr></table></div></div>",
            &locator,
        );
        assert!(matches!(found, LocateOutcome::Found(_)));
    }

    #[test]
    fn test_commented_table_is_found() {
        let html = r#"
            <div id="all_team_stats" class="table_wrapper">
              <div class="placeholder"></div>
              <!--
              <div class="table_container" id="div_team_stats">
                <table class="stats_table" id="team_stats">
                  <thead><tr><th></th><th>KAN</th><th>BAL</th></tr></thead>
                  <tbody><tr><th>First Downs</th><td>24</td><td>20</td></tr></tbody>
                </table>
              </div>
              -->
            </div>"#;

        let table = locate_table(html, &TableLocator::wrapped("team_stats"))
            .found()
            .unwrap();
        assert_eq!(table.authoritative_headers, vec!["", "KAN", "BAL"]);
        assert_eq!(table.rows[0].cells, vec!["First Downs", "24", "20"]);

        let by_id = locate_table(html, &TableLocator::by_id("team_stats")).found().unwrap();
        assert_eq!(by_id, table);
    }

    #[test]
    fn test_locate_in_reuses_parsed_page() {
        let html = r#"
            <div id="all_scoring"><div id="div_scoring">
              <table><tr><th>Quarter</th></tr><tr><td>1</td></tr></table>
            </div></div>
            <div id="all_kicking"><div id="div_kicking">
              <table><tr><th>Player</th></tr><tr><td>Harrison Butker</td></tr></table>
            </div></div>"#;
        let document = Html::parse_document(html);

        let scoring = locate_in(&document, &TableLocator::wrapped("scoring")).found().unwrap();
        let kicking = locate_in(&document, &TableLocator::wrapped("kicking")).found().unwrap();
        assert_eq!(scoring.rows[1].cells, vec!["1"]);
        assert_eq!(kicking.rows[1].cells, vec!["Harrison Butker"]);
        assert_eq!(
            locate_in(&document, &TableLocator::wrapped("returns")),
            LocateOutcome::OuterMissing
        );
        assert_eq!(
            locate_in(&document, &TableLocator::wrapped("scoring")),
            locate_table(html, &TableLocator::wrapped("scoring"))
        );
    }
}
