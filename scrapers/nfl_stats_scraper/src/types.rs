use anyhow::{Context, Result};
use regex::Regex;
use std::{
    collections::HashMap,
    fmt,
    fs,
    io,
    path::Path,
    sync::LazyLock,
};

static GROUPED_NUMBER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d{1,3}(,\d{3})+(\.\d+)?$").unwrap());

static MISSING: Value = Value::Missing;

/// A single typed cell.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Missing,
    Int(i64),
    Float(f64),
    Text(String),
}

impl Value {
    /// Parses cell text into the narrowest fitting type. Thousands separators
    /// are accepted on numbers ("4,123").
    pub fn parse(cell: &str) -> Self {
        let cell = cell.trim();
        if cell.is_empty() {
            return Value::Missing;
        }

        let numeric = if GROUPED_NUMBER.is_match(cell) {
            cell.replace(',', "")
        } else {
            cell.to_string()
        };

        if let Ok(int) = numeric.parse::<i64>() {
            return Value::Int(int);
        }
        match numeric.parse::<f64>() {
            Ok(float) if float.is_finite() => Value::Float(float),
            _ => Value::Text(cell.to_string()),
        }
    }

    pub fn from_f64(value: Option<f64>) -> Self {
        value.map_or(Value::Missing, Value::Float)
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Value::Missing)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Missing => Ok(()),
            Value::Int(i) => write!(f, "{}", i),
            // Whole floats keep their decimal point so they read back as floats
            Value::Float(x) if x.fract() == 0.0 && x.abs() < 1e15 => write!(f, "{:.1}", x),
            Value::Float(x) => write!(f, "{}", x),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum TableError {
    #[error("column '{0}' not found")]
    MissingColumn(String),
    #[error("column '{0}' exists on both sides of the join and no suffixes were given")]
    ColumnCollision(String),
    #[error("expected {expected} columns, found {found}")]
    ColumnCount { expected: usize, found: usize },
}

/// Read-only view of one row, addressed by column name.
#[derive(Clone, Copy)]
pub struct RowView<'a> {
    index: &'a HashMap<String, usize>,
    values: &'a [Value],
}

impl<'a> RowView<'a> {
    pub fn get(&self, column: &str) -> &'a Value {
        self.index
            .get(column)
            .and_then(|&i| self.values.get(i))
            .unwrap_or(&MISSING)
    }

    pub fn f64(&self, column: &str) -> Option<f64> {
        self.get(column).as_f64()
    }

    pub fn values(&self) -> &'a [Value] {
        self.values
    }
}

/// Ordered columns plus rows of typed values. Every row always holds exactly
/// one value per column.
#[derive(Debug, Clone, Default)]
pub struct RecordSet {
    columns: Vec<String>,
    index: HashMap<String, usize>,
    rows: Vec<Vec<Value>>,
}

impl PartialEq for RecordSet {
    fn eq(&self, other: &Self) -> bool {
        self.columns == other.columns && self.rows == other.rows
    }
}

impl RecordSet {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        let mut table = Self::default();
        table.set_columns(columns.into_iter().map(Into::into).collect());
        table
    }

    pub fn with_rows<S: Into<String>>(
        columns: impl IntoIterator<Item = S>,
        rows: impl IntoIterator<Item = Vec<Value>>,
    ) -> Self {
        let mut table = Self::new(columns);
        for row in rows {
            table.push_row(row);
        }
        table
    }

    fn set_columns(&mut self, columns: Vec<String>) {
        self.index = columns
            .iter()
            .enumerate()
            .rev()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        self.columns = columns;
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn iter(&self) -> impl Iterator<Item = RowView<'_>> {
        self.rows.iter().map(|values| RowView {
            index: &self.index,
            values,
        })
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    fn require(&self, name: &str) -> Result<usize, TableError> {
        self.column_index(name)
            .ok_or_else(|| TableError::MissingColumn(name.to_string()))
    }

    pub fn value(&self, row: usize, column: &str) -> Option<&Value> {
        let col = self.column_index(column)?;
        self.rows.get(row).and_then(|r| r.get(col))
    }

    pub fn column(&self, name: &str) -> Result<Vec<&Value>, TableError> {
        let col = self.require(name)?;
        Ok(self.rows.iter().map(|row| &row[col]).collect())
    }

    /// Appends a row, padding with missing values or truncating to the
    /// column count.
    pub fn push_row(&mut self, mut row: Vec<Value>) {
        row.resize(self.columns.len(), Value::Missing);
        self.rows.push(row);
    }

    pub fn rename_columns(&mut self, renames: &[(&str, &str)]) {
        let columns = self
            .columns
            .iter()
            .map(|name| {
                renames
                    .iter()
                    .find(|(from, _)| *from == name.as_str())
                    .map_or_else(|| name.clone(), |(_, to)| to.to_string())
            })
            .collect();
        self.set_columns(columns);
    }

    /// Replaces every column name at once.
    pub fn replace_columns<S: Into<String>>(
        &mut self,
        columns: impl IntoIterator<Item = S>,
    ) -> Result<(), TableError> {
        let columns: Vec<String> = columns.into_iter().map(Into::into).collect();
        if columns.len() != self.columns.len() {
            return Err(TableError::ColumnCount {
                expected: self.columns.len(),
                found: columns.len(),
            });
        }
        self.set_columns(columns);
        Ok(())
    }

    pub fn trim_column_names(&mut self) {
        let columns = self.columns.iter().map(|c| c.trim().to_string()).collect();
        self.set_columns(columns);
    }

    /// Projects the named columns, in the given order.
    pub fn select(&self, columns: &[&str]) -> Result<RecordSet, TableError> {
        let indices = columns
            .iter()
            .map(|name| self.require(name))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(RecordSet::with_rows(
            columns.iter().copied(),
            self.rows
                .iter()
                .map(|row| indices.iter().map(|&i| row[i].clone()).collect()),
        ))
    }

    /// Removes the named columns; names that do not exist are ignored.
    pub fn drop_columns(&mut self, columns: &[&str]) {
        let keep: Vec<usize> = (0..self.columns.len())
            .filter(|&i| !columns.contains(&self.columns[i].as_str()))
            .collect();
        let names = keep.iter().map(|&i| self.columns[i].clone()).collect();
        for row in &mut self.rows {
            *row = keep.iter().map(|&i| row[i].clone()).collect();
        }
        self.set_columns(names);
    }

    /// Appends a column computed from each row. Replaces an existing column
    /// of the same name in place.
    pub fn derive_column<F>(&mut self, name: &str, mut f: F)
    where
        F: FnMut(RowView<'_>) -> Value,
    {
        let values: Vec<Value> = self.iter().map(&mut f).collect();
        self.put_column(name, values);
    }

    pub fn put_column(&mut self, name: &str, values: Vec<Value>) {
        let col = match self.column_index(name) {
            Some(col) => col,
            None => {
                let mut columns = self.columns.clone();
                columns.push(name.to_string());
                self.set_columns(columns);
                for row in &mut self.rows {
                    row.push(Value::Missing);
                }
                self.columns.len() - 1
            }
        };
        for (row, value) in self.rows.iter_mut().zip(values) {
            row[col] = value;
        }
    }

    pub fn map_column<F>(&mut self, name: &str, mut f: F) -> Result<(), TableError>
    where
        F: FnMut(&Value) -> Value,
    {
        let col = self.require(name)?;
        for row in &mut self.rows {
            row[col] = f(&row[col]);
        }
        Ok(())
    }

    /// Forces a column to numbers; text that is not numeric becomes missing.
    /// Returns how many cells were coerced away.
    pub fn coerce_numeric(&mut self, name: &str) -> Result<usize, TableError> {
        let mut coerced = 0;
        self.map_column(name, |value| match value {
            Value::Text(text) => match Value::parse(text) {
                parsed @ (Value::Int(_) | Value::Float(_)) => parsed,
                _ => {
                    coerced += 1;
                    Value::Missing
                }
            },
            other => other.clone(),
        })?;
        Ok(coerced)
    }

    /// Drops every row holding at least one missing value.
    pub fn drop_incomplete_rows(&mut self) -> usize {
        let before = self.rows.len();
        self.rows.retain(|row| row.iter().all(|v| !v.is_missing()));
        before - self.rows.len()
    }

    /// Rewrites every cell of every row.
    pub fn map_values<F>(&mut self, mut f: F)
    where
        F: FnMut(&Value) -> Value,
    {
        for value in self.rows.iter_mut().flatten() {
            *value = f(value);
        }
    }

    /// Replaces missing values with a literal placeholder such as "N/A".
    pub fn fill_missing(&mut self, placeholder: &str) {
        self.map_values(|value| match value {
            Value::Missing => Value::Text(placeholder.to_string()),
            other => other.clone(),
        });
    }

    pub fn write_csv(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = fs::File::create(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        self.to_writer(file)
            .with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn to_writer<W: io::Write>(&self, writer: W) -> Result<()> {
        let mut wtr = csv::Writer::from_writer(writer);
        wtr.write_record(&self.columns)?;
        for row in &self.rows {
            wtr.write_record(row.iter().map(|v| v.to_string()))?;
        }
        wtr.flush()?;
        Ok(())
    }

    pub fn read_csv(path: &Path) -> Result<Self> {
        let file = fs::File::open(path)
            .with_context(|| format!("Required source file {} is missing", path.display()))?;
        Self::from_reader(file).with_context(|| format!("Failed to read {}", path.display()))
    }

    pub fn from_reader<R: io::Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
        let headers: Vec<String> = rdr.headers()?.iter().map(str::to_string).collect();
        let mut table = RecordSet::new(headers);
        for record in rdr.records() {
            let record = record?;
            table.push_row(record.iter().map(Value::parse).collect());
        }
        Ok(table)
    }
}
