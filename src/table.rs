//! Append-only table of per-time-point values, keyed by column name.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::path::Path;

use log::warn;

use crate::error::TacError;

/// Name of the acquisition-time column.
pub const TIME_COLUMN: &str = "tacq";

#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    name: String,
    values: Vec<f64>,
}

impl Column {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }
}

/// Columns in order of first appearance, all of length [`ResultTable::rows`].
///
/// A column introduced after the first row is front-padded with NaN, and a
/// column missing from a row gets NaN for that row.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ResultTable {
    columns: Vec<Column>,
    index: HashMap<String, usize>,
    rows: usize,
}

impl ResultTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn get(&self, name: &str) -> Option<&[f64]> {
        self.index.get(name).map(|&i| self.columns[i].values.as_slice())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    /// Append one time point. A name repeated within `row` keeps its last value.
    pub fn append_row<I, S>(&mut self, row: I)
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let row_index = self.rows;
        for (name, value) in row {
            let name = name.into();
            let column = self.column_mut(name);
            if column.values.len() > row_index {
                warn!(
                    "Column {:?} written twice at row {row_index}; keeping the last value",
                    column.name
                );
                column.values[row_index] = value;
            } else {
                column.values.push(value);
            }
        }
        self.rows += 1;
        for column in &mut self.columns {
            column.values.resize(self.rows, f64::NAN);
        }
    }

    fn column_mut(&mut self, name: String) -> &mut Column {
        let i = match self.index.get(&name) {
            Some(&i) => i,
            None => {
                let i = self.columns.len();
                self.index.insert(name.clone(), i);
                self.columns.push(Column {
                    name,
                    values: vec![f64::NAN; self.rows],
                });
                i
            }
        };
        &mut self.columns[i]
    }

    /// Store `factor * from` as column `to`.
    ///
    /// An existing `to` column is overwritten in place.
    ///
    /// # Errors
    ///
    /// [`TacError::UnknownColumn`] if `from` does not exist.
    pub fn scale(&mut self, from: &str, to: &str, factor: f64) -> Result<(), TacError> {
        let scaled: Vec<f64> = self
            .get(from)
            .ok_or_else(|| TacError::UnknownColumn(from.to_string()))?
            .iter()
            .map(|v| v * factor)
            .collect();
        if self.contains(to) {
            warn!("Scale output {to:?} replaces an existing column");
        }
        self.column_mut(to.to_string()).values = scaled;
        Ok(())
    }

    /// Write a `# name name ...` header line followed by one space-delimited row per time point.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), TacError> {
        let mut csv = csv::WriterBuilder::new()
            .delimiter(b' ')
            .quote_style(csv::QuoteStyle::Never)
            .has_headers(false)
            .flexible(true)
            .from_writer(writer);

        csv.write_record(std::iter::once("#").chain(self.column_names()))?;
        for row in 0..self.rows {
            csv.write_record(self.columns.iter().map(|c| format!("{:.18e}", c.values[row])))?;
        }
        csv.flush()?;
        Ok(())
    }

    pub fn write_to_path(&self, path: impl AsRef<Path>) -> Result<(), TacError> {
        let file = File::create(path.as_ref())?;
        self.write_to(file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn columns_keep_first_appearance_order() {
        let mut table = ResultTable::new();
        table.append_row([(TIME_COLUMN, 0.0), ("2", 1.0), ("1", 2.0)]);
        table.append_row([(TIME_COLUMN, 3.0), ("1", 4.0), ("2", 5.0)]);
        assert_eq!(table.column_names().collect::<Vec<_>>(), [TIME_COLUMN, "2", "1"]);
        assert_eq!(table.get("1").unwrap(), [2.0, 4.0]);
        assert_eq!(table.rows(), 2);
    }

    #[test]
    fn late_and_missing_columns_are_nan_padded() {
        let mut table = ResultTable::new();
        table.append_row([(TIME_COLUMN, 0.0), ("a", 1.0)]);
        table.append_row([(TIME_COLUMN, 1.0), ("b", 2.0)]);
        let a = table.get("a").unwrap();
        let b = table.get("b").unwrap();
        assert_eq!(a.len(), 2);
        assert_eq!(a[0], 1.0);
        assert!(a[1].is_nan());
        assert!(b[0].is_nan());
        assert_eq!(b[1], 2.0);
    }

    #[test]
    fn duplicate_name_in_row_keeps_last() {
        let mut table = ResultTable::new();
        table.append_row([("x", 1.0), ("x", 2.0)]);
        assert_eq!(table.get("x").unwrap(), [2.0]);
    }

    #[test]
    fn scale_creates_and_overwrites() {
        let mut table = ResultTable::new();
        table.append_row([("1", 2.0), ("2", 4.0)]);
        table.append_row([("1", 3.0), ("2", 5.0)]);

        table.scale("1", "1a", 2.0).unwrap();
        assert_eq!(table.get("1a").unwrap(), [4.0, 6.0]);

        table.scale("2", "1", 0.5).unwrap();
        assert_eq!(table.get("1").unwrap(), [2.0, 2.5]);
        assert_eq!(table.column_names().collect::<Vec<_>>(), ["1", "2", "1a"]);

        assert!(matches!(table.scale("3", "3a", 1.0), Err(TacError::UnknownColumn(c)) if c == "3"));
    }

    #[test]
    fn writes_commented_header_and_rows() {
        let mut table = ResultTable::new();
        table.append_row([(TIME_COLUMN, 0.0), ("1", 1.0), ("2", 0.5)]);
        table.append_row([(TIME_COLUMN, 1.2), ("1", 2.0), ("2", 0.1)]);

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("# tacq 1 2"));

        let rows: Vec<Vec<f64>> = lines
            .map(|l| l.split_whitespace().map(|v| v.parse().unwrap()).collect())
            .collect();
        assert_eq!(rows, [[0.0, 1.0, 0.5], [1.2, 2.0, 0.1]]);
    }

    #[test]
    fn header_has_one_more_field_than_rows() {
        let mut table = ResultTable::new();
        table.append_row([(TIME_COLUMN, 0.0), ("1", 1.0), ("2", f64::NAN)]);

        let mut out = Vec::new();
        table.write_to(&mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        let lines: Vec<_> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].split(' ').count(), 4);
        assert_eq!(lines[1].split(' ').count(), 3);
        assert_eq!(lines[1].split(' ').last(), Some("NaN"));
    }
}
