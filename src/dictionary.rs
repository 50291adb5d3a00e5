//! Data-dictionary tables: loading, lookup, row splicing, and serialization.
//!
//! A [`DataDict`] is an ordered mapping from field name to the field's
//! metadata cells. Row order is semantically meaningful (it is the on-form
//! presentation order REDCap uses), so every operation here preserves the
//! relative order of existing rows. Duplicate field names are rejected at
//! load time because they make positional row splicing ambiguous.
//!
//! Cells are opaque strings. Numeric-looking values (validation minima and
//! maxima, question numbers) round-trip byte-for-byte.

use std::{collections::HashSet, io::Read, path::Path};

use anyhow::{Context, Result};
use encoding_rs::Encoding;

use crate::{
    io_utils,
    schema::{self, KEY_COLUMN, SchemaError},
};

/// Loader switches.
///
/// `trim_keys` strips whitespace from field names before they are used as
/// lookup keys, preventing phantom-duplicate rows from invisible whitespace.
/// `trim_all` additionally strips every data cell; it is enabled for patch
/// files and disabled for the base dictionary, so whitespace discrepancies
/// between the two do not manufacture spurious changes.
/// `coerce_headers` forces nonstandard headers to the canonical names
/// positionally, without semantic verification; the caller must know the
/// column count and order already match.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    pub trim_keys: bool,
    pub trim_all: bool,
    pub coerce_headers: bool,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            trim_keys: true,
            trim_all: false,
            coerce_headers: false,
        }
    }
}

/// One row of a data dictionary. `cells` parallels the owning table's
/// internal column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldRow {
    pub name: String,
    cells: Vec<String>,
}

/// An ordered field-name → metadata table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataDict {
    /// Data columns in canonical order, restricted to those in the source.
    columns: Vec<String>,
    /// Data columns in the order the source file presented them.
    source_columns: Vec<String>,
    rows: Vec<FieldRow>,
}

impl DataDict {
    pub fn load(path: &Path, options: &LoadOptions, encoding: &'static Encoding) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader_from_path(path, true)?;
        Self::from_csv(&mut reader, options, encoding)
            .with_context(|| format!("Loading data dictionary from {path:?}"))
    }

    pub fn from_reader<R: Read>(
        input: R,
        options: &LoadOptions,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let mut reader = io_utils::open_csv_reader(input, true);
        Self::from_csv(&mut reader, options, encoding)
    }

    pub fn from_csv<R: Read>(
        reader: &mut csv::Reader<R>,
        options: &LoadOptions,
        encoding: &'static Encoding,
    ) -> Result<Self> {
        let mut headers = io_utils::reader_headers(reader, encoding)?;
        if options.coerce_headers {
            let expected = schema::CANONICAL_COLUMNS.len() + 1;
            if headers.len() != expected {
                return Err(SchemaError::ColumnCount {
                    found: headers.len(),
                    expected,
                }
                .into());
            }
            headers = schema::canonical_headers();
        } else {
            schema::validate_headers(&headers)?;
        }
        let source_columns = headers[1..].to_vec();

        let mut columns = source_columns.clone();
        columns.sort_by_key(|column| schema::canonical_position(column).unwrap_or(usize::MAX));

        let mut rows = Vec::new();
        let mut seen = HashSet::new();
        for (idx, record) in reader.byte_records().enumerate() {
            let record = record.with_context(|| format!("Reading row {}", idx + 2))?;
            let decoded = io_utils::decode_record(&record, encoding)?;

            let mut name = decoded.first().cloned().unwrap_or_default();
            if options.trim_keys || options.trim_all {
                name = name.trim().to_string();
            }
            if name.is_empty() {
                return Err(SchemaError::EmptyFieldName { row: idx + 2 }.into());
            }
            if !seen.insert(name.clone()) {
                return Err(SchemaError::DuplicateField { name }.into());
            }

            let mut cells = vec![String::new(); columns.len()];
            for (col_idx, column) in source_columns.iter().enumerate() {
                let mut value = decoded.get(col_idx + 1).cloned().unwrap_or_default();
                if options.trim_all {
                    value = value.trim().to_string();
                }
                if let Some(target) = columns.iter().position(|c| c == column) {
                    cells[target] = value;
                }
            }
            rows.push(FieldRow { name, cells });
        }

        Ok(Self {
            columns,
            source_columns,
            rows,
        })
    }

    /// Data columns in canonical order.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Data columns in the order the source file presented them.
    pub fn source_columns(&self) -> &[String] {
        &self.source_columns
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn rows(&self) -> &[FieldRow] {
        &self.rows
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.rows.iter().map(|row| row.name.as_str())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Row position of `name`, if present. Tables are small enough that a
    /// linear scan beats maintaining an index across row splices.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.rows.iter().position(|row| row.name == name)
    }

    /// Value of `column` in `row`, or "" when the table lacks that column.
    pub fn value_of<'a>(&self, row: &'a FieldRow, column: &str) -> &'a str {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|idx| row.cells.get(idx))
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn cell(&self, name: &str, column: &str) -> Option<&str> {
        self.position(name)
            .map(|idx| self.value_of(&self.rows[idx], column))
    }

    /// Replaces one cell. Returns false when the row or column is absent.
    pub fn set_cell(&mut self, name: &str, column: &str, value: String) -> bool {
        let Some(col_idx) = self.columns.iter().position(|c| c == column) else {
            return false;
        };
        let Some(row_idx) = self.position(name) else {
            return false;
        };
        self.rows[row_idx].cells[col_idx] = value;
        true
    }

    /// Re-maps a row from `source`'s column layout onto this table's layout,
    /// filling columns the source lacks with "".
    pub fn project_row(&self, source: &DataDict, row: &FieldRow) -> FieldRow {
        let cells = self
            .columns
            .iter()
            .map(|column| source.value_of(row, column).to_string())
            .collect();
        FieldRow {
            name: row.name.clone(),
            cells,
        }
    }

    /// Splices `rows` into the table so the first spliced row lands at `at`.
    pub fn insert_rows(&mut self, at: usize, rows: Vec<FieldRow>) {
        self.rows.splice(at..at, rows);
    }

    /// Position of the last row whose `column` equals `value`.
    pub fn last_row_with(&self, column: &str, value: &str) -> Option<usize> {
        let col_idx = self.columns.iter().position(|c| c == column)?;
        self.rows
            .iter()
            .rposition(|row| row.cells.get(col_idx).is_some_and(|cell| cell == value))
    }

    /// Serializes the table with the given data-column order (the driver
    /// passes the base file's verbatim header order here).
    pub fn write<W: std::io::Write>(
        &self,
        writer: &mut csv::Writer<W>,
        column_order: &[String],
    ) -> Result<()> {
        let mut header = Vec::with_capacity(column_order.len() + 1);
        header.push(KEY_COLUMN.to_string());
        header.extend(column_order.iter().cloned());
        writer
            .write_record(&header)
            .context("Writing data-dictionary header")?;

        for row in &self.rows {
            let mut record = Vec::with_capacity(header.len());
            record.push(row.name.clone());
            for column in column_order {
                record.push(self.value_of(row, column).to_string());
            }
            writer
                .write_record(&record)
                .with_context(|| format!("Writing field '{}'", row.name))?;
        }
        Ok(())
    }
}
