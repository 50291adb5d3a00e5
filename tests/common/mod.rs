#![allow(dead_code)]

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::{TempDir, tempdir};

use datadict_update::schema::KEY_COLUMN;

/// Scratch directory helper that cleans up files automatically on drop.
pub struct TestWorkspace {
    temp_dir: TempDir,
}

impl TestWorkspace {
    /// Creates a fresh scratch directory for the current test case.
    pub fn new() -> Self {
        Self {
            temp_dir: tempdir().expect("temp dir"),
        }
    }

    /// Returns the root path for all files owned by this workspace.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Writes `contents` into a file under the workspace and returns the path.
    pub fn write(&self, name: &str, contents: &str) -> PathBuf {
        let path = self.temp_dir.path().join(name);
        let mut file = File::create(&path).expect("create temp file");
        file.write_all(contents.as_bytes())
            .expect("write temp file contents");
        path
    }
}

/// Renders a data-dictionary CSV with the key column plus `columns`; each row
/// slice holds the field name followed by one value per column. Every cell is
/// quoted the way REDCap exports are.
pub fn dict_csv(columns: &[&str], rows: &[&[&str]]) -> String {
    let mut text = String::new();
    let header: Vec<&str> = std::iter::once(KEY_COLUMN).chain(columns.iter().copied()).collect();
    push_quoted_line(&mut text, &header);
    for row in rows {
        assert_eq!(
            row.len(),
            columns.len() + 1,
            "row width must match column count plus key"
        );
        push_quoted_line(&mut text, row);
    }
    text
}

fn push_quoted_line(text: &mut String, cells: &[&str]) {
    let quoted: Vec<String> = cells.iter().map(|cell| format!("\"{cell}\"")).collect();
    text.push_str(&quoted.join(","));
    text.push('\n');
}

/// First column of every data row in a CSV file, in order.
pub fn field_names(path: &Path) -> Vec<String> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .from_path(path)
        .expect("open output csv");
    reader
        .records()
        .map(|record| record.expect("read output row")[0].to_string())
        .collect()
}
