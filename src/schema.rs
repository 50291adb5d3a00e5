//! Canonical REDCap data-dictionary layout and header validation.
//!
//! A data dictionary always keys rows on the "Variable / Field Name" column
//! and carries up to 17 further metadata columns. The canonical column order
//! defined here governs serialization; input files may present a subset of
//! the columns in any order, but every header must be a member of this set.

use std::collections::HashSet;

use thiserror::Error;

/// Header of the key column, exactly as REDCap exports it.
pub const KEY_COLUMN: &str = "Variable / Field Name";

/// The 17 canonical data columns, in fixed serialization order.
pub const CANONICAL_COLUMNS: [&str; 17] = [
    "Form Name",
    "Section Header",
    "Field Type",
    "Field Label",
    "Choices, Calculations, OR Slider Labels",
    "Field Note",
    "Text Validation Type OR Show Slider Number",
    "Text Validation Min",
    "Text Validation Max",
    "Identifier?",
    "Branching Logic (Show field only if...)",
    "Required Field?",
    "Custom Alignment",
    "Question Number (surveys only)",
    "Matrix Group Name",
    "Matrix Ranking?",
    "Field Annotation",
];

pub const FORM_NAME: &str = "Form Name";
pub const SECTION_HEADER: &str = "Section Header";
pub const FIELD_NOTE: &str = "Field Note";
pub const BRANCHING_LOGIC: &str = "Branching Logic (Show field only if...)";

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("key column must be 'Variable / Field Name', found '{found}'")]
    KeyColumn { found: String },
    #[error("unrecognized data-dictionary column '{name}'")]
    UnknownHeader { name: String },
    #[error("column '{name}' appears more than once in the header")]
    DuplicateHeader { name: String },
    #[error("duplicate field name '{name}' makes row positions ambiguous")]
    DuplicateField { name: String },
    #[error("row {row} has an empty field name")]
    EmptyFieldName { row: usize },
    #[error("cannot coerce headers: file has {found} column(s), canonical layout has {expected}")]
    ColumnCount { found: usize, expected: usize },
}

pub fn is_canonical_column(name: &str) -> bool {
    CANONICAL_COLUMNS.contains(&name)
}

/// Position of `name` within the canonical layout.
pub fn canonical_position(name: &str) -> Option<usize> {
    CANONICAL_COLUMNS.iter().position(|column| *column == name)
}

/// Checks that the first header is the key column and every remaining header
/// is a distinct member of the canonical column set.
pub fn validate_headers(headers: &[String]) -> Result<(), SchemaError> {
    let Some((key, data_headers)) = headers.split_first() else {
        return Err(SchemaError::KeyColumn {
            found: String::new(),
        });
    };
    if key != KEY_COLUMN {
        return Err(SchemaError::KeyColumn { found: key.clone() });
    }
    let mut seen = HashSet::new();
    for name in data_headers {
        if !is_canonical_column(name) {
            return Err(SchemaError::UnknownHeader { name: name.clone() });
        }
        if !seen.insert(name.as_str()) {
            return Err(SchemaError::DuplicateHeader { name: name.clone() });
        }
    }
    Ok(())
}

/// Returns the full canonical header row, key column first.
pub fn canonical_headers() -> Vec<String> {
    std::iter::once(KEY_COLUMN)
        .chain(CANONICAL_COLUMNS)
        .map(str::to_string)
        .collect()
}
