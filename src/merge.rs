//! Positional merge of a patch dictionary into a base dictionary.
//!
//! Rows shared between patch and base are overwritten in place (restricted
//! to the caller's overwrite column set) and never move. New rows are placed
//! next to the nearest shared row in the patch's own ordering ("smart
//! placement"): runs of new rows are buffered while walking the patch and
//! flushed next to the anchor row that bounds them. When the patch shares no
//! rows with the base, new rows fall back to form-level placement, landing
//! after the last base row of the same form.

use std::collections::HashSet;

use anyhow::Result;
use thiserror::Error;

use crate::{
    dictionary::{DataDict, FieldRow},
    schema,
};

/// An anchor key vanished from the base table between partition and splice.
/// Only reachable when base and patch are inconsistent mid-merge.
#[derive(Debug, Error)]
#[error("anchor field '{0}' is not present in the base dictionary")]
pub struct UnknownAnchor(pub String);

#[derive(Debug, Clone)]
pub struct MergeOptions {
    /// Columns whose base values a shared patch row may replace.
    pub overwrite_columns: HashSet<String>,
    /// When false, rows absent from the base are ignored (update-only mode).
    pub insert_new: bool,
}

impl MergeOptions {
    /// All canonical columns overwritable.
    pub fn new(insert_new: bool) -> Self {
        Self {
            overwrite_columns: schema::CANONICAL_COLUMNS
                .iter()
                .map(|column| column.to_string())
                .collect(),
            insert_new,
        }
    }

    pub fn skip_column(&mut self, column: &str) {
        self.overwrite_columns.remove(column);
    }
}

/// Per-patch accounting, used for verbose summaries and the JSON report.
#[derive(Debug, Default, Clone)]
pub struct MergeOutcome {
    pub overwritten: Vec<String>,
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
}

/// Applies `patch` to `base` and returns the merged table plus an outcome
/// record. The merged table's key set is `base ∪ patch` when inserting and
/// exactly `base` in update-only mode; pre-existing rows keep their relative
/// order in every case.
pub fn merge(
    mut base: DataDict,
    patch: &DataDict,
    options: &MergeOptions,
) -> Result<(DataDict, MergeOutcome)> {
    let mut outcome = MergeOutcome::default();

    // Partition patch keys against the base, preserving patch row order.
    let mut existing = Vec::new();
    let mut new_keys = Vec::new();
    for row in patch.rows() {
        if base.contains(&row.name) {
            existing.push(row.name.clone());
        } else {
            new_keys.push(row.name.clone());
        }
    }

    for key in &existing {
        for column in patch.columns() {
            if !options.overwrite_columns.contains(column) {
                continue;
            }
            if let Some(value) = patch.cell(key, column) {
                let value = value.to_string();
                base.set_cell(key, column, value);
            }
        }
    }
    outcome.overwritten = existing.clone();

    if !options.insert_new {
        outcome.skipped = new_keys;
        return Ok((base, outcome));
    }
    if new_keys.is_empty() {
        return Ok((base, outcome));
    }

    if existing.is_empty() {
        insert_by_form(&mut base, patch, &mut outcome);
    } else {
        let existing_set: HashSet<&str> = existing.iter().map(String::as_str).collect();
        insert_by_anchor(&mut base, patch, &existing_set, &mut outcome)?;
    }
    Ok((base, outcome))
}

/// Smart placement: walk the patch in order, buffering runs of new rows and
/// flushing each run next to the anchor that bounds it. A run seen before
/// any anchor goes immediately before the first anchor; every later run goes
/// immediately after the most recently seen anchor. A trailing run after the
/// last anchor is flushed after that anchor rather than dropped.
fn insert_by_anchor(
    base: &mut DataDict,
    patch: &DataDict,
    existing: &HashSet<&str>,
    outcome: &mut MergeOutcome,
) -> Result<()> {
    let mut buffer: Vec<FieldRow> = Vec::new();
    let mut last_old: Option<&str> = None;

    for row in patch.rows() {
        if existing.contains(row.name.as_str()) {
            if !buffer.is_empty() {
                let at = match last_old {
                    None => anchor_position(base, &row.name)?,
                    Some(anchor) => anchor_position(base, anchor)? + 1,
                };
                flush(base, at, &mut buffer, outcome);
            }
            last_old = Some(row.name.as_str());
        } else {
            buffer.push(base.project_row(patch, row));
        }
    }

    if !buffer.is_empty() {
        let at = match last_old {
            Some(anchor) => anchor_position(base, anchor)? + 1,
            None => base.len(),
        };
        flush(base, at, &mut buffer, outcome);
    }
    Ok(())
}

/// Form-level placement for patches sharing no rows with the base: new rows
/// are grouped by form name (first-seen form order, patch row order within a
/// group) and each group lands after the last base row of the same form, or
/// at the end when the base has no row for that form.
fn insert_by_form(base: &mut DataDict, patch: &DataDict, outcome: &mut MergeOutcome) {
    let mut groups: Vec<(String, Vec<FieldRow>)> = Vec::new();
    for row in patch.rows() {
        let form = patch.value_of(row, schema::FORM_NAME).to_string();
        let projected = base.project_row(patch, row);
        match groups.iter_mut().find(|(name, _)| *name == form) {
            Some((_, rows)) => rows.push(projected),
            None => groups.push((form, vec![projected])),
        }
    }

    for (form, mut rows) in groups {
        let at = match base.last_row_with(schema::FORM_NAME, &form) {
            Some(idx) => idx + 1,
            None => base.len(),
        };
        flush(base, at, &mut rows, outcome);
    }
}

fn anchor_position(base: &DataDict, key: &str) -> Result<usize, UnknownAnchor> {
    base.position(key)
        .ok_or_else(|| UnknownAnchor(key.to_string()))
}

fn flush(base: &mut DataDict, at: usize, buffer: &mut Vec<FieldRow>, outcome: &mut MergeOutcome) {
    outcome
        .inserted
        .extend(buffer.iter().map(|row| row.name.clone()));
    base.insert_rows(at, std::mem::take(buffer));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dictionary::LoadOptions;
    use encoding_rs::UTF_8;

    // Builds a dictionary with Form Name and Field Label columns from
    // (name, form, label) triples.
    fn dict(rows: &[(&str, &str, &str)]) -> DataDict {
        let mut text = String::from(
            "\"Variable / Field Name\",\"Form Name\",\"Section Header\",\"Field Label\"\n",
        );
        for (name, form, label) in rows {
            text.push_str(&format!("\"{name}\",\"{form}\",\"\",\"{label}\"\n"));
        }
        DataDict::from_reader(text.as_bytes(), &LoadOptions::default(), UTF_8)
            .expect("parse dictionary")
    }

    fn keys(dict: &DataDict) -> Vec<&str> {
        dict.keys().collect()
    }

    #[test]
    fn overwrite_updates_shared_row_in_place() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("b", "f1", "B updated")]);
        let (merged, outcome) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "b", "c"]);
        assert_eq!(merged.cell("b", "Field Label"), Some("B updated"));
        assert_eq!(outcome.overwritten, ["b"]);
        assert!(outcome.inserted.is_empty());
    }

    #[test]
    fn new_row_lands_after_its_anchor() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("b", "f1", "B updated"), ("x", "f1", "X")]);
        let (merged, outcome) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "b", "x", "c"]);
        assert_eq!(merged.cell("b", "Field Label"), Some("B updated"));
        assert_eq!(outcome.inserted, ["x"]);
    }

    #[test]
    fn new_rows_before_first_anchor_land_before_it() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("y", "f1", "Y"), ("a", "f1", "A")]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["y", "a", "b", "c"]);
    }

    #[test]
    fn buffered_run_flushes_after_previous_anchor_not_before_current() {
        // Patch order a, x, c: x belongs after a even though c triggers the
        // flush and sits two rows later in the base.
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("a", "f1", "A"), ("x", "f1", "X"), ("c", "f1", "C")]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "x", "b", "c"]);
    }

    #[test]
    fn trailing_new_rows_flush_after_last_anchor() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("c", "f1", "C"), ("x", "f1", "X"), ("y", "f1", "Y")]);
        let (merged, outcome) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "b", "c", "x", "y"]);
        assert_eq!(outcome.inserted, ["x", "y"]);
    }

    #[test]
    fn anchorless_patch_lands_after_last_row_of_same_form() {
        let base = dict(&[("a", "f1", "A"), ("b", "form1", "B"), ("c", "f2", "C")]);
        let patch = dict(&[("p", "form1", "P"), ("q", "form1", "Q")]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "b", "p", "q", "c"]);
    }

    #[test]
    fn anchorless_patch_with_unknown_form_appends_at_end() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B")]);
        let patch = dict(&[("p", "brand_new_form", "P")]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "b", "p"]);
    }

    #[test]
    fn anchorless_patch_groups_interleaved_forms() {
        let base = dict(&[("a", "f1", "A"), ("b", "f2", "B")]);
        let patch = dict(&[
            ("p", "f1", "P"),
            ("q", "f2", "Q"),
            ("r", "f1", "R"),
        ]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(keys(&merged), ["a", "p", "r", "b", "q"]);
    }

    #[test]
    fn update_only_ignores_new_rows() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B")]);
        let patch = dict(&[("x", "f1", "X"), ("y", "f1", "Y")]);
        let (merged, outcome) = merge(base.clone(), &patch, &MergeOptions::new(false)).unwrap();

        assert_eq!(merged, base);
        assert_eq!(outcome.skipped, ["x", "y"]);
        assert!(outcome.inserted.is_empty());
    }

    #[test]
    fn skipped_column_keeps_base_value() {
        let base = dict(&[("a", "f1", "A")]);
        let patch = dict(&[("a", "f9", "A updated")]);
        let mut options = MergeOptions::new(true);
        options.skip_column(schema::FORM_NAME);
        let (merged, _) = merge(base, &patch, &options).unwrap();

        assert_eq!(merged.cell("a", schema::FORM_NAME), Some("f1"));
        assert_eq!(merged.cell("a", "Field Label"), Some("A updated"));
    }

    #[test]
    fn overwrite_is_idempotent() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B"), ("c", "f1", "C")]);
        let patch = dict(&[("b", "f1", "B2"), ("x", "f1", "X")]);
        let options = MergeOptions::new(true);

        let (once, _) = merge(base, &patch, &options).unwrap();
        let (twice, _) = merge(once.clone(), &patch, &options).unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn merged_key_set_is_union_of_base_and_patch() {
        let base = dict(&[("a", "f1", "A"), ("b", "f1", "B")]);
        let patch = dict(&[("b", "f1", "B2"), ("x", "f1", "X"), ("y", "f1", "Y")]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        let mut merged_keys = keys(&merged);
        merged_keys.sort_unstable();
        assert_eq!(merged_keys, ["a", "b", "x", "y"]);
    }

    #[test]
    fn merge_never_reorders_preexisting_rows() {
        let base = dict(&[
            ("a", "f1", "A"),
            ("b", "f1", "B"),
            ("c", "f1", "C"),
            ("d", "f1", "D"),
        ]);
        let patch = dict(&[
            ("d", "f1", "D2"),
            ("x", "f1", "X"),
            ("a", "f1", "A2"),
            ("y", "f1", "Y"),
            ("c", "f1", "C2"),
        ]);
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        let order = keys(&merged);
        let pos = |key: &str| order.iter().position(|k| *k == key).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
        assert!(pos("c") < pos("d"));
    }

    #[test]
    fn patch_missing_columns_leaves_base_cells_untouched() {
        let base = dict(&[("a", "f1", "A")]);
        let patch_text =
            "\"Variable / Field Name\",\"Field Label\"\n\"a\",\"A updated\"\n".to_string();
        let patch =
            DataDict::from_reader(patch_text.as_bytes(), &LoadOptions::default(), UTF_8).unwrap();
        let (merged, _) = merge(base, &patch, &MergeOptions::new(true)).unwrap();

        assert_eq!(merged.cell("a", "Field Label"), Some("A updated"));
        assert_eq!(merged.cell("a", schema::FORM_NAME), Some("f1"));
    }
}
