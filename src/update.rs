//! Sequential application of patch files to a base data dictionary.
//!
//! Each patch is loaded with full whitespace normalization, merged against
//! the accumulated base, and the result feeds the next patch. The final
//! table is serialized using the base file's verbatim column order.

use anyhow::{Context, Result};
use itertools::Itertools;
use log::info;

use crate::{
    cli::Cli,
    dictionary::{DataDict, LoadOptions},
    io_utils,
    merge::{self, MergeOptions},
    report::MergeReport,
    schema,
};

pub fn execute(args: &Cli) -> Result<()> {
    let input_encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;

    let base_options = LoadOptions {
        trim_keys: true,
        trim_all: false,
        coerce_headers: args.coerce_headers,
    };
    let mut base = DataDict::load(&args.current, &base_options, input_encoding)
        .with_context(|| format!("Loading base data dictionary {:?}", args.current))?;
    let output_columns = base.source_columns().to_vec();
    info!(
        "Loaded base dictionary {:?} with {} field(s)",
        args.current,
        base.len()
    );

    let mut options = MergeOptions::new(!args.update_only);
    if args.skip_branching {
        options.skip_column(schema::BRANCHING_LOGIC);
    }
    if args.skip_section_headers {
        options.skip_column(schema::SECTION_HEADER);
    }
    if args.skip_field_notes {
        options.skip_column(schema::FIELD_NOTE);
    }

    // Patches are always whitespace-normalized; the base is not.
    let patch_options = LoadOptions {
        trim_keys: true,
        trim_all: true,
        coerce_headers: args.coerce_headers,
    };

    let mut report = MergeReport::default();
    for patch_path in &args.patch_files {
        let patch = DataDict::load(patch_path, &patch_options, input_encoding)
            .with_context(|| format!("Loading patch file {patch_path:?}"))?;
        let (merged, outcome) = merge::merge(base, &patch, &options)
            .with_context(|| format!("Applying patch file {patch_path:?}"))?;
        base = merged;

        info!(
            "{:?}: overwrote {} field(s), inserted {} field(s)",
            patch_path,
            outcome.overwritten.len(),
            outcome.inserted.len()
        );
        if !outcome.overwritten.is_empty() {
            info!("  overwritten: {}", outcome.overwritten.iter().join(", "));
        }
        if !outcome.inserted.is_empty() {
            info!("  inserted: {}", outcome.inserted.iter().join(", "));
        }
        if !outcome.skipped.is_empty() {
            info!(
                "  ignored new field(s) under --update-only: {}",
                outcome.skipped.iter().join(", ")
            );
        }
        report.record(patch_path, &outcome);
    }

    let mut writer = io_utils::open_csv_writer(args.output.as_deref())?;
    base.write(&mut writer, &output_columns)?;
    writer.flush().context("Flushing merged output")?;

    if let Some(path) = &args.report {
        report
            .save(path)
            .with_context(|| format!("Writing merge report to {path:?}"))?;
        info!("Merge report written to {path:?}");
    }
    info!(
        "Wrote {} field(s) to {}",
        base.len(),
        args.output
            .as_deref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "stdout".into())
    );
    Ok(())
}
