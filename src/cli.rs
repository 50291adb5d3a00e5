use std::path::PathBuf;

use clap::Parser;

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Merge patch files into a REDCap data dictionary",
    long_about = None
)]
pub struct Cli {
    /// Base data-dictionary CSV to update
    #[arg(short = 'c', long = "current")]
    pub current: PathBuf,
    /// Output CSV file (stdout if omitted)
    #[arg(short = 'o', long = "output")]
    pub output: Option<PathBuf>,
    /// Patch CSV files, applied in the order given
    #[arg(required = true)]
    pub patch_files: Vec<PathBuf>,
    /// Print a per-patch summary of overwritten and inserted fields
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
    /// Only overwrite existing fields; never insert new ones
    #[arg(long = "update-only")]
    pub update_only: bool,
    /// Keep the base dictionary's branching logic untouched
    #[arg(long = "skip-branching")]
    pub skip_branching: bool,
    /// Keep the base dictionary's section headers untouched
    #[arg(long = "skip-section-headers")]
    pub skip_section_headers: bool,
    /// Keep the base dictionary's field notes untouched
    #[arg(long = "skip-field-notes")]
    pub skip_field_notes: bool,
    /// Force nonstandard headers to the canonical column names positionally
    #[arg(long = "coerce-headers")]
    pub coerce_headers: bool,
    /// Write a JSON summary of every patch application
    #[arg(long = "report")]
    pub report: Option<PathBuf>,
    /// Character encoding of the input files (defaults to utf-8)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}
