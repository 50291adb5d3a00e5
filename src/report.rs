//! JSON merge report written by `--report`.

use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::Serialize;

use crate::merge::MergeOutcome;

#[derive(Debug, Serialize)]
pub struct PatchSummary {
    pub patch: PathBuf,
    pub overwritten: Vec<String>,
    pub inserted: Vec<String>,
    pub skipped: Vec<String>,
}

#[derive(Debug, Default, Serialize)]
pub struct MergeReport {
    pub patches: Vec<PatchSummary>,
}

impl MergeReport {
    pub fn record(&mut self, patch: &Path, outcome: &MergeOutcome) {
        self.patches.push(PatchSummary {
            patch: patch.to_path_buf(),
            overwritten: outcome.overwritten.clone(),
            inserted: outcome.inserted.clone(),
            skipped: outcome.skipped.clone(),
        });
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let file =
            File::create(path).with_context(|| format!("Creating report file {path:?}"))?;
        serde_json::to_writer_pretty(BufWriter::new(file), self)
            .with_context(|| format!("Serializing merge report to {path:?}"))?;
        Ok(())
    }
}
