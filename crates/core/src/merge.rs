//! Sequential document concatenation.
//!
//! Inputs that are encrypted or fail to open are recorded and skipped; the
//! merge fails only when no pages could be collected at all. The merged
//! output lives in a scoped temp file owned by whoever adopts the outcome.

use inkmark_engine::{DocumentEngine, EngineError, OpenSource, SerializeOptions};
use std::path::{Path, PathBuf};
use tempfile::TempPath;

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no pages could be collected from the inputs")]
    NoPages,
    #[error("merge output could not be written: {0}")]
    Serialize(#[source] EngineError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

/// Result of a successful merge. Dropping `output` deletes the temp file, so
/// the adopter (normally the session) keeps it alive until superseded.
#[derive(Debug)]
pub struct MergeOutcome {
    pub output: TempPath,
    pub page_count: u32,
    pub merged: Vec<String>,
    pub skipped: Vec<String>,
}

fn display_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

/// Append all pages of each readable input, in input order, into one new
/// document and serialize it to a fresh temp file.
pub fn merge(
    engine: &mut dyn DocumentEngine,
    paths: &[PathBuf],
) -> Result<MergeOutcome, MergeError> {
    let dst = engine.create()?;
    let mut page_count = 0;
    let mut merged = Vec::new();
    let mut skipped = Vec::new();

    for path in paths {
        let name = display_name(path);
        let src = match engine.open(OpenSource::from(path.as_path())) {
            Ok(handle) => handle,
            Err(err) => {
                log::warn!("skipping {name}: {err}");
                skipped.push(name);
                continue;
            }
        };

        match engine.append_pages(dst, src) {
            Ok(appended) => {
                page_count += appended;
                merged.push(name);
            }
            Err(err) => {
                log::warn!("skipping {name}: {err}");
                skipped.push(name);
            }
        }

        let _ = engine.close(src);
    }

    if page_count == 0 {
        let _ = engine.close(dst);
        return Err(MergeError::NoPages);
    }

    let output = tempfile::Builder::new()
        .prefix("inkmark-merge-")
        .suffix(".pdf")
        .tempfile()?
        .into_temp_path();

    let result = engine.serialize(dst, &output, SerializeOptions::default());
    let _ = engine.close(dst);
    result.map_err(MergeError::Serialize)?;

    Ok(MergeOutcome { output, page_count, merged, skipped })
}
