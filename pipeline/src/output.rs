//! Delimited-text rendering of a similarity matrix.
//!
//! The first header cell is empty; the remaining header cells and the
//! first cell of each row are the entity identifiers in matrix order.

use std::fmt::Write as _;
use std::path::Path;

use tokio::fs;
use tracing::info;

use crate::config::OutputConfig;
use crate::error::{PipelineError, Result};
use crate::matrix::SimilarityMatrix;

/// Render `matrix` as delimited text.
pub fn render(matrix: &SimilarityMatrix, delimiter: char, precision: Option<usize>) -> String {
    let mut out = String::new();

    for label in matrix.labels() {
        out.push(delimiter);
        push_field(&mut out, label, delimiter);
    }
    out.push('\n');

    for (label, values) in matrix.rows() {
        push_field(&mut out, label, delimiter);
        for value in values {
            out.push(delimiter);
            // Writing into a String cannot fail.
            let _ = match precision {
                Some(precision) => write!(out, "{value:.precision$}"),
                None => write!(out, "{value:?}"),
            };
        }
        out.push('\n');
    }

    out
}

/// Write `matrix` to `config.path`, replacing any previous file.
///
/// The document is written to a sibling temporary file and renamed into
/// place, so a failed run never leaves a partial matrix behind.
pub async fn write_matrix(matrix: &SimilarityMatrix, config: &OutputConfig) -> Result<()> {
    let path = config.path.as_path();
    let document = render(matrix, config.delimiter, config.precision);

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .await
            .map_err(|e| PipelineError::io(parent, e))?;
    }

    let tmp_path = tmp_path_for(path);
    fs::write(&tmp_path, document.as_bytes())
        .await
        .map_err(|e| PipelineError::io(&tmp_path, e))?;
    if let Err(e) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(PipelineError::io(path, e));
    }

    info!(
        path = %path.display(),
        entities = matrix.len(),
        "wrote similarity matrix"
    );
    Ok(())
}

fn tmp_path_for(path: &Path) -> std::path::PathBuf {
    let mut name = path
        .file_name()
        .map(std::ffi::OsStr::to_os_string)
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn push_field(out: &mut String, field: &str, delimiter: char) {
    let needs_quotes = field.contains(delimiter) || field.contains(['"', '\n', '\r']);
    if needs_quotes {
        out.push('"');
        out.push_str(&field.replace('"', "\"\""));
        out.push('"');
    } else {
        out.push_str(field);
    }
}
