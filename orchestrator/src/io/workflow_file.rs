//! Reading workflow documents from disk.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::Path;

use tracing::debug;

use crate::core::parser::{WorkflowDocument, parse_document};
use crate::error::WorkflowError;

/// Read a workflow file as UTF-8 text.
pub fn read_workflow(path: &Path) -> Result<String, WorkflowError> {
    if !path.is_file() {
        return Err(WorkflowError::FileNotFound {
            path: path.to_path_buf(),
        });
    }
    fs::read_to_string(path).map_err(|source| match source.kind() {
        IoErrorKind::NotFound => WorkflowError::FileNotFound {
            path: path.to_path_buf(),
        },
        _ => WorkflowError::FileUnreadable {
            path: path.to_path_buf(),
            source,
        },
    })
}

/// Read and parse a workflow file.
pub fn load_document(path: &Path) -> Result<WorkflowDocument, WorkflowError> {
    let text = read_workflow(path)?;
    debug!(path = %path.display(), bytes = text.len(), "read workflow file");
    parse_document(&text)
}
