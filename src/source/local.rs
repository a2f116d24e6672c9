//! Workbook read from the local filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info};

use crate::roster::workbook::SheetNames;
use crate::roster::Workbook;

use super::{decode_blocking, DataSource, SourceError};

/// Fallback file for the company context blob.
pub const COMPANY_CONTEXT_FILE: &str = "company_context.txt";
/// Fallback file for the role glossary blob.
pub const ROLE_DEFINITIONS_FILE: &str = "role_definition.txt";

/// Local `.xlsx` source.
///
/// Context sheets missing from the workbook are read from text files in
/// `context_dir`; missing files give empty text.
#[derive(Debug, Clone)]
pub struct LocalWorkbookSource {
    path: PathBuf,
    context_dir: PathBuf,
    sheets: SheetNames,
}

impl LocalWorkbookSource {
    /// Create a source for `path`.
    pub fn new(path: PathBuf, context_dir: PathBuf, sheets: SheetNames) -> Self {
        Self {
            path,
            context_dir,
            sheets,
        }
    }
}

#[async_trait]
impl DataSource for LocalWorkbookSource {
    async fn fetch(&self) -> Result<Workbook, SourceError> {
        let bytes = tokio::fs::read(&self.path).await.map_err(|e| match e.kind() {
            ErrorKind::NotFound => SourceError::NotFound(self.path.clone()),
            _ => SourceError::Io {
                path: self.path.clone(),
                source: e,
            },
        })?;
        let partial = decode_blocking(bytes, &self.sheets).await?;

        let company_context = match partial.company_context {
            Some(text) => text,
            None => read_fallback(&self.context_dir.join(COMPANY_CONTEXT_FILE)).await?,
        };
        let role_definitions = match partial.role_definitions {
            Some(text) => text,
            None => read_fallback(&self.context_dir.join(ROLE_DEFINITIONS_FILE)).await?,
        };

        info!(
            path = %self.path.display(),
            participants = partial.participants.len(),
            "loaded local workbook"
        );
        Ok(Workbook {
            participants: partial.participants,
            company_context,
            role_definitions,
        })
    }

    fn describe(&self) -> String {
        format!("local file {}", self.path.display())
    }
}

async fn read_fallback(path: &Path) -> Result<String, SourceError> {
    match tokio::fs::read_to_string(path).await {
        Ok(text) => {
            debug!(path = %path.display(), "context sheet missing, using text file");
            Ok(text.trim().to_owned())
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "context sheet and text file missing, using empty text");
            Ok(String::new())
        }
        Err(e) => Err(SourceError::Io {
            path: path.to_path_buf(),
            source: e,
        }),
    }
}
