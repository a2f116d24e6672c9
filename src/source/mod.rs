//! Workbook data sources.
//!
//! A [`DataSource`] produces a decoded [`Workbook`]. Two implementations
//! exist: [`sharepoint::RemoteWorkbookSource`] downloads the file from a
//! SharePoint site and [`local::LocalWorkbookSource`] reads it from disk.
//! [`cache::WorkbookCache`] sits in front of either one.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::{SourceConfig, SourceKind};
use crate::credentials::Credentials;
use crate::roster::workbook::{decode_workbook, PartialWorkbook, SheetNames, WorkbookError};
use crate::roster::Workbook;

pub mod cache;
pub mod local;
pub mod sharepoint;

/// Errors raised while fetching or decoding the workbook.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    /// HTTP transport failure.
    #[error("workbook download failed: {0}")]
    Http(#[from] reqwest::Error),
    /// The server answered with a non-success status.
    #[error("workbook server returned status {status}: {body}")]
    HttpStatus {
        /// HTTP status code.
        status: u16,
        /// Sanitised response body.
        body: String,
    },
    /// The server rejected the credentials.
    #[error("workbook server rejected credentials (status {status})")]
    Auth {
        /// 401 or 403.
        status: u16,
    },
    /// The workbook file does not exist.
    #[error("workbook file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// Reading a local file failed.
    #[error("cannot read {}: {source}", path.display())]
    Io {
        /// File being read.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },
    /// The bytes are not a usable workbook.
    #[error(transparent)]
    Decode(#[from] WorkbookError),
    /// One fetch attempt exceeded its deadline.
    #[error("workbook fetch timed out after {}s", .0.as_secs())]
    Timeout(Duration),
    /// The blocking decode task panicked or was cancelled.
    #[error("workbook decode task failed: {0}")]
    Worker(String),
    /// The source cannot be built from the current configuration.
    #[error("data source misconfigured: {0}")]
    Config(String),
}

impl SourceError {
    /// Whether a retry could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Http(_) | Self::Timeout(_) => true,
            Self::HttpStatus { status, .. } => *status == 429 || *status >= 500,
            Self::Auth { .. }
            | Self::NotFound(_)
            | Self::Io { .. }
            | Self::Decode(_)
            | Self::Worker(_)
            | Self::Config(_) => false,
        }
    }
}

/// Something that can produce the participant workbook.
#[async_trait]
pub trait DataSource: Send + Sync {
    /// Fetch and decode the workbook.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError`] on transport, auth, file, or decode failure.
    async fn fetch(&self) -> Result<Workbook, SourceError>;

    /// Human-readable location, for logs and `check` output.
    fn describe(&self) -> String;
}

/// Run `work` on tokio's blocking pool.
async fn off_runtime<T, F>(work: F) -> Result<T, SourceError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SourceError> + Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| SourceError::Worker(e.to_string()))?
}

/// Decode workbook bytes without stalling the async workers; unzipping and
/// XML parsing never yield.
async fn decode_blocking(bytes: Vec<u8>, sheets: &SheetNames) -> Result<PartialWorkbook, SourceError> {
    let sheets = sheets.clone();
    off_runtime(move || Ok(decode_workbook(bytes, &sheets)?)).await
}

/// Build the configured data source.
///
/// # Errors
///
/// Returns [`SourceError::Config`] when a SharePoint source lacks its site,
/// file path, or credentials.
pub fn build_source(
    config: &SourceConfig,
    credentials: &Credentials,
) -> Result<Arc<dyn DataSource>, SourceError> {
    match config.kind {
        SourceKind::Local => Ok(Arc::new(local::LocalWorkbookSource::new(
            config.local_workbook.clone(),
            config.context_dir.clone(),
            config.sheets.clone(),
        ))),
        SourceKind::Sharepoint => {
            let site = config
                .site_url
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| SourceError::Config("source.site_url is not set".to_owned()))?;
            let file = config
                .file_path
                .as_deref()
                .filter(|s| !s.trim().is_empty())
                .ok_or_else(|| SourceError::Config("source.file_path is not set".to_owned()))?;
            let auth = sharepoint::SourceAuth::from_credentials(credentials).ok_or_else(|| {
                SourceError::Config(
                    "set SHAREPOINT_ACCESS_TOKEN or MICROSOFT_ACCOUNT and MICROSOFT_PASSWORD"
                        .to_owned(),
                )
            })?;
            let source =
                sharepoint::RemoteWorkbookSource::new(site, file, auth, config.sheets.clone())?;
            Ok(Arc::new(source))
        }
    }
}
