//! Workbook downloaded from a SharePoint site through the REST file API.

use async_trait::async_trait;
use reqwest::StatusCode;
use tracing::{info, warn};
use url::Url;

use crate::credentials::Credentials;
use crate::providers::sanitize_http_error_body;
use crate::roster::workbook::SheetNames;
use crate::roster::Workbook;

use super::{decode_blocking, DataSource, SourceError};

/// How requests to SharePoint are authenticated.
#[derive(Clone, PartialEq, Eq)]
pub enum SourceAuth {
    /// `Authorization: Bearer <token>`.
    Bearer(String),
    /// HTTP basic auth with an account and password.
    ///
    /// On-premises SharePoint only. SharePoint Online refuses basic auth
    /// and needs a bearer token.
    Basic {
        /// Account name.
        username: String,
        /// Account password.
        password: String,
    },
}

impl std::fmt::Debug for SourceAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Bearer(_) => f.debug_tuple("Bearer").field(&"[REDACTED]").finish(),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

impl SourceAuth {
    /// Whether SharePoint Online accepts this scheme.
    pub fn works_with_sharepoint_online(&self) -> bool {
        matches!(self, Self::Bearer(_))
    }

    /// Pick auth from credentials: an access token wins over account/password.
    pub fn from_credentials(credentials: &Credentials) -> Option<Self> {
        let non_blank = |key: &str| {
            credentials
                .get(key)
                .filter(|v| !v.trim().is_empty())
                .map(str::to_owned)
        };
        if let Some(token) = non_blank("SHAREPOINT_ACCESS_TOKEN") {
            return Some(Self::Bearer(token));
        }
        match (non_blank("MICROSOFT_ACCOUNT"), non_blank("MICROSOFT_PASSWORD")) {
            (Some(username), Some(password)) => Some(Self::Basic { username, password }),
            _ => None,
        }
    }
}

/// SharePoint-hosted workbook.
#[derive(Debug, Clone)]
pub struct RemoteWorkbookSource {
    url: Url,
    auth: SourceAuth,
    sheets: SheetNames,
    client: reqwest::Client,
}

impl RemoteWorkbookSource {
    /// Create a source for `file_path` (server-relative) on `site_url`.
    ///
    /// # Errors
    ///
    /// Returns [`SourceError::Config`] if `site_url` is not a base URL.
    pub fn new(
        site_url: &str,
        file_path: &str,
        auth: SourceAuth,
        sheets: SheetNames,
    ) -> Result<Self, SourceError> {
        let url = download_url(site_url, file_path)?;
        if !auth.works_with_sharepoint_online() {
            warn!(
                host = url.host_str().unwrap_or_default(),
                "basic auth only works with on-premises SharePoint; set SHAREPOINT_ACCESS_TOKEN for SharePoint Online"
            );
        }
        Ok(Self {
            url,
            auth,
            sheets,
            client: reqwest::Client::new(),
        })
    }

    /// The download URL requests are sent to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

/// Build `{site}/_api/web/GetFileByServerRelativeUrl('{path}')/$value`.
///
/// Single quotes in the path are doubled for the OData string literal;
/// the rest is percent-encoded as URL path text.
///
/// # Errors
///
/// Returns [`SourceError::Config`] if `site_url` is not a base URL.
pub fn download_url(site_url: &str, file_path: &str) -> Result<Url, SourceError> {
    let mut url = Url::parse(site_url.trim())
        .map_err(|e| SourceError::Config(format!("invalid site url '{site_url}': {e}")))?;
    if url.cannot_be_a_base() {
        return Err(SourceError::Config(format!(
            "site url '{site_url}' cannot be a base"
        )));
    }
    let literal = file_path.trim().replace('\'', "''");
    let path = format!(
        "{}/_api/web/GetFileByServerRelativeUrl('{literal}')/$value",
        url.path().trim_end_matches('/')
    );
    url.set_path(&path);
    url.set_query(None);
    Ok(url)
}

#[async_trait]
impl DataSource for RemoteWorkbookSource {
    async fn fetch(&self) -> Result<Workbook, SourceError> {
        let request = self.client.get(self.url.clone());
        let request = match &self.auth {
            SourceAuth::Bearer(token) => request.bearer_auth(token),
            SourceAuth::Basic { username, password } => {
                request.basic_auth(username, Some(password))
            }
        };
        let response = request.send().await?;

        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(SourceError::Auth {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SourceError::HttpStatus {
                status: status.as_u16(),
                body: sanitize_http_error_body(&body),
            });
        }

        let bytes = response.bytes().await?.to_vec();
        let size = bytes.len();
        let workbook = decode_blocking(bytes, &self.sheets)
            .await?
            .require_blobs(&self.sheets)?;
        info!(
            url = %self.url,
            bytes = size,
            participants = workbook.participants.len(),
            "downloaded workbook"
        );
        Ok(workbook)
    }

    fn describe(&self) -> String {
        format!("sharepoint {}", self.url)
    }
}
