//! Secrets for the model provider and SharePoint.
//!
//! Read from an optional owner-only `.env` file, then overlaid with the
//! process environment for the keys in [`KNOWN_KEYS`].

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use tracing::debug;

/// Environment variable naming an alternative `.env` path.
pub const ENV_FILE_VAR: &str = "FORTUNE_ENV_FILE";

/// Keys read from the process environment in addition to the `.env` file.
pub const KNOWN_KEYS: [&str; 5] = [
    "GEMINI_API_KEY",
    "OPENAI_API_KEY",
    "SHAREPOINT_ACCESS_TOKEN",
    "MICROSOFT_ACCOUNT",
    "MICROSOFT_PASSWORD",
];

/// Loaded secrets. `Debug` prints key names only.
#[derive(Clone, Default)]
pub struct Credentials {
    vars: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("keys", &self.vars.keys().collect::<Vec<_>>())
            .field("values", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Wrap an already loaded map.
    pub fn from_map(vars: BTreeMap<String, String>) -> Self {
        Self { vars }
    }

    /// Value for `key`, blank or not.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.vars.get(key).map(String::as_str)
    }

    /// Non-blank value for `key`.
    ///
    /// # Errors
    ///
    /// Names the key when it is absent or whitespace only.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.vars
            .get(key)
            .filter(|value| !value.trim().is_empty())
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("missing required credential: {key}"))
    }

    /// Overlay known keys from an environment resolver; resolved values win.
    pub fn merge_env(&mut self, env: impl Fn(&str) -> Option<String>) {
        for key in KNOWN_KEYS {
            if let Some(value) = env(key) {
                self.vars.insert(key.to_owned(), value);
            }
        }
    }
}

/// Read a dotenv file that only its owner can access.
///
/// # Errors
///
/// Fails when the file is missing, group or world accessible, or has a line
/// dotenvy cannot parse.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    anyhow::ensure!(path.exists(), "no credentials file at {}", path.display());
    ensure_owner_only(path)?;

    let entries = dotenvy::from_path_iter(path)
        .with_context(|| format!("cannot open credentials file {}", path.display()))?;
    let vars = entries
        .collect::<Result<BTreeMap<_, _>, _>>()
        .with_context(|| format!("malformed line in credentials file {}", path.display()))?;

    Ok(Credentials { vars })
}

/// Load credentials the way the binary does: the `.env` file named by
/// `$FORTUNE_ENV_FILE` (or `./.env`) when it exists, overlaid with the
/// process environment.
///
/// # Errors
///
/// Returns an error when an existing credentials file is invalid.
pub fn load_default_credentials() -> anyhow::Result<Credentials> {
    load_credentials_with(|key| std::env::var(key).ok())
}

/// [`load_default_credentials`] with an injectable environment resolver.
///
/// # Errors
///
/// Returns an error when an existing credentials file is invalid.
pub fn load_credentials_with(
    env: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<Credentials> {
    let path = env(ENV_FILE_VAR).map_or_else(|| PathBuf::from(".env"), PathBuf::from);
    let mut credentials = if path.exists() {
        debug!(path = %path.display(), "loading credentials file");
        load_credentials(&path)?
    } else {
        debug!(path = %path.display(), "no credentials file, using environment only");
        Credentials::default()
    };
    credentials.merge_env(env);
    Ok(credentials)
}

#[cfg(unix)]
fn ensure_owner_only(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = fs::metadata(path)
        .with_context(|| format!("cannot stat credentials file {}", path.display()))?
        .permissions()
        .mode()
        & 0o777;
    anyhow::ensure!(
        mode & 0o077 == 0,
        "credentials file {} is mode {mode:o}; chmod it to 0600",
        path.display()
    );
    Ok(())
}

#[cfg(not(unix))]
fn ensure_owner_only(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
