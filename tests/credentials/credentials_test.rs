//! `.env` loading and environment overlay.

use std::collections::HashMap;
use std::fs;

use fortune_booth::credentials::{load_credentials, load_credentials_with, ENV_FILE_VAR};

fn private_env_file(dir: &std::path::Path, contents: &str) -> std::path::PathBuf {
    let path = dir.join(".env");
    fs::write(&path, contents).expect("write env file");
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(&path, fs::Permissions::from_mode(0o600)).expect("chmod");
    }
    path
}

#[test]
fn env_file_is_parsed() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = private_env_file(
        dir.path(),
        "GEMINI_API_KEY=file-key\n# comment\nMICROSOFT_ACCOUNT=\"me@corp\"\n",
    );
    let creds = load_credentials(&path).expect("load");
    assert_eq!(creds.get("GEMINI_API_KEY"), Some("file-key"));
    assert_eq!(creds.get("MICROSOFT_ACCOUNT"), Some("me@corp"));
    let rendered = format!("{creds:?}");
    assert!(!rendered.contains("file-key"));
}

#[cfg(unix)]
#[test]
fn world_readable_env_file_is_rejected() {
    use std::os::unix::fs::PermissionsExt;

    let dir = tempfile::tempdir().expect("tempdir");
    let path = private_env_file(dir.path(), "GEMINI_API_KEY=k\n");
    fs::set_permissions(&path, fs::Permissions::from_mode(0o644)).expect("chmod");
    assert!(load_credentials(&path).is_err());
}

#[test]
fn process_environment_overrides_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = private_env_file(dir.path(), "GEMINI_API_KEY=file-key\nOPENAI_API_KEY=file-openai\n");
    let env: HashMap<String, String> = HashMap::from([
        (ENV_FILE_VAR.to_owned(), path.display().to_string()),
        ("GEMINI_API_KEY".to_owned(), "env-key".to_owned()),
    ]);

    let creds = load_credentials_with(|key| env.get(key).cloned()).expect("load");
    assert_eq!(creds.get("GEMINI_API_KEY"), Some("env-key"));
    assert_eq!(creds.get("OPENAI_API_KEY"), Some("file-openai"));
}

#[test]
fn missing_env_file_falls_back_to_environment() {
    let dir = tempfile::tempdir().expect("tempdir");
    let env: HashMap<String, String> = HashMap::from([
        (
            ENV_FILE_VAR.to_owned(),
            dir.path().join("absent.env").display().to_string(),
        ),
        ("SHAREPOINT_ACCESS_TOKEN".to_owned(), "tok".to_owned()),
    ]);
    let creds = load_credentials_with(|key| env.get(key).cloned()).expect("load");
    assert_eq!(creds.get("SHAREPOINT_ACCESS_TOKEN"), Some("tok"));
    assert!(creds.require("GEMINI_API_KEY").is_err());
}
