use std::fs;
use std::path::Path;

use log::{info, warn};
use secrecy::SecretString;

use super::{Result, VaultError};

/// Reads a password from the first line of `path`.
///
/// Warns when the file is readable by group or others. With `remove_after`
/// the file is deleted once the password has been read.
pub fn read_password_file(path: &str, remove_after: bool) -> Result<SecretString> {
    let expanded = expand_home(path);
    let file_path = Path::new(&expanded);

    warn_if_exposed(file_path);

    let content = fs::read_to_string(file_path).map_err(|e| VaultError::PasswordFile {
        path: expanded.clone(),
        source: e,
    })?;

    let password = content
        .lines()
        .next()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty())
        .ok_or_else(|| VaultError::EmptyPasswordFile(expanded.clone()))?
        .to_string();

    if remove_after {
        match fs::remove_file(file_path) {
            Ok(()) => info!("Removed password file {}", expanded),
            Err(e) => warn!("Could not remove password file {}: {}", expanded, e),
        }
    }

    Ok(SecretString::from(password))
}

#[cfg(unix)]
fn warn_if_exposed(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    if let Ok(metadata) = fs::metadata(path) {
        let mode = metadata.permissions().mode();
        if mode & 0o077 != 0 {
            warn!(
                "Password file {} is accessible by other users (mode {:o}); consider chmod 600",
                path.display(),
                mode & 0o777
            );
        }
    }
}

#[cfg(not(unix))]
fn warn_if_exposed(_path: &Path) {}

/// Expands `~` to the user's home directory.
///
/// Checks HOME (Unix) then USERPROFILE (Windows). `~user/path` is not supported.
pub fn expand_home(path: &str) -> String {
    if path == "~" || path.starts_with("~/") {
        if let Some(home) = std::env::var_os("HOME").or_else(|| std::env::var_os("USERPROFILE")) {
            if path == "~" {
                return home.to_string_lossy().into_owned();
            }
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    path.to_string()
}
