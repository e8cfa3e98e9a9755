//! Secret loading from the runtime `.env` file.
//!
//! The bot token and RCON password are looked up by the variable names the
//! config points at. The `.env` file wins over the process environment.

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::Context;
use tracing::debug;

/// Bot token and console password, keyed by variable name.
#[derive(Clone, Default)]
pub struct Credentials {
    secrets: BTreeMap<String, String>,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.keys().collect();
        f.debug_struct("Credentials")
            .field("names", &names)
            .field("secrets", &"[REDACTED]")
            .finish()
    }
}

impl Credentials {
    /// Wrap an already-parsed set of secrets.
    pub fn from_map(secrets: BTreeMap<String, String>) -> Self {
        Self { secrets }
    }

    /// Value for `key` from the file, if present.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.secrets.get(key).map(String::as_str)
    }

    /// Value for `key` from the file, falling back to `env`.
    ///
    /// Empty values count as missing.
    pub fn lookup(&self, key: &str, env: impl Fn(&str) -> Option<String>) -> Option<String> {
        let value = match self.get(key) {
            Some(value) => Some(value.to_owned()),
            None => env(key),
        };
        value.filter(|v| !v.trim().is_empty())
    }

    /// Secret the relay cannot start without.
    ///
    /// # Errors
    ///
    /// Returns an error naming `key` when it is missing or empty both in the
    /// file and in the process environment.
    pub fn require(&self, key: &str) -> anyhow::Result<String> {
        self.lookup(key, |name| std::env::var(name).ok())
            .with_context(|| format!("{key} is not set in .env or the environment"))
    }

    /// Names of the secrets read from the file.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.secrets.keys().map(String::as_str)
    }
}

/// Read secrets from a `.env` file.
///
/// A missing file yields empty credentials so secrets may come from the
/// process environment alone.
///
/// # Errors
///
/// Returns an error if the file is readable by group or others, or a line
/// cannot be parsed.
pub fn load_credentials(path: &Path) -> anyhow::Result<Credentials> {
    if !path.exists() {
        debug!(path = %path.display(), "no .env file, secrets come from the environment");
        return Ok(Credentials::default());
    }

    ensure_owner_only(path)?;

    let secrets = dotenvy::from_path_iter(path)
        .with_context(|| format!("cannot open {}", path.display()))?
        .collect::<Result<BTreeMap<_, _>, _>>()
        .with_context(|| format!("malformed line in {}", path.display()))?;

    debug!(path = %path.display(), count = secrets.len(), "secrets loaded");
    Ok(Credentials { secrets })
}

#[cfg(unix)]
fn ensure_owner_only(path: &Path) -> anyhow::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)
        .with_context(|| format!("cannot stat {}", path.display()))?
        .permissions()
        .mode();
    anyhow::ensure!(
        mode & 0o077 == 0,
        "{} holds secrets and must be 0600, found {:o}",
        path.display(),
        mode & 0o777
    );
    Ok(())
}

#[cfg(not(unix))]
fn ensure_owner_only(_path: &Path) -> anyhow::Result<()> {
    Ok(())
}
