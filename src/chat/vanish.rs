//! Vanish tracking: which players are invisible, and what the relay shows
//! for them.
//!
//! A vanished player's chat and presence lines are suppressed. The vanish
//! and unvanish markers themselves are rewritten into ordinary
//! "left the game" / "joined the game" lines so the channel sees a plausible
//! departure and return.
//!
//! Each vanish mod has its own marker format; [`VanishConvention`] is the
//! seam, with one implementation per mod.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use regex::Regex;
use tracing::{info, warn};

use super::classifier::USERNAME_PATTERN;
use super::{ChatError, ChatEvent};

/// A vanish or unvanish announcement for one player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VanishMarker {
    /// Player name as written in the marker.
    pub username: String,
    /// `true` when the player went invisible, `false` when they reappeared.
    pub vanished: bool,
}

impl VanishMarker {
    /// The join/leave line shown in place of the marker.
    pub fn synthetic_line(&self) -> String {
        if self.vanished {
            format!("{} left the game", self.username)
        } else {
            format!("{} joined the game", self.username)
        }
    }
}

/// Marker format of one vanish mod.
pub trait VanishConvention: Send + Sync {
    /// Short identifier used in logs.
    fn name(&self) -> &str;

    /// Player named by a vanish or unvanish marker, if `body` is one.
    fn extract_username(&self, body: &str) -> Option<String>;

    /// Whether `body` announces a player vanishing.
    fn is_vanished(&self, body: &str) -> bool;

    /// Whether `body` announces a player reappearing.
    fn is_unvanished(&self, body: &str) -> bool;

    /// Recognize a marker in `body`.
    fn match_marker(&self, body: &str) -> Option<VanishMarker> {
        let username = self.extract_username(body)?;
        if self.is_vanished(body) {
            Some(VanishMarker {
                username,
                vanished: true,
            })
        } else if self.is_unvanished(body) {
            Some(VanishMarker {
                username,
                vanished: false,
            })
        } else {
            None
        }
    }
}

/// Vanishmod by MasterPerki (<https://www.curseforge.com/minecraft/mc-mods/vanishmod>).
///
/// Markers look like `[Steve: [Vanishmod] Steve vanished]`.
#[derive(Debug, Clone)]
pub struct MasterPerkiVanishmod {
    vanished: Regex,
    unvanished: Regex,
}

impl MasterPerkiVanishmod {
    /// Compile the marker patterns.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if a pattern fails to compile.
    pub fn new() -> Result<Self, ChatError> {
        let vanished = Regex::new(&format!(
            r"^\[({u}): \[Vanishmod\] {u} vanished\]$",
            u = USERNAME_PATTERN
        ))?;
        let unvanished = Regex::new(&format!(
            r"^\[({u}): \[Vanishmod\] {u} unvanished\]$",
            u = USERNAME_PATTERN
        ))?;
        Ok(Self {
            vanished,
            unvanished,
        })
    }
}

impl VanishConvention for MasterPerkiVanishmod {
    fn name(&self) -> &str {
        "vanishmod-masterperki"
    }

    fn extract_username(&self, body: &str) -> Option<String> {
        [&self.vanished, &self.unvanished]
            .into_iter()
            .find_map(|pattern| pattern.captures(body))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().to_owned())
    }

    fn is_vanished(&self, body: &str) -> bool {
        self.vanished.is_match(body)
    }

    fn is_unvanished(&self, body: &str) -> bool {
        self.unvanished.is_match(body)
    }
}

/// Failure to persist the vanished set.
#[derive(Debug, thiserror::Error)]
pub enum VanishStoreError {
    /// The snapshot could not be written.
    #[error("failed to write vanished players to {}: {source}", path.display())]
    Write {
        /// Storage file.
        path: PathBuf,
        /// Underlying I/O failure.
        #[source]
        source: io::Error,
    },
    /// The set could not be encoded.
    #[error("failed to encode vanished players: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Case-insensitive set of vanished players backed by a JSON array file.
///
/// Every mutation rewrites the whole file, so it always holds a complete
/// snapshot of the in-memory set.
#[derive(Debug, Clone)]
pub struct VanishStore {
    path: PathBuf,
    players: BTreeSet<String>,
}

impl VanishStore {
    /// Load the set from `path`.
    ///
    /// A missing file yields an empty set. A corrupt file, or one that is not
    /// an array of strings, is logged and also yields an empty set; it gets
    /// overwritten on the first mutation.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let players = read_players(&path);
        Self { path, players }
    }

    /// Storage file location.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether `username` is vanished (case-insensitive).
    pub fn contains(&self, username: &str) -> bool {
        self.players.contains(&username.to_lowercase())
    }

    /// Vanished players, lowercase, sorted.
    pub fn players(&self) -> impl Iterator<Item = &str> {
        self.players.iter().map(String::as_str)
    }

    /// Number of vanished players.
    pub fn len(&self) -> usize {
        self.players.len()
    }

    /// Whether nobody is vanished.
    pub fn is_empty(&self) -> bool {
        self.players.is_empty()
    }

    /// Add a player and persist.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written. The in-memory set
    /// is updated regardless.
    pub fn insert(&mut self, username: &str) -> Result<(), VanishStoreError> {
        self.players.insert(username.to_lowercase());
        self.persist()
    }

    /// Remove a player and persist.
    ///
    /// Returns `Ok(false)` without touching the file when the player was not
    /// vanished.
    ///
    /// # Errors
    ///
    /// Returns an error if the snapshot cannot be written.
    pub fn remove(&mut self, username: &str) -> Result<bool, VanishStoreError> {
        if !self.players.remove(&username.to_lowercase()) {
            return Ok(false);
        }
        self.persist()?;
        Ok(true)
    }

    fn persist(&self) -> Result<(), VanishStoreError> {
        let snapshot: Vec<&str> = self.players().collect();
        let json = serde_json::to_string(&snapshot)?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|source| VanishStoreError::Write {
                path: self.path.clone(),
                source,
            })?;
        }
        fs::write(&self.path, json).map_err(|source| VanishStoreError::Write {
            path: self.path.clone(),
            source,
        })
    }
}

fn read_players(path: &Path) -> BTreeSet<String> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            info!(path = %path.display(), "vanished players file does not exist yet");
            return BTreeSet::new();
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read vanished players file");
            return BTreeSet::new();
        }
    };

    match serde_json::from_str::<Vec<String>>(&contents) {
        Ok(names) => names.iter().map(|name| name.to_lowercase()).collect(),
        Err(e) => {
            warn!(
                path = %path.display(),
                error = %e,
                "vanished players file is corrupt or not a list of names, starting empty"
            );
            BTreeSet::new()
        }
    }
}

/// The vanish state machine.
pub struct VanishHandler {
    store: VanishStore,
    convention: Box<dyn VanishConvention>,
}

impl std::fmt::Debug for VanishHandler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VanishHandler")
            .field("store", &self.store)
            .field("convention", &self.convention.name())
            .finish()
    }
}

impl VanishHandler {
    /// Build a handler over `store` using one mod's marker format.
    pub fn new(store: VanishStore, convention: Box<dyn VanishConvention>) -> Self {
        Self { store, convention }
    }

    /// Handler for Vanishmod (MasterPerki) persisting to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`ChatError::Pattern`] if the marker patterns fail to compile.
    pub fn master_perki(path: impl Into<PathBuf>) -> Result<Self, ChatError> {
        Ok(Self::new(
            VanishStore::load(path),
            Box::new(MasterPerkiVanishmod::new()?),
        ))
    }

    /// The persistent vanished set.
    pub fn store(&self) -> &VanishStore {
        &self.store
    }

    /// The active marker format.
    pub fn convention(&self) -> &dyn VanishConvention {
        self.convention.as_ref()
    }

    /// Whether lines attributed to `username` are hidden.
    pub fn is_suppressed(&self, username: &str) -> bool {
        self.store.contains(username)
    }

    /// Decide what a classified body turns into.
    ///
    /// With a known username the line passes unless that player is vanished.
    /// Without one the body is tested for vanish markers, which update the
    /// set; anything else is server noise.
    pub fn dispose(&mut self, body: &str, username: Option<&str>) -> ChatEvent {
        if let Some(username) = username {
            if self.is_suppressed(username) {
                info!(player = %username, "skipping message from vanished player");
                return ChatEvent::NoEvent;
            }
            return ChatEvent::PlayerMessage {
                text: body.to_owned(),
                username: Some(username.to_owned()),
            };
        }

        match self.convention.match_marker(body) {
            Some(marker) => {
                self.apply(&marker);
                ChatEvent::VanishMarker(marker)
            }
            None => ChatEvent::NoEvent,
        }
    }

    /// Outward text for a body: the body itself, a synthetic join/leave line,
    /// or an empty string when the line is suppressed.
    pub fn process(&mut self, body: &str, username: Option<&str>) -> String {
        match self.dispose(body, username) {
            ChatEvent::PlayerMessage { text, .. } => text,
            ChatEvent::VanishMarker(marker) => marker.synthetic_line(),
            ChatEvent::NoEvent | ChatEvent::ServerStatusChanged(_) => String::new(),
        }
    }

    /// Record a marker in the persistent set.
    ///
    /// Storage failures are logged; the in-memory set stays authoritative.
    pub fn apply(&mut self, marker: &VanishMarker) {
        if marker.vanished {
            if let Err(e) = self.store.insert(&marker.username) {
                warn!(player = %marker.username, error = %e, "failed to persist vanish");
            }
            info!(player = %marker.username, "player vanished");
            return;
        }

        match self.store.remove(&marker.username) {
            Ok(true) => info!(player = %marker.username, "player unvanished"),
            Ok(false) => warn!(player = %marker.username, "player is not vanished"),
            Err(e) => warn!(player = %marker.username, error = %e, "failed to persist unvanish"),
        }
    }
}
