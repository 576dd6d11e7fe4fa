//! Credential pair storage.
//!
//! The [`TokenStore`] trait is the only way the client reads or writes the
//! access/refresh pair, so the persistence mechanism can be swapped without
//! touching the refresh pipeline.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use serde::{Deserialize, Serialize};

/// The current access/refresh token pair.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

impl TokenPair {
    pub fn new(access_token: impl Into<String>, refresh_token: impl Into<String>) -> Self {
        Self {
            access_token: access_token.into(),
            refresh_token: refresh_token.into(),
        }
    }
}

impl fmt::Debug for TokenPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenPair")
            .field("access_token", &"<redacted>")
            .field("refresh_token", &"<redacted>")
            .finish()
    }
}

/// Persistence for the credential pair.
///
/// Implementations must replace both tokens together in [`TokenStore::save`].
pub trait TokenStore: Send + Sync {
    /// Returns the current pair, if any.
    fn load(&self) -> Option<TokenPair>;

    /// Replaces the current pair.
    fn save(&self, pair: &TokenPair) -> io::Result<()>;

    /// Removes the current pair.
    fn clear(&self) -> io::Result<()>;

    /// Returns the current access token.
    fn access_token(&self) -> Option<String> {
        self.load().map(|pair| pair.access_token)
    }

    /// Returns the current refresh token.
    fn refresh_token(&self) -> Option<String> {
        self.load().map(|pair| pair.refresh_token)
    }
}

/// In-memory store, used by tests and short-lived processes.
#[derive(Debug, Default)]
pub struct MemoryTokenStore {
    pair: RwLock<Option<TokenPair>>,
}

impl MemoryTokenStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store that already holds `pair`.
    pub fn with_pair(pair: TokenPair) -> Self {
        Self {
            pair: RwLock::new(Some(pair)),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.pair
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn save(&self, pair: &TokenPair) -> io::Result<()> {
        *self
            .pair
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(pair.clone());
        Ok(())
    }

    fn clear(&self) -> io::Result<()> {
        *self
            .pair
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = None;
        Ok(())
    }
}

/// Stores the pair as a JSON document on disk, with an in-memory copy for reads.
#[derive(Debug)]
pub struct FileTokenStore {
    path: PathBuf,
    cached: MemoryTokenStore,
}

impl FileTokenStore {
    /// Opens the store at `path`, reading an existing pair if the file is present.
    ///
    /// An unreadable or malformed file is treated as "no session" and logged.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let cached = match read_pair(&path) {
            Ok(Some(pair)) => MemoryTokenStore::with_pair(pair),
            Ok(None) => MemoryTokenStore::new(),
            Err(err) => {
                log::warn!(
                    "Ignoring unreadable token file {}: {}",
                    path.display(),
                    err
                );
                MemoryTokenStore::new()
            }
        };
        Self { path, cached }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_pair(path: &Path) -> io::Result<Option<TokenPair>> {
    match fs::read(path) {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err)),
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err),
    }
}

impl TokenStore for FileTokenStore {
    fn load(&self) -> Option<TokenPair> {
        self.cached.load()
    }

    fn save(&self, pair: &TokenPair) -> io::Result<()> {
        let json = serde_json::to_vec_pretty(pair)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        // The rename swaps both tokens at once.
        let staging = self.path.with_extension("tmp");
        fs::write(&staging, json)?;
        fs::rename(&staging, &self.path)?;
        self.cached.save(pair)
    }

    fn clear(&self) -> io::Result<()> {
        match fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => return Err(err),
        }
        self.cached.clear()
    }
}
