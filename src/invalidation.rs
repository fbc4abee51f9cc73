//! Tracks the server data load time and decides when caches go stale.

use parking_lot::Mutex;
use std::fmt;

/// Opaque marker of the server's last data reload.
///
/// Only compared for equality, never parsed as a timestamp.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct LoadTimeToken(String);

impl LoadTimeToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for LoadTimeToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Holds the last observed load-time token
#[derive(Debug, Default)]
pub struct LoadTimeTracker {
    current: Mutex<LoadTimeToken>,
}

impl LoadTimeTracker {
    pub fn current(&self) -> LoadTimeToken {
        self.current.lock().clone()
    }

    /// Record a token seen in a server response.
    ///
    /// Returns true when the token differs from the stored one, in which case
    /// it replaces it and every cache must be cleared. Empty tokens are ignored.
    pub fn observe(&self, token: &str) -> bool {
        if token.is_empty() {
            return false;
        }
        let mut current = self.current.lock();
        if current.as_str() == token {
            return false;
        }
        tracing::info!(
            "WM server data reloaded (load time '{}' -> '{}'), clearing caches",
            current,
            token
        );
        *current = LoadTimeToken::new(token);
        true
    }
}
