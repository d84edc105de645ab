//! Login sessions of the web front end.
//!
//! Sessions live in memory only; restarting the process logs everyone out.

use parking_lot::RwLock;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

pub mod error {
    use thiserror::Error;

    #[derive(Debug, Error, PartialEq, Eq)]
    pub enum SessionError {
        #[error("Wrong password, {remaining} attempts left")]
        WrongPassword { remaining: u32 },

        #[error("Too many failed login attempts")]
        TooManyAttempts,

        #[error("Session tracker is closed")]
        Closed,
    }
}

use error::SessionError;

pub const SESSION_COOKIE_NAME: &str = "RelaySessionID";

/// Wrong passwords tolerated before the tracker locks for good.
pub const MAX_LOGIN_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SameSite {
    Strict,
    Lax,
    None,
}

impl fmt::Display for SameSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SameSite::Strict => write!(f, "Strict"),
            SameSite::Lax => write!(f, "Lax"),
            SameSite::None => write!(f, "None"),
        }
    }
}

/// Cookie the HTTP layer sets on the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionCookie {
    pub name: &'static str,
    pub value: String,
    pub path: &'static str,
    /// `None` together with `expired` tells the client to drop the cookie.
    pub max_age: Option<Duration>,
    pub expired: bool,
    pub http_only: bool,
    pub same_site: SameSite,
}

impl SessionCookie {
    fn new(value: String, max_age: Option<Duration>) -> Self {
        Self {
            name: SESSION_COOKIE_NAME,
            expired: max_age.is_none(),
            value,
            path: "/",
            max_age,
            http_only: true,
            same_site: SameSite::Lax,
        }
    }

    /// Renders the value of a `Set-Cookie` header.
    pub fn header_value(&self) -> String {
        let max_age = match self.max_age {
            Some(max_age) if !self.expired => max_age.as_secs(),
            _ => 0,
        };
        let mut header = format!(
            "{}={}; Path={}; Max-Age={}",
            self.name, self.value, self.path, max_age
        );
        if self.http_only {
            header.push_str("; HttpOnly");
        }
        header.push_str(&format!("; SameSite={}", self.same_site));
        header
    }
}

/// Set of live session tokens.
pub struct SessionTracker {
    sessions: RwLock<HashSet<String>>,
    max_age: Duration,
    closed: AtomicBool,
}

impl SessionTracker {
    pub fn new(max_age: Duration) -> Self {
        Self {
            sessions: RwLock::new(HashSet::new()),
            max_age,
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a session and returns the cookie carrying its token.
    ///
    /// Returns `Err(Closed)` once the tracker has been closed.
    pub fn issue(&self) -> Result<SessionCookie, SessionError> {
        if self.is_closed() {
            return Err(SessionError::Closed);
        }

        let token = Uuid::new_v4().simple().to_string();
        self.sessions.write().insert(token.clone());
        debug!("issued session");

        Ok(SessionCookie::new(token, Some(self.max_age)))
    }

    pub fn is_valid(&self, token: &str) -> bool {
        !self.is_closed() && self.sessions.read().contains(token)
    }

    /// Forgets `token` and returns a cookie that expires it on the client.
    pub fn revoke(&self, token: &str) -> SessionCookie {
        self.sessions.write().remove(token);
        SessionCookie::new(String::new(), None)
    }

    /// Drops every session and refuses new ones.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.sessions.write().clear();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Counts consecutive wrong passwords and closes the tracker at the limit.
pub struct LoginGuard {
    failures: AtomicU32,
    max_attempts: u32,
}

impl LoginGuard {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            failures: AtomicU32::new(0),
            max_attempts,
        }
    }

    /// Checks `given` against `expected` and issues a session on success.
    ///
    /// A correct password resets the failure count.
    pub fn login(
        &self,
        tracker: &SessionTracker,
        expected: &str,
        given: &str,
    ) -> Result<SessionCookie, SessionError> {
        if tracker.is_closed() {
            return Err(SessionError::TooManyAttempts);
        }

        // blake3::Hash compares in constant time
        if blake3::hash(given.as_bytes()) == blake3::hash(expected.as_bytes()) {
            self.failures.store(0, Ordering::SeqCst);
            return tracker.issue();
        }

        let failures = self.failures.fetch_add(1, Ordering::SeqCst) + 1;
        if failures >= self.max_attempts {
            warn!(failures, "too many failed logins, closing sessions");
            tracker.close();
            return Err(SessionError::TooManyAttempts);
        }

        Err(SessionError::WrongPassword {
            remaining: self.max_attempts - failures,
        })
    }

    pub fn failures(&self) -> u32 {
        self.failures.load(Ordering::SeqCst)
    }
}

impl Default for LoginGuard {
    fn default() -> Self {
        Self::new(MAX_LOGIN_ATTEMPTS)
    }
}

#[cfg(test)]
mod tests;
