use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::storage::{KeyValueStore, StorageError};

const TOKEN_KEY: &str = "token";
const ROLE_KEY: &str = "role";
const USERNAME_KEY: &str = "username";
const DISPLAY_NAME_KEY: &str = "displayName";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Guest,
    User,
    Admin,
}

impl Role {
    /// Every role, in the order caches are invalidated.
    pub const ALL: [Role; 3] = [Role::Guest, Role::User, Role::Admin];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Guest => "guest",
            Role::User => "user",
            Role::Admin => "admin",
        }
    }

    /// Parse a role tag. Unknown tags yield `None` so callers never guess a
    /// partition for data they cannot classify.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "guest" => Some(Role::Guest),
            "user" => Some(Role::User),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "ts", derive(ts_rs::TS), ts(export))]
#[serde(rename_all = "camelCase")]
pub struct SessionContext {
    pub token: Option<String>,
    pub role: Role,
    pub username: Option<String>,
    pub display_name: Option<String>,
}

impl SessionContext {
    /// Anonymous session.
    pub fn guest() -> Self {
        Self::default()
    }

    /// Bearer token, if one is set and non-empty.
    pub fn token(&self) -> Option<&str> {
        self.token.as_deref().filter(|t| !t.is_empty())
    }

    pub fn is_logged_in(&self) -> bool {
        self.token().is_some()
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }

    /// Reset to an anonymous guest session.
    pub fn clear(&mut self) {
        *self = Self::guest();
    }

    /// Apply a role tag reported by the server. Unknown tags are ignored.
    pub fn apply_role_tag(&mut self, tag: &str) {
        match Role::parse(tag) {
            Some(role) => self.role = role,
            None => warn!(role = tag, "Ignoring unknown role tag"),
        }
    }

    /// Load a persisted session. Anything unreadable degrades to a guest session.
    pub fn load<S: KeyValueStore + ?Sized>(store: &S) -> Self {
        match Self::try_load(store) {
            Ok(session) => session,
            Err(e) => {
                debug!(error = %e, "Failed to load session, starting as guest");
                Self::guest()
            }
        }
    }

    fn try_load<S: KeyValueStore + ?Sized>(store: &S) -> Result<Self, StorageError> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.is_empty());
        let role = store
            .get(ROLE_KEY)?
            .and_then(|tag| Role::parse(&tag))
            .unwrap_or_default();

        Ok(Self {
            token: non_empty(store.get(TOKEN_KEY)?),
            role,
            username: non_empty(store.get(USERNAME_KEY)?),
            display_name: non_empty(store.get(DISPLAY_NAME_KEY)?),
        })
    }

    /// Persist the session. Empty fields remove their key.
    pub fn save<S: KeyValueStore + ?Sized>(&self, store: &S) -> Result<(), StorageError> {
        put_or_remove(store, TOKEN_KEY, self.token())?;
        put_or_remove(store, ROLE_KEY, Some(self.role.as_str()))?;
        put_or_remove(store, USERNAME_KEY, self.username.as_deref())?;
        put_or_remove(store, DISPLAY_NAME_KEY, self.display_name.as_deref())?;
        Ok(())
    }
}

fn put_or_remove<S: KeyValueStore + ?Sized>(
    store: &S,
    key: &str,
    value: Option<&str>,
) -> Result<(), StorageError> {
    match value.filter(|v| !v.is_empty()) {
        Some(v) => store.set(key, v),
        None => store.remove(key),
    }
}
