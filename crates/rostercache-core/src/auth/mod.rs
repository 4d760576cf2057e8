//! Session state for the current user.
//!
//! This module provides:
//! - `Role`: the authorization tag (`guest`, `user`, `admin`) that partitions caches
//! - `SessionContext`: token + identity, passed explicitly into every facade call
//!
//! Sessions are persisted through a `KeyValueStore` under the keys the web
//! client uses (`token`, `role`, `username`, `displayName`).

pub mod session;

pub use session::{Role, SessionContext};
